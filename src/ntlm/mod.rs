// src/ntlm/mod.rs

//! The NTLM engine: the three-message handshake codec and its crypto.
//!
//! Messages are fixed-offset binary: an 8-byte signature, a 4-byte
//! little-endian message type, type-specific fixed fields and then
//! variable-length security buffers (2-byte length, 2-byte capacity,
//! 4-byte offset) pointing into a trailing data area. A buffer whose
//! offset+length runs past the end of the message is rejected outright.

pub(crate) mod crypto;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bitflags::bitflags;
use bytes::BufMut;

use crate::error;
use crate::Error;

/// The magic value at the start of every NTLM message: `NTLMSSP\0`.
pub const SIGNATURE: &[u8; 8] = b"NTLMSSP\0";

bitflags! {
    /// NTLM negotiation flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct NegotiateFlags: u32 {
        const NEGOTIATE_UNICODE = 0x0000_0001;
        const NEGOTIATE_OEM = 0x0000_0002;
        const REQUEST_TARGET = 0x0000_0004;
        const NEGOTIATE_SIGN = 0x0000_0010;
        const NEGOTIATE_SEAL = 0x0000_0020;
        const NEGOTIATE_LAN_MANAGER_KEY = 0x0000_0080;
        const NEGOTIATE_NTLM = 0x0000_0200;
        const DOMAIN_SUPPLIED = 0x0000_1000;
        const WORKSTATION_SUPPLIED = 0x0000_2000;
        const ALWAYS_SIGN = 0x0000_8000;
        const TARGET_TYPE_DOMAIN = 0x0001_0000;
        const TARGET_TYPE_SERVER = 0x0002_0000;
        const NEGOTIATE_NTLM2 = 0x0008_0000;
        const NEGOTIATE_TARGET_INFO = 0x0080_0000;
        const NEGOTIATE_VERSION = 0x0200_0000;
        const NEGOTIATE_128 = 0x2000_0000;
        const NEGOTIATE_KEY_EXCHANGE = 0x4000_0000;
        const NEGOTIATE_56 = 0x8000_0000;
    }
}

/// A security buffer descriptor pointing into the message's data area.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct SecurityBuffer {
    length: u16,
    capacity: u16,
    offset: u32,
}

impl SecurityBuffer {
    fn decode(data: &[u8], at: usize) -> Result<SecurityBuffer, Error> {
        let field = data.get(at..at + 8).ok_or_else(|| {
            error::malformed_challenge("NTLM message truncated inside a security buffer field")
        })?;
        Ok(SecurityBuffer {
            length: u16::from_le_bytes(field[0..2].try_into().unwrap()),
            capacity: u16::from_le_bytes(field[2..4].try_into().unwrap()),
            offset: u32::from_le_bytes(field[4..8].try_into().unwrap()),
        })
    }

    /// Resolve the referenced bytes, rejecting out-of-range references.
    fn slice<'a>(&self, data: &'a [u8]) -> Result<&'a [u8], Error> {
        if self.length == 0 {
            return Ok(&[]);
        }
        let start = self.offset as usize;
        let end = start + usize::from(self.length);
        data.get(start..end).ok_or_else(|| {
            error::malformed_challenge(format!(
                "NTLM security buffer out of range: offset {} length {} in {} bytes",
                self.offset,
                self.length,
                data.len()
            ))
        })
    }
}

/// Append a security buffer field for `data` and account for its payload
/// position in the trailing data area.
fn put_security_buffer(header: &mut Vec<u8>, payload: &mut Vec<u8>, base: u32, data: &[u8]) {
    let length = data.len() as u16;
    let offset = base + payload.len() as u32;
    header.put_u16_le(length);
    header.put_u16_le(length);
    header.put_u32_le(if length == 0 { base } else { offset });
    payload.extend_from_slice(data);
}

fn check_signature(data: &[u8], expected_type: u32) -> Result<(), Error> {
    if data.len() < 12 {
        return Err(error::malformed_challenge(format!(
            "NTLM message too short: {} bytes",
            data.len()
        )));
    }
    if &data[0..8] != SIGNATURE {
        return Err(error::malformed_challenge("NTLM signature mismatch"));
    }
    let msg_type = u32::from_le_bytes(data[8..12].try_into().unwrap());
    if msg_type != expected_type {
        return Err(error::malformed_challenge(format!(
            "expected NTLM message type {expected_type}, got {msg_type}"
        )));
    }
    Ok(())
}

fn encode_string(text: &str, unicode: bool) -> Vec<u8> {
    if unicode {
        crypto::utf16_le(text)
    } else {
        text.as_bytes().to_vec()
    }
}

fn decode_string(data: &[u8], unicode: bool) -> String {
    if unicode {
        let units: Vec<u16> = data
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else {
        String::from_utf8_lossy(data).into_owned()
    }
}

/// The client's opening negotiation message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Type1Message {
    pub flags: NegotiateFlags,
    pub domain: Option<String>,
    pub workstation: Option<String>,
}

impl Type1Message {
    /// The default negotiation: unicode, NTLMv1, NTLM2 session security and
    /// version information requested.
    pub fn new(domain: Option<&str>, workstation: Option<&str>) -> Type1Message {
        let mut flags = NegotiateFlags::NEGOTIATE_UNICODE
            | NegotiateFlags::REQUEST_TARGET
            | NegotiateFlags::NEGOTIATE_NTLM
            | NegotiateFlags::NEGOTIATE_NTLM2
            | NegotiateFlags::ALWAYS_SIGN
            | NegotiateFlags::NEGOTIATE_VERSION
            | NegotiateFlags::NEGOTIATE_128
            | NegotiateFlags::NEGOTIATE_56;
        if domain.is_some() {
            flags |= NegotiateFlags::DOMAIN_SUPPLIED;
        }
        if workstation.is_some() {
            flags |= NegotiateFlags::WORKSTATION_SUPPLIED;
        }
        Type1Message {
            flags,
            domain: domain.map(str::to_owned),
            workstation: workstation.map(str::to_owned),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        // domain and workstation are OEM-encoded in the Type 1 message
        let domain = self.domain.as_deref().unwrap_or("").to_uppercase();
        let workstation = self.workstation.as_deref().unwrap_or("").to_uppercase();

        const HEADER_LEN: u32 = 40;
        let mut header = Vec::with_capacity(HEADER_LEN as usize);
        let mut payload = Vec::new();

        header.extend_from_slice(SIGNATURE);
        header.put_u32_le(1);
        header.put_u32_le(self.flags.bits());
        put_security_buffer(&mut header, &mut payload, HEADER_LEN, domain.as_bytes());
        put_security_buffer(&mut header, &mut payload, HEADER_LEN, workstation.as_bytes());
        // version block: placeholder OS version, NTLM revision 15
        header.extend_from_slice(&[0x06, 0x01, 0xb1, 0x1d, 0x00, 0x00, 0x00, 0x0f]);

        header.extend_from_slice(&payload);
        header
    }

    pub fn decode(data: &[u8]) -> Result<Type1Message, Error> {
        check_signature(data, 1)?;
        if data.len() < 32 {
            return Err(error::malformed_challenge("NTLM Type 1 message too short"));
        }
        let flags = NegotiateFlags::from_bits_retain(u32::from_le_bytes(
            data[12..16].try_into().unwrap(),
        ));
        let domain = SecurityBuffer::decode(data, 16)?.slice(data)?;
        let workstation = SecurityBuffer::decode(data, 24)?.slice(data)?;
        Ok(Type1Message {
            flags,
            domain: (!domain.is_empty()).then(|| decode_string(domain, false)),
            workstation: (!workstation.is_empty()).then(|| decode_string(workstation, false)),
        })
    }
}

/// The server's challenge message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Type2Message {
    pub flags: NegotiateFlags,
    pub challenge: [u8; 8],
    pub target_name: Option<String>,
    pub target_info: Option<Vec<u8>>,
}

impl Type2Message {
    /// Decode a server challenge.
    ///
    /// Only the fixed fields through the challenge are required; target
    /// name, target info and version are optional and absent from minimal
    /// conformant servers.
    pub fn decode(data: &[u8]) -> Result<Type2Message, Error> {
        check_signature(data, 2)?;
        if data.len() < 32 {
            return Err(error::malformed_challenge(format!(
                "NTLM Type 2 message too short: {} bytes",
                data.len()
            )));
        }

        let flags = NegotiateFlags::from_bits_retain(u32::from_le_bytes(
            data[20..24].try_into().unwrap(),
        ));
        let unicode = flags.contains(NegotiateFlags::NEGOTIATE_UNICODE);
        let mut challenge = [0u8; 8];
        challenge.copy_from_slice(&data[24..32]);

        let target_name = {
            let buffer = SecurityBuffer::decode(data, 12)?;
            let bytes = buffer.slice(data)?;
            (!bytes.is_empty()).then(|| decode_string(bytes, unicode))
        };

        // the target info buffer exists only in messages long enough to
        // carry the context and target info fields
        let target_info = if data.len() >= 48 {
            let buffer = SecurityBuffer::decode(data, 40)?;
            let bytes = buffer.slice(data)?;
            (!bytes.is_empty()).then(|| bytes.to_vec())
        } else {
            None
        };

        Ok(Type2Message {
            flags,
            challenge,
            target_name,
            target_info,
        })
    }

    /// Encode a challenge message; the counterpart of [`Type2Message::decode`].
    pub fn encode(&self) -> Vec<u8> {
        let unicode = self.flags.contains(NegotiateFlags::NEGOTIATE_UNICODE);
        let target_name = self
            .target_name
            .as_deref()
            .map(|name| encode_string(name, unicode))
            .unwrap_or_default();
        let target_info = self.target_info.clone().unwrap_or_default();

        const HEADER_LEN: u32 = 48;
        let mut header = Vec::with_capacity(HEADER_LEN as usize);
        let mut payload = Vec::new();

        header.extend_from_slice(SIGNATURE);
        header.put_u32_le(2);
        put_security_buffer(&mut header, &mut payload, HEADER_LEN, &target_name);
        header.put_u32_le(self.flags.bits());
        header.extend_from_slice(&self.challenge);
        header.put_u64_le(0); // context
        put_security_buffer(&mut header, &mut payload, HEADER_LEN, &target_info);

        header.extend_from_slice(&payload);
        header
    }

    /// Iterate the AV pairs of the target info block, if present.
    pub fn target_info_entries(&self) -> Vec<(u16, Vec<u8>)> {
        let mut entries = Vec::new();
        let Some(info) = self.target_info.as_deref() else {
            return entries;
        };
        let mut rest = info;
        while rest.len() >= 4 {
            let av_id = u16::from_le_bytes([rest[0], rest[1]]);
            let av_len = usize::from(u16::from_le_bytes([rest[2], rest[3]]));
            if av_id == 0 {
                break;
            }
            let Some(data) = rest.get(4..4 + av_len) else {
                break;
            };
            entries.push((av_id, data.to_vec()));
            rest = &rest[4 + av_len..];
        }
        entries
    }
}

/// The client's authentication message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Type3Message {
    pub flags: NegotiateFlags,
    pub lm_response: Vec<u8>,
    pub nt_response: Vec<u8>,
    pub domain: String,
    pub username: String,
    pub workstation: String,
    pub session_key: Vec<u8>,
}

impl Type3Message {
    /// Compute the response to a server challenge.
    ///
    /// Response selection: a target-info block drives NTLMv2; otherwise the
    /// NTLM2 session flag drives the session response; otherwise plain v1.
    /// The session-key variant follows the negotiated flags, RC4-wrapped
    /// under a random secondary key when key exchange was negotiated.
    pub fn build(
        username: &str,
        password: &str,
        domain: Option<&str>,
        workstation: Option<&str>,
        type2: &Type2Message,
    ) -> Result<Type3Message, Error> {
        let domain = domain.unwrap_or("");
        let workstation = workstation.unwrap_or("");
        let challenge = &type2.challenge;

        let mut client_nonce = [0u8; 8];
        crypto::secure_random(&mut client_nonce);

        let nt_hash = crypto::ntlm_hash(password);

        let (lm_response, nt_response, base_key) = match type2.target_info.as_deref() {
            Some(target_info) => {
                let v2_hash = crypto::ntlmv2_hash(username, domain, password)?;
                let blob =
                    crypto::ntlmv2_blob(crypto::windows_timestamp(), &client_nonce, target_info);
                let nt_response = crypto::ntlmv2_response(&v2_hash, challenge, &blob)?;
                let lm_response = crypto::lmv2_response(&v2_hash, challenge, &client_nonce)?;
                let key = crypto::ntlmv2_user_session_key(&v2_hash, &nt_response)?;
                (lm_response, nt_response, key)
            }
            None if type2.flags.contains(NegotiateFlags::NEGOTIATE_NTLM2) => {
                let nt_response =
                    crypto::ntlm2_session_response(&nt_hash, challenge, &client_nonce)?;
                let mut lm_response = vec![0u8; 24];
                lm_response[..8].copy_from_slice(&client_nonce);
                let key = crypto::ntlm2_session_key(&nt_hash, challenge, &client_nonce)?;
                (lm_response, nt_response.to_vec(), key)
            }
            None => {
                let lm_hash = crypto::lm_hash(password)?;
                let lm_response = crypto::v1_response(&lm_hash, challenge)?;
                let nt_response = crypto::v1_response(&nt_hash, challenge)?;
                let key = if type2
                    .flags
                    .contains(NegotiateFlags::NEGOTIATE_LAN_MANAGER_KEY)
                {
                    crypto::lan_manager_session_key(&lm_hash, &lm_response)?
                } else {
                    crypto::ntlm_user_session_key(&nt_hash)
                };
                (lm_response.to_vec(), nt_response.to_vec(), key)
            }
        };

        let key_exchange = type2
            .flags
            .contains(NegotiateFlags::NEGOTIATE_KEY_EXCHANGE);
        let session_key = if key_exchange {
            let mut secondary = [0u8; 16];
            crypto::secure_random(&mut secondary);
            crypto::rc4(&secondary, &base_key)
        } else {
            Vec::new()
        };

        let mut flags = NegotiateFlags::NEGOTIATE_NTLM | NegotiateFlags::ALWAYS_SIGN;
        if type2.flags.contains(NegotiateFlags::NEGOTIATE_UNICODE) {
            flags |= NegotiateFlags::NEGOTIATE_UNICODE;
        } else {
            flags |= NegotiateFlags::NEGOTIATE_OEM;
        }
        if type2.flags.contains(NegotiateFlags::NEGOTIATE_NTLM2) {
            flags |= NegotiateFlags::NEGOTIATE_NTLM2;
        }
        if type2.target_info.is_some() {
            flags |= NegotiateFlags::NEGOTIATE_TARGET_INFO;
        }
        if key_exchange {
            flags |= NegotiateFlags::NEGOTIATE_KEY_EXCHANGE;
        }

        Ok(Type3Message {
            flags,
            lm_response,
            nt_response,
            domain: domain.to_string(),
            username: username.to_string(),
            workstation: workstation.to_string(),
            session_key,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let unicode = self.flags.contains(NegotiateFlags::NEGOTIATE_UNICODE);
        let domain = encode_string(&self.domain, unicode);
        let username = encode_string(&self.username, unicode);
        let workstation = encode_string(&self.workstation, unicode);

        const HEADER_LEN: u32 = 72;
        let mut header = Vec::with_capacity(HEADER_LEN as usize);
        let mut payload = Vec::new();

        header.extend_from_slice(SIGNATURE);
        header.put_u32_le(3);
        put_security_buffer(&mut header, &mut payload, HEADER_LEN, &self.lm_response);
        put_security_buffer(&mut header, &mut payload, HEADER_LEN, &self.nt_response);
        put_security_buffer(&mut header, &mut payload, HEADER_LEN, &domain);
        put_security_buffer(&mut header, &mut payload, HEADER_LEN, &username);
        put_security_buffer(&mut header, &mut payload, HEADER_LEN, &workstation);
        put_security_buffer(&mut header, &mut payload, HEADER_LEN, &self.session_key);
        header.put_u32_le(self.flags.bits());
        // version block matching the one sent in Type 1
        header.extend_from_slice(&[0x06, 0x01, 0xb1, 0x1d, 0x00, 0x00, 0x00, 0x0f]);

        header.extend_from_slice(&payload);
        header
    }

    pub fn decode(data: &[u8]) -> Result<Type3Message, Error> {
        check_signature(data, 3)?;
        if data.len() < 64 {
            return Err(error::malformed_challenge("NTLM Type 3 message too short"));
        }
        let flags = NegotiateFlags::from_bits_retain(u32::from_le_bytes(
            data[60..64].try_into().unwrap(),
        ));
        let unicode = flags.contains(NegotiateFlags::NEGOTIATE_UNICODE);

        let lm_response = SecurityBuffer::decode(data, 12)?.slice(data)?.to_vec();
        let nt_response = SecurityBuffer::decode(data, 20)?.slice(data)?.to_vec();
        let domain = decode_string(SecurityBuffer::decode(data, 28)?.slice(data)?, unicode);
        let username = decode_string(SecurityBuffer::decode(data, 36)?.slice(data)?, unicode);
        let workstation = decode_string(SecurityBuffer::decode(data, 44)?.slice(data)?, unicode);
        let session_key = SecurityBuffer::decode(data, 52)?.slice(data)?.to_vec();

        Ok(Type3Message {
            flags,
            lm_response,
            nt_response,
            domain,
            username,
            workstation,
            session_key,
        })
    }
}

/// Produce the base64 Type 1 token.
pub fn generate_type1_token(domain: Option<&str>, workstation: Option<&str>) -> String {
    BASE64.encode(Type1Message::new(domain, workstation).encode())
}

/// Decode a base64 Type 2 token from a challenge header.
pub fn parse_type2_token(token: &str) -> Result<Type2Message, Error> {
    let bytes = BASE64
        .decode(token.trim())
        .map_err(|e| error::malformed_challenge(format!("invalid base64 in NTLM token: {e}")))?;
    Type2Message::decode(&bytes)
}

/// Produce the base64 Type 3 token answering `type2`.
pub fn generate_type3_token(
    username: &str,
    password: &str,
    domain: Option<&str>,
    workstation: Option<&str>,
    type2: &Type2Message,
) -> Result<String, Error> {
    let message = Type3Message::build(username, password, domain, workstation, type2)?;
    Ok(BASE64.encode(message.encode()))
}
