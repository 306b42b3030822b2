// src/ntlm/crypto.rs

//! NTLM cryptographic primitives.
//!
//! Password hashing (LM via DES-ECB, NTLM via MD4 over UTF-16LE), the v1/v2
//! challenge responses, the session-key derivations selected by negotiated
//! flags, and the RC4 stream used only to wrap the exported session key.

use des::cipher::generic_array::GenericArray;
use des::cipher::{BlockEncrypt, KeyInit};
use des::Des;
use hmac::{Hmac, Mac};
use md4::{Digest, Md4};
use md5::Md5;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error;
use crate::Error;

type HmacMd5 = Hmac<Md5>;

/// The fixed plaintext DES-encrypted by the LM hash derivation.
const LM_MAGIC: &[u8; 8] = b"KGS!@#$%";

/// Encode a string as UTF-16LE without a byte order mark.
pub(crate) fn utf16_le(text: &str) -> Vec<u8> {
    text.encode_utf16().flat_map(|u| u.to_le_bytes()).collect()
}

/// Expand a 7-byte key into an 8-byte DES key with odd parity bits.
pub(crate) fn expand_des_key(key7: &[u8]) -> [u8; 8] {
    debug_assert_eq!(key7.len(), 7);
    let mut key8 = [0u8; 8];
    key8[0] = key7[0] >> 1;
    key8[1] = ((key7[0] & 0x01) << 6) | (key7[1] >> 2);
    key8[2] = ((key7[1] & 0x03) << 5) | (key7[2] >> 3);
    key8[3] = ((key7[2] & 0x07) << 4) | (key7[3] >> 4);
    key8[4] = ((key7[3] & 0x0F) << 3) | (key7[4] >> 5);
    key8[5] = ((key7[4] & 0x1F) << 2) | (key7[5] >> 6);
    key8[6] = ((key7[5] & 0x3F) << 1) | (key7[6] >> 7);
    key8[7] = key7[6] & 0x7F;
    for b in &mut key8 {
        // 7 key bits in bits 7..1; bit 0 carries odd parity
        *b <<= 1;
        if b.count_ones() % 2 == 0 {
            *b ^= 0x01;
        }
    }
    key8
}

/// DES-ECB encrypt one 8-byte block under a parity-expanded 7-byte key.
fn des_encrypt(key7: &[u8], block: &[u8; 8]) -> Result<[u8; 8], Error> {
    let key = expand_des_key(key7);
    let des = Des::new_from_slice(&key)
        .map_err(|e| error::auth(format!("DES key schedule failed: {e}")))?;
    let mut buf: GenericArray<u8, _> = GenericArray::clone_from_slice(block);
    des.encrypt_block(&mut buf);
    let mut out = [0u8; 8];
    out.copy_from_slice(&buf);
    Ok(out)
}

/// DES-encrypt `data` under three 7-byte keys taken from a 16-byte hash
/// padded to 21 bytes, concatenating the blocks into a 24-byte response.
fn des_long(hash: &[u8; 16], data: &[u8; 8]) -> Result<[u8; 24], Error> {
    let mut key_material = [0u8; 21];
    key_material[..16].copy_from_slice(hash);

    let mut out = [0u8; 24];
    out[..8].copy_from_slice(&des_encrypt(&key_material[0..7], data)?);
    out[8..16].copy_from_slice(&des_encrypt(&key_material[7..14], data)?);
    out[16..].copy_from_slice(&des_encrypt(&key_material[14..21], data)?);
    Ok(out)
}

/// The LM hash of a password.
///
/// The password is upper-cased, truncated or zero-padded to 14 bytes and
/// split into two 7-byte DES keys, each encrypting a fixed magic constant.
pub(crate) fn lm_hash(password: &str) -> Result<[u8; 16], Error> {
    let mut bytes = password.to_uppercase().into_bytes();
    bytes.truncate(14);
    bytes.resize(14, 0);

    let mut hash = [0u8; 16];
    hash[..8].copy_from_slice(&des_encrypt(&bytes[0..7], LM_MAGIC)?);
    hash[8..].copy_from_slice(&des_encrypt(&bytes[7..14], LM_MAGIC)?);
    Ok(hash)
}

/// The NTLM hash of a password: MD4 over its UTF-16LE encoding.
pub(crate) fn ntlm_hash(password: &str) -> [u8; 16] {
    let mut hasher = Md4::new();
    hasher.update(utf16_le(password));
    hasher.finalize().into()
}

/// The NTLMv2 hash: HMAC-MD5 keyed by the NTLM hash over the upper-cased
/// username concatenated with the upper-cased domain, both UTF-16LE.
pub(crate) fn ntlmv2_hash(username: &str, domain: &str, password: &str) -> Result<[u8; 16], Error> {
    let key = ntlm_hash(password);
    let mut mac = <HmacMd5 as Mac>::new_from_slice(&key)
        .map_err(|e| error::auth(format!("HMAC key error: {e}")))?;
    mac.update(&utf16_le(&username.to_uppercase()));
    mac.update(&utf16_le(&domain.to_uppercase()));
    let mut hash = [0u8; 16];
    hash.copy_from_slice(&mac.finalize().into_bytes());
    Ok(hash)
}

/// The 24-byte LM or NTLM v1 response to an 8-byte server challenge.
pub(crate) fn v1_response(hash: &[u8; 16], challenge: &[u8; 8]) -> Result<[u8; 24], Error> {
    des_long(hash, challenge)
}

/// The NTLM2 session response: the v1 computation applied to the first
/// 8 bytes of `MD5(server challenge || client nonce)`.
pub(crate) fn ntlm2_session_response(
    ntlm_hash: &[u8; 16],
    challenge: &[u8; 8],
    client_nonce: &[u8; 8],
) -> Result<[u8; 24], Error> {
    let mut md5 = Md5::new();
    md5.update(challenge);
    md5.update(client_nonce);
    let digest = md5.finalize();

    let mut session_nonce = [0u8; 8];
    session_nonce.copy_from_slice(&digest[..8]);
    des_long(ntlm_hash, &session_nonce)
}

/// The NTLMv2 blob: signature, reserved, timestamp, client challenge,
/// target info and trailer.
pub(crate) fn ntlmv2_blob(timestamp: u64, client_nonce: &[u8; 8], target_info: &[u8]) -> Vec<u8> {
    let mut blob = Vec::with_capacity(32 + target_info.len());
    blob.extend_from_slice(&[0x01, 0x01, 0x00, 0x00]);
    blob.extend_from_slice(&[0x00; 4]);
    blob.extend_from_slice(&timestamp.to_le_bytes());
    blob.extend_from_slice(client_nonce);
    blob.extend_from_slice(&[0x00; 4]);
    blob.extend_from_slice(target_info);
    blob.extend_from_slice(&[0x00; 4]);
    blob
}

/// The NTLMv2 response: `HMAC(v2 hash, challenge || blob)` followed by the
/// blob itself.
pub(crate) fn ntlmv2_response(
    v2_hash: &[u8; 16],
    challenge: &[u8; 8],
    blob: &[u8],
) -> Result<Vec<u8>, Error> {
    let mut mac = <HmacMd5 as Mac>::new_from_slice(v2_hash)
        .map_err(|e| error::auth(format!("HMAC key error: {e}")))?;
    mac.update(challenge);
    mac.update(blob);

    let mut response = Vec::with_capacity(16 + blob.len());
    response.extend_from_slice(&mac.finalize().into_bytes());
    response.extend_from_slice(blob);
    Ok(response)
}

/// The LMv2 response: `HMAC(v2 hash, challenge || client nonce)` followed
/// by the client nonce.
pub(crate) fn lmv2_response(
    v2_hash: &[u8; 16],
    challenge: &[u8; 8],
    client_nonce: &[u8; 8],
) -> Result<Vec<u8>, Error> {
    let mut mac = <HmacMd5 as Mac>::new_from_slice(v2_hash)
        .map_err(|e| error::auth(format!("HMAC key error: {e}")))?;
    mac.update(challenge);
    mac.update(client_nonce);

    let mut response = Vec::with_capacity(24);
    response.extend_from_slice(&mac.finalize().into_bytes());
    response.extend_from_slice(client_nonce);
    Ok(response)
}

/// The LAN Manager session key, derived from the LM hash and response.
pub(crate) fn lan_manager_session_key(
    lm_hash: &[u8; 16],
    lm_response: &[u8; 24],
) -> Result<[u8; 16], Error> {
    let mut key_material = [0xbd_u8; 14];
    key_material[..8].copy_from_slice(&lm_hash[..8]);

    let mut truncated = [0u8; 8];
    truncated.copy_from_slice(&lm_response[..8]);

    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&des_encrypt(&key_material[0..7], &truncated)?);
    key[8..].copy_from_slice(&des_encrypt(&key_material[7..14], &truncated)?);
    Ok(key)
}

/// The plain NTLM user session key: a second MD4 over the NTLM hash.
pub(crate) fn ntlm_user_session_key(ntlm_hash: &[u8; 16]) -> [u8; 16] {
    let mut hasher = Md4::new();
    hasher.update(ntlm_hash);
    hasher.finalize().into()
}

/// The NTLMv2 user session key: HMAC over the proof prefix of the response.
pub(crate) fn ntlmv2_user_session_key(
    v2_hash: &[u8; 16],
    ntlmv2_response: &[u8],
) -> Result<[u8; 16], Error> {
    if ntlmv2_response.len() < 16 {
        return Err(error::auth("NTLMv2 response too short for session key"));
    }
    let mut mac = <HmacMd5 as Mac>::new_from_slice(v2_hash)
        .map_err(|e| error::auth(format!("HMAC key error: {e}")))?;
    mac.update(&ntlmv2_response[..16]);
    let mut key = [0u8; 16];
    key.copy_from_slice(&mac.finalize().into_bytes());
    Ok(key)
}

/// The NTLM2 session variant: HMAC keyed by the NTLM user session key over
/// the server challenge concatenated with the client nonce.
pub(crate) fn ntlm2_session_key(
    ntlm_hash: &[u8; 16],
    challenge: &[u8; 8],
    client_nonce: &[u8; 8],
) -> Result<[u8; 16], Error> {
    let user_key = ntlm_user_session_key(ntlm_hash);
    let mut mac = <HmacMd5 as Mac>::new_from_slice(&user_key)
        .map_err(|e| error::auth(format!("HMAC key error: {e}")))?;
    mac.update(challenge);
    mac.update(client_nonce);
    let mut key = [0u8; 16];
    key.copy_from_slice(&mac.finalize().into_bytes());
    Ok(key)
}

/// RC4 stream cipher, used only for session-key wrapping during key exchange.
pub(crate) fn rc4(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut state: [u8; 256] = [0; 256];
    for (i, entry) in state.iter_mut().enumerate() {
        *entry = i as u8;
    }
    let mut j: u8 = 0;
    for i in 0..256 {
        j = j
            .wrapping_add(state[i])
            .wrapping_add(key[i % key.len()]);
        state.swap(i, usize::from(j));
    }

    let mut out = Vec::with_capacity(data.len());
    let (mut i, mut j) = (0u8, 0u8);
    for byte in data {
        i = i.wrapping_add(1);
        j = j.wrapping_add(state[usize::from(i)]);
        state.swap(usize::from(i), usize::from(j));
        let k = state[usize::from(
            state[usize::from(i)].wrapping_add(state[usize::from(j)]),
        )];
        out.push(byte ^ k);
    }
    out
}

/// Fill a buffer from the operating system's secure random source.
///
/// Draws are made per call site, so concurrent callers never share
/// generator state.
pub(crate) fn secure_random(buf: &mut [u8]) {
    OsRng.fill_bytes(buf);
}

/// The current time in Windows FILETIME units: 100ns intervals since
/// 1601-01-01.
pub(crate) fn windows_timestamp() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};

    const WINDOWS_EPOCH_DIFF: u64 = 116_444_736_000_000_000;

    let duration = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    duration.as_secs() * 10_000_000 + u64::from(duration.subsec_nanos()) / 100 + WINDOWS_EPOCH_DIFF
}
