// src/scheme/ntlm.rs

//! The NTLM authentication scheme.
//!
//! A thin state machine over the engine in [`crate::ntlm`]: Type 1 goes out
//! on the first authenticate call, the server's Type 2 challenge is absorbed
//! by `process_challenge`, and Type 3 completes the handshake. Completion is
//! scoped to the connection, not the request.

use http::HeaderValue;

use super::{AuthRequest, AuthScheme};
use crate::challenge::Challenge;
use crate::credentials::Credentials;
use crate::error;
use crate::ntlm::{generate_type1_token, generate_type3_token, parse_type2_token, Type2Message};
use crate::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum HandshakeState {
    Uninitiated,
    ChallengeReceived,
    Type1Generated,
    Type2Received,
    Type3Generated,
    Failed,
}

#[derive(Clone, Debug)]
pub struct NtlmScheme {
    state: HandshakeState,
    type2: Option<Type2Message>,
}

impl Default for NtlmScheme {
    fn default() -> Self {
        Self::new()
    }
}

impl NtlmScheme {
    pub fn new() -> NtlmScheme {
        NtlmScheme {
            state: HandshakeState::Uninitiated,
            type2: None,
        }
    }
}

impl AuthScheme for NtlmScheme {
    fn name(&self) -> &str {
        "NTLM"
    }

    fn realm(&self) -> Option<&str> {
        // NTLM authenticates a connection, not a protection space
        None
    }

    fn is_connection_based(&self) -> bool {
        true
    }

    fn is_complete(&self) -> bool {
        matches!(
            self.state,
            HandshakeState::Type3Generated | HandshakeState::Failed
        )
    }

    fn process_challenge(&mut self, challenge: &Challenge) -> Result<(), Error> {
        if !challenge.scheme().eq_ignore_ascii_case("ntlm") {
            return Err(error::malformed_challenge(format!(
                "NTLM scheme handed a {} challenge",
                challenge.scheme()
            )));
        }

        let token = challenge.value().trim();
        if token.is_empty() {
            if self.state == HandshakeState::Uninitiated {
                self.state = HandshakeState::ChallengeReceived;
            } else {
                // the server restarted the handshake: the previous round
                // was rejected
                self.state = HandshakeState::Failed;
            }
            Ok(())
        } else {
            match parse_type2_token(token) {
                Ok(type2) => {
                    self.type2 = Some(type2);
                    self.state = HandshakeState::Type2Received;
                    Ok(())
                }
                Err(e) => {
                    self.state = HandshakeState::Failed;
                    Err(e)
                }
            }
        }
    }

    fn authenticate(
        &mut self,
        credentials: &Credentials,
        _request: &AuthRequest<'_>,
    ) -> Result<HeaderValue, Error> {
        let (username, password, domain, workstation) = match credentials {
            Credentials::Nt {
                username,
                password,
                domain,
                workstation,
            } => (username, password, domain.as_deref(), workstation.as_deref()),
            Credentials::Password { .. } => {
                return Err(error::invalid_credentials(
                    "NTLM requires NT credentials with domain and workstation",
                ))
            }
        };

        let token = match self.state {
            HandshakeState::Failed => {
                return Err(error::auth("NTLM authentication has failed"))
            }
            HandshakeState::Uninitiated => {
                return Err(error::auth("NTLM challenge has not been processed"))
            }
            HandshakeState::ChallengeReceived | HandshakeState::Type1Generated => {
                self.state = HandshakeState::Type1Generated;
                generate_type1_token(domain, workstation)
            }
            HandshakeState::Type2Received => {
                let Some(type2) = self.type2.as_ref() else {
                    return Err(error::auth("no NTLM challenge message stored"));
                };
                let token =
                    generate_type3_token(username, password, domain, workstation, type2)?;
                self.state = HandshakeState::Type3Generated;
                token
            }
            HandshakeState::Type3Generated => {
                return Err(error::auth("NTLM handshake already completed"))
            }
        };

        HeaderValue::from_str(&format!("NTLM {token}")).map_err(error::encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ntlm::NegotiateFlags;
    use crate::target::AuthTarget;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine as _;

    fn request<'a>(target: &'a AuthTarget) -> AuthRequest<'a> {
        AuthRequest {
            method: "GET",
            uri: "/",
            body: None,
            target,
        }
    }

    fn type2_token() -> String {
        let message = Type2Message {
            flags: NegotiateFlags::NEGOTIATE_UNICODE,
            challenge: [0x01, 0x23, 0x45, 0x67, 0x89, 0xab, 0xcd, 0xef],
            target_name: None,
            target_info: None,
        };
        BASE64.encode(message.encode())
    }

    #[test]
    fn test_full_handshake() {
        let target = AuthTarget::default_port("http", "server");
        let creds = Credentials::nt("user", "SecREt01", Some("DOMAIN".into()), Some("WS".into()));
        let mut scheme = NtlmScheme::new();

        scheme
            .process_challenge(&Challenge::parse("NTLM").unwrap())
            .unwrap();
        assert!(!scheme.is_complete());

        let type1 = scheme.authenticate(&creds, &request(&target)).unwrap();
        assert!(type1.to_str().unwrap().starts_with("NTLM TlRMTVNTUAAB"));
        assert!(!scheme.is_complete());

        let header = format!("NTLM {}", type2_token());
        scheme
            .process_challenge(&Challenge::parse(&header).unwrap())
            .unwrap();

        let type3 = scheme.authenticate(&creds, &request(&target)).unwrap();
        assert!(type3.to_str().unwrap().starts_with("NTLM TlRMTVNTUAAD"));
        assert!(scheme.is_complete());
        assert!(scheme.is_connection_based());
    }

    #[test]
    fn test_bare_rechallenge_after_type3_fails() {
        let target = AuthTarget::default_port("http", "server");
        let creds = Credentials::nt("user", "pw", None, None);
        let mut scheme = NtlmScheme::new();

        scheme
            .process_challenge(&Challenge::parse("NTLM").unwrap())
            .unwrap();
        scheme.authenticate(&creds, &request(&target)).unwrap();
        let header = format!("NTLM {}", type2_token());
        scheme
            .process_challenge(&Challenge::parse(&header).unwrap())
            .unwrap();
        scheme.authenticate(&creds, &request(&target)).unwrap();

        // server answered the Type 3 with a bare challenge: rejected
        scheme
            .process_challenge(&Challenge::parse("NTLM").unwrap())
            .unwrap();
        assert!(scheme.is_complete());
        assert!(scheme.authenticate(&creds, &request(&target)).is_err());
    }

    #[test]
    fn test_password_credentials_rejected() {
        let target = AuthTarget::default_port("http", "server");
        let mut scheme = NtlmScheme::new();
        scheme
            .process_challenge(&Challenge::parse("NTLM").unwrap())
            .unwrap();

        let creds = Credentials::password("user", Some("pw".into()));
        let err = scheme.authenticate(&creds, &request(&target)).unwrap_err();
        assert!(err.is_invalid_credentials());
    }

    #[test]
    fn test_garbage_token_is_malformed() {
        let mut scheme = NtlmScheme::new();
        let err = scheme
            .process_challenge(&Challenge::parse("NTLM !!!not-base64!!!").unwrap())
            .unwrap_err();
        assert!(err.is_malformed_challenge());
        assert!(scheme.is_complete());
    }

    #[test]
    fn test_authenticate_before_challenge_errors() {
        let target = AuthTarget::default_port("http", "server");
        let creds = Credentials::nt("user", "pw", None, None);
        let mut scheme = NtlmScheme::new();
        assert!(scheme.authenticate(&creds, &request(&target)).is_err());
    }
}
