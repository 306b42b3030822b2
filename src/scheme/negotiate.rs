// src/scheme/negotiate.rs

//! The Negotiate (SPNEGO/Kerberos) authentication scheme.
//!
//! The engine drives the token exchange but does not implement the GSS
//! security layer itself: tokens come from an injected
//! [`SecurityContextProvider`] capability, keyed by mechanism name and the
//! service principal derived from the route (`HTTP/<host>`, using the proxy
//! host when authenticating to a proxy).

use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use http::HeaderValue;

use super::{AuthRequest, AuthScheme};
use crate::challenge::Challenge;
use crate::credentials::Credentials;
use crate::error;
use crate::Error;

/// Opaque security-context capability producing mechanism tokens.
///
/// The call is synchronous and blocking with no internal timeout; callers
/// that need cancellation must drive the scheme to failure themselves.
pub trait SecurityContextProvider: Send + Sync {
    /// Produce an initial token (no input) or a continuation token for the
    /// given mechanism and service principal.
    fn initialize(
        &self,
        mechanism: &str,
        service_principal: &str,
        input_token: Option<&[u8]>,
    ) -> Result<Vec<u8>, Error>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum NegotiateState {
    Uninitiated,
    ChallengeReceived,
    TokenGenerated,
    Failed,
}

#[derive(Clone)]
pub struct NegotiateScheme {
    mechanism: String,
    provider: Arc<dyn SecurityContextProvider>,
    state: NegotiateState,
    input: Option<Vec<u8>>,
    output: Option<String>,
}

impl NegotiateScheme {
    pub fn new(mechanism: &str, provider: Arc<dyn SecurityContextProvider>) -> NegotiateScheme {
        NegotiateScheme {
            mechanism: mechanism.to_string(),
            provider,
            state: NegotiateState::Uninitiated,
            input: None,
            output: None,
        }
    }
}

impl std::fmt::Debug for NegotiateScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NegotiateScheme")
            .field("mechanism", &self.mechanism)
            .field("state", &self.state)
            .finish()
    }
}

impl AuthScheme for NegotiateScheme {
    fn name(&self) -> &str {
        &self.mechanism
    }

    fn realm(&self) -> Option<&str> {
        None
    }

    fn is_connection_based(&self) -> bool {
        true
    }

    fn is_complete(&self) -> bool {
        matches!(
            self.state,
            NegotiateState::TokenGenerated | NegotiateState::Failed
        )
    }

    fn process_challenge(&mut self, challenge: &Challenge) -> Result<(), Error> {
        if !challenge.scheme().eq_ignore_ascii_case(&self.mechanism) {
            return Err(error::malformed_challenge(format!(
                "{} scheme handed a {} challenge",
                self.mechanism,
                challenge.scheme()
            )));
        }

        let token = challenge.value().trim();
        match (self.state, token.is_empty()) {
            (NegotiateState::Uninitiated, true) => {
                self.state = NegotiateState::ChallengeReceived;
                Ok(())
            }
            (NegotiateState::TokenGenerated, false) => {
                let decoded = BASE64.decode(token).map_err(|e| {
                    self.state = NegotiateState::Failed;
                    error::malformed_challenge(format!("invalid base64 in {} token: {e}", self.mechanism))
                })?;
                self.input = Some(decoded);
                self.state = NegotiateState::ChallengeReceived;
                Ok(())
            }
            (NegotiateState::TokenGenerated, true) => {
                // bare re-challenge after our token: the server rejected it
                self.state = NegotiateState::Failed;
                Ok(())
            }
            (NegotiateState::Failed, _) => Ok(()),
            _ => {
                // a token before we produced one, or a repeated challenge
                // without an intervening request
                self.state = NegotiateState::Failed;
                Err(error::negotiate(format!(
                    "out-of-sequence {} challenge",
                    self.mechanism
                )))
            }
        }
    }

    fn authenticate(
        &mut self,
        _credentials: &Credentials,
        request: &AuthRequest<'_>,
    ) -> Result<HeaderValue, Error> {
        let token = match self.state {
            NegotiateState::Failed => {
                return Err(error::negotiate(format!(
                    "{} token exchange already failed",
                    self.mechanism
                )))
            }
            NegotiateState::Uninitiated => {
                return Err(error::auth(format!(
                    "{} challenge has not been processed",
                    self.mechanism
                )))
            }
            NegotiateState::ChallengeReceived => {
                let spn = request.target.service_principal();
                log::debug!(
                    "acquiring {} token for {spn} ({})",
                    self.mechanism,
                    if self.input.is_some() {
                        "continuation"
                    } else {
                        "initial"
                    }
                );
                let raw = match self.provider.initialize(
                    &self.mechanism,
                    &spn,
                    self.input.as_deref(),
                ) {
                    Ok(raw) => raw,
                    Err(e) => {
                        // provider failures are fatal for the exchange
                        self.state = NegotiateState::Failed;
                        return Err(e);
                    }
                };
                let encoded = BASE64.encode(raw);
                self.output = Some(encoded.clone());
                self.state = NegotiateState::TokenGenerated;
                encoded
            }
            NegotiateState::TokenGenerated => self
                .output
                .clone()
                .ok_or_else(|| error::negotiate("no token available to re-emit"))?,
        };

        HeaderValue::from_str(&format!("{} {token}", self.mechanism)).map_err(error::encoding)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::AuthTarget;

    /// Provider returning canned tokens and recording the principals asked
    /// for.
    struct FixedProvider {
        token: Vec<u8>,
        fail: bool,
    }

    impl SecurityContextProvider for FixedProvider {
        fn initialize(
            &self,
            _mechanism: &str,
            service_principal: &str,
            input_token: Option<&[u8]>,
        ) -> Result<Vec<u8>, Error> {
            if self.fail {
                return Err(error::negotiate("no credentials available"));
            }
            let mut token = self.token.clone();
            token.extend_from_slice(service_principal.as_bytes());
            if let Some(input) = input_token {
                token.extend_from_slice(input);
            }
            Ok(token)
        }
    }

    fn scheme(fail: bool) -> NegotiateScheme {
        NegotiateScheme::new(
            "Negotiate",
            Arc::new(FixedProvider {
                token: b"tok".to_vec(),
                fail,
            }),
        )
    }

    fn request<'a>(target: &'a AuthTarget) -> AuthRequest<'a> {
        AuthRequest {
            method: "GET",
            uri: "/",
            body: None,
            target,
        }
    }

    #[test]
    fn test_initial_token_flow() {
        let target = AuthTarget::default_port("http", "server.corp.com");
        let creds = Credentials::password("ignored", None);
        let mut scheme = scheme(false);

        scheme
            .process_challenge(&Challenge::parse("Negotiate").unwrap())
            .unwrap();
        assert!(!scheme.is_complete());

        let value = scheme.authenticate(&creds, &request(&target)).unwrap();
        let header = value.to_str().unwrap();
        assert!(header.starts_with("Negotiate "));

        let decoded = BASE64
            .decode(header.strip_prefix("Negotiate ").unwrap())
            .unwrap();
        assert_eq!(&decoded[..3], b"tok");
        assert!(decoded.ends_with(b"HTTP/server.corp.com"));
        assert!(scheme.is_complete());
    }

    #[test]
    fn test_continuation_token() {
        let target = AuthTarget::default_port("http", "server");
        let creds = Credentials::password("ignored", None);
        let mut scheme = scheme(false);

        scheme
            .process_challenge(&Challenge::parse("Negotiate").unwrap())
            .unwrap();
        scheme.authenticate(&creds, &request(&target)).unwrap();

        let server_token = BASE64.encode(b"continue-me");
        scheme
            .process_challenge(&Challenge::parse(&format!("Negotiate {server_token}")).unwrap())
            .unwrap();
        assert!(!scheme.is_complete());

        let value = scheme.authenticate(&creds, &request(&target)).unwrap();
        let decoded = BASE64
            .decode(value.to_str().unwrap().strip_prefix("Negotiate ").unwrap())
            .unwrap();
        assert!(decoded.ends_with(b"continue-me"));
    }

    #[test]
    fn test_out_of_sequence_token_fails() {
        let token = BASE64.encode(b"unexpected");
        let mut scheme = scheme(false);
        let err = scheme
            .process_challenge(&Challenge::parse(&format!("Negotiate {token}")).unwrap())
            .unwrap_err();
        assert!(err.is_negotiate());
        assert!(err.is_fatal());
        assert!(scheme.is_complete());
    }

    #[test]
    fn test_provider_failure_is_fatal() {
        let target = AuthTarget::default_port("http", "server");
        let creds = Credentials::password("ignored", None);
        let mut scheme = scheme(true);

        scheme
            .process_challenge(&Challenge::parse("Negotiate").unwrap())
            .unwrap();
        let err = scheme.authenticate(&creds, &request(&target)).unwrap_err();
        assert!(err.is_negotiate());
        assert!(scheme.is_complete());
    }

    #[test]
    fn test_bare_rechallenge_after_token_is_rejection() {
        let target = AuthTarget::default_port("http", "server");
        let creds = Credentials::password("ignored", None);
        let mut scheme = scheme(false);

        scheme
            .process_challenge(&Challenge::parse("Negotiate").unwrap())
            .unwrap();
        scheme.authenticate(&creds, &request(&target)).unwrap();
        scheme
            .process_challenge(&Challenge::parse("Negotiate").unwrap())
            .unwrap();
        assert!(scheme.is_complete());
        assert!(scheme.authenticate(&creds, &request(&target)).is_err());
    }

    #[test]
    fn test_kerberos_mechanism_token_prefix() {
        let target = AuthTarget::default_port("http", "server");
        let creds = Credentials::password("ignored", None);
        let mut scheme = NegotiateScheme::new(
            "Kerberos",
            Arc::new(FixedProvider {
                token: b"krb".to_vec(),
                fail: false,
            }),
        );

        scheme
            .process_challenge(&Challenge::parse("Kerberos").unwrap())
            .unwrap();
        let value = scheme.authenticate(&creds, &request(&target)).unwrap();
        assert!(value.to_str().unwrap().starts_with("Kerberos "));
        assert_eq!(scheme.name(), "Kerberos");
    }
}
