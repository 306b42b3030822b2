// src/lib.rs

//! # httpauth
//!
//! The authentication engine of an HTTP client: challenge/response
//! negotiation with origin servers and proxies across the Basic, Digest,
//! NTLM and Negotiate (SPNEGO/Kerberos) schemes.
//!
//! The engine performs no network I/O. The surrounding request-execution
//! pipeline hands it responses and mutable request headers; the engine
//! tracks per-target progress in an [`AuthState`], selects and drives a
//! scheme, and attaches the `Authorization` or `Proxy-Authorization`
//! header for the next attempt.
//!
//! ```no_run
//! use httpauth::{
//!     AuthCache, AuthConfig, AuthRequest, AuthScope, AuthState, AuthStrategy, AuthTarget,
//!     Authenticator, Credentials, MemoryCredentialStore, SchemeRegistry,
//! };
//! use http::{HeaderMap, StatusCode};
//!
//! let store = MemoryCredentialStore::new();
//! store.add(AuthScope::any(), Credentials::password("user", Some("secret".into())));
//!
//! let authenticator = Authenticator::new();
//! let strategy = AuthStrategy::target();
//! let registry = SchemeRegistry::standard();
//! let cache = AuthCache::new();
//! let config = AuthConfig::new();
//! let target = AuthTarget::new("http", "example.com", 80);
//! let mut state = AuthState::new();
//!
//! // on response receipt:
//! let (status, response_headers) = (StatusCode::UNAUTHORIZED, HeaderMap::new());
//! if authenticator.is_challenged(&target, status, &mut state, &strategy, &cache)
//!     && authenticator.handle_challenge(
//!         &target, &response_headers, &mut state, &strategy,
//!         &registry, &store, &cache, &config,
//!     )
//! {
//!     // before resending the request:
//!     let mut request_headers = HeaderMap::new();
//!     let request = AuthRequest {
//!         method: "GET",
//!         uri: "/",
//!         body: None,
//!         target: &target,
//!     };
//!     authenticator.apply_auth_response(&request, &mut request_headers, &mut state, &strategy);
//! }
//! ```
//!
//! NTLM and Negotiate are connection-based: their completed state belongs
//! to the underlying connection and is never cached across connections.
//! Basic and Digest completions are cached per host in an [`AuthCache`] so
//! later requests can authenticate preemptively.

mod authenticator;
mod cache;
mod challenge;
mod config;
mod credentials;
pub mod error;
pub mod ntlm;
mod scheme;
mod state;
mod strategy;
mod target;

pub use crate::authenticator::Authenticator;
pub use crate::cache::AuthCache;
pub use crate::challenge::{Challenge, ChallengeKind};
pub use crate::config::AuthConfig;
pub use crate::credentials::{AuthScope, CredentialStore, Credentials, MemoryCredentialStore};
pub use crate::error::Error;
pub use crate::scheme::{
    AuthRequest, AuthScheme, BasicScheme, DigestScheme, NegotiateScheme, NtlmScheme, Scheme,
    SchemeRegistry, SecurityContextProvider,
};
pub use crate::state::{AuthOption, AuthState, ProtocolState};
pub use crate::strategy::AuthStrategy;
pub use crate::target::{scheme_default_port, AuthTarget};
