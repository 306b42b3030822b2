// src/scheme/mod.rs

//! Authentication schemes.
//!
//! The four schemes share the [`AuthScheme`] capability set and are carried
//! in the closed [`Scheme`] union so the rest of the engine never deals in
//! trait objects. A scheme instance is stateful: it accumulates challenge
//! parameters and handshake progress for one authentication attempt.

mod basic;
mod digest;
mod negotiate;
mod ntlm;

pub use basic::BasicScheme;
pub use digest::DigestScheme;
pub use negotiate::{NegotiateScheme, SecurityContextProvider};
pub use ntlm::NtlmScheme;

use std::collections::HashMap;
use std::sync::Arc;

use http::HeaderValue;

use crate::challenge::Challenge;
use crate::config::AuthConfig;
use crate::credentials::Credentials;
use crate::target::AuthTarget;
use crate::Error;

/// The request attributes a scheme may consult while computing an
/// authorization value.
#[derive(Clone, Copy, Debug)]
pub struct AuthRequest<'a> {
    /// The request method, e.g. `GET`.
    pub method: &'a str,
    /// The request URI as it will appear on the request line.
    pub uri: &'a str,
    /// The entity body when it is repeatable, for integrity protection.
    pub body: Option<&'a [u8]>,
    /// The host this authorization is addressed to: the proxy for proxy
    /// authentication, the origin server otherwise.
    pub target: &'a AuthTarget,
}

/// The capability set shared by all schemes.
pub trait AuthScheme {
    /// The scheme token, e.g. `Basic`.
    fn name(&self) -> &str;

    /// The protection-space realm from the last challenge, if any.
    fn realm(&self) -> Option<&str>;

    /// True if completed state is valid for the connection's lifetime
    /// rather than per request.
    fn is_connection_based(&self) -> bool;

    /// True if the handshake can make no further progress: either it
    /// succeeded or the scheme is exhausted.
    fn is_complete(&self) -> bool;

    /// Absorb a challenge into the scheme's state.
    fn process_challenge(&mut self, challenge: &Challenge) -> Result<(), Error>;

    /// Compute the authorization header value for the given credentials
    /// and request. Never returns a partial value: any failure is an error.
    fn authenticate(
        &mut self,
        credentials: &Credentials,
        request: &AuthRequest<'_>,
    ) -> Result<HeaderValue, Error>;
}

/// A scheme instance: the closed union over the supported variants.
#[derive(Clone)]
pub enum Scheme {
    Basic(BasicScheme),
    Digest(DigestScheme),
    Ntlm(NtlmScheme),
    Negotiate(NegotiateScheme),
}

impl Scheme {
    fn inner(&self) -> &dyn AuthScheme {
        match self {
            Scheme::Basic(s) => s,
            Scheme::Digest(s) => s,
            Scheme::Ntlm(s) => s,
            Scheme::Negotiate(s) => s,
        }
    }

    fn inner_mut(&mut self) -> &mut dyn AuthScheme {
        match self {
            Scheme::Basic(s) => s,
            Scheme::Digest(s) => s,
            Scheme::Ntlm(s) => s,
            Scheme::Negotiate(s) => s,
        }
    }
}

impl AuthScheme for Scheme {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn realm(&self) -> Option<&str> {
        self.inner().realm()
    }

    fn is_connection_based(&self) -> bool {
        self.inner().is_connection_based()
    }

    fn is_complete(&self) -> bool {
        self.inner().is_complete()
    }

    fn process_challenge(&mut self, challenge: &Challenge) -> Result<(), Error> {
        self.inner_mut().process_challenge(challenge)
    }

    fn authenticate(
        &mut self,
        credentials: &Credentials,
        request: &AuthRequest<'_>,
    ) -> Result<HeaderValue, Error> {
        self.inner_mut().authenticate(credentials, request)
    }
}

impl std::fmt::Debug for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheme")
            .field("name", &self.name())
            .field("realm", &self.realm())
            .field("complete", &self.is_complete())
            .finish()
    }
}

type SchemeFactory = Arc<dyn Fn(&AuthConfig) -> Scheme + Send + Sync>;

/// Maps scheme names to factories creating fresh scheme instances.
///
/// Lookup is case-insensitive. The default registry carries Basic, Digest
/// and NTLM; Negotiate and Kerberos are added when a security context
/// provider capability is supplied.
#[derive(Clone, Default)]
pub struct SchemeRegistry {
    factories: HashMap<String, SchemeFactory>,
}

impl SchemeRegistry {
    /// An empty registry.
    pub fn new() -> SchemeRegistry {
        SchemeRegistry::default()
    }

    /// The registry with the schemes that need no external capability.
    pub fn standard() -> SchemeRegistry {
        let mut registry = SchemeRegistry::new();
        registry.register("Basic", |config| {
            Scheme::Basic(BasicScheme::new(config.charset()))
        });
        registry.register("Digest", |_| Scheme::Digest(DigestScheme::new()));
        registry.register("NTLM", |_| Scheme::Ntlm(NtlmScheme::new()));
        registry
    }

    /// The standard registry extended with Negotiate and Kerberos driven
    /// by the given security context provider.
    pub fn with_provider(provider: Arc<dyn SecurityContextProvider>) -> SchemeRegistry {
        let mut registry = SchemeRegistry::standard();
        let negotiate = provider.clone();
        registry.register("Negotiate", move |_| {
            Scheme::Negotiate(NegotiateScheme::new("Negotiate", negotiate.clone()))
        });
        registry.register("Kerberos", move |_| {
            Scheme::Negotiate(NegotiateScheme::new("Kerberos", provider.clone()))
        });
        registry
    }

    /// Register a scheme factory under a name.
    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn(&AuthConfig) -> Scheme + Send + Sync + 'static,
    {
        self.factories
            .insert(name.to_ascii_lowercase(), Arc::new(factory));
    }

    /// Instantiate a fresh scheme for a name, if registered.
    pub fn create(&self, name: &str, config: &AuthConfig) -> Option<Scheme> {
        self.factories
            .get(&name.to_ascii_lowercase())
            .map(|factory| factory(config))
    }
}
