// src/target.rs

//! Host descriptors the engine authenticates against.

/// A resolved authentication target: an origin server or a proxy.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AuthTarget {
    scheme: String,
    host: String,
    port: Option<u16>,
}

impl AuthTarget {
    /// A target with an explicit port.
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> AuthTarget {
        AuthTarget {
            scheme: scheme.into(),
            host: host.into(),
            port: Some(port),
        }
    }

    /// A target on the scheme's default port.
    pub fn default_port(scheme: impl Into<String>, host: impl Into<String>) -> AuthTarget {
        AuthTarget {
            scheme: scheme.into(),
            host: host.into(),
            port: None,
        }
    }

    /// The URI scheme, e.g. `http` or `https`.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// The explicit port, if one was given.
    pub fn port(&self) -> Option<u16> {
        self.port
    }

    /// The port in effect, resolving the scheme default when none was given.
    ///
    /// `host` and `host:defaultPort` must land on the same value so that
    /// cache entries for the two spellings collide.
    pub fn effective_port(&self) -> Option<u16> {
        self.port.or_else(|| scheme_default_port(&self.scheme))
    }

    /// Derive the service principal name for this host, e.g. `HTTP/example.com`.
    pub fn service_principal(&self) -> String {
        format!("HTTP/{}", self.host)
    }
}

impl std::fmt::Display for AuthTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.port {
            Some(port) => write!(f, "{}://{}:{}", self.scheme, self.host, port),
            None => write!(f, "{}://{}", self.scheme, self.host),
        }
    }
}

/// The registry default port for a URI scheme.
pub fn scheme_default_port(scheme: &str) -> Option<u16> {
    match scheme.to_ascii_lowercase().as_str() {
        "http" | "ws" => Some(80),
        "https" | "wss" => Some(443),
        _ => None,
    }
}
