// src/credentials.rs

//! Credentials and the scope-matching store they are looked up from.
//!
//! A [`AuthScope`] identifies the protection space a set of credentials
//! applies to. Scopes support wildcard components; when several stored
//! scopes match a lookup, the most specific one wins (host outranks port,
//! port outranks realm, realm outranks scheme).

use std::sync::Mutex;

/// Credentials for an authentication scheme.
///
/// `Password` covers Basic, Digest and Negotiate. NTLM requires the richer
/// `Nt` variant carrying the domain and workstation names; handing a plain
/// `Password` credential to NTLM is an invalid-credentials error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Credentials {
    /// A principal identity plus optional secret.
    Password {
        username: String,
        password: Option<String>,
    },
    /// Windows-style credentials for NTLM.
    Nt {
        username: String,
        password: String,
        domain: Option<String>,
        workstation: Option<String>,
    },
}

impl Credentials {
    /// Username/password credentials.
    pub fn password(username: impl Into<String>, password: Option<String>) -> Credentials {
        Credentials::Password {
            username: username.into(),
            password,
        }
    }

    /// NTLM credentials with optional domain and workstation.
    pub fn nt(
        username: impl Into<String>,
        password: impl Into<String>,
        domain: Option<String>,
        workstation: Option<String>,
    ) -> Credentials {
        Credentials::Nt {
            username: username.into(),
            password: password.into(),
            domain,
            workstation,
        }
    }

    /// The principal identity.
    pub fn username(&self) -> &str {
        match self {
            Credentials::Password { username, .. } => username,
            Credentials::Nt { username, .. } => username,
        }
    }

    /// The secret, if one was supplied.
    pub fn secret(&self) -> Option<&str> {
        match self {
            Credentials::Password { password, .. } => password.as_deref(),
            Credentials::Nt { password, .. } => Some(password),
        }
    }
}

/// The (host, port, realm, scheme) tuple credentials are scoped by.
///
/// `None` components act as wildcards. Matching is scored so that a fully
/// specified scope always outranks a partially specified one.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthScope {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub realm: Option<String>,
    pub scheme: Option<String>,
}

impl AuthScope {
    /// A scope matching any host, port, realm and scheme.
    pub fn any() -> AuthScope {
        AuthScope::default()
    }

    /// A fully specified scope.
    pub fn new(
        host: impl Into<String>,
        port: Option<u16>,
        realm: Option<String>,
        scheme: Option<String>,
    ) -> AuthScope {
        AuthScope {
            host: Some(host.into()),
            port,
            realm,
            scheme,
        }
    }

    /// Scope restricted to a host only.
    pub fn host(host: impl Into<String>) -> AuthScope {
        AuthScope {
            host: Some(host.into()),
            ..AuthScope::default()
        }
    }

    /// Score this stored scope against a lookup scope.
    ///
    /// Returns a negative value on mismatch. Specified components that agree
    /// contribute weighted points: host 8, port 4, realm 2, scheme 1, so a
    /// more specific match always scores higher than any combination of less
    /// significant components.
    pub fn match_score(&self, that: &AuthScope) -> i32 {
        let mut factor = 0;

        match (&self.scheme, &that.scheme) {
            (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => factor += 1,
            (Some(_), Some(_)) => return -1,
            _ => {}
        }
        match (&self.realm, &that.realm) {
            (Some(a), Some(b)) if a == b => factor += 2,
            (Some(_), Some(_)) => return -1,
            _ => {}
        }
        match (self.port, that.port) {
            (Some(a), Some(b)) if a == b => factor += 4,
            (Some(_), Some(_)) => return -1,
            _ => {}
        }
        match (&self.host, &that.host) {
            (Some(a), Some(b)) if a.eq_ignore_ascii_case(b) => factor += 8,
            (Some(_), Some(_)) => return -1,
            _ => {}
        }

        factor
    }
}

/// Capability to resolve credentials for an authentication scope.
///
/// Shared across concurrently executing requests; implementations must be
/// safe for concurrent lookups.
pub trait CredentialStore: Send + Sync {
    /// The best matching credentials for `scope`, if any.
    fn credentials(&self, scope: &AuthScope) -> Option<Credentials>;
}

/// An in-memory credential store with scope-priority lookup.
#[derive(Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<Vec<(AuthScope, Credentials)>>,
}

impl MemoryCredentialStore {
    pub fn new() -> MemoryCredentialStore {
        MemoryCredentialStore::default()
    }

    /// Register credentials for a scope, replacing any identical scope.
    pub fn add(&self, scope: AuthScope, credentials: Credentials) {
        let mut entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.iter_mut().find(|(s, _)| *s == scope) {
            entry.1 = credentials;
        } else {
            entries.push((scope, credentials));
        }
    }

    /// Remove every stored entry.
    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn credentials(&self, scope: &AuthScope) -> Option<Credentials> {
        let entries = self.entries.lock().unwrap();
        let mut best: Option<(i32, &Credentials)> = None;
        for (stored, creds) in entries.iter() {
            let score = stored.match_score(scope);
            if score < 0 {
                continue;
            }
            if best.map_or(true, |(b, _)| score > b) {
                best = Some((score, creds));
            }
        }
        best.map(|(_, creds)| creds.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_scope_outranks_partial() {
        let store = MemoryCredentialStore::new();
        store.add(
            AuthScope::new("example.com", Some(80), None, None),
            Credentials::password("partial", Some("p1".into())),
        );
        store.add(
            AuthScope::new(
                "example.com",
                Some(80),
                Some("staging".into()),
                Some("Digest".into()),
            ),
            Credentials::password("full", Some("p2".into())),
        );

        let lookup = AuthScope::new(
            "example.com",
            Some(80),
            Some("staging".into()),
            Some("Digest".into()),
        );
        let found = store.credentials(&lookup).unwrap();
        assert_eq!(found.username(), "full");
    }

    #[test]
    fn test_wildcard_matches_any_lookup() {
        let store = MemoryCredentialStore::new();
        store.add(
            AuthScope::any(),
            Credentials::password("fallback", Some("pw".into())),
        );

        let lookup = AuthScope::new("other.example", Some(8080), Some("r".into()), None);
        assert!(store.credentials(&lookup).is_some());
    }

    #[test]
    fn test_mismatched_component_rejects() {
        let scope = AuthScope::new("example.com", Some(80), None, None);
        let lookup = AuthScope::new("example.com", Some(443), None, None);
        assert!(scope.match_score(&lookup) < 0);
    }

    #[test]
    fn test_host_outweighs_realm_and_scheme() {
        // host-only match (8) must beat realm+scheme match (3)
        let host_only = AuthScope::host("example.com");
        let realm_scheme = AuthScope {
            realm: Some("r".into()),
            scheme: Some("Basic".into()),
            ..AuthScope::default()
        };
        let lookup = AuthScope::new("example.com", None, Some("r".into()), Some("Basic".into()));
        assert!(host_only.match_score(&lookup) > realm_scheme.match_score(&lookup));
    }

    #[test]
    fn test_hostname_match_is_case_insensitive() {
        let scope = AuthScope::host("EXAMPLE.com");
        let lookup = AuthScope::host("example.COM");
        assert!(scope.match_score(&lookup) > 0);
    }
}
