// src/strategy.rs

//! The authentication strategy: challenge discovery, candidate selection
//! and cacheability policy.

use std::collections::{HashMap, VecDeque};

use http::{HeaderMap, StatusCode};

use crate::cache::AuthCache;
use crate::challenge::{Challenge, ChallengeKind};
use crate::config::AuthConfig;
use crate::credentials::{AuthScope, CredentialStore};
use crate::error;
use crate::scheme::{AuthScheme, Scheme, SchemeRegistry};
use crate::state::AuthOption;
use crate::target::AuthTarget;
use crate::Error;

/// Strategy for one side of the route: the origin target or the proxy.
///
/// The two differ only in which status code and header names carry the
/// challenge/response pair.
#[derive(Clone, Copy, Debug)]
pub struct AuthStrategy {
    kind: ChallengeKind,
}

impl AuthStrategy {
    /// Strategy for origin-server authentication (401 / `WWW-Authenticate`).
    pub fn target() -> AuthStrategy {
        AuthStrategy {
            kind: ChallengeKind::Target,
        }
    }

    /// Strategy for proxy authentication (407 / `Proxy-Authenticate`).
    pub fn proxy() -> AuthStrategy {
        AuthStrategy {
            kind: ChallengeKind::Proxy,
        }
    }

    pub fn kind(&self) -> ChallengeKind {
        self.kind
    }

    /// Whether this response status asks us to authenticate.
    pub fn is_challenged(&self, status: StatusCode) -> bool {
        status == self.kind.challenge_status()
    }

    /// Extract all challenges from the response, indexed by lower-cased
    /// scheme name.
    ///
    /// A scheme token appearing twice in one response is treated as a
    /// malformed response rather than silently keeping one of the two.
    pub fn challenges(&self, headers: &HeaderMap) -> Result<HashMap<String, Challenge>, Error> {
        let mut map = HashMap::new();
        for value in headers.get_all(self.kind.challenge_header()) {
            let text = match value.to_str() {
                Ok(text) => text,
                Err(_) => {
                    log::warn!("ignoring non-text {} header", self.kind.challenge_header());
                    continue;
                }
            };
            let challenge = match Challenge::parse(text) {
                Ok(challenge) => challenge,
                Err(e) => {
                    log::warn!("ignoring unparseable challenge: {e}");
                    continue;
                }
            };
            let name = challenge.scheme().to_ascii_lowercase();
            if map.insert(name.clone(), challenge).is_some() {
                return Err(error::malformed_challenge(format!(
                    "duplicate {name:?} challenge in one response"
                )));
            }
        }
        Ok(map)
    }

    /// Build the candidate queue: for each preferred scheme with a matching
    /// challenge, instantiate it, feed it the challenge, and resolve
    /// credentials for its scope. Schemes without resolvable credentials
    /// never enter the queue.
    pub fn select(
        &self,
        challenges: &HashMap<String, Challenge>,
        target: &AuthTarget,
        registry: &SchemeRegistry,
        store: &dyn CredentialStore,
        config: &AuthConfig,
    ) -> VecDeque<AuthOption> {
        let mut options = VecDeque::new();
        for name in config.preference() {
            let Some(challenge) = challenges.get(&name.to_ascii_lowercase()) else {
                continue;
            };
            let Some(mut scheme) = registry.create(name, config) else {
                log::debug!("challenge for unsupported scheme {name}");
                continue;
            };
            if let Err(e) = scheme.process_challenge(challenge) {
                log::warn!("discarding {name} challenge: {e}");
                continue;
            }

            let scope = AuthScope::new(
                target.host(),
                target.effective_port(),
                scheme.realm().map(str::to_owned),
                Some(scheme.name().to_string()),
            );
            match store.credentials(&scope) {
                Some(credentials) => {
                    log::debug!("queueing {name} for {target}");
                    options.push_back(AuthOption {
                        scheme,
                        credentials,
                    });
                }
                None => {
                    log::debug!("no credentials for {name} at {target}");
                }
            }
        }
        options
    }

    /// Only completed, request-scoped schemes are worth caching; a
    /// connection-based scheme's completion dies with its connection.
    pub fn is_cacheable(scheme: &Scheme) -> bool {
        scheme.is_complete() && !scheme.is_connection_based()
    }

    /// Record a successful, cacheable scheme for the host.
    pub fn succeeded(&self, target: &AuthTarget, scheme: &Scheme, cache: &AuthCache) {
        if Self::is_cacheable(scheme) {
            log::debug!("caching {} auth for {target}", scheme.name());
            cache.put(target, scheme.clone());
        }
    }

    /// Evict any cached scheme for a host that just rejected us.
    pub fn failed(&self, target: &AuthTarget, cache: &AuthCache) {
        log::debug!("evicting cached auth for {target}");
        cache.remove(target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::{Credentials, MemoryCredentialStore};
    use http::HeaderValue;

    fn headers(values: &[&str]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for value in values {
            map.append(
                http::header::WWW_AUTHENTICATE,
                HeaderValue::from_str(value).unwrap(),
            );
        }
        map
    }

    #[test]
    fn test_is_challenged_status() {
        assert!(AuthStrategy::target().is_challenged(StatusCode::UNAUTHORIZED));
        assert!(!AuthStrategy::target().is_challenged(StatusCode::OK));
        assert!(AuthStrategy::proxy().is_challenged(StatusCode::PROXY_AUTHENTICATION_REQUIRED));
        assert!(!AuthStrategy::proxy().is_challenged(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn test_challenges_indexed_by_scheme() {
        let strategy = AuthStrategy::target();
        let map = strategy
            .challenges(&headers(&[
                "Basic realm=\"r\"",
                "Digest realm=\"r\", nonce=\"n\"",
            ]))
            .unwrap();
        assert_eq!(map.len(), 2);
        assert!(map.contains_key("basic"));
        assert!(map.contains_key("digest"));
    }

    #[test]
    fn test_duplicate_scheme_is_malformed() {
        let strategy = AuthStrategy::target();
        let err = strategy
            .challenges(&headers(&["Basic realm=\"a\"", "Basic realm=\"b\""]))
            .unwrap_err();
        assert!(err.is_malformed_challenge());
    }

    #[test]
    fn test_unparseable_header_is_skipped() {
        let strategy = AuthStrategy::target();
        let map = strategy
            .challenges(&headers(&["", "Basic realm=\"r\""]))
            .unwrap();
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn test_select_preference_order() {
        let strategy = AuthStrategy::target();
        let target = AuthTarget::new("http", "example.com", 80);
        let registry = SchemeRegistry::standard();
        let store = MemoryCredentialStore::new();
        store.add(
            crate::credentials::AuthScope::any(),
            Credentials::password("user", Some("pw".into())),
        );

        let challenges = strategy
            .challenges(&headers(&[
                "Basic realm=\"r\"",
                "Digest realm=\"r\", nonce=\"n\"",
            ]))
            .unwrap();
        let options = strategy.select(
            &challenges,
            &target,
            &registry,
            &store,
            &AuthConfig::new(),
        );
        let names: Vec<_> = options.iter().map(|o| o.scheme.name().to_string()).collect();
        // digest outranks basic in the default preference
        assert_eq!(names, vec!["Digest", "Basic"]);
    }

    #[test]
    fn test_select_skips_schemes_without_credentials() {
        let strategy = AuthStrategy::target();
        let target = AuthTarget::new("http", "example.com", 80);
        let registry = SchemeRegistry::standard();
        let store = MemoryCredentialStore::new();
        store.add(
            crate::credentials::AuthScope {
                realm: Some("other-realm".into()),
                ..Default::default()
            },
            Credentials::password("user", Some("pw".into())),
        );

        let challenges = strategy
            .challenges(&headers(&["Basic realm=\"this-realm\""]))
            .unwrap();
        let options = strategy.select(
            &challenges,
            &target,
            &registry,
            &store,
            &AuthConfig::new(),
        );
        assert!(options.is_empty());
    }

    #[test]
    fn test_preference_override_restricts() {
        let strategy = AuthStrategy::target();
        let target = AuthTarget::new("http", "example.com", 80);
        let registry = SchemeRegistry::standard();
        let store = MemoryCredentialStore::new();
        store.add(
            crate::credentials::AuthScope::any(),
            Credentials::password("user", Some("pw".into())),
        );

        let challenges = strategy
            .challenges(&headers(&[
                "Basic realm=\"r\"",
                "Digest realm=\"r\", nonce=\"n\"",
            ]))
            .unwrap();
        let config = AuthConfig::new().scheme_preference(["Basic"]);
        let options = strategy.select(&challenges, &target, &registry, &store, &config);
        let names: Vec<_> = options.iter().map(|o| o.scheme.name().to_string()).collect();
        assert_eq!(names, vec!["Basic"]);
    }

    #[test]
    fn test_cacheability() {
        let registry = SchemeRegistry::standard();
        let config = AuthConfig::new();

        let mut basic = registry.create("Basic", &config).unwrap();
        assert!(!AuthStrategy::is_cacheable(&basic)); // not yet complete
        basic
            .process_challenge(&Challenge::parse("Basic realm=\"r\"").unwrap())
            .unwrap();
        assert!(AuthStrategy::is_cacheable(&basic));

        let ntlm = registry.create("NTLM", &config).unwrap();
        assert!(!AuthStrategy::is_cacheable(&ntlm)); // connection-based
    }
}
