// src/cache.rs

//! The per-host cache of completed, connection-independent schemes.
//!
//! A cached scheme lets a later request to the same host send its
//! authorization preemptively, skipping the challenge round trip. Keys are
//! normalized by resolving the scheme default port, so `host` and
//! `host:defaultPort` collide to the same entry. The cache is shared across
//! concurrent requests; each operation is atomic per key.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::scheme::Scheme;
use crate::target::AuthTarget;

#[derive(Default)]
pub struct AuthCache {
    entries: Mutex<HashMap<(String, u16), Scheme>>,
}

impl AuthCache {
    pub fn new() -> AuthCache {
        AuthCache::default()
    }

    /// Port 0 stands in for "no port and no resolvable default".
    fn key(target: &AuthTarget) -> (String, u16) {
        (
            target.host().to_ascii_lowercase(),
            target.effective_port().unwrap_or(0),
        )
    }

    /// Store a completed scheme snapshot, overwriting any previous entry.
    pub fn put(&self, target: &AuthTarget, scheme: Scheme) {
        self.entries
            .lock()
            .unwrap()
            .insert(Self::key(target), scheme);
    }

    /// A clone of the cached scheme for this host, if any.
    pub fn get(&self, target: &AuthTarget) -> Option<Scheme> {
        self.entries.lock().unwrap().get(&Self::key(target)).cloned()
    }

    /// Fully evict the entry for this host.
    pub fn remove(&self, target: &AuthTarget) {
        self.entries.lock().unwrap().remove(&Self::key(target));
    }

    pub fn clear(&self) {
        self.entries.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AuthConfig;
    use crate::scheme::{AuthScheme, SchemeRegistry};

    fn basic() -> Scheme {
        SchemeRegistry::standard()
            .create("Basic", &AuthConfig::new())
            .unwrap()
    }

    #[test]
    fn test_default_port_normalization() {
        let cache = AuthCache::new();
        let implied = AuthTarget::default_port("https", "example.com");
        let explicit = AuthTarget::new("https", "example.com", 443);

        cache.put(&implied, basic());
        let found = cache.get(&explicit).expect("default port should collide");
        assert_eq!(found.name(), "Basic");

        cache.remove(&implied);
        assert!(cache.get(&explicit).is_none());
    }

    #[test]
    fn test_host_case_normalization() {
        let cache = AuthCache::new();
        cache.put(&AuthTarget::new("http", "Example.COM", 80), basic());
        assert!(cache.get(&AuthTarget::new("http", "example.com", 80)).is_some());
    }

    #[test]
    fn test_distinct_ports_do_not_collide() {
        let cache = AuthCache::new();
        cache.put(&AuthTarget::new("http", "example.com", 8080), basic());
        assert!(cache.get(&AuthTarget::new("http", "example.com", 80)).is_none());
    }

    #[test]
    fn test_put_overwrites() {
        let cache = AuthCache::new();
        let target = AuthTarget::new("http", "example.com", 80);
        cache.put(&target, basic());
        let digest = SchemeRegistry::standard()
            .create("Digest", &AuthConfig::new())
            .unwrap();
        cache.put(&target, digest);
        assert_eq!(cache.get(&target).unwrap().name(), "Digest");
    }

    #[test]
    fn test_clear() {
        let cache = AuthCache::new();
        cache.put(&AuthTarget::new("http", "a", 80), basic());
        cache.put(&AuthTarget::new("http", "b", 80), basic());
        cache.clear();
        assert!(cache.get(&AuthTarget::new("http", "a", 80)).is_none());
        assert!(cache.get(&AuthTarget::new("http", "b", 80)).is_none());
    }
}
