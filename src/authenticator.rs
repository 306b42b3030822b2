// src/authenticator.rs

//! The authenticator orchestrates one authentication exchange.
//!
//! It is the only component that mutates [`AuthState`]: once when a
//! response arrives (detecting success or processing a challenge) and once
//! before each request goes out (attaching the authorization header).
//! Per-candidate errors advance the candidate queue; queue exhaustion and
//! fatal errors drive the state to [`ProtocolState::Failure`], and a
//! failed exchange never emits a partial authorization header.

use http::{HeaderMap, StatusCode};

use crate::cache::AuthCache;
use crate::config::AuthConfig;
use crate::credentials::{AuthScope, CredentialStore};
use crate::scheme::{AuthRequest, AuthScheme, SchemeRegistry};
use crate::state::{AuthState, ProtocolState};
use crate::strategy::AuthStrategy;
use crate::target::AuthTarget;

#[derive(Clone, Copy, Debug, Default)]
pub struct Authenticator;

impl Authenticator {
    pub fn new() -> Authenticator {
        Authenticator
    }

    /// Inspect a response's status for this strategy's challenge code.
    ///
    /// A non-challenge response while the exchange was in flight marks the
    /// exchange successful and offers the scheme for caching. A challenge
    /// that arrives after success means a previously accepted authorization
    /// was rejected, so any cache entry for the host is evicted.
    pub fn is_challenged(
        &self,
        target: &AuthTarget,
        status: StatusCode,
        state: &mut AuthState,
        strategy: &AuthStrategy,
        cache: &AuthCache,
    ) -> bool {
        if strategy.is_challenged(status) {
            if state.state() == ProtocolState::Success {
                log::debug!("previously accepted authorization rejected by {target}");
                strategy.failed(target, cache);
            }
            return true;
        }

        match state.state() {
            ProtocolState::Challenged | ProtocolState::Handshake => {
                state.set_state(ProtocolState::Success);
                if let Some(scheme) = state.scheme() {
                    log::debug!("authentication succeeded for {target} via {}", scheme.name());
                    strategy.succeeded(target, scheme, cache);
                }
            }
            _ => {}
        }
        false
    }

    /// Process the challenges of a 401/407 response.
    ///
    /// Returns true when the request should be retried with a fresh
    /// authorization attempt, false when authentication is abandoned.
    #[allow(clippy::too_many_arguments)]
    pub fn handle_challenge(
        &self,
        target: &AuthTarget,
        headers: &HeaderMap,
        state: &mut AuthState,
        strategy: &AuthStrategy,
        registry: &SchemeRegistry,
        store: &dyn CredentialStore,
        cache: &AuthCache,
        config: &AuthConfig,
    ) -> bool {
        if state.state() == ProtocolState::Failure {
            // absorbing: authentication was already abandoned
            return false;
        }

        let challenges = match strategy.challenges(headers) {
            Ok(challenges) if !challenges.is_empty() => challenges,
            Ok(_) => {
                log::warn!("challenge response from {target} carries no usable challenges");
                state.set_state(ProtocolState::Failure);
                return false;
            }
            Err(e) => {
                log::warn!("malformed challenge response from {target}: {e}");
                state.set_state(ProtocolState::Failure);
                return false;
            }
        };

        // a challenge after success means the accepted authorization went
        // bad; start over with fresh candidates
        if state.state() == ProtocolState::Success {
            state.reset();
        }

        // a challenge addressed to the live scheme continues its handshake
        if let Some(scheme) = state.scheme_mut() {
            let name = scheme.name().to_ascii_lowercase();
            if let Some(challenge) = challenges.get(&name) {
                return match scheme.process_challenge(challenge) {
                    Ok(()) => {
                        if scheme.is_complete() {
                            log::debug!("{name} exhausted without success for {target}");
                            state.set_state(ProtocolState::Failure);
                            strategy.failed(target, cache);
                            false
                        } else {
                            state.set_state(ProtocolState::Handshake);
                            true
                        }
                    }
                    Err(e) => {
                        log::warn!("challenge processing failed for {target}: {e}");
                        state.set_state(ProtocolState::Failure);
                        strategy.failed(target, cache);
                        false
                    }
                };
            }
            log::debug!("{target} switched schemes mid-exchange, reselecting");
        }

        // unknown or no current scheme: build a fresh candidate queue
        let options = strategy.select(&challenges, target, registry, store, config);
        if options.is_empty() {
            log::debug!("no usable authentication candidates for {target}");
            state.set_state(ProtocolState::Failure);
            false
        } else {
            state.set_options(options);
            state.set_state(ProtocolState::Challenged);
            true
        }
    }

    /// Attach the authorization header for the current state, if any.
    ///
    /// Does nothing when the exchange failed, when a connection-based
    /// scheme already authenticated the connection, or when the caller
    /// supplied its own authorization header.
    pub fn apply_auth_response(
        &self,
        request: &AuthRequest<'_>,
        headers: &mut HeaderMap,
        state: &mut AuthState,
        strategy: &AuthStrategy,
    ) {
        let header = strategy.kind().response_header();
        if headers.contains_key(&header) {
            log::debug!("request already carries {header:?}, leaving it untouched");
            return;
        }

        match state.state() {
            ProtocolState::Failure | ProtocolState::Unchallenged => {}
            ProtocolState::Success => {
                let credentials = state.credentials().cloned();
                let Some(scheme) = state.scheme_mut() else {
                    return;
                };
                if scheme.is_connection_based() {
                    // the connection itself is authenticated
                    return;
                }
                let Some(credentials) = credentials else {
                    return;
                };
                match scheme.authenticate(&credentials, request) {
                    Ok(value) => {
                        headers.insert(header, value);
                    }
                    Err(e) => {
                        log::warn!("failed to regenerate authorization: {e}");
                        state.set_state(ProtocolState::Failure);
                    }
                }
            }
            ProtocolState::Challenged => {
                while let Some(mut option) = state.next_option() {
                    let name = option.scheme.name().to_string();
                    match option.scheme.authenticate(&option.credentials, request) {
                        Ok(value) => {
                            log::debug!("selected {name} for authentication");
                            headers.insert(header, value);
                            state.update(option.scheme, option.credentials);
                            return;
                        }
                        Err(e) if e.is_fatal() => {
                            log::warn!("{name} failed fatally: {e}");
                            state.set_state(ProtocolState::Failure);
                            return;
                        }
                        Err(e) => {
                            log::warn!("{name} candidate failed, trying next: {e}");
                        }
                    }
                }
                log::debug!("candidate queue exhausted");
                state.set_state(ProtocolState::Failure);
            }
            ProtocolState::Handshake => {
                let credentials = state.credentials().cloned();
                let Some(scheme) = state.scheme_mut() else {
                    state.set_state(ProtocolState::Failure);
                    return;
                };
                let Some(credentials) = credentials else {
                    state.set_state(ProtocolState::Failure);
                    return;
                };
                match scheme.authenticate(&credentials, request) {
                    Ok(value) => {
                        headers.insert(header, value);
                    }
                    Err(e) => {
                        log::warn!("handshake continuation failed: {e}");
                        state.set_state(ProtocolState::Failure);
                    }
                }
            }
        }
    }

    /// Seed the state from the cache so a request can authenticate
    /// preemptively, skipping the challenge round trip.
    ///
    /// Returns true when a cached scheme with resolvable credentials was
    /// installed.
    pub fn prepare_preemptive(
        &self,
        target: &AuthTarget,
        state: &mut AuthState,
        cache: &AuthCache,
        store: &dyn CredentialStore,
    ) -> bool {
        if state.state() != ProtocolState::Unchallenged || state.scheme().is_some() {
            return false;
        }
        let Some(scheme) = cache.get(target) else {
            return false;
        };
        let scope = AuthScope::new(
            target.host(),
            target.effective_port(),
            scheme.realm().map(str::to_owned),
            Some(scheme.name().to_string()),
        );
        let Some(credentials) = store.credentials(&scope) else {
            return false;
        };
        log::debug!("preemptive {} authentication for {target}", scheme.name());
        state.update(scheme, credentials);
        state.set_state(ProtocolState::Success);
        true
    }
}
