// src/state.rs

//! Per-target authentication state.
//!
//! One [`AuthState`] exists per logical target (the origin, and separately
//! any proxy) within one request attempt, including its redirects. It is
//! owned by a single execution context and mutated only by the
//! [`crate::Authenticator`]. The live scheme and the candidate queue are
//! mutually exclusive: once a candidate is locked in, the queue is not
//! consulted again until a failure resets the state.

use std::collections::VecDeque;

use crate::credentials::Credentials;
use crate::scheme::Scheme;

/// The coarse protocol state of one authentication exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProtocolState {
    /// No challenge has been seen.
    Unchallenged,
    /// A challenge arrived and candidates are queued but none locked in.
    Challenged,
    /// A scheme is live and exchanging messages.
    Handshake,
    /// The target accepted our authorization.
    Success,
    /// Authentication was abandoned; absorbing until an explicit reset.
    Failure,
}

/// A candidate (scheme, credentials) pairing awaiting its turn.
#[derive(Debug)]
pub struct AuthOption {
    pub scheme: Scheme,
    pub credentials: Credentials,
}

/// The mutable authentication state for one target.
#[derive(Debug)]
pub struct AuthState {
    state: ProtocolState,
    scheme: Option<Scheme>,
    credentials: Option<Credentials>,
    queue: VecDeque<AuthOption>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthState {
    pub fn new() -> AuthState {
        AuthState {
            state: ProtocolState::Unchallenged,
            scheme: None,
            credentials: None,
            queue: VecDeque::new(),
        }
    }

    pub fn state(&self) -> ProtocolState {
        self.state
    }

    /// The live scheme, if one has been selected.
    pub fn scheme(&self) -> Option<&Scheme> {
        self.scheme.as_ref()
    }

    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// Return to the initial state, dropping scheme, credentials and queue.
    ///
    /// This is the only way out of [`ProtocolState::Failure`].
    pub fn reset(&mut self) {
        self.state = ProtocolState::Unchallenged;
        self.scheme = None;
        self.credentials = None;
        self.queue.clear();
    }

    pub(crate) fn set_state(&mut self, state: ProtocolState) {
        self.state = state;
    }

    /// Lock in a scheme and the credentials it will authenticate with.
    pub(crate) fn update(&mut self, scheme: Scheme, credentials: Credentials) {
        self.scheme = Some(scheme);
        self.credentials = Some(credentials);
        self.queue.clear();
    }

    pub(crate) fn scheme_mut(&mut self) -> Option<&mut Scheme> {
        self.scheme.as_mut()
    }

    /// Install a fresh candidate queue, discarding the live scheme.
    pub(crate) fn set_options(&mut self, options: VecDeque<AuthOption>) {
        self.scheme = None;
        self.credentials = None;
        self.queue = options;
    }

    pub(crate) fn next_option(&mut self) -> Option<AuthOption> {
        self.queue.pop_front()
    }

    /// True while untried candidates remain queued.
    pub fn has_options(&self) -> bool {
        !self.queue.is_empty()
    }
}
