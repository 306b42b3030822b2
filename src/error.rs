// src/error.rs

//! Errors produced while negotiating HTTP authentication.
//!
//! The engine distinguishes recoverable per-candidate failures (a malformed
//! challenge, rejected credentials, an unusable algorithm) from fatal ones
//! (a failing Negotiate token provider, an out-of-sequence handshake).
//! Recoverable errors cause the orchestrator to advance to the next queued
//! candidate; fatal errors terminate the exchange.

use std::error::Error as StdError;
use std::fmt;

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

/// The error type emitted by this crate.
pub struct Error {
    inner: Box<Inner>,
}

struct Inner {
    kind: Kind,
    source: Option<BoxError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Kind {
    /// A challenge header could not be parsed, or did not match the scheme
    /// it was handed to.
    MalformedChallenge,
    /// The scheme could not produce an authorization value: credentials were
    /// rejected, a required challenge parameter was missing, or the offered
    /// quality of protection is unsupported.
    Authentication,
    /// The supplied credentials are of the wrong type for the scheme.
    InvalidCredentials,
    /// The digest algorithm named in the challenge is not implemented.
    UnsupportedAlgorithm,
    /// The external security context provider failed, or the token exchange
    /// ran out of sequence.
    Negotiate,
    /// An authorization value could not be rendered as a valid header.
    Encoding,
}

impl Error {
    pub(crate) fn new<E: Into<BoxError>>(kind: Kind, source: E) -> Error {
        Error {
            inner: Box::new(Inner {
                kind,
                source: Some(source.into()),
            }),
        }
    }

    /// True if a challenge was unparseable or mismatched.
    pub fn is_malformed_challenge(&self) -> bool {
        matches!(self.inner.kind, Kind::MalformedChallenge)
    }

    /// True if the scheme failed to authenticate with the given credentials.
    pub fn is_authentication(&self) -> bool {
        matches!(self.inner.kind, Kind::Authentication)
    }

    /// True if the credentials were of the wrong type for the scheme.
    pub fn is_invalid_credentials(&self) -> bool {
        matches!(self.inner.kind, Kind::InvalidCredentials)
    }

    /// True if the challenge named an algorithm this crate does not implement.
    pub fn is_unsupported_algorithm(&self) -> bool {
        matches!(self.inner.kind, Kind::UnsupportedAlgorithm)
    }

    /// True if the Negotiate token exchange failed.
    pub fn is_negotiate(&self) -> bool {
        matches!(self.inner.kind, Kind::Negotiate)
    }

    /// True if the error is fatal for the whole exchange rather than for a
    /// single scheme candidate.
    pub fn is_fatal(&self) -> bool {
        matches!(self.inner.kind, Kind::Negotiate)
    }

    fn description(&self) -> &str {
        match self.inner.kind {
            Kind::MalformedChallenge => "malformed authentication challenge",
            Kind::Authentication => "authentication failed",
            Kind::InvalidCredentials => "invalid credentials for scheme",
            Kind::UnsupportedAlgorithm => "unsupported digest algorithm",
            Kind::Negotiate => "negotiate token exchange failed",
            Kind::Encoding => "authorization value is not a valid header",
        }
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut builder = f.debug_struct("httpauth::Error");
        builder.field("kind", &self.inner.kind);
        if let Some(ref source) = self.inner.source {
            builder.field("source", source);
        }
        builder.finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())?;
        if let Some(ref source) = self.inner.source {
            write!(f, ": {source}")?;
        }
        Ok(())
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.inner.source.as_ref().map(|e| &**e as _)
    }
}

// Constructors used across the crate, mirroring the error helpers the rest
// of the client calls into.

pub(crate) fn malformed_challenge<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::MalformedChallenge, e)
}

pub(crate) fn auth<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Authentication, e)
}

pub(crate) fn invalid_credentials<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::InvalidCredentials, e)
}

pub(crate) fn unsupported_algorithm<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::UnsupportedAlgorithm, e)
}

pub(crate) fn negotiate<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Negotiate, e)
}

pub(crate) fn encoding<E: Into<BoxError>>(e: E) -> Error {
    Error::new(Kind::Encoding, e)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_predicates() {
        assert!(malformed_challenge("bad header").is_malformed_challenge());
        assert!(auth("missing nonce").is_authentication());
        assert!(invalid_credentials("need NT credentials").is_invalid_credentials());
        assert!(unsupported_algorithm("SHA-512-sess").is_unsupported_algorithm());
        assert!(negotiate("provider failure").is_negotiate());
    }

    #[test]
    fn test_fatal_classification() {
        // Only provider/out-of-sequence errors abort the whole exchange.
        assert!(negotiate("out of sequence").is_fatal());
        assert!(!auth("bad password").is_fatal());
        assert!(!malformed_challenge("garbage").is_fatal());
    }

    #[test]
    fn test_display_includes_source() {
        let err = auth("qop \"token-int\" not supported");
        let text = err.to_string();
        assert!(text.contains("authentication failed"));
        assert!(text.contains("token-int"));
    }
}
