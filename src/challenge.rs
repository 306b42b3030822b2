// src/challenge.rs

//! Challenge headers and their wire format.
//!
//! A challenge is one `WWW-Authenticate` or `Proxy-Authenticate` header
//! value: a leading scheme token followed by either a base64 blob (NTLM,
//! Negotiate) or a comma-separated parameter list (Basic, Digest).

use http::header::{
    HeaderName, AUTHORIZATION, PROXY_AUTHENTICATE, PROXY_AUTHORIZATION, WWW_AUTHENTICATE,
};
use http::StatusCode;

use crate::error;
use crate::Error;

/// Whether a challenge came from the origin server or a proxy.
///
/// The two use distinct status codes and header names but are otherwise
/// handled identically.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChallengeKind {
    Target,
    Proxy,
}

impl ChallengeKind {
    /// The response status that signals a challenge of this kind.
    pub fn challenge_status(&self) -> StatusCode {
        match self {
            ChallengeKind::Target => StatusCode::UNAUTHORIZED,
            ChallengeKind::Proxy => StatusCode::PROXY_AUTHENTICATION_REQUIRED,
        }
    }

    /// The header carrying challenges of this kind.
    pub fn challenge_header(&self) -> HeaderName {
        match self {
            ChallengeKind::Target => WWW_AUTHENTICATE,
            ChallengeKind::Proxy => PROXY_AUTHENTICATE,
        }
    }

    /// The header an authorization response of this kind is sent on.
    pub fn response_header(&self) -> HeaderName {
        match self {
            ChallengeKind::Target => AUTHORIZATION,
            ChallengeKind::Proxy => PROXY_AUTHORIZATION,
        }
    }
}

/// A parsed authentication challenge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Challenge {
    scheme: String,
    value: String,
    params: Vec<(String, String)>,
}

impl Challenge {
    /// Parse a challenge header value.
    ///
    /// The scheme token runs up to the first whitespace; the remainder is
    /// kept verbatim and additionally parsed as `name=value` parameters
    /// where that shape applies.
    pub fn parse(header_value: &str) -> Result<Challenge, Error> {
        let trimmed = header_value.trim();
        if trimmed.is_empty() {
            return Err(error::malformed_challenge("empty challenge header"));
        }

        let (scheme, rest) = match trimmed.find(|c: char| c.is_ascii_whitespace()) {
            Some(at) => (&trimmed[..at], trimmed[at..].trim_start()),
            None => (trimmed, ""),
        };
        if !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(error::malformed_challenge(format!(
                "invalid scheme token: {scheme:?}"
            )));
        }

        Ok(Challenge {
            scheme: scheme.to_string(),
            value: rest.to_string(),
            params: parse_params(rest),
        })
    }

    /// The scheme token, as received.
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Everything after the scheme token, untrimmed of parameters.
    ///
    /// For NTLM and Negotiate this is the base64 token (possibly empty).
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Look up a challenge parameter, case-insensitively by name.
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// All parsed parameters in order of appearance.
    pub fn params(&self) -> &[(String, String)] {
        &self.params
    }
}

/// Parse `name=value, name="quoted \" value", ...` parameter lists.
///
/// Unparseable fragments are skipped rather than failing the whole
/// challenge; schemes validate the parameters they require.
fn parse_params(input: &str) -> Vec<(String, String)> {
    let mut params = Vec::new();
    let mut chars = input.chars().peekable();

    loop {
        // skip whitespace and element separators
        while matches!(chars.peek(), Some(c) if c.is_ascii_whitespace() || *c == ',') {
            chars.next();
        }
        if chars.peek().is_none() {
            break;
        }

        let mut name = String::new();
        while matches!(chars.peek(), Some(c) if *c != '=' && *c != ',') {
            name.push(chars.next().unwrap());
        }
        let name = name.trim().to_string();

        if chars.peek() != Some(&'=') {
            // bare token with no value; skip it
            chars.next();
            continue;
        }
        chars.next(); // consume '='
        while matches!(chars.peek(), Some(c) if c.is_ascii_whitespace()) {
            chars.next();
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    other => value.push(other),
                }
            }
        } else {
            while matches!(chars.peek(), Some(c) if *c != ',') {
                value.push(chars.next().unwrap());
            }
            value = value.trim_end().to_string();
        }

        if !name.is_empty() {
            params.push((name, value));
        }
    }

    params
}
