// src/scheme/digest.rs

//! The Digest authentication scheme (RFC 2617).
//!
//! Supports the MD5 and MD5-sess algorithms with qop `auth` and `auth-int`,
//! plus the legacy qop-less mode for old servers. The nonce count increments
//! while the server nonce is unchanged and resets, with a fresh client
//! nonce, whenever the server rotates it.

use std::fmt::Write as _;

use http::HeaderValue;
use md5::{Digest as _, Md5};

use super::{AuthRequest, AuthScheme};
use crate::challenge::Challenge;
use crate::credentials::Credentials;
use crate::error;
use crate::ntlm::crypto::secure_random;
use crate::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Algorithm {
    Md5,
    Md5Sess,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Qop {
    Auth,
    AuthInt,
    /// Pre-RFC2617 servers that send no qop at all.
    Legacy,
}

impl Qop {
    fn token(&self) -> &'static str {
        match self {
            Qop::Auth => "auth",
            Qop::AuthInt => "auth-int",
            Qop::Legacy => "",
        }
    }
}

#[derive(Clone, Debug)]
pub struct DigestScheme {
    realm: Option<String>,
    nonce: Option<String>,
    opaque: Option<String>,
    algorithm: Option<String>,
    qop_offered: Vec<String>,
    stale: bool,
    complete: bool,

    // nonce-count tracking across requests for the same server nonce
    last_nonce: Option<String>,
    nonce_count: u32,
    cnonce: String,
}

impl Default for DigestScheme {
    fn default() -> Self {
        Self::new()
    }
}

impl DigestScheme {
    pub fn new() -> DigestScheme {
        DigestScheme {
            realm: None,
            nonce: None,
            opaque: None,
            algorithm: None,
            qop_offered: Vec::new(),
            stale: false,
            complete: false,
            last_nonce: None,
            nonce_count: 0,
            cnonce: String::new(),
        }
    }

    fn parsed_algorithm(&self) -> Result<Algorithm, Error> {
        match self.algorithm.as_deref() {
            None => Ok(Algorithm::Md5),
            Some(name) if name.eq_ignore_ascii_case("MD5") => Ok(Algorithm::Md5),
            Some(name) if name.eq_ignore_ascii_case("MD5-sess") => Ok(Algorithm::Md5Sess),
            Some(other) => Err(error::unsupported_algorithm(format!(
                "digest algorithm {other:?}"
            ))),
        }
    }

    /// Pick the quality of protection for this request.
    ///
    /// `auth-int` needs a repeatable entity to hash; without one we fall
    /// back to `auth` when offered. A qop list with nothing we support is
    /// fatal for the attempt.
    fn select_qop(&self, request: &AuthRequest<'_>) -> Result<Qop, Error> {
        if self.qop_offered.is_empty() {
            return Ok(Qop::Legacy);
        }
        let offers = |token: &str| {
            self.qop_offered
                .iter()
                .any(|q| q.eq_ignore_ascii_case(token))
        };
        if offers("auth-int") && request.body.is_some() {
            return Ok(Qop::AuthInt);
        }
        if offers("auth") {
            return Ok(Qop::Auth);
        }
        if offers("auth-int") {
            // offered, but the entity is not repeatable
            return Err(error::auth(
                "qop auth-int requires a repeatable request entity",
            ));
        }
        Err(error::auth(format!(
            "no supported qop in challenge: {:?}",
            self.qop_offered.join(",")
        )))
    }

    /// Advance the nonce count, rolling the client nonce when the server
    /// nonce changed.
    fn advance_nonce(&mut self, nonce: &str) {
        if self.last_nonce.as_deref() == Some(nonce) {
            self.nonce_count += 1;
        } else {
            self.nonce_count = 1;
            self.cnonce = generate_cnonce();
            self.last_nonce = Some(nonce.to_string());
        }
    }
}

impl AuthScheme for DigestScheme {
    fn name(&self) -> &str {
        "Digest"
    }

    fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    fn is_connection_based(&self) -> bool {
        false
    }

    fn is_complete(&self) -> bool {
        // a stale nonce invites another round with the same credentials
        if self.stale {
            false
        } else {
            self.complete
        }
    }

    fn process_challenge(&mut self, challenge: &Challenge) -> Result<(), Error> {
        if !challenge.scheme().eq_ignore_ascii_case("digest") {
            return Err(error::malformed_challenge(format!(
                "Digest scheme handed a {} challenge",
                challenge.scheme()
            )));
        }
        self.realm = challenge.param("realm").map(str::to_owned);
        self.nonce = challenge.param("nonce").map(str::to_owned);
        self.opaque = challenge.param("opaque").map(str::to_owned);
        self.algorithm = challenge.param("algorithm").map(str::to_owned);
        self.qop_offered = challenge
            .param("qop")
            .map(|list| {
                list.split(',')
                    .map(|q| q.trim().to_string())
                    .filter(|q| !q.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        self.stale = challenge
            .param("stale")
            .map(|s| s.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        self.complete = true;
        Ok(())
    }

    fn authenticate(
        &mut self,
        credentials: &Credentials,
        request: &AuthRequest<'_>,
    ) -> Result<HeaderValue, Error> {
        let realm = self
            .realm
            .clone()
            .ok_or_else(|| error::auth("missing realm in digest challenge"))?;
        let nonce = self
            .nonce
            .clone()
            .ok_or_else(|| error::auth("missing nonce in digest challenge"))?;
        let algorithm = self.parsed_algorithm()?;
        let qop = self.select_qop(request)?;

        self.advance_nonce(&nonce);
        let nc = format!("{:08x}", self.nonce_count);
        let cnonce = self.cnonce.clone();

        let username = credentials.username();
        let password = credentials.secret().unwrap_or("");

        let a1 = match algorithm {
            Algorithm::Md5 => md5_hex(format!("{username}:{realm}:{password}").as_bytes()),
            Algorithm::Md5Sess => {
                let inner = md5_hex(format!("{username}:{realm}:{password}").as_bytes());
                md5_hex(format!("{inner}:{nonce}:{cnonce}").as_bytes())
            }
        };

        let a2 = match qop {
            Qop::AuthInt => {
                let body_hash = md5_hex(request.body.unwrap_or(&[]));
                md5_hex(format!("{}:{}:{}", request.method, request.uri, body_hash).as_bytes())
            }
            _ => md5_hex(format!("{}:{}", request.method, request.uri).as_bytes()),
        };

        let response = match qop {
            Qop::Legacy => md5_hex(format!("{a1}:{nonce}:{a2}").as_bytes()),
            _ => md5_hex(
                format!("{a1}:{nonce}:{nc}:{cnonce}:{}:{a2}", qop.token()).as_bytes(),
            ),
        };

        let mut value = format!(
            "Digest username=\"{username}\", realm=\"{realm}\", nonce=\"{nonce}\", \
             uri=\"{}\", response=\"{response}\"",
            request.uri
        );
        if qop != Qop::Legacy {
            value.push_str(&format!(
                ", qop={}, nc={nc}, cnonce=\"{cnonce}\"",
                qop.token()
            ));
        }
        if let Some(algorithm) = &self.algorithm {
            value.push_str(&format!(", algorithm={algorithm}"));
        }
        if let Some(opaque) = &self.opaque {
            value.push_str(&format!(", opaque=\"{opaque}\""));
        }

        HeaderValue::from_str(&value).map_err(error::encoding)
    }
}

fn md5_hex(input: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(input);
    hex(&hasher.finalize())
}

/// A fresh client nonce from the secure random source.
fn generate_cnonce() -> String {
    let mut bytes = [0u8; 8];
    secure_random(&mut bytes);
    hex(&bytes)
}

fn hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::AuthTarget;

    const RFC_CHALLENGE: &str = "Digest realm=\"testrealm@host.com\", qop=\"auth,auth-int\", \
         nonce=\"dcd98b7102dd2f0e8b11d0f600bfb0c093\", \
         opaque=\"5ccc069c403ebaf9f0171e9517f40e41\"";

    fn scheme_for(challenge: &str) -> DigestScheme {
        let mut scheme = DigestScheme::new();
        scheme
            .process_challenge(&Challenge::parse(challenge).unwrap())
            .unwrap();
        scheme
    }

    fn param<'a>(header: &'a str, name: &str) -> Option<&'a str> {
        // pull a parameter back out of the emitted header for assertions
        let at = header.find(&format!("{name}=") as &str)?;
        let rest = &header[at + name.len() + 1..];
        if let Some(stripped) = rest.strip_prefix('"') {
            stripped.split('"').next()
        } else {
            rest.split(',').next()
        }
    }

    #[test]
    fn test_rfc2617_vector() {
        let target = AuthTarget::default_port("http", "host.com");
        let mut scheme = scheme_for(RFC_CHALLENGE);
        // pin the client nonce to the RFC example value
        scheme.cnonce = "0a4f113b".to_string();
        scheme.last_nonce = Some("dcd98b7102dd2f0e8b11d0f600bfb0c093".to_string());
        scheme.nonce_count = 0;

        let creds = Credentials::password("Mufasa", Some("Circle Of Life".into()));
        let request = AuthRequest {
            method: "GET",
            uri: "/dir/index.html",
            body: None,
            target: &target,
        };
        let value = scheme.authenticate(&creds, &request).unwrap();
        let header = value.to_str().unwrap();

        assert_eq!(
            param(header, "response"),
            Some("6629fae49393a05397450978507c4ef1")
        );
        assert_eq!(param(header, "nc"), Some("00000001"));
        assert_eq!(param(header, "qop"), Some("auth"));
        assert_eq!(param(header, "uri"), Some("/dir/index.html"));
        assert_eq!(
            param(header, "opaque"),
            Some("5ccc069c403ebaf9f0171e9517f40e41")
        );
    }

    #[test]
    fn test_nonce_count_increments_and_resets() {
        let target = AuthTarget::default_port("http", "host.com");
        let mut scheme = scheme_for(RFC_CHALLENGE);
        let creds = Credentials::password("Mufasa", Some("Circle Of Life".into()));
        let request = AuthRequest {
            method: "GET",
            uri: "/",
            body: None,
            target: &target,
        };

        let first = scheme.authenticate(&creds, &request).unwrap();
        let second = scheme.authenticate(&creds, &request).unwrap();
        assert_eq!(param(first.to_str().unwrap(), "nc"), Some("00000001"));
        assert_eq!(param(second.to_str().unwrap(), "nc"), Some("00000002"));
        let cnonce = param(second.to_str().unwrap(), "cnonce").unwrap().to_string();

        // a rotated server nonce resets the counter and the client nonce
        scheme
            .process_challenge(
                &Challenge::parse("Digest realm=\"testrealm@host.com\", qop=\"auth\", nonce=\"fresh\"")
                    .unwrap(),
            )
            .unwrap();
        let third = scheme.authenticate(&creds, &request).unwrap();
        assert_eq!(param(third.to_str().unwrap(), "nc"), Some("00000001"));
        assert_ne!(param(third.to_str().unwrap(), "cnonce"), Some(cnonce.as_str()));
    }

    #[test]
    fn test_auth_int_with_repeatable_body() {
        let target = AuthTarget::default_port("http", "host.com");
        let mut scheme = scheme_for(RFC_CHALLENGE);
        let creds = Credentials::password("Mufasa", Some("Circle Of Life".into()));
        let body = b"project=panther".as_slice();
        let request = AuthRequest {
            method: "POST",
            uri: "/update",
            body: Some(body),
            target: &target,
        };
        let value = scheme.authenticate(&creds, &request).unwrap();
        assert_eq!(param(value.to_str().unwrap(), "qop"), Some("auth-int"));
    }

    #[test]
    fn test_legacy_mode_without_qop() {
        let target = AuthTarget::default_port("http", "host.com");
        let mut scheme =
            scheme_for("Digest realm=\"legacy\", nonce=\"abc123\"");
        let creds = Credentials::password("user", Some("pw".into()));
        let request = AuthRequest {
            method: "GET",
            uri: "/",
            body: None,
            target: &target,
        };
        let value = scheme.authenticate(&creds, &request).unwrap();
        let header = value.to_str().unwrap();
        assert!(!header.contains("qop="));
        assert!(!header.contains("nc="));
        assert!(!header.contains("cnonce="));
    }

    #[test]
    fn test_unsupported_qop_is_fatal_for_attempt() {
        let target = AuthTarget::default_port("http", "host.com");
        let mut scheme = scheme_for("Digest realm=\"r\", nonce=\"n\", qop=\"token-int\"");
        let creds = Credentials::password("user", Some("pw".into()));
        let request = AuthRequest {
            method: "GET",
            uri: "/",
            body: None,
            target: &target,
        };
        let err = scheme.authenticate(&creds, &request).unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn test_unsupported_algorithm() {
        let target = AuthTarget::default_port("http", "host.com");
        let mut scheme =
            scheme_for("Digest realm=\"r\", nonce=\"n\", algorithm=SHA-512-256");
        let creds = Credentials::password("user", Some("pw".into()));
        let request = AuthRequest {
            method: "GET",
            uri: "/",
            body: None,
            target: &target,
        };
        let err = scheme.authenticate(&creds, &request).unwrap_err();
        assert!(err.is_unsupported_algorithm());
    }

    #[test]
    fn test_missing_nonce_is_fatal_for_attempt() {
        let target = AuthTarget::default_port("http", "host.com");
        let mut scheme = scheme_for("Digest realm=\"r\"");
        let creds = Credentials::password("user", Some("pw".into()));
        let request = AuthRequest {
            method: "GET",
            uri: "/",
            body: None,
            target: &target,
        };
        assert!(scheme.authenticate(&creds, &request).is_err());
    }

    #[test]
    fn test_stale_reopens_completed_scheme() {
        let mut scheme = scheme_for(RFC_CHALLENGE);
        assert!(scheme.is_complete());

        scheme
            .process_challenge(
                &Challenge::parse(
                    "Digest realm=\"testrealm@host.com\", qop=\"auth\", nonce=\"n2\", stale=true",
                )
                .unwrap(),
            )
            .unwrap();
        assert!(!scheme.is_complete());
    }

    #[test]
    fn test_md5_sess_differs_from_md5() {
        let target = AuthTarget::default_port("http", "host.com");
        let creds = Credentials::password("user", Some("pw".into()));
        let request = AuthRequest {
            method: "GET",
            uri: "/",
            body: None,
            target: &target,
        };

        let mut md5 = scheme_for("Digest realm=\"r\", nonce=\"n\", qop=\"auth\", algorithm=MD5");
        let mut sess =
            scheme_for("Digest realm=\"r\", nonce=\"n\", qop=\"auth\", algorithm=MD5-sess");
        md5.cnonce = "0a4f113b".into();
        md5.last_nonce = Some("n".into());
        sess.cnonce = "0a4f113b".into();
        sess.last_nonce = Some("n".into());

        let plain = md5.authenticate(&creds, &request).unwrap();
        let session = sess.authenticate(&creds, &request).unwrap();
        assert_ne!(
            param(plain.to_str().unwrap(), "response"),
            param(session.to_str().unwrap(), "response")
        );
        assert_eq!(param(session.to_str().unwrap(), "algorithm"), Some("MD5-sess"));
    }
}
