// src/config.rs

//! Per-request authentication configuration.

use encoding_rs::Encoding;

/// The default scheme preference order, strongest first.
pub(crate) const DEFAULT_PREFERENCE: &[&str] = &["Negotiate", "Kerberos", "NTLM", "Digest", "Basic"];

/// Configuration consulted while answering challenges for one request.
///
/// The preference list reorders (and restricts) which offered schemes are
/// tried; the charset applies to Basic credentials encoding.
#[derive(Clone, Debug)]
pub struct AuthConfig {
    scheme_preference: Option<Vec<String>>,
    basic_charset: &'static Encoding,
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            scheme_preference: None,
            basic_charset: encoding_rs::UTF_8,
        }
    }
}

impl AuthConfig {
    pub fn new() -> AuthConfig {
        AuthConfig::default()
    }

    /// Override the default scheme preference order.
    ///
    /// Schemes not named here are never attempted for the request.
    pub fn scheme_preference<I, S>(mut self, schemes: I) -> AuthConfig
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scheme_preference = Some(schemes.into_iter().map(Into::into).collect());
        self
    }

    /// The charset used to encode Basic credentials.
    pub fn basic_charset(mut self, charset: &'static Encoding) -> AuthConfig {
        self.basic_charset = charset;
        self
    }

    pub(crate) fn preference(&self) -> Vec<&str> {
        match &self.scheme_preference {
            Some(list) => list.iter().map(String::as_str).collect(),
            None => DEFAULT_PREFERENCE.to_vec(),
        }
    }

    pub(crate) fn charset(&self) -> &'static Encoding {
        self.basic_charset
    }
}
