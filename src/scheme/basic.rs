// src/scheme/basic.rs

//! The Basic authentication scheme (RFC 7617).

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use encoding_rs::Encoding;
use http::HeaderValue;

use super::{AuthRequest, AuthScheme};
use crate::challenge::Challenge;
use crate::credentials::Credentials;
use crate::error;
use crate::Error;

/// Basic completes in a single round trip: the challenge only tells us the
/// realm, and the response is the base64 credentials pair.
#[derive(Clone, Debug)]
pub struct BasicScheme {
    realm: Option<String>,
    complete: bool,
    charset: &'static Encoding,
}

impl BasicScheme {
    pub fn new(charset: &'static Encoding) -> BasicScheme {
        BasicScheme {
            realm: None,
            complete: false,
            charset,
        }
    }
}

impl AuthScheme for BasicScheme {
    fn name(&self) -> &str {
        "Basic"
    }

    fn realm(&self) -> Option<&str> {
        self.realm.as_deref()
    }

    fn is_connection_based(&self) -> bool {
        false
    }

    fn is_complete(&self) -> bool {
        self.complete
    }

    fn process_challenge(&mut self, challenge: &Challenge) -> Result<(), Error> {
        if !challenge.scheme().eq_ignore_ascii_case("basic") {
            return Err(error::malformed_challenge(format!(
                "Basic scheme handed a {} challenge",
                challenge.scheme()
            )));
        }
        self.realm = challenge.param("realm").map(str::to_owned);
        self.complete = true;
        Ok(())
    }

    fn authenticate(
        &mut self,
        credentials: &Credentials,
        _request: &AuthRequest<'_>,
    ) -> Result<HeaderValue, Error> {
        // an absent password is rendered as the literal text "null"
        let pair = format!(
            "{}:{}",
            credentials.username(),
            credentials.secret().unwrap_or("null")
        );
        let (encoded, _, unmappable) = self.charset.encode(&pair);
        if unmappable {
            return Err(error::encoding(format!(
                "credentials not representable in {}",
                self.charset.name()
            )));
        }

        let value = format!("Basic {}", BASE64.encode(encoded));
        HeaderValue::from_str(&value).map_err(error::encoding)
    }
}
