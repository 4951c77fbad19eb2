//! Signed session cookies.
//!
//! Format: `s:<value>.<signature>` where the signature is the unpadded
//! standard base64 of HMAC-SHA256(secret, value). The whole cookie value
//! is usually percent-encoded on the wire (`s%3A...`).

use base64::engine::general_purpose::STANDARD_NO_PAD;
use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::{percent_decode_str, utf8_percent_encode, NON_ALPHANUMERIC};
use secrecy::{ExposeSecret, Secret};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::ports::SessionError;

type HmacSha256 = Hmac<Sha256>;

const SIGNED_PREFIX: &str = "s:";

/// Signs and verifies cookie values with a shared secret.
#[derive(Clone)]
pub struct CookieSigner {
    secret: Secret<String>,
}

impl CookieSigner {
    pub fn new(secret: Secret<String>) -> Self {
        Self { secret }
    }

    fn signature(&self, value: &str) -> Result<String, SessionError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| SessionError::Unavailable("invalid signing key".to_string()))?;
        mac.update(value.as_bytes());
        Ok(STANDARD_NO_PAD.encode(mac.finalize().into_bytes()))
    }

    /// `s:<value>.<signature>`, not yet percent-encoded.
    pub fn sign(&self, value: &str) -> Result<String, SessionError> {
        Ok(format!("{SIGNED_PREFIX}{value}.{}", self.signature(value)?))
    }

    /// Signed and percent-encoded, ready for a `Set-Cookie` header.
    pub fn sign_for_header(&self, value: &str) -> Result<String, SessionError> {
        Ok(utf8_percent_encode(&self.sign(value)?, NON_ALPHANUMERIC).to_string())
    }

    /// Verifies a (percent-decoded) signed value and returns the payload.
    pub fn unsign(&self, signed: &str) -> Result<String, SessionError> {
        let body = signed
            .strip_prefix(SIGNED_PREFIX)
            .ok_or_else(|| SessionError::MalformedCookie("cookie is not signed".to_string()))?;
        let (value, signature) = body
            .rsplit_once('.')
            .ok_or_else(|| SessionError::MalformedCookie("signature missing".to_string()))?;

        let expected = self.signature(value)?;
        if bool::from(expected.as_bytes().ct_eq(signature.as_bytes())) {
            Ok(value.to_string())
        } else {
            Err(SessionError::BadSignature)
        }
    }
}

/// Finds cookie `name` in a raw `Cookie` header and percent-decodes it.
pub fn find_cookie(header: &str, name: &str) -> Result<String, SessionError> {
    let raw = header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .ok_or_else(|| SessionError::CookieMissing(name.to_string()))?;

    percent_decode_str(raw)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|e| SessionError::MalformedCookie(e.to_string()))
}
