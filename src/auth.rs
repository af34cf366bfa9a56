//! Request authentication for the conferencing control service.
//!
//! Every call carries an `Authorization` header stamped with a millisecond
//! timestamp, a single-use client nonce and an HMAC signature over both. The
//! service rejects stale timestamps and nonces it has already seen; the client
//! keeps no replay state of its own.
//!
//! The signature is `base64(hex(HMAC-SHA256(message, key)))`. The HMAC runs
//! over the message text and the *hex digest text* is what gets base64-encoded,
//! not the raw digest bytes. The service verifies exactly this encoding.

use chrono::Utc;
use hmac::{Hmac, Mac as _};
use rand::Rng as _;
use secrecy::{ExposeSecret as _, SecretString};
use sha2::Sha256;

use crate::error::Error;
use crate::{Result, Timestamp, encoding};

/// Header the signed value is attached under.
pub const AUTHORIZATION: &str = "Authorization";
/// Realm token every header value starts with.
pub const REALM: &str = "MAuth realm=http://marte3.dit.upm.es";
pub const SIGNATURE_METHOD: &str = "HMAC_SHA256";

const NONCE_BYTES: usize = 16;

/// Shared service identity used to sign calls.
#[derive(Clone, Debug)]
pub struct Credentials {
    service_id: String,
    key: SecretString,
}

impl Credentials {
    #[must_use]
    pub fn new<S: Into<String>>(service_id: S, key: SecretString) -> Self {
        Self {
            service_id: service_id.into(),
            key,
        }
    }

    #[must_use]
    pub fn service_id(&self) -> &str {
        &self.service_id
    }

    #[must_use]
    pub(crate) fn key(&self) -> &SecretString {
        &self.key
    }

    /// Both the service identifier and the key are non-empty.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        !self.service_id.is_empty() && !self.key.expose_secret().is_empty()
    }
}

/// Acts on behalf of a named room user. The service scopes the call to that
/// user's role instead of the service's full rights.
#[non_exhaustive]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Impersonation {
    pub username: String,
    pub role: String,
}

impl Impersonation {
    #[must_use]
    pub fn new<U: Into<String>, R: Into<String>>(username: U, role: R) -> Self {
        Self {
            username: username.into(),
            role: role.into(),
        }
    }
}

/// Signing inputs for exactly one outgoing call.
///
/// Consumed by [`AuthContext::into_header`]; never stored.
#[derive(Debug)]
pub struct AuthContext<'a> {
    credentials: &'a Credentials,
    impersonation: Option<&'a Impersonation>,
    timestamp: Timestamp,
    cnonce: String,
}

impl<'a> AuthContext<'a> {
    /// Stamps a fresh context with the current time and a random nonce.
    pub fn new(credentials: Option<&'a Credentials>) -> Result<Self> {
        Self::with_parts(
            credentials,
            Utc::now().timestamp_millis(),
            generate_cnonce(),
        )
    }

    /// Builds a context from explicit inputs. Identical inputs produce an
    /// identical header.
    pub fn with_parts<S: Into<String>>(
        credentials: Option<&'a Credentials>,
        timestamp: Timestamp,
        cnonce: S,
    ) -> Result<Self> {
        let credentials = match credentials {
            Some(credentials) if credentials.is_complete() => credentials,
            Some(_) => {
                return Err(Error::unauthenticated(
                    "service id and service key must both be non-empty",
                ));
            }
            None => {
                return Err(Error::unauthenticated(
                    "no service credentials configured",
                ));
            }
        };

        Ok(Self {
            credentials,
            impersonation: None,
            timestamp,
            cnonce: cnonce.into(),
        })
    }

    #[must_use]
    pub fn impersonate(mut self, impersonation: Option<&'a Impersonation>) -> Self {
        self.impersonation = impersonation;
        self
    }

    #[must_use]
    pub fn timestamp(&self) -> Timestamp {
        self.timestamp
    }

    #[must_use]
    pub fn cnonce(&self) -> &str {
        &self.cnonce
    }

    /// `timestamp,cnonce`, extended with `,username,role` when impersonating.
    #[must_use]
    pub fn message(&self) -> String {
        let mut message = format!("{},{}", self.timestamp, self.cnonce);
        if let Some(Impersonation { username, role }) = self.impersonation {
            message.push(',');
            message.push_str(username);
            message.push(',');
            message.push_str(role);
        }
        message
    }

    pub fn signature(&self) -> Result<String> {
        sign(&self.message(), self.credentials.key())
    }

    /// Renders the header value. Pair order is fixed; the service parses it
    /// positionally.
    pub fn into_header(self) -> Result<String> {
        let signature = self.signature()?;

        let mut header = format!(
            "{REALM},mauth_signature_method={SIGNATURE_METHOD},mauth_serviceid={},mauth_cnonce={},mauth_timestamp={}",
            self.credentials.service_id(),
            self.cnonce,
            self.timestamp
        );
        if let Some(Impersonation { username, role }) = self.impersonation {
            header.push_str(",mauth_username=");
            header.push_str(&encoding::encode(username));
            header.push_str(",mauth_role=");
            header.push_str(&encoding::encode(role));
        }
        header.push_str(",mauth_signature=");
        header.push_str(&signature);

        Ok(header)
    }
}

/// Builds the `Authorization` value for one call using the current time and a
/// fresh nonce.
pub fn create_header(
    credentials: Option<&Credentials>,
    impersonation: Option<&Impersonation>,
) -> Result<String> {
    AuthContext::new(credentials)?
        .impersonate(impersonation)
        .into_header()
}

/// `base64(hex(HMAC-SHA256(message, key)))`.
pub fn sign(message: &str, key: &SecretString) -> Result<String> {
    let mut mac = Hmac::<Sha256>::new_from_slice(key.expose_secret().as_bytes())
        .map_err(|e| Error::validation(format!("invalid service key: {e}")))?;
    mac.update(message.as_bytes());

    let digest = hex::encode(mac.finalize().into_bytes());
    Ok(encoding::encode(digest))
}

/// Random single-use nonce, hex-encoded.
#[must_use]
pub fn generate_cnonce() -> String {
    let mut bytes = [0_u8; NONCE_BYTES];
    rand::rng().fill(&mut bytes);
    hex::encode(bytes)
}
