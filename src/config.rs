use std::path::PathBuf;

use secrecy::SecretString;
use url::Url;

use crate::Result;
use crate::auth::{Credentials, Impersonation};
use crate::bridge::WORKER_ENV;
use crate::error::Error;

pub const ENV_SERVICE_ID: &str = "CONFERENCE_SERVICE_ID";
pub const ENV_SERVICE_KEY: &str = "CONFERENCE_SERVICE_KEY";
pub const ENV_BASE_URL: &str = "CONFERENCE_BASE_URL";
pub const ENV_TLS_VERIFY: &str = "CONFERENCE_TLS_VERIFY";

/// Raw service identity typically passed from app-level config.
#[expect(
    clippy::exhaustive_structs,
    reason = "plain carrier for app-level settings, built with a struct literal"
)]
#[derive(Clone, Debug)]
pub struct RawServiceConfig {
    pub service_id: String,
    pub service_key: SecretString,
}

/// Client configuration.
///
/// Missing credentials are allowed here; authenticated calls then fail with
/// [`crate::error::Kind::Unauthenticated`].
#[non_exhaustive]
#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub base_url: Url,
    pub credentials: Option<Credentials>,
    pub tls_verify: bool,
    pub impersonation: Option<Impersonation>,
    pub sync_worker: Option<PathBuf>,
}

impl ClientConfig {
    pub fn new(base_url: Url, credentials: Option<Credentials>) -> Result<Self> {
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(Error::validation(format!(
                "base URL must be http or https, got `{}`",
                base_url.scheme()
            )));
        }
        if base_url.host_str().is_none_or(str::is_empty) {
            return Err(Error::validation(format!("base URL `{base_url}` has no host")));
        }

        // Resource paths are joined onto the base, which needs a trailing slash
        // to keep its last segment.
        let mut base_url = base_url;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            base_url,
            credentials,
            tls_verify: true,
            impersonation: None,
            sync_worker: None,
        })
    }

    pub fn from_raw(base_url: &str, raw: RawServiceConfig) -> Result<Self> {
        if base_url.trim().is_empty() {
            return Err(Error::validation("base URL must not be empty"));
        }
        let base_url = Url::parse(base_url.trim())?;

        Self::new(
            base_url,
            Some(Credentials::new(raw.service_id, raw.service_key)),
        )
    }

    /// Loads `CONFERENCE_BASE_URL`, `CONFERENCE_SERVICE_ID`,
    /// `CONFERENCE_SERVICE_KEY`, `CONFERENCE_TLS_VERIFY` and
    /// `CONFERENCE_SYNC_WORKER` from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`ClientConfig::from_env`] over an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let base_url = lookup(ENV_BASE_URL).ok_or_else(|| {
            Error::validation(format!("missing required environment variable: {ENV_BASE_URL}"))
        })?;

        let credentials = match (lookup(ENV_SERVICE_ID), lookup(ENV_SERVICE_KEY)) {
            (Some(service_id), Some(service_key)) => Some(RawServiceConfig {
                service_id,
                service_key: SecretString::from(service_key),
            }),
            _ => None,
        };

        let mut config = match credentials {
            Some(raw) => Self::from_raw(&base_url, raw)?,
            None => {
                if base_url.trim().is_empty() {
                    return Err(Error::validation("base URL must not be empty"));
                }
                Self::new(Url::parse(base_url.trim())?, None)?
            }
        };

        if let Some(value) = lookup(ENV_TLS_VERIFY) {
            config.tls_verify = parse_bool(ENV_TLS_VERIFY, &value)?;
        }
        config.sync_worker = lookup(WORKER_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        Ok(config)
    }

    #[must_use]
    pub fn with_tls_verify(mut self, tls_verify: bool) -> Self {
        self.tls_verify = tls_verify;
        self
    }

    #[must_use]
    pub fn with_impersonation(mut self, impersonation: Impersonation) -> Self {
        self.impersonation = Some(impersonation);
        self
    }

    #[must_use]
    pub fn with_sync_worker<P: Into<PathBuf>>(mut self, worker: P) -> Self {
        self.sync_worker = Some(worker.into());
        self
    }

    #[must_use]
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }
}

/// Accepts `1`/`0`, `true`/`false`, `yes`/`no`, `on`/`off` (case-insensitive).
fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::validation(format!(
            "invalid boolean `{other}` for {key}"
        ))),
    }
}
