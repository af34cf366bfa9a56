//! Browser-style HTTP request object for a non-browser runtime.
//!
//! A [`HttpRequest`] walks through [`ReadyState`] once per exchange:
//! `Opened -> HeadersReceived -> Loading* -> Done`, or straight to `Done` on
//! failure or abort. The same surface runs in two modes chosen at `open`:
//!
//! - async: the exchange runs as a Tokio task; headers and body chunks are
//!   observable as they arrive.
//! - sync: `send` blocks the calling thread while an isolated worker process
//!   performs the exchange (see [`crate::bridge`]); the result lands at once.
//!
//! Network failures never surface as `Err`. They end the exchange in `Done`
//! with status [`FAILURE_STATUS`] and the error text as status text and body.
//!
//! Repeated `set_header` calls with the same name overwrite instead of
//! appending, unlike the browser object this mirrors.

mod events;
mod request;
mod state;
mod transport;

use bon::Builder;
use secrecy::SecretString;

pub use events::{Event, Listener};
pub use request::HttpRequest;
pub use state::ReadyState;
pub use transport::{ResolvedRequest, Scheme, Transport, TransportFailure, execute};

/// Status reported for every transport failure.
pub const FAILURE_STATUS: u16 = 503;

pub const DEFAULT_USER_AGENT: &str = concat!("conference-client-sdk/", env!("CARGO_PKG_VERSION"));
pub const DEFAULT_ACCEPT: &str = "*/*";
pub const DEFAULT_CONTENT_TYPE: &str = "text/plain;charset=UTF-8";

/// Settings fixed for one request cycle by [`HttpRequest::open`].
#[non_exhaustive]
#[derive(Clone, Debug, Builder)]
pub struct OpenOptions {
    /// `false` selects sync mode.
    #[builder(default = true)]
    pub async_mode: bool,
    /// Basic auth user; overrides any caller-set `Authorization` header.
    #[builder(into)]
    pub user: Option<String>,
    #[builder(into)]
    pub password: Option<SecretString>,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            async_mode: true,
            user: None,
            password: None,
        }
    }
}

impl OpenOptions {
    /// Blocking mode through the worker process.
    #[must_use]
    pub fn sync() -> Self {
        Self {
            async_mode: false,
            ..Self::default()
        }
    }
}
