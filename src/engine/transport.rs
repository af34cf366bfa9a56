use std::error::Error as StdError;
use std::fmt;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client as ReqwestClient, Method, Response};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::Result;

#[non_exhaustive]
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }
}

/// Everything needed to perform one exchange, with URL parts and injected
/// headers already settled. The sync worker receives exactly this value.
#[expect(
    clippy::exhaustive_structs,
    reason = "callers driving the bridge directly build this value field by field"
)]
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct ResolvedRequest {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Path plus query string.
    pub path: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub tls_verify: bool,
}

impl ResolvedRequest {
    pub fn url(&self) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}://{}:{}{}",
            self.scheme.as_str(),
            self.host,
            self.port,
            self.path
        ))?)
    }

    /// Case-insensitive header lookup.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// A failed exchange: connection refused, DNS, TLS, or a broken stream.
///
/// Never raised to the caller of `send`; it becomes the response status text
/// (`message`) and body (`trace`).
#[non_exhaustive]
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct TransportFailure {
    pub message: String,
    pub trace: String,
}

impl TransportFailure {
    pub fn new<S: Into<String>>(message: S) -> Self {
        let message = message.into();
        Self {
            trace: message.clone(),
            message,
        }
    }

    /// Captures the error's message and its full source chain.
    #[must_use]
    pub fn from_error(err: &(dyn StdError + 'static)) -> Self {
        let message = err.to_string();
        let mut trace = message.clone();
        let mut source = err.source();
        while let Some(cause) = source {
            trace.push_str("\ncaused by: ");
            trace.push_str(&cause.to_string());
            source = cause.source();
        }
        Self { message, trace }
    }
}

impl fmt::Display for TransportFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl StdError for TransportFailure {}

/// Network side of the request engine.
#[derive(Clone, Debug)]
pub struct Transport {
    client: ReqwestClient,
    tls_verify: bool,
}

impl Default for Transport {
    fn default() -> Self {
        Self {
            client: ReqwestClient::new(),
            tls_verify: true,
        }
    }
}

impl Transport {
    /// `tls_verify = false` accepts any server certificate.
    pub fn new(tls_verify: bool) -> Result<Self> {
        let client = ReqwestClient::builder()
            .danger_accept_invalid_certs(!tls_verify)
            .build()?;
        Ok(Self { client, tls_verify })
    }

    #[must_use]
    pub fn tls_verify(&self) -> bool {
        self.tls_verify
    }

    /// Opens the connection and resolves once the response head has arrived.
    pub(crate) async fn start(
        &self,
        request: &ResolvedRequest,
    ) -> std::result::Result<Response, TransportFailure> {
        let url = request
            .url()
            .map_err(|e| TransportFailure::from_error(&e))?;
        let method = Method::from_bytes(request.method.as_bytes())
            .map_err(|e| TransportFailure::from_error(&e))?;

        let mut headers = HeaderMap::with_capacity(request.headers.len());
        for (name, value) in &request.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| TransportFailure::from_error(&e))?;
            let value =
                HeaderValue::from_str(value).map_err(|e| TransportFailure::from_error(&e))?;
            headers.insert(name, value);
        }

        let mut builder = self.client.request(method, url).headers(headers);
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        builder
            .send()
            .await
            .map_err(|e| TransportFailure::from_error(&e))
    }
}

/// Status line and header map of a received response.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub(crate) struct ResponseHead {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
}

impl From<&Response> for ResponseHead {
    fn from(response: &Response) -> Self {
        let status = response.status();
        Self {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            headers: response
                .headers()
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_owned(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
        }
    }
}

/// Performs the whole exchange and returns the status with the full body.
///
/// Used by the sync worker, which has no incremental observer.
pub async fn execute(
    request: &ResolvedRequest,
) -> std::result::Result<(u16, Vec<u8>), TransportFailure> {
    let transport = Transport::new(request.tls_verify).map_err(|e| TransportFailure::from_error(&e))?;
    let mut response = transport.start(request).await?;
    let status = response.status().as_u16();

    let mut body = Vec::new();
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| TransportFailure::from_error(&e))?
    {
        body.extend_from_slice(&chunk);
    }

    Ok((status, body))
}
