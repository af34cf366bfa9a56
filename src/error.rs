use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

use reqwest::{Method, StatusCode};

use crate::engine::ReadyState;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// Error related to non-successful HTTP call
    Status,
    /// Error related to invalid state within the SDK
    Validation,
    /// Request object operation called out of sequence
    InvalidState,
    /// URL scheme the request engine cannot speak
    UnsupportedProtocol,
    /// Authenticated call attempted without service credentials
    Unauthenticated,
    /// Internal error from dependencies
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    #[must_use]
    pub fn kind(&self) -> Kind {
        self.kind
    }

    #[must_use]
    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    #[must_use]
    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    pub fn validation<S: Into<String>>(message: S) -> Self {
        Validation {
            reason: message.into(),
        }
        .into()
    }

    pub fn status<S: Into<String>>(
        status_code: StatusCode,
        method: Method,
        path: String,
        message: S,
    ) -> Self {
        Status {
            status_code,
            method,
            path,
            message: message.into(),
        }
        .into()
    }

    pub fn invalid_state<S: Into<String>>(
        operation: &'static str,
        state: ReadyState,
        reason: S,
    ) -> Self {
        InvalidState {
            operation,
            state,
            reason: reason.into(),
        }
        .into()
    }

    pub fn unsupported_protocol<S: Into<String>>(scheme: S) -> Self {
        UnsupportedProtocol {
            scheme: scheme.into(),
        }
        .into()
    }

    pub fn unauthenticated<S: Into<String>>(reason: S) -> Self {
        Unauthenticated {
            reason: reason.into(),
        }
        .into()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

#[non_exhaustive]
#[derive(Debug)]
pub struct Status {
    pub status_code: StatusCode,
    pub method: Method,
    pub path: String,
    pub message: String,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "error({}) making {} call to {} with {}",
            self.status_code, self.method, self.path, self.message
        )
    }
}

impl StdError for Status {}

#[non_exhaustive]
#[derive(Debug)]
pub struct Validation {
    pub reason: String,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid: {}", self.reason)
    }
}

impl StdError for Validation {}

/// An operation was attempted while the request object was in a state that
/// does not permit it.
#[non_exhaustive]
#[derive(Debug)]
pub struct InvalidState {
    pub operation: &'static str,
    pub state: ReadyState,
    pub reason: String,
}

impl fmt::Display for InvalidState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} not allowed in state {:?}: {}",
            self.operation, self.state, self.reason
        )
    }
}

impl StdError for InvalidState {}

#[non_exhaustive]
#[derive(Debug)]
pub struct UnsupportedProtocol {
    pub scheme: String,
}

impl fmt::Display for UnsupportedProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unsupported protocol `{}:`", self.scheme)
    }
}

impl StdError for UnsupportedProtocol {}

#[non_exhaustive]
#[derive(Debug)]
pub struct Unauthenticated {
    pub reason: String,
}

impl fmt::Display for Unauthenticated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unauthenticated: {}", self.reason)
    }
}

impl StdError for Unauthenticated {}

impl From<Status> for Error {
    fn from(err: Status) -> Self {
        Error::with_source(Kind::Status, err)
    }
}

impl From<Validation> for Error {
    fn from(err: Validation) -> Self {
        Error::with_source(Kind::Validation, err)
    }
}

impl From<InvalidState> for Error {
    fn from(err: InvalidState) -> Self {
        Error::with_source(Kind::InvalidState, err)
    }
}

impl From<UnsupportedProtocol> for Error {
    fn from(err: UnsupportedProtocol) -> Self {
        Error::with_source(Kind::UnsupportedProtocol, err)
    }
}

impl From<Unauthenticated> for Error {
    fn from(err: Unauthenticated) -> Self {
        Error::with_source(Kind::Unauthenticated, err)
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<reqwest::header::InvalidHeaderName> for Error {
    fn from(e: reqwest::header::InvalidHeaderName) -> Self {
        Error::with_source(Kind::Validation, e)
    }
}

impl From<reqwest::header::InvalidHeaderValue> for Error {
    fn from(e: reqwest::header::InvalidHeaderValue) -> Self {
        Error::with_source(Kind::Validation, e)
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::with_source(Kind::Validation, e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}

impl From<serde_html_form::ser::Error> for Error {
    fn from(e: serde_html_form::ser::Error) -> Self {
        Error::with_source(Kind::Validation, e)
    }
}

impl From<base64::DecodeError> for Error {
    fn from(e: base64::DecodeError) -> Self {
        Error::with_source(Kind::Validation, e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_state_carries_operation_and_state() {
        let err = Error::invalid_state("set_header", ReadyState::Unsent, "open() has not been called");

        assert_eq!(err.kind(), Kind::InvalidState);
        let inner = err.downcast_ref::<InvalidState>().expect("InvalidState payload");
        assert_eq!(inner.operation, "set_header");
        assert_eq!(inner.state, ReadyState::Unsent);
        assert!(err.to_string().contains("set_header not allowed in state Unsent"));
    }

    #[test]
    fn status_display_names_call() {
        let err = Error::status(
            StatusCode::NOT_FOUND,
            Method::GET,
            "/v1/rooms/abc".to_owned(),
            "room not found",
        );

        assert_eq!(err.kind(), Kind::Status);
        assert_eq!(
            err.to_string(),
            "Status: error(404 Not Found) making GET call to /v1/rooms/abc with room not found"
        );
    }

    #[test]
    fn unsupported_protocol_names_scheme() {
        let err = Error::unsupported_protocol("ftp");

        assert_eq!(err.kind(), Kind::UnsupportedProtocol);
        assert!(err.to_string().contains("`ftp:`"));
    }
}
