use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use reqwest::StatusCode;
use reqwest::header::{HeaderName, HeaderValue};
use secrecy::ExposeSecret as _;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::Result;
use crate::bridge::{BridgeRecord, SyncBridge};
use crate::encoding;
use crate::engine::events::{Event, Listener, Listeners};
use crate::engine::transport::{ResolvedRequest, ResponseHead, Scheme, Transport, TransportFailure};
use crate::engine::{
    DEFAULT_ACCEPT, DEFAULT_CONTENT_TYPE, DEFAULT_USER_AGENT, FAILURE_STATUS, OpenOptions,
    ReadyState,
};
use crate::error::Error;

const FORBIDDEN_METHODS: [&str; 3] = ["CONNECT", "TRACE", "TRACK"];
const HIDDEN_RESPONSE_HEADERS: [&str; 2] = ["set-cookie", "set-cookie2"];

/// Browser-style request object.
///
/// Cloning yields another handle to the same request, so one task can
/// `abort` an exchange another task is waiting on. Listeners, headers and
/// response buffers belong to this request alone.
#[derive(Clone)]
pub struct HttpRequest {
    shared: Arc<Shared>,
}

struct Shared {
    inner: Mutex<Inner>,
    listeners: Mutex<Listeners>,
    transport: Transport,
    bridge: SyncBridge,
    /// Id of the last exchange that reached `Done`.
    completed: watch::Sender<u64>,
}

#[derive(Debug, Default)]
struct Inner {
    state: ReadyState,
    method: String,
    url: Option<Url>,
    options: OpenOptions,
    headers: Vec<(String, String)>,
    send_flag: bool,
    error_flag: bool,
    exchange: u64,
    cancel: Option<CancellationToken>,
    response: Response,
}

#[derive(Debug, Default)]
struct Response {
    status: u16,
    status_text: String,
    headers: Vec<(String, String)>,
    body: Vec<u8>,
}

impl Default for HttpRequest {
    fn default() -> Self {
        Self::with_parts(Transport::default(), SyncBridge::default())
    }
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("HttpRequest")
            .field("state", &inner.state)
            .field("method", &inner.method)
            .field("url", &inner.url.as_ref().map(Url::as_str))
            .field("send_flag", &inner.send_flag)
            .field("error_flag", &inner.error_flag)
            .finish_non_exhaustive()
    }
}

impl HttpRequest {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a request that performs async exchanges on `transport` and
    /// sync exchanges through `bridge`.
    #[must_use]
    pub fn with_parts(transport: Transport, bridge: SyncBridge) -> Self {
        let (completed, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    headers: default_headers(),
                    ..Inner::default()
                }),
                listeners: Mutex::new(Listeners::default()),
                transport,
                bridge,
                completed,
            }),
        }
    }

    /// Starts a new request cycle. Any exchange still in flight is aborted
    /// first and request headers return to the defaults.
    pub fn open(&self, method: &str, url: &str, options: OpenOptions) -> Result<()> {
        let method = normalize_method(method)?;
        let url = Url::parse(url)?;

        self.cancel_exchange(false);

        let state = {
            let mut inner = self.lock();
            inner.method = method;
            inner.url = Some(url);
            inner.options = options;
            inner.headers = default_headers();
            inner.send_flag = false;
            inner.transition(ReadyState::Opened);
            inner.state
        };
        self.dispatch(&[Event::ReadyStateChange], state);

        Ok(())
    }

    /// Sets a request header. A repeated name (compared case-sensitively)
    /// replaces the earlier value rather than appending to it.
    pub fn set_header(&self, name: &str, value: &str) -> Result<()> {
        let mut inner = self.lock();
        if inner.state != ReadyState::Opened {
            return Err(Error::invalid_state(
                "set_header",
                inner.state,
                "open() must be called first",
            ));
        }
        if inner.send_flag {
            return Err(Error::invalid_state(
                "set_header",
                inner.state,
                "send() has already been called",
            ));
        }
        HeaderName::from_bytes(name.as_bytes())?;
        HeaderValue::from_str(value)?;

        put_header(&mut inner.headers, name, value);
        Ok(())
    }

    /// Dispatches the exchange.
    ///
    /// In async mode this returns as soon as the exchange has been spawned on
    /// the current Tokio runtime; progress is reported through events and
    /// [`HttpRequest::wait`]. In sync mode it blocks the calling thread until
    /// the worker process has produced a result, then reaches `Done`.
    ///
    /// Only misuse and unsupported URL schemes are returned as `Err`; network
    /// failures end in `Done` with [`FAILURE_STATUS`].
    pub fn send(&self, body: Option<String>) -> Result<()> {
        let (resolved, async_mode, exchange, cancel) = {
            let mut inner = self.lock();
            if inner.state != ReadyState::Opened {
                return Err(Error::invalid_state(
                    "send",
                    inner.state,
                    "open() must be called first",
                ));
            }
            if inner.send_flag {
                return Err(Error::invalid_state(
                    "send",
                    inner.state,
                    "send() has already been called",
                ));
            }

            let resolved = inner.resolve(body, self.shared.transport.tls_verify())?;
            let async_mode = inner.options.async_mode;
            if async_mode && tokio::runtime::Handle::try_current().is_err() {
                return Err(Error::invalid_state(
                    "send",
                    inner.state,
                    "async mode requires a running Tokio runtime",
                ));
            }

            inner.headers.clone_from(&resolved.headers);
            inner.error_flag = false;
            inner.send_flag = true;
            inner.exchange += 1;
            let cancel = CancellationToken::new();
            inner.cancel = Some(cancel.clone());

            (resolved, async_mode, inner.exchange, cancel)
        };

        #[cfg(feature = "tracing")]
        tracing::debug!(
            method = %resolved.method,
            host = %resolved.host,
            path = %resolved.path,
            async_mode,
            "sending request"
        );

        if async_mode {
            // Observers are told once, before any network activity.
            self.dispatch(&[Event::LoadStart, Event::ReadyStateChange], ReadyState::Opened);
            tokio::spawn(self.clone().run_exchange(exchange, resolved, cancel));
        } else {
            self.dispatch(&[Event::LoadStart], ReadyState::Opened);
            self.run_blocking(exchange, &resolved);
        }

        Ok(())
    }

    /// Cancels the exchange in flight, if any, and leaves the request
    /// `Unsent`. Listeners observe `Done` first when an exchange was running.
    pub fn abort(&self) {
        self.cancel_exchange(true);
    }

    /// Records a transport failure as the outcome of the current exchange.
    pub fn handle_error(&self, failure: &TransportFailure) {
        self.fail_with(None, failure);
    }

    /// Resolves once the most recently sent exchange has reached `Done`.
    pub async fn wait(&self) {
        let target = self.lock().exchange;
        let mut completed = self.shared.completed.subscribe();
        // The sender lives as long as `self`, so this cannot observe a close.
        let _: std::result::Result<watch::Ref<'_, u64>, watch::error::RecvError> =
            completed.wait_for(|done| *done >= target).await;
    }

    pub fn on_ready_state_change<F>(&self, callback: Option<F>)
    where
        F: Fn(ReadyState) + Send + Sync + 'static,
    {
        self.set_handler(
            Event::ReadyStateChange,
            callback.map(|callback| Arc::new(callback) as Listener),
        );
    }

    /// Replaces the single handler slot for `event`.
    pub fn set_handler(&self, event: Event, handler: Option<Listener>) {
        self.listeners().set_handler(event, handler);
    }

    /// Registers a listener and returns the handle needed to remove it.
    pub fn add_listener<F>(&self, event: Event, callback: F) -> Listener
    where
        F: Fn(ReadyState) + Send + Sync + 'static,
    {
        let listener: Listener = Arc::new(callback);
        self.listeners().add(event, Arc::clone(&listener));
        listener
    }

    pub fn remove_listener(&self, event: Event, listener: &Listener) -> bool {
        self.listeners().remove(event, listener)
    }

    #[must_use]
    pub fn ready_state(&self) -> ReadyState {
        self.lock().state
    }

    #[must_use]
    pub fn error_flag(&self) -> bool {
        self.lock().error_flag
    }

    #[must_use]
    pub fn status(&self) -> u16 {
        self.lock().response.status
    }

    #[must_use]
    pub fn status_text(&self) -> String {
        self.lock().response.status_text.clone()
    }

    /// Body received so far. After a transport failure this holds the error
    /// trace.
    #[must_use]
    pub fn response_text(&self) -> String {
        String::from_utf8_lossy(&self.lock().response.body).into_owned()
    }

    /// Response header value, case-insensitive. Repeated headers are joined
    /// with `", "`.
    #[must_use]
    pub fn response_header(&self, name: &str) -> Option<String> {
        let inner = self.lock();
        if !inner.headers_visible() {
            return None;
        }

        let values: Vec<&str> = inner
            .response
            .headers
            .iter()
            .filter(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
            .collect();
        (!values.is_empty()).then(|| values.join(", "))
    }

    /// All response headers as `name: value\r\n` lines, cookies excluded.
    #[must_use]
    pub fn all_response_headers(&self) -> String {
        let inner = self.lock();
        if !inner.headers_visible() {
            return String::new();
        }

        inner
            .response
            .headers
            .iter()
            .filter(|(key, _)| {
                !HIDDEN_RESPONSE_HEADERS
                    .iter()
                    .any(|hidden| key.eq_ignore_ascii_case(hidden))
            })
            .map(|(key, value)| format!("{key}: {value}\r\n"))
            .collect()
    }

    /// Request header as it will be (or was) sent.
    #[must_use]
    pub fn request_header(&self, name: &str) -> Option<String> {
        self.lock()
            .headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.clone())
    }

    async fn run_exchange(self, exchange: u64, request: ResolvedRequest, cancel: CancellationToken) {
        let started = tokio::select! {
            () = cancel.cancelled() => return,
            result = self.shared.transport.start(&request) => result,
        };
        let mut response = match started {
            Ok(response) => response,
            Err(failure) => {
                self.fail_exchange(exchange, &failure);
                return;
            }
        };

        let head = ResponseHead::from(&response);
        let progressed = self.advance(exchange, ReadyState::HeadersReceived, &[], |response| {
            response.status = head.status;
            response.status_text = head.status_text;
            response.headers = head.headers;
        });
        if !progressed {
            return;
        }

        loop {
            let chunk = tokio::select! {
                () = cancel.cancelled() => return,
                chunk = response.chunk() => chunk,
            };
            match chunk {
                Ok(Some(bytes)) => {
                    let progressed = self.advance(exchange, ReadyState::Loading, &[], |response| {
                        response.body.extend_from_slice(&bytes);
                    });
                    if !progressed {
                        return;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    self.fail_exchange(exchange, &TransportFailure::from_error(&e));
                    return;
                }
            }
        }

        self.advance(exchange, ReadyState::Done, &[Event::Load, Event::LoadEnd], |_| {});
    }

    fn run_blocking(&self, exchange: u64, request: &ResolvedRequest) {
        match self.shared.bridge.run(request) {
            Ok(BridgeRecord::Status { code, body }) => {
                let status_text = StatusCode::from_u16(code)
                    .ok()
                    .and_then(|status| status.canonical_reason())
                    .unwrap_or_default()
                    .to_owned();
                self.advance(exchange, ReadyState::Done, &[Event::Load, Event::LoadEnd], |response| {
                    response.status = code;
                    response.status_text = status_text;
                    response.body = body.into_bytes();
                });
            }
            Ok(BridgeRecord::Error(failure)) => self.fail_exchange(exchange, &failure),
            Err(e) => self.fail_exchange(exchange, &TransportFailure::from_error(&e)),
        }
    }

    /// Applies progress of `exchange` and moves to `next`. Returns `false`
    /// when the exchange has been aborted or superseded; nothing is applied
    /// then.
    fn advance<F>(&self, exchange: u64, next: ReadyState, extra: &[Event], update: F) -> bool
    where
        F: FnOnce(&mut Response),
    {
        let (fired, state) = {
            let mut inner = self.lock();
            if !inner.owns(exchange) {
                return false;
            }
            update(&mut inner.response);
            if next == ReadyState::Done {
                inner.send_flag = false;
                inner.cancel = None;
            }
            let fired = inner.transition(next);
            if next == ReadyState::Done {
                self.mark_completed(&inner);
            }
            (fired, inner.state)
        };

        if fired {
            self.dispatch(&[Event::ReadyStateChange], state);
            self.dispatch(extra, state);
        }
        true
    }

    fn fail_exchange(&self, exchange: u64, failure: &TransportFailure) {
        #[cfg(feature = "tracing")]
        tracing::warn!(exchange, error = %failure.message, "request failed");

        self.fail_with(Some(exchange), failure);
    }

    /// Forces `Done` with the failure recorded. With an exchange id, only
    /// applies while that exchange is still current.
    fn fail_with(&self, exchange: Option<u64>, failure: &TransportFailure) {
        let (fired, state) = {
            let mut inner = self.lock();
            if exchange.is_some_and(|exchange| !inner.owns(exchange)) {
                return;
            }
            let fired = inner.fail(failure);
            self.mark_completed(&inner);
            (fired, inner.state)
        };

        if fired {
            self.dispatch(&[Event::ReadyStateChange], state);
        }
        self.dispatch(&[Event::Error, Event::LoadEnd], state);
    }

    fn cancel_exchange(&self, explicit: bool) {
        let (was_in_flight, state) = {
            let mut inner = self.lock();
            if let Some(cancel) = inner.cancel.take() {
                cancel.cancel();
            }

            inner.headers = default_headers();
            inner.response = Response::default();
            inner.error_flag = true;

            let was_in_flight = inner.state.in_flight(inner.send_flag);
            if was_in_flight {
                inner.send_flag = false;
                inner.transition(ReadyState::Done);
                self.mark_completed(&inner);
            }
            let state = inner.state;
            inner.state = ReadyState::Unsent;
            (was_in_flight, state)
        };

        if was_in_flight {
            self.dispatch(&[Event::ReadyStateChange], state);
        }
        if explicit || was_in_flight {
            self.dispatch(&[Event::Abort], ReadyState::Unsent);
        }
    }

    fn mark_completed(&self, inner: &Inner) {
        self.shared.completed.send_replace(inner.exchange);
    }

    fn dispatch(&self, events: &[Event], state: ReadyState) {
        for &event in events {
            #[cfg(feature = "tracing")]
            tracing::trace!(event = %event, state = ?state, "dispatching event");

            let listeners = self.listeners().snapshot(event);
            for listener in listeners {
                listener(state);
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.shared
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn listeners(&self) -> MutexGuard<'_, Listeners> {
        self.shared
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    /// Moves to `next`; `false` when already there. Every `Loading` step
    /// counts as a transition so each chunk is observable.
    fn transition(&mut self, next: ReadyState) -> bool {
        if self.state == next && next != ReadyState::Loading {
            return false;
        }
        self.state = next;
        true
    }

    fn owns(&self, exchange: u64) -> bool {
        self.exchange == exchange && self.send_flag
    }

    fn headers_visible(&self) -> bool {
        self.state >= ReadyState::HeadersReceived && !self.error_flag
    }

    fn fail(&mut self, failure: &TransportFailure) -> bool {
        self.response.status = FAILURE_STATUS;
        self.response.status_text.clone_from(&failure.message);
        self.response.body = failure.trace.clone().into_bytes();
        self.error_flag = true;
        self.send_flag = false;
        self.cancel = None;
        self.transition(ReadyState::Done)
    }

    /// Settles URL parts and injected headers for the exchange.
    fn resolve(&self, body: Option<String>, tls_verify: bool) -> Result<ResolvedRequest> {
        let Some(url) = &self.url else {
            return Err(Error::invalid_state("send", self.state, "no URL opened"));
        };

        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => return Err(Error::unsupported_protocol(other)),
        };
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| Error::validation(format!("URL `{url}` has no host")))?
            .to_owned();
        let port = url
            .port_or_known_default()
            .ok_or_else(|| Error::validation(format!("URL `{url}` has no port")))?;

        let mut path = url.path().to_owned();
        if let Some(query) = url.query() {
            path.push('?');
            path.push_str(query);
        }

        let mut headers = self.headers.clone();
        let host_header = match url.port() {
            Some(port) => format!("{host}:{port}"),
            None => host.clone(),
        };
        replace_header(&mut headers, "Host", &host_header);

        if let Some(credentials) = self.basic_credentials(url) {
            let value = format!("Basic {}", encoding::encode(credentials));
            replace_header(&mut headers, "Authorization", &value);
        }

        let body = match self.method.as_str() {
            "GET" | "HEAD" => None,
            _ => body.filter(|body| !body.is_empty()),
        };
        match &body {
            Some(body) => {
                put_header(&mut headers, "Content-Length", &body.len().to_string());
                if !has_header(&headers, "Content-Type") {
                    put_header(&mut headers, "Content-Type", DEFAULT_CONTENT_TYPE);
                }
            }
            None if self.method == "POST" => put_header(&mut headers, "Content-Length", "0"),
            None => {}
        }

        Ok(ResolvedRequest {
            scheme,
            host,
            port,
            path,
            method: self.method.clone(),
            headers,
            body,
            tls_verify,
        })
    }

    /// `user:password` from the open options, falling back to URL userinfo.
    fn basic_credentials(&self, url: &Url) -> Option<String> {
        match &self.options.user {
            Some(user) => Some(format!(
                "{user}:{}",
                self.options
                    .password
                    .as_ref()
                    .map(|password| password.expose_secret())
                    .unwrap_or_default()
            )),
            None if !url.username().is_empty() => Some(format!(
                "{}:{}",
                url.username(),
                url.password().unwrap_or_default()
            )),
            None => None,
        }
    }
}

fn default_headers() -> Vec<(String, String)> {
    vec![
        ("User-Agent".to_owned(), DEFAULT_USER_AGENT.to_owned()),
        ("Accept".to_owned(), DEFAULT_ACCEPT.to_owned()),
    ]
}

fn normalize_method(method: &str) -> Result<String> {
    let method = method.trim().to_ascii_uppercase();
    if method.is_empty() {
        return Err(Error::validation("HTTP method must not be empty"));
    }
    if FORBIDDEN_METHODS.contains(&method.as_str()) {
        return Err(Error::validation(format!(
            "HTTP method `{method}` is not allowed"
        )));
    }
    reqwest::Method::from_bytes(method.as_bytes())
        .map_err(|_| Error::validation(format!("invalid HTTP method `{method}`")))?;
    Ok(method)
}

fn has_header(headers: &[(String, String)], name: &str) -> bool {
    headers.iter().any(|(key, _)| key.eq_ignore_ascii_case(name))
}

/// Last write wins for an exact (case-sensitive) name.
fn put_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    match headers.iter_mut().find(|(key, _)| key == name) {
        Some((_, existing)) => value.clone_into(existing),
        None => headers.push((name.to_owned(), value.to_owned())),
    }
}

/// Drops every spelling of `name` before inserting, for headers the engine
/// owns outright.
fn replace_header(headers: &mut Vec<(String, String)>, name: &str, value: &str) {
    headers.retain(|(key, _)| !key.eq_ignore_ascii_case(name));
    headers.push((name.to_owned(), value.to_owned()));
}
