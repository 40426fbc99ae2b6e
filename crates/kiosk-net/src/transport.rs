//! Request/response types and the non-blocking [`Transport`] seam.
//!
//! The session submits a [`Request`] tagged with a [`Ticket`] and later
//! collects [`Completion`]s from `poll()` on its own frame. Submitting never
//! blocks, so a slow helper can never stall the next poll tick.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, Sender};
use std::time::Duration;

use kiosk_types::error::KioskError;
use serde_json::Value;

use crate::http::{self, HttpError, Method};

/// Identifies a submitted request so its completion can be routed.
pub type Ticket = u64;

/// One request to the helper or the control server.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    pub method: Method,
    /// Base URL (`http://host:port`).
    pub base_url: String,
    /// Endpoint path appended to the base URL.
    pub endpoint: String,
    /// JSON body; `None` sends no body at all.
    pub body: Option<Value>,
    pub timeout: Duration,
    /// Resolve with the response text instead of parsed JSON.
    pub raw: bool,
}

impl Request {
    /// Timeout applied when none is given.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(2000);

    pub fn get(base_url: impl Into<String>, endpoint: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            base_url: base_url.into(),
            endpoint: endpoint.into(),
            body: None,
            timeout: Self::DEFAULT_TIMEOUT,
            raw: false,
        }
    }

    pub fn post(base_url: impl Into<String>, endpoint: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            body: Some(body),
            ..Self::get(base_url, endpoint)
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn raw_response(mut self) -> Self {
        self.raw = true;
        self
    }

    /// Full target URL, with exactly one `/` between base and endpoint.
    pub fn url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        let endpoint = self.endpoint.trim_start_matches('/');
        format!("{base}/{endpoint}")
    }
}

/// A successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Json(Value),
    Text(String),
}

impl Response {
    /// The JSON payload, if this was a JSON request.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Self::Json(v) => Some(v),
            Self::Text(_) => None,
        }
    }

    /// Consume into a JSON value; text becomes a JSON string.
    pub fn into_json(self) -> Value {
        match self {
            Self::Json(v) => v,
            Self::Text(t) => Value::String(t),
        }
    }
}

/// Why a request failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestErrorKind {
    Timeout,
    Network(String),
    /// Status outside `200..300`.
    Status(u16),
    /// The body was not the expected JSON or text.
    Decode(String),
}

impl fmt::Display for RequestErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => write!(f, "timed out"),
            Self::Network(msg) => write!(f, "{msg}"),
            Self::Status(code) => write!(f, "HTTP status {code}"),
            Self::Decode(msg) => write!(f, "decode failed: {msg}"),
        }
    }
}

/// A failed request with enough context to diagnose it from the log.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestError {
    pub method: Method,
    pub url: String,
    /// The body that was sent, if any.
    pub params: Option<Value>,
    pub kind: RequestErrorKind,
}

impl RequestError {
    fn new(request: &Request, kind: RequestErrorKind) -> Self {
        Self {
            method: request.method,
            url: request.url(),
            params: request.body.clone(),
            kind,
        }
    }
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} failed: {}", self.method, self.url, self.kind)?;
        if let Some(ref params) = self.params {
            write!(f, " (params: {params})")?;
        }
        Ok(())
    }
}

impl std::error::Error for RequestError {}

impl From<RequestError> for KioskError {
    fn from(e: RequestError) -> Self {
        KioskError::Transport(e.to_string())
    }
}

/// Perform a request synchronously.
pub fn execute(request: &Request) -> Result<Response, RequestError> {
    let body = match request.body {
        Some(ref v) => Some(
            serde_json::to_vec(v)
                .map_err(|e| RequestError::new(request, RequestErrorKind::Decode(e.to_string())))?,
        ),
        None => None,
    };

    let resp = http::send(request.method, &request.url(), body.as_deref(), request.timeout)
        .map_err(|e| {
            let kind = match e {
                HttpError::Timeout => RequestErrorKind::Timeout,
                HttpError::Network(msg) | HttpError::Malformed(msg) => {
                    RequestErrorKind::Network(msg)
                },
            };
            RequestError::new(request, kind)
        })?;

    if !(200..300).contains(&resp.status_code) {
        return Err(RequestError::new(
            request,
            RequestErrorKind::Status(resp.status_code),
        ));
    }

    if request.raw {
        return String::from_utf8(resp.body)
            .map(Response::Text)
            .map_err(|e| RequestError::new(request, RequestErrorKind::Decode(e.to_string())));
    }

    // Power actions answer with an empty body.
    if resp.body.iter().all(u8::is_ascii_whitespace) {
        return Ok(Response::Json(Value::Null));
    }
    serde_json::from_slice(&resp.body)
        .map(Response::Json)
        .map_err(|e| RequestError::new(request, RequestErrorKind::Decode(e.to_string())))
}

/// Outcome of one submitted request.
#[derive(Debug, Clone, PartialEq)]
pub struct Completion {
    pub ticket: Ticket,
    pub result: Result<Response, RequestError>,
}

/// Non-blocking request dispatch polled from the frame loop.
pub trait Transport {
    /// Start a request. Must return immediately.
    fn submit(&mut self, ticket: Ticket, request: Request);

    /// Completions that arrived since the last poll, in arrival order.
    fn poll(&mut self) -> Vec<Completion>;
}

/// [`Transport`] running each request on its own worker thread.
pub struct HttpTransport {
    tx: Sender<Completion>,
    rx: Receiver<Completion>,
}

impl HttpTransport {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for HttpTransport {
    fn submit(&mut self, ticket: Ticket, request: Request) {
        let tx = self.tx.clone();
        let context = RequestError::new(&request, RequestErrorKind::Network(String::new()));
        let spawned = std::thread::Builder::new()
            .name("kiosk-http".to_string())
            .spawn(move || {
                let completion = run_worker(ticket, &request, execute);
                // The receiver is gone only when the session was dropped.
                let _ = tx.send(completion);
            });
        if let Err(e) = spawned {
            log::error!("Failed to spawn request worker: {e}");
            let _ = self.tx.send(spawn_failure(ticket, context, &e));
        }
    }

    fn poll(&mut self) -> Vec<Completion> {
        self.rx.try_iter().collect()
    }
}

/// Run `work` for `request`, turning a panic into a failed completion so
/// every submitted ticket is answered.
fn run_worker(
    ticket: Ticket,
    request: &Request,
    work: impl FnOnce(&Request) -> Result<Response, RequestError>,
) -> Completion {
    let result = panic::catch_unwind(AssertUnwindSafe(|| work(request))).unwrap_or_else(|payload| {
        let reason = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        log::error!("Request worker for {} panicked: {reason}", request.url());
        Err(RequestError::new(
            request,
            RequestErrorKind::Network(format!("request worker panicked: {reason}")),
        ))
    });
    Completion { ticket, result }
}

/// Completion for a request whose worker thread could not be started.
fn spawn_failure(ticket: Ticket, context: RequestError, e: &std::io::Error) -> Completion {
    Completion {
        ticket,
        result: Err(RequestError {
            kind: RequestErrorKind::Network(format!("spawn failed: {e}")),
            ..context
        }),
    }
}
