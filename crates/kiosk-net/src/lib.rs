//! Transport layer for talking to the local helper and the control server.
//!
//! [`http`] is a minimal blocking HTTP/1.1 client. [`transport`] wraps it
//! behind the non-blocking [`Transport`] trait the frame loop polls.

pub mod http;
pub mod transport;

pub use http::Method;
pub use transport::{
    Completion, HttpTransport, Request, RequestError, RequestErrorKind, Response, Ticket,
    Transport, execute,
};
