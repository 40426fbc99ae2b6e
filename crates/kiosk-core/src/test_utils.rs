//! Shared test utilities for the session.
//!
//! Provides a [`MockTransport`] that records every submitted request and
//! lets tests decide when and how each one completes.

use std::collections::HashSet;

use kiosk_net::{Completion, Request, RequestError, RequestErrorKind, Response, Ticket, Transport};
use serde_json::Value;

/// A transport that never touches the network.
pub struct MockTransport {
    /// Every request in submission order.
    pub submitted: Vec<(Ticket, Request)>,
    answered: HashSet<Ticket>,
    ready: Vec<Completion>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            submitted: Vec::new(),
            answered: HashSet::new(),
            ready: Vec::new(),
        }
    }

    /// Requests sent to `endpoint`, oldest first.
    pub fn requests_to(&self, endpoint: &str) -> Vec<&Request> {
        self.submitted
            .iter()
            .filter(|(_, r)| r.endpoint == endpoint)
            .map(|(_, r)| r)
            .collect()
    }

    /// Count of requests sent to `endpoint`.
    pub fn count(&self, endpoint: &str) -> usize {
        self.requests_to(endpoint).len()
    }

    /// The most recent request to `endpoint`.
    pub fn last_to(&self, endpoint: &str) -> Option<&Request> {
        self.requests_to(endpoint).into_iter().last()
    }

    /// Complete the oldest unanswered request to `endpoint` with `body`.
    /// Returns false when there is no such request.
    pub fn respond(&mut self, endpoint: &str, body: Value) -> bool {
        self.complete(endpoint, |_| Ok(Response::Json(body)))
    }

    /// Fail the oldest unanswered request to `endpoint`.
    pub fn fail(&mut self, endpoint: &str, kind: RequestErrorKind) -> bool {
        self.complete(endpoint, |req| {
            Err(RequestError {
                method: req.method,
                url: req.url(),
                params: req.body.clone(),
                kind,
            })
        })
    }

    fn complete(
        &mut self,
        endpoint: &str,
        result: impl FnOnce(&Request) -> Result<Response, RequestError>,
    ) -> bool {
        let found = self
            .submitted
            .iter()
            .find(|(t, r)| r.endpoint == endpoint && !self.answered.contains(t));
        let Some((ticket, request)) = found else {
            return false;
        };
        let ticket = *ticket;
        let result = result(request);
        self.answered.insert(ticket);
        self.ready.push(Completion { ticket, result });
        true
    }
}

impl Transport for MockTransport {
    fn submit(&mut self, ticket: Ticket, request: Request) {
        self.submitted.push((ticket, request));
    }

    fn poll(&mut self) -> Vec<Completion> {
        std::mem::take(&mut self.ready)
    }
}
