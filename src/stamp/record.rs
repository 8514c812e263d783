//! The response head handed to flow hooks.

use axum::http::response::Parts;
use axum::http::{header, HeaderMap, Response, StatusCode, Uri};

use crate::stamp::flow::FlowInfo;

/// Mutable head of a response being relayed to the client, plus the flow
/// it belongs to.
///
/// The body is kept by the transport and reattached untouched by
/// [`ResponseRecord::into_response`].
#[derive(Debug)]
pub struct ResponseRecord {
    flow: FlowInfo,
    head: Parts,
}

impl ResponseRecord {
    /// Wrap an already split response head.
    pub fn new(flow: FlowInfo, head: Parts) -> Self {
        Self { flow, head }
    }

    /// Split `response` into a record and its body.
    pub fn from_response<B>(flow: FlowInfo, response: Response<B>) -> (Self, B) {
        let (head, body) = response.into_parts();
        (Self::new(flow, head), body)
    }

    /// Reattach `body` and produce the response to transmit.
    pub fn into_response<B>(self, body: B) -> Response<B> {
        Response::from_parts(self.head, body)
    }

    pub fn flow(&self) -> &FlowInfo {
        &self.flow
    }

    /// URL of the request this response answers.
    pub fn request_uri(&self) -> &Uri {
        &self.flow.url
    }

    pub fn status(&self) -> StatusCode {
        self.head.status
    }

    /// Declared body size, when the upstream sent `Content-Length`.
    pub fn content_length(&self) -> Option<u64> {
        self.head
            .headers
            .get(header::CONTENT_LENGTH)?
            .to_str()
            .ok()?
            .parse()
            .ok()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.head.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.head.headers
    }
}
