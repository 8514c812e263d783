//! Mapping of relay failures to client responses.
//!
//! Responses built here never reach a flow hook: the exchange had no
//! upstream response to stamp.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use thiserror::Error;

use crate::http::request::TargetError;

/// Why a request was answered by the proxy instead of an upstream.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("CONNECT tunnelling is not supported")]
    ConnectUnsupported,

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("upstream request failed: {0}")]
    Upstream(#[source] hyper_util::client::legacy::Error),
}

impl ProxyError {
    pub fn status(&self) -> StatusCode {
        match self {
            ProxyError::ConnectUnsupported => StatusCode::NOT_IMPLEMENTED,
            ProxyError::Target(_) => StatusCode::BAD_REQUEST,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
