//! Request handling and transformation.
//!
//! # Responsibilities
//! - Generate unique request ID (UUID v4) when the client sent none
//! - Resolve the upstream target for forward and reverse listeners
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Forward mode only accepts absolute-form `http://` targets; HTTPS needs
//!   CONNECT, which this proxy does not tunnel

use std::task::{Context, Poll};

use axum::http::uri::{Authority, PathAndQuery, Scheme};
use axum::http::{HeaderName, HeaderValue, Request, Uri};
use thiserror::Error;
use tower::{Layer, Service};
use uuid::Uuid;

/// Header carrying the request ID.
pub const X_REQUEST_ID: HeaderName = HeaderName::from_static("x-request-id");

/// Unique identifier for a relayed request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    /// Generate a new random request ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Access the request ID carried by a request.
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&str>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&str> {
        self.headers()
            .get(&X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
    }
}

/// Layer adding an `x-request-id` header to requests that lack one.
#[derive(Debug, Clone, Copy, Default)]
pub struct RequestIdLayer;

impl<S> Layer<S> for RequestIdLayer {
    type Service = RequestIdService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        RequestIdService { inner }
    }
}

/// Service produced by [`RequestIdLayer`].
#[derive(Debug, Clone)]
pub struct RequestIdService<S> {
    inner: S,
}

impl<S, B> Service<Request<B>> for RequestIdService<S>
where
    S: Service<Request<B>>,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = S::Future;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut request: Request<B>) -> Self::Future {
        if !request.headers().contains_key(&X_REQUEST_ID) {
            let id = RequestId::new();
            if let Ok(value) = HeaderValue::from_str(id.as_str()) {
                request.headers_mut().insert(X_REQUEST_ID, value);
            }
        }
        self.inner.call(request)
    }
}

/// Why a request could not be mapped to an upstream target.
#[derive(Debug, Error)]
pub enum TargetError {
    #[error("forward proxy requests must use an absolute http:// URI")]
    NotAbsolute,
    #[error("unsupported scheme {0:?}")]
    UnsupportedScheme(String),
    #[error("invalid upstream URI: {0}")]
    Build(#[from] axum::http::Error),
}

/// Upstream URI for a request arriving with `uri`.
///
/// With an `upstream` (reverse mode) the scheme and authority are replaced
/// and path and query kept. Without one (forward mode) `uri` must already be
/// an absolute `http://` URI.
pub fn resolve_target(uri: &Uri, upstream: Option<&Authority>) -> Result<Uri, TargetError> {
    match upstream {
        Some(authority) => {
            let path = uri
                .path_and_query()
                .cloned()
                .unwrap_or_else(|| PathAndQuery::from_static("/"));
            Ok(Uri::builder()
                .scheme(Scheme::HTTP)
                .authority(authority.clone())
                .path_and_query(path)
                .build()?)
        }
        None => {
            let scheme = uri.scheme().ok_or(TargetError::NotAbsolute)?;
            if *scheme != Scheme::HTTP {
                return Err(TargetError::UnsupportedScheme(scheme.to_string()));
            }
            if uri.authority().is_none() {
                return Err(TargetError::NotAbsolute);
            }
            Ok(uri.clone())
        }
    }
}
