//! Per-exchange metadata captured by the transport.
//!
//! A [`FlowInfo`] is taken when a request reaches the relay handler and rides
//! along in the [`ResponseRecord`](crate::stamp::ResponseRecord) so hooks can
//! report on the whole exchange, not just the response head.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::{header, HeaderMap, Method, Uri};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Kind of client that sent a request, guessed from its `User-Agent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientSource {
    Curl,
    Wget,
    Httpie,
    Postman,
    Insomnia,
    Node,
    Python,
    Go,
    Java,
    Browser,
    /// No recognised agent.
    Terminal,
}

/// Agent substrings in match order; the first hit wins.
const AGENT_PATTERNS: &[(&str, ClientSource)] = &[
    ("curl", ClientSource::Curl),
    ("wget", ClientSource::Wget),
    ("httpie", ClientSource::Httpie),
    ("postman", ClientSource::Postman),
    ("insomnia", ClientSource::Insomnia),
    ("node", ClientSource::Node),
    ("python", ClientSource::Python),
    ("go-http-client", ClientSource::Go),
    ("java", ClientSource::Java),
    ("chrome", ClientSource::Browser),
    ("chromium", ClientSource::Browser),
    ("firefox", ClientSource::Browser),
    ("safari", ClientSource::Browser),
    ("edge", ClientSource::Browser),
];

impl ClientSource {
    /// Classify the request's `User-Agent` header.
    pub fn detect(headers: &HeaderMap) -> Self {
        let agent = headers
            .get(header::USER_AGENT)
            .map(|v| String::from_utf8_lossy(v.as_bytes()).to_ascii_lowercase())
            .unwrap_or_default();

        AGENT_PATTERNS
            .iter()
            .find(|(pattern, _)| agent.contains(pattern))
            .map(|(_, source)| *source)
            .unwrap_or(ClientSource::Terminal)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ClientSource::Curl => "curl",
            ClientSource::Wget => "wget",
            ClientSource::Httpie => "httpie",
            ClientSource::Postman => "postman",
            ClientSource::Insomnia => "insomnia",
            ClientSource::Node => "node",
            ClientSource::Python => "python",
            ClientSource::Go => "go",
            ClientSource::Java => "java",
            ClientSource::Browser => "browser",
            ClientSource::Terminal => "terminal",
        }
    }
}

impl fmt::Display for ClientSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Process-wide request counter handing out flow ids.
///
/// Clones share the same count, so every listener draws from one sequence.
#[derive(Debug, Clone, Default)]
pub struct FlowCounter {
    issued: Arc<AtomicU64>,
}

impl FlowCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next flow id, starting at 1.
    pub fn next_id(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Number of ids issued so far.
    pub fn count(&self) -> u64 {
        self.issued.load(Ordering::Relaxed)
    }
}

/// What the transport knows about an exchange when its request arrives.
#[derive(Debug, Clone)]
pub struct FlowInfo {
    pub id: u64,
    /// Value of `x-request-id`, or `"unknown"` if the middleware did not run.
    pub request_id: String,
    pub method: Method,
    /// Upstream target once resolved; the client's request URI before that.
    pub url: Uri,
    pub source: ClientSource,
    pub started_at: DateTime<Utc>,
    started: Instant,
}

impl FlowInfo {
    /// Capture a flow starting now.
    pub fn begin(id: u64, request_id: impl Into<String>, method: Method, url: Uri, headers: &HeaderMap) -> Self {
        Self {
            id,
            request_id: request_id.into(),
            method,
            url,
            source: ClientSource::detect(headers),
            started_at: Utc::now(),
            started: Instant::now(),
        }
    }

    /// Time since the request arrived.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
