//! Per-exchange lifecycle hooks.
//!
//! The transport calls these synchronously while relaying an exchange:
//! `on_request` before forwarding, then exactly one of
//! - `on_response(port, Some(record))` once the upstream head arrives, or
//! - `on_error(..)` followed by `on_response(port, None)` when the exchange
//!   fails before any response exists.
//!
//! `on_response` always runs before response bytes reach the client.

use axum::body::Body;
use axum::http::Request;

use crate::stamp::flow::FlowInfo;
use crate::stamp::record::ResponseRecord;
use crate::stamp::registry::ListenerPort;

/// Handler for the lifecycle events of relayed exchanges.
///
/// Implementations are shared across all connections and must tolerate
/// concurrent calls for independent exchanges.
pub trait FlowHook: Send + Sync {
    /// Called with the client request before it is forwarded.
    fn on_request(&self, _port: ListenerPort, _request: &mut Request<Body>) {}

    /// Called once per exchange with the response head, or `None` if the
    /// exchange produced no response.
    fn on_response(&self, port: ListenerPort, response: Option<&mut ResponseRecord>);

    /// Called when forwarding failed before a response arrived.
    fn on_error(&self, port: ListenerPort, flow: &FlowInfo, error: &dyn std::error::Error) {
        tracing::warn!(
            listener_port = %port,
            flow_id = flow.id,
            request_id = %flow.request_id,
            target = %flow.url,
            error = %error,
            "Exchange failed before a response arrived"
        );
    }
}
