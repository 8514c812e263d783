//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection on listener port P
//!     → server.rs (hyper connection, Axum router, middleware)
//!     → request.rs (request ID, resolve upstream target)
//!     → headers.rs (strip hop-by-hop)
//!     → upstream client
//!     → FlowHook::on_response(P, record) (stamp header)
//!     → Send to client
//! ```

pub mod headers;
pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestId, RequestIdExt, RequestIdLayer, X_REQUEST_ID};
pub use response::ProxyError;
pub use server::{HttpServer, ListenerState};
