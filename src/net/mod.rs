//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection on a configured port
//!     → listener.rs (accept loop, connection limits)
//!     → connection.rs (per-port connection ID, active count)
//!     → Hand off to HTTP layer with the listener port attached
//! ```
//!
//! # Design Decisions
//! - One listener per configured port; the port identifies the header mapping
//! - Bounded accept prevents resource exhaustion
//! - Each connection tracked for graceful shutdown

pub mod connection;
pub mod listener;

pub use connection::{ActiveConnection, ConnectionId, ConnectionTracker};
pub use listener::{ConnectionPermit, Listener, ListenerError};
