//! Per-listener response stamping.
//!
//! # Data Flow
//! ```text
//! transport accepts on port P, captures the flow, relays request upstream
//!     → hook.rs (FlowHook::on_response(P, record))
//!     → interceptor.rs (ResponseStamper)
//!         → registry.rs (resolve P → header name, or fallback)
//!         → record.rs (insert-or-replace header on the response head)
//!         → observability::audit (one record per flow, best effort)
//!     → transport writes the stamped response to the client
//! ```

pub mod flow;
pub mod hook;
pub mod interceptor;
pub mod record;
pub mod registry;

pub use flow::{ClientSource, FlowCounter, FlowInfo};
pub use hook::FlowHook;
pub use interceptor::{ResponseStamper, StamperError};
pub use record::ResponseRecord;
pub use registry::{ListenerPort, ListenerRegistry};
