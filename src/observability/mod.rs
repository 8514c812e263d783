//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! All subsystems produce:
//!     → logging.rs (structured log events)
//!     → metrics.rs (counters, gauges, histograms)
//!     → audit.rs (one record per stamped response)
//!
//! Consumers:
//!     → Log aggregation (stdout, JSON lines)
//!     → Metrics endpoint (Prometheus scrape)
//!     → Audit file or `audit` log target
//! ```
//!
//! # Design Decisions
//! - Structured logging for machine parsing
//! - Request ID and listener port flow through all log events
//! - Metrics are cheap (atomic increments)

pub mod audit;
pub mod logging;
pub mod metrics;
