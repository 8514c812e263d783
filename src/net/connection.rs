//! Per-listener connection accounting.
//!
//! Each listener port owns one [`ConnectionTracker`]. Connection IDs are
//! `<port>/<seq>` so a log line shows which header mapping served it, and the
//! active count is exported per port.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;
use crate::stamp::ListenerPort;

/// Connection accepted on a listener port, numbered per port from 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId {
    port: ListenerPort,
    seq: u64,
}

impl ConnectionId {
    pub fn port(&self) -> ListenerPort {
        self.port
    }

    pub fn seq(&self) -> u64 {
        self.seq
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.port, self.seq)
    }
}

#[derive(Debug)]
struct PortCounters {
    port: ListenerPort,
    accepted: AtomicU64,
    active: AtomicU64,
}

impl PortCounters {
    fn publish(&self, active: u64) {
        metrics::set_active_connections(self.port, active);
    }
}

/// Accepted and open connections for one listener port.
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    counters: Arc<PortCounters>,
}

impl ConnectionTracker {
    pub fn new(port: ListenerPort) -> Self {
        Self {
            counters: Arc::new(PortCounters {
                port,
                accepted: AtomicU64::new(0),
                active: AtomicU64::new(0),
            }),
        }
    }

    /// Register a newly accepted connection; it stays active until the
    /// returned guard is dropped.
    pub fn open(&self) -> ActiveConnection {
        let seq = self.counters.accepted.fetch_add(1, Ordering::Relaxed) + 1;
        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.publish(active);
        ActiveConnection {
            id: ConnectionId {
                port: self.counters.port,
                seq,
            },
            counters: Arc::clone(&self.counters),
        }
    }

    pub fn port(&self) -> ListenerPort {
        self.counters.port
    }

    /// Connections currently open.
    pub fn active(&self) -> u64 {
        self.counters.active.load(Ordering::SeqCst)
    }

    /// Connections accepted since the listener started.
    pub fn accepted(&self) -> u64 {
        self.counters.accepted.load(Ordering::Relaxed)
    }
}

/// An open connection; closing it is dropping this guard.
#[derive(Debug)]
pub struct ActiveConnection {
    id: ConnectionId,
    counters: Arc<PortCounters>,
}

impl ActiveConnection {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ActiveConnection {
    fn drop(&mut self) {
        let active = self.counters.active.fetch_sub(1, Ordering::SeqCst) - 1;
        self.counters.publish(active);
        tracing::trace!(connection_id = %self.id, "Connection closed");
    }
}
