//! Audit trail for stamped responses.
//!
//! # Responsibilities
//! - Accept one record per stamped response without blocking the caller
//! - Write records from a single background task (log event or JSON lines)
//! - Count records dropped under backpressure
//!
//! # Design Decisions
//! - Bounded queue with `try_send`: a full queue drops the record
//! - Sink failures never reach the request path; the writer logs and continues
//! - The writer exits once every queue handle is dropped, after draining

use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;

use crate::config::AuditConfig;
use crate::observability::metrics;
use crate::stamp::ClientSource;

/// One stamped response and the exchange it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditRecord {
    pub flow_id: u64,
    pub request_id: String,
    /// When the request arrived.
    pub timestamp: DateTime<Utc>,
    pub listener_port: u16,
    pub method: String,
    pub request_url: String,
    pub status: u16,
    /// Request arrival to upstream response head.
    pub duration_ms: u64,
    pub content_length: Option<u64>,
    pub source: ClientSource,
    pub header_name: String,
    pub header_value: String,
}

/// Why a record could not be accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AuditError {
    #[error("audit queue is full")]
    QueueFull,
    #[error("audit writer has stopped")]
    Closed,
}

/// Destination for audit records.
pub trait AuditSink: Send + Sync {
    /// Hand off a record. Must not block.
    fn submit(&self, record: AuditRecord) -> Result<(), AuditError>;
}

/// Sink used when auditing is disabled.
#[derive(Debug, Default, Clone, Copy)]
pub struct DiscardAudit;

impl AuditSink for DiscardAudit {
    fn submit(&self, _record: AuditRecord) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Bounded, non-blocking queue feeding an [`AuditWriter`].
#[derive(Debug)]
pub struct AuditQueue {
    tx: mpsc::Sender<AuditRecord>,
    dropped: AtomicU64,
}

impl AuditQueue {
    /// Create a queue and the receiver its writer drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<AuditRecord>) {
        let (tx, rx) = mpsc::channel(capacity);
        (
            Self {
                tx,
                dropped: AtomicU64::new(0),
            },
            rx,
        )
    }

    /// Create a queue and start its writer task.
    pub async fn spawn(config: &AuditConfig) -> io::Result<(Self, JoinHandle<()>)> {
        let writer = AuditWriter::open(config.path.as_deref().map(Path::new)).await?;
        let (queue, rx) = Self::channel(config.queue_capacity);
        let handle = tokio::spawn(writer.run(rx));
        Ok((queue, handle))
    }

    /// Records dropped because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl AuditSink for AuditQueue {
    fn submit(&self, record: AuditRecord) -> Result<(), AuditError> {
        match self.tx.try_send(record) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                metrics::record_audit_dropped();
                Err(AuditError::QueueFull)
            }
            Err(TrySendError::Closed(_)) => Err(AuditError::Closed),
        }
    }
}

/// Background writer draining the audit queue.
#[derive(Debug)]
pub enum AuditWriter {
    /// Emit each record as a structured `tracing` event (target `audit`).
    Log,
    /// Append each record as one JSON line.
    File(File),
}

impl AuditWriter {
    /// Open the file sink at `path`, or the log sink when `None`.
    pub async fn open(path: Option<&Path>) -> io::Result<Self> {
        match path {
            Some(path) => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(path)
                    .await?;
                Ok(AuditWriter::File(file))
            }
            None => Ok(AuditWriter::Log),
        }
    }

    async fn write(&mut self, record: &AuditRecord) -> io::Result<()> {
        match self {
            AuditWriter::Log => {
                tracing::info!(
                    target: "audit",
                    flow_id = record.flow_id,
                    request_id = %record.request_id,
                    listener_port = record.listener_port,
                    method = %record.method,
                    request_url = %record.request_url,
                    status = record.status,
                    duration_ms = record.duration_ms,
                    content_length = ?record.content_length,
                    source = %record.source,
                    header_name = %record.header_name,
                    header_value = %record.header_value,
                    "Response stamped"
                );
                Ok(())
            }
            AuditWriter::File(file) => {
                let mut line = serde_json::to_vec(record)?;
                line.push(b'\n');
                file.write_all(&line).await?;
                file.flush().await
            }
        }
    }

    /// Drain `rx` until every sender is gone.
    pub async fn run(mut self, mut rx: mpsc::Receiver<AuditRecord>) {
        while let Some(record) = rx.recv().await {
            if let Err(e) = self.write(&record).await {
                tracing::warn!(error = %e, request_url = %record.request_url, "Audit write failed");
            }
        }
        tracing::debug!("Audit writer stopped");
    }
}
