//! Startup orchestration.
//!
//! # Responsibilities
//! - Initialize subsystems in dependency order (metrics, audit, hook)
//! - Bind every listener before serving any traffic
//! - Flush the audit queue once the server has stopped
//!
//! # Design Decisions
//! - Fail fast: any startup error is fatal
//! - Listeners start last (traffic only when ready)

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::config::ProxyConfig;
use crate::http::HttpServer;
use crate::net::{Listener, ListenerError};
use crate::observability::audit::{AuditQueue, AuditSink, DiscardAudit};
use crate::observability::metrics;
use crate::stamp::{ResponseStamper, StamperError};

/// How long to wait for queued audit records after the server stops.
const AUDIT_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

/// Fatal error while starting or running the proxy.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("invalid stamp configuration: {0}")]
    Stamp(#[from] StamperError),

    #[error("failed to open audit sink: {0}")]
    Audit(#[source] std::io::Error),

    #[error("listener {port}: {source}")]
    Listener {
        port: u16,
        #[source]
        source: ListenerError,
    },

    #[error("server error: {0}")]
    Serve(#[source] std::io::Error),
}

/// Bind every configured listener.
pub async fn bind_listeners(config: &ProxyConfig) -> Result<Vec<Listener>, StartupError> {
    let mut listeners = Vec::with_capacity(config.listeners.len());
    for listener_config in &config.listeners {
        let listener = Listener::bind(listener_config)
            .await
            .map_err(|source| StartupError::Listener {
                port: listener_config.port,
                source,
            })?;
        listeners.push(listener);
    }
    Ok(listeners)
}

/// Start the audit writer, or a discarding sink when auditing is off.
async fn start_audit(
    config: &ProxyConfig,
) -> Result<(Arc<dyn AuditSink>, Option<JoinHandle<()>>), StartupError> {
    if !config.audit.enabled {
        tracing::info!("Audit log disabled");
        return Ok((Arc::new(DiscardAudit), None));
    }

    let (queue, handle) = AuditQueue::spawn(&config.audit)
        .await
        .map_err(StartupError::Audit)?;
    tracing::info!(
        queue_capacity = config.audit.queue_capacity,
        path = config.audit.path.as_deref().unwrap_or("<log>"),
        "Audit log enabled"
    );
    Ok((Arc::new(queue), Some(handle)))
}

/// Run the proxy until `shutdown` fires.
pub async fn run(config: ProxyConfig, shutdown: broadcast::Receiver<()>) -> Result<(), StartupError> {
    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let (audit, audit_task) = start_audit(&config).await?;
    let stamper = ResponseStamper::from_config(&config, audit)?;

    for (port, header) in stamper.registry().iter() {
        tracing::info!(listener_port = %port, header = %header, "Header mapping");
    }
    tracing::info!(
        fallback_header = %stamper.registry().fallback(),
        header_value = ?stamper.value(),
        "Stamp configured"
    );

    let listeners = bind_listeners(&config).await?;
    let server = HttpServer::new(config, Arc::new(stamper));
    let result = server.run(listeners, shutdown).await;

    // Every connection has finished or been aborted, so the stamper and its
    // queue handle are gone; the writer drains what is left and exits.
    if let Some(handle) = audit_task {
        if tokio::time::timeout(AUDIT_FLUSH_TIMEOUT, handle).await.is_err() {
            tracing::warn!("Audit writer did not finish before timeout");
        }
    }

    result.map_err(StartupError::Serve)
}
