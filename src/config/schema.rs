//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use std::net::{AddrParseError, IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

/// Root configuration for the stamping proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Header stamping settings (sentinel value, fallback name).
    pub stamp: StampConfig,

    /// One entry per local port the proxy listens on.
    pub listeners: Vec<ListenerConfig>,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Audit log settings.
    pub audit: AuditConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Header stamping configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StampConfig {
    /// Value written into the stamped header.
    pub header_value: String,

    /// Header name used when a listener port has no explicit mapping.
    pub fallback_header: String,
}

impl Default for StampConfig {
    fn default() -> Self {
        Self {
            header_value: "via-mitmproxy".to_string(),
            fallback_header: "X-Bruno-Proxy".to_string(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenerConfig {
    /// Local port to accept connections on.
    pub port: u16,

    /// Header name stamped on responses relayed through this port.
    /// Falls back to `stamp.fallback_header` when absent.
    #[serde(default)]
    pub header_name: Option<String>,

    /// Interface to bind (e.g., "127.0.0.1" or "::1").
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Fixed upstream ("host:port"). When set the listener runs as a
    /// reverse proxy, otherwise it expects absolute-form request URIs.
    #[serde(default)]
    pub upstream: Option<String>,

    /// Maximum concurrent connections (backpressure).
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

impl ListenerConfig {
    /// Listener on `port` stamping `header_name`, with default settings.
    pub fn new(port: u16, header_name: Option<&str>) -> Self {
        Self {
            port,
            header_name: header_name.map(str::to_string),
            bind_address: default_bind_address(),
            upstream: None,
            max_connections: default_max_connections(),
        }
    }

    /// Socket address for binding.
    pub fn socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        let ip: IpAddr = self.bind_address.parse()?;
        Ok(SocketAddr::new(ip, self.port))
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_max_connections() -> usize {
    10_000
}

/// Default listener set: the system-wide and app-scoped proxy ports.
fn default_listeners() -> Vec<ListenerConfig> {
    vec![
        ListenerConfig::new(8091, Some("X-Bruno-Proxy-System")),
        ListenerConfig::new(8092, Some("X-Bruno-Proxy-App")),
    ]
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,

    /// How long in-flight connections may drain on shutdown, in seconds.
    pub shutdown_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 30,
            shutdown_secs: 10,
        }
    }
}

/// Audit log configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Emit one audit record per stamped response.
    pub enabled: bool,

    /// Bounded queue size; records are dropped when full.
    pub queue_capacity: usize,

    /// Append records as JSON lines to this file instead of the log.
    pub path: Option<String>,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            queue_capacity: 1024,
            path: None,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable output for development.
    #[default]
    Pretty,
    /// One JSON object per line for log aggregation.
    Json,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            stamp: StampConfig::default(),
            listeners: default_listeners(),
            timeouts: TimeoutConfig::default(),
            audit: AuditConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
