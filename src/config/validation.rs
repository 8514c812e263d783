//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Header names and the sentinel value must be valid HTTP tokens
//! - Validate value ranges (timeouts > 0, ports valid, queue sizes)
//! - Detect listeners sharing a port
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;
use std::str::FromStr;

use axum::http::uri::Authority;
use axum::http::{HeaderName, HeaderValue};
use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("at least one listener must be configured")]
    NoListeners,

    #[error("listener port 0 is not allowed (ports must be fixed for header mapping)")]
    ZeroPort,

    #[error("port {0} is configured by more than one listener")]
    DuplicatePort(u16),

    #[error("listener {port}: invalid bind address {address:?}")]
    InvalidBindAddress { port: u16, address: String },

    #[error("listener {port}: invalid header name {name:?}")]
    InvalidHeaderName { port: u16, name: String },

    #[error("listener {port}: invalid upstream {upstream:?}")]
    InvalidUpstream { port: u16, upstream: String },

    #[error("listener {0}: max_connections must be greater than 0")]
    ZeroConnections(u16),

    #[error("invalid fallback header name {0:?}")]
    InvalidFallbackHeader(String),

    #[error("invalid stamp header value {0:?}")]
    InvalidHeaderValue(String),

    #[error("timeouts.{0} must be greater than 0")]
    ZeroTimeout(&'static str),

    #[error("audit.queue_capacity must be greater than 0")]
    ZeroAuditCapacity,

    #[error("invalid metrics address {0:?}")]
    InvalidMetricsAddress(String),
}

/// Validate a parsed configuration, collecting every problem found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listeners.is_empty() {
        errors.push(ValidationError::NoListeners);
    }

    let mut seen = HashSet::new();
    for listener in &config.listeners {
        let port = listener.port;
        if port == 0 {
            errors.push(ValidationError::ZeroPort);
            continue;
        }
        if !seen.insert(port) {
            errors.push(ValidationError::DuplicatePort(port));
        }
        if listener.socket_addr().is_err() {
            errors.push(ValidationError::InvalidBindAddress {
                port,
                address: listener.bind_address.clone(),
            });
        }
        if let Some(name) = &listener.header_name {
            if HeaderName::from_bytes(name.as_bytes()).is_err() {
                errors.push(ValidationError::InvalidHeaderName {
                    port,
                    name: name.clone(),
                });
            }
        }
        if let Some(upstream) = &listener.upstream {
            if Authority::from_str(upstream).is_err() {
                errors.push(ValidationError::InvalidUpstream {
                    port,
                    upstream: upstream.clone(),
                });
            }
        }
        if listener.max_connections == 0 {
            errors.push(ValidationError::ZeroConnections(port));
        }
    }

    if HeaderName::from_bytes(config.stamp.fallback_header.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidFallbackHeader(
            config.stamp.fallback_header.clone(),
        ));
    }
    if HeaderValue::from_str(&config.stamp.header_value).is_err() {
        errors.push(ValidationError::InvalidHeaderValue(
            config.stamp.header_value.clone(),
        ));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("request_secs"));
    }

    if config.audit.enabled && config.audit.queue_capacity == 0 {
        errors.push(ValidationError::ZeroAuditCapacity);
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::InvalidMetricsAddress(
            config.observability.metrics_address.clone(),
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
