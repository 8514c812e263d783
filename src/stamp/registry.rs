//! Listener port → header name lookup.
//!
//! # Responsibilities
//! - Hold the fixed mapping from listener port to stamped header name
//! - Resolve unmapped ports to the fallback header name
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Ordered by port so startup logs are stable
//! - Unknown and unmapped ports are the same case: both take the fallback

use std::collections::BTreeMap;
use std::fmt;

use axum::http::header::InvalidHeaderName;
use axum::http::HeaderName;

use crate::config::ProxyConfig;

/// Local port that accepted a client connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerPort(u16);

impl ListenerPort {
    pub const fn new(port: u16) -> Self {
        Self(port)
    }

    /// Get the raw port number.
    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl From<u16> for ListenerPort {
    fn from(port: u16) -> Self {
        Self(port)
    }
}

impl fmt::Display for ListenerPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Fixed mapping from listener port to the header name stamped on its
/// responses.
#[derive(Debug, Clone)]
pub struct ListenerRegistry {
    mapping: BTreeMap<ListenerPort, HeaderName>,
    fallback: HeaderName,
}

impl ListenerRegistry {
    /// Create a registry from explicit port/name pairs.
    ///
    /// A port listed twice keeps the last name.
    pub fn new<I>(mapping: I, fallback: HeaderName) -> Self
    where
        I: IntoIterator<Item = (ListenerPort, HeaderName)>,
    {
        Self {
            mapping: mapping.into_iter().collect(),
            fallback,
        }
    }

    /// Build the registry from the listener table.
    ///
    /// Listeners without a `header_name` are left out and resolve to the
    /// fallback.
    pub fn from_config(config: &ProxyConfig) -> Result<Self, InvalidHeaderName> {
        let fallback = HeaderName::from_bytes(config.stamp.fallback_header.as_bytes())?;
        let mut mapping = BTreeMap::new();
        for listener in &config.listeners {
            if let Some(name) = &listener.header_name {
                let name = HeaderName::from_bytes(name.as_bytes())?;
                mapping.insert(ListenerPort::from(listener.port), name);
            }
        }
        Ok(Self { mapping, fallback })
    }

    /// Header name for responses relayed through `port`.
    pub fn resolve(&self, port: ListenerPort) -> &HeaderName {
        self.mapping.get(&port).unwrap_or(&self.fallback)
    }

    /// Whether `port` has an explicit mapping.
    pub fn is_mapped(&self, port: ListenerPort) -> bool {
        self.mapping.contains_key(&port)
    }

    /// The header name used for unmapped ports.
    pub fn fallback(&self) -> &HeaderName {
        &self.fallback
    }

    /// Explicit mappings in port order.
    pub fn iter(&self) -> impl Iterator<Item = (ListenerPort, &HeaderName)> {
        self.mapping.iter().map(|(port, name)| (*port, name))
    }
}
