//! Intercepting HTTP proxy that stamps every relayed response with a header
//! chosen by the local port the client connected to.

pub mod config;
pub mod http;
pub mod lifecycle;
pub mod net;
pub mod observability;
pub mod stamp;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use stamp::{
    ClientSource, FlowHook, FlowInfo, ListenerPort, ListenerRegistry, ResponseRecord, ResponseStamper,
};
