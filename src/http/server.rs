//! HTTP server setup and request relaying.
//!
//! # Responsibilities
//! - Run one accept loop per configured listener port
//! - Serve HTTP/1.1 and HTTP/2 connections with graceful draining
//! - Wire up middleware (tracing, timeout, request ID)
//! - Forward requests upstream (forward or reverse mode)
//! - Number every exchange and hand its upstream response head to the flow
//!   hook before relaying it
//!
//! # Design Decisions
//! - Connections still open when the drain deadline passes are aborted, so
//!   nothing the hook owns outlives the server

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{uri::Authority, Method, Request, Version},
    response::{IntoResponse, Response},
    Router,
};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::{TokioExecutor, TokioIo},
    server::{conn::auto, graceful::GracefulShutdown},
};
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tower::ServiceExt;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};
use tracing::Instrument;

use crate::config::ProxyConfig;
use crate::http::headers::strip_hop_by_hop;
use crate::http::request::{resolve_target, RequestIdExt, RequestIdLayer};
use crate::http::response::ProxyError;
use crate::net::{ConnectionTracker, Listener};
use crate::observability::metrics;
use crate::stamp::{FlowCounter, FlowHook, FlowInfo, ListenerPort, ResponseRecord};

/// Per-listener state injected into the relay handler.
#[derive(Clone)]
pub struct ListenerState {
    pub port: ListenerPort,
    /// Fixed upstream in reverse mode; `None` for forward mode.
    pub upstream: Option<Authority>,
    pub client: Client<HttpConnector, Body>,
    pub hook: Arc<dyn FlowHook>,
    /// Shared across listeners.
    pub flows: FlowCounter,
}

/// HTTP server for the stamping proxy.
pub struct HttpServer {
    config: ProxyConfig,
    client: Client<HttpConnector, Body>,
    hook: Arc<dyn FlowHook>,
    flows: FlowCounter,
}

impl HttpServer {
    /// Create a new HTTP server relaying every exchange through `hook`.
    pub fn new(config: ProxyConfig, hook: Arc<dyn FlowHook>) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(config.timeouts.connect_secs)));
        let client = Client::builder(TokioExecutor::new()).build(connector);

        Self {
            config,
            client,
            hook,
            flows: FlowCounter::new(),
        }
    }

    /// Build the Axum router for one listener with all middleware layers.
    #[allow(deprecated)]
    pub fn build_router(&self, state: ListenerState) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .with_state(state)
            .layer(TimeoutLayer::new(Duration::from_secs(self.config.timeouts.request_secs)))
            .layer(RequestIdLayer)
            .layer(TraceLayer::new_for_http())
    }

    /// Handler state for `listener`.
    pub fn listener_state(&self, listener: &Listener) -> Result<ListenerState, std::io::Error> {
        let upstream = listener
            .config()
            .upstream
            .as_deref()
            .map(Authority::from_str)
            .transpose()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;

        Ok(ListenerState {
            port: listener.port(),
            upstream,
            client: self.client.clone(),
            hook: Arc::clone(&self.hook),
            flows: self.flows.clone(),
        })
    }

    /// Serve every listener until `shutdown` fires, then drain connections.
    pub async fn run(
        self,
        listeners: Vec<Listener>,
        shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let drain = Duration::from_secs(self.config.timeouts.shutdown_secs);
        let mut tasks = JoinSet::new();

        for listener in listeners {
            let state = self.listener_state(&listener)?;
            let router = self.build_router(state);
            let address = listener.local_addr()?;
            tracing::info!(
                address = %address,
                listener_port = %listener.port(),
                "HTTP server starting"
            );
            tasks.spawn(serve_listener(listener, router, shutdown.resubscribe(), drain));
        }
        drop(shutdown);

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Listener task failed");
            }
        }

        tracing::info!(request_count = self.request_count(), "HTTP server stopped");
        Ok(())
    }

    /// Requests received across all listeners so far.
    pub fn request_count(&self) -> u64 {
        self.flows.count()
    }

    /// Get a reference to the config.
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }
}

/// Accept loop for one listener.
async fn serve_listener(
    listener: Listener,
    router: Router,
    mut shutdown: broadcast::Receiver<()>,
    drain: Duration,
) {
    let port = listener.port();
    let tracker = ConnectionTracker::new(port);
    let mut builder = auto::Builder::new(TokioExecutor::new());
    builder.http1().title_case_headers(true);
    let graceful = GracefulShutdown::new();
    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer_addr, permit) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        tracing::warn!(listener_port = %port, error = %e, "Accept failed");
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        continue;
                    }
                };

                let guard = tracker.open();
                let span = tracing::debug_span!(
                    "connection",
                    connection_id = %guard.id(),
                    listener_port = %port,
                    peer_addr = %peer_addr,
                );

                let router = router.clone();
                let service = service_fn(move |mut request: Request<Incoming>| {
                    request.extensions_mut().insert(ConnectInfo(peer_addr));
                    router.clone().oneshot(request)
                });
                let connection = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
                let connection = graceful.watch(connection.into_owned());

                connections.spawn(
                    async move {
                        if let Err(e) = connection.await {
                            tracing::debug!(error = %e, "Connection ended with error");
                        }
                        drop(permit);
                        drop(guard);
                    }
                    .instrument(span),
                );
            }
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            _ = shutdown.recv() => {
                tracing::info!(listener_port = %port, "Listener stopping");
                break;
            }
        }
    }

    drop(listener);
    if tokio::time::timeout(drain, graceful.shutdown()).await.is_err() {
        tracing::warn!(
            listener_port = %port,
            open_connections = tracker.active(),
            "Aborting connections still open after drain timeout"
        );
        connections.shutdown().await;
    }
    tracing::debug!(
        listener_port = %port,
        accepted_connections = tracker.accepted(),
        "Listener stopped"
    );
}

/// Relay handler: forwards the request and stamps the upstream response.
async fn proxy_handler(State(state): State<ListenerState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let flow = FlowInfo::begin(
        state.flows.next_id(),
        request.request_id().unwrap_or("unknown"),
        request.method().clone(),
        request.uri().clone(),
        request.headers(),
    );
    let peer_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);

    tracing::debug!(
        flow_id = flow.id,
        request_id = %flow.request_id,
        listener_port = %state.port,
        source = %flow.source,
        peer_addr = ?peer_addr,
        method = %request.method(),
        uri = %request.uri(),
        "Relaying request"
    );

    let request_id = flow.request_id.clone();
    let response = match relay(&state, flow, request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                listener_port = %state.port,
                error = %e,
                "Request not relayed"
            );
            e.into_response()
        }
    };

    metrics::record_request(state.port, response.status().as_u16(), start);
    response
}

async fn relay(
    state: &ListenerState,
    mut flow: FlowInfo,
    mut request: Request<Body>,
) -> Result<Response, ProxyError> {
    if request.method() == Method::CONNECT {
        return Err(ProxyError::ConnectUnsupported);
    }

    state.hook.on_request(state.port, &mut request);

    let target = resolve_target(request.uri(), state.upstream.as_ref())?;
    let (mut parts, body) = request.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    parts.uri = target.clone();
    parts.version = Version::HTTP_11;
    flow.url = target;

    match state.client.request(Request::from_parts(parts, body)).await {
        Ok(response) => {
            let (mut record, body) = ResponseRecord::from_response(flow, response);
            strip_hop_by_hop(record.headers_mut());
            state.hook.on_response(state.port, Some(&mut record));
            Ok(record.into_response(Body::new(body)))
        }
        Err(e) => {
            state.hook.on_error(state.port, &flow, &e);
            state.hook.on_response(state.port, None);
            Err(ProxyError::Upstream(e))
        }
    }
}
