//! Response header stamping.
//!
//! # Responsibilities
//! - Resolve the header name for the accepting listener
//! - Insert or replace that header with the sentinel value
//! - Emit one audit record per stamped response
//!
//! # Design Decisions
//! - `HeaderMap::insert` replaces every prior value in place, so a replaced
//!   header keeps its position and a new one is appended
//! - Audit submission is fire-and-forget; its failure never touches the response
//! - Absent responses are a normal path, not an error

use std::sync::Arc;

use axum::http::header::{InvalidHeaderName, InvalidHeaderValue};
use axum::http::HeaderValue;
use thiserror::Error;

use crate::config::ProxyConfig;
use crate::observability::audit::{AuditRecord, AuditSink};
use crate::observability::metrics;
use crate::stamp::hook::FlowHook;
use crate::stamp::record::ResponseRecord;
use crate::stamp::registry::{ListenerPort, ListenerRegistry};

/// Error building a stamper from configuration.
#[derive(Debug, Error)]
pub enum StamperError {
    #[error("invalid header name: {0}")]
    HeaderName(#[from] InvalidHeaderName),
    #[error("invalid header value: {0}")]
    HeaderValue(#[from] InvalidHeaderValue),
}

/// Flow hook stamping every relayed response with a per-listener header.
pub struct ResponseStamper {
    registry: Arc<ListenerRegistry>,
    value: HeaderValue,
    audit: Arc<dyn AuditSink>,
}

impl ResponseStamper {
    pub fn new(registry: Arc<ListenerRegistry>, value: HeaderValue, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            registry,
            value,
            audit,
        }
    }

    /// Build the registry and sentinel value from `config`.
    pub fn from_config(config: &ProxyConfig, audit: Arc<dyn AuditSink>) -> Result<Self, StamperError> {
        let registry = ListenerRegistry::from_config(config)?;
        let value = HeaderValue::from_str(&config.stamp.header_value)?;
        Ok(Self::new(Arc::new(registry), value, audit))
    }

    pub fn registry(&self) -> &ListenerRegistry {
        &self.registry
    }

    pub fn value(&self) -> &HeaderValue {
        &self.value
    }
}

impl FlowHook for ResponseStamper {
    fn on_response(&self, port: ListenerPort, response: Option<&mut ResponseRecord>) {
        let Some(response) = response else {
            tracing::trace!(listener_port = %port, "No response to stamp");
            return;
        };

        let name = self.registry.resolve(port);
        response.headers_mut().insert(name.clone(), self.value.clone());
        metrics::record_stamp(port);

        let flow = response.flow();
        let record = AuditRecord {
            flow_id: flow.id,
            request_id: flow.request_id.clone(),
            timestamp: flow.started_at,
            listener_port: port.as_u16(),
            method: flow.method.to_string(),
            request_url: flow.url.to_string(),
            status: response.status().as_u16(),
            duration_ms: u64::try_from(flow.elapsed().as_millis()).unwrap_or(u64::MAX),
            content_length: response.content_length(),
            source: flow.source,
            header_name: name.to_string(),
            header_value: String::from_utf8_lossy(self.value.as_bytes()).into_owned(),
        };
        if let Err(e) = self.audit.submit(record) {
            tracing::debug!(listener_port = %port, error = %e, "Audit record not written");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::audit::{AuditError, DiscardAudit};
    use crate::stamp::flow::{ClientSource, FlowInfo};
    use axum::http::{HeaderMap, Method, Response, StatusCode, Uri};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        records: Mutex<Vec<AuditRecord>>,
    }

    impl AuditSink for RecordingSink {
        fn submit(&self, record: AuditRecord) -> Result<(), AuditError> {
            self.records.lock().unwrap().push(record);
            Ok(())
        }
    }

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn submit(&self, _record: AuditRecord) -> Result<(), AuditError> {
            Err(AuditError::QueueFull)
        }
    }

    fn stamper(audit: Arc<dyn AuditSink>) -> ResponseStamper {
        ResponseStamper::from_config(&ProxyConfig::default(), audit).unwrap()
    }

    fn record(headers: &[(&str, &str)]) -> ResponseRecord {
        let mut builder = Response::builder();
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        let uri: Uri = "http://example.com/page?q=1".parse().unwrap();
        let mut request_headers = HeaderMap::new();
        request_headers.insert("user-agent", "curl/8.5.0".parse().unwrap());
        let flow = FlowInfo::begin(42, "req-42", Method::GET, uri, &request_headers);
        ResponseRecord::from_response(flow, builder.status(StatusCode::OK).body(()).unwrap()).0
    }

    fn pairs(headers: &HeaderMap) -> Vec<(String, String)> {
        headers
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_str().unwrap().to_string()))
            .collect()
    }

    #[test]
    fn system_port_on_empty_headers() {
        let stamper = stamper(Arc::new(DiscardAudit));
        let mut response = record(&[]);

        stamper.on_response(ListenerPort::new(8091), Some(&mut response));

        assert_eq!(
            pairs(response.headers()),
            vec![("x-bruno-proxy-system".into(), "via-mitmproxy".into())]
        );
    }

    #[test]
    fn app_port_replaces_existing_value() {
        let stamper = stamper(Arc::new(DiscardAudit));
        let mut response = record(&[("X-Bruno-Proxy-App", "old")]);

        stamper.on_response(ListenerPort::new(8092), Some(&mut response));

        assert_eq!(
            pairs(response.headers()),
            vec![("x-bruno-proxy-app".into(), "via-mitmproxy".into())]
        );
    }

    #[test]
    fn unmapped_port_appends_fallback() {
        let stamper = stamper(Arc::new(DiscardAudit));
        let mut response = record(&[("Content-Type", "text/html")]);

        stamper.on_response(ListenerPort::new(9999), Some(&mut response));

        assert_eq!(
            pairs(response.headers()),
            vec![
                ("content-type".into(), "text/html".into()),
                ("x-bruno-proxy".into(), "via-mitmproxy".into()),
            ]
        );
    }

    #[test]
    fn replacement_keeps_position_and_neighbours() {
        let stamper = stamper(Arc::new(DiscardAudit));
        let mut response = record(&[
            ("content-type", "application/json"),
            ("X-BRUNO-PROXY-SYSTEM", "stale"),
            ("cache-control", "no-store"),
        ]);

        stamper.on_response(ListenerPort::new(8091), Some(&mut response));

        assert_eq!(
            pairs(response.headers()),
            vec![
                ("content-type".into(), "application/json".into()),
                ("x-bruno-proxy-system".into(), "via-mitmproxy".into()),
                ("cache-control".into(), "no-store".into()),
            ]
        );
    }

    #[test]
    fn duplicate_values_collapse_to_one() {
        let stamper = stamper(Arc::new(DiscardAudit));
        let mut response = record(&[("x-bruno-proxy", "a"), ("x-bruno-proxy", "b")]);

        stamper.on_response(ListenerPort::new(9999), Some(&mut response));

        let values: Vec<_> = response.headers().get_all("X-Bruno-Proxy").iter().collect();
        assert_eq!(values, vec!["via-mitmproxy"]);
    }

    #[test]
    fn stamping_twice_is_idempotent() {
        let stamper = stamper(Arc::new(DiscardAudit));
        let mut once = record(&[("server", "upstream")]);
        let mut twice = record(&[("server", "upstream")]);

        stamper.on_response(ListenerPort::new(8092), Some(&mut once));
        stamper.on_response(ListenerPort::new(8092), Some(&mut twice));
        stamper.on_response(ListenerPort::new(8092), Some(&mut twice));

        assert_eq!(pairs(once.headers()), pairs(twice.headers()));
        assert_eq!(twice.headers().len(), 2);
    }

    #[test]
    fn absent_response_is_a_no_op() {
        let sink = Arc::new(RecordingSink::default());
        let stamper = stamper(sink.clone());

        stamper.on_response(ListenerPort::new(8091), None);

        assert!(sink.records.lock().unwrap().is_empty());
    }

    #[test]
    fn emits_one_audit_record() {
        let sink = Arc::new(RecordingSink::default());
        let stamper = stamper(sink.clone());
        let mut response = record(&[("content-length", "128")]);
        let started_at = response.flow().started_at;

        stamper.on_response(ListenerPort::new(8091), Some(&mut response));

        let records = sink.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        let audit = &records[0];
        assert_eq!(audit.flow_id, 42);
        assert_eq!(audit.request_id, "req-42");
        assert_eq!(audit.timestamp, started_at);
        assert_eq!(audit.listener_port, 8091);
        assert_eq!(audit.method, "GET");
        assert_eq!(audit.request_url, "http://example.com/page?q=1");
        assert_eq!(audit.status, 200);
        assert_eq!(audit.content_length, Some(128));
        assert_eq!(audit.source, ClientSource::Curl);
        assert_eq!(audit.header_name, "x-bruno-proxy-system");
        assert_eq!(audit.header_value, "via-mitmproxy");
    }

    #[test]
    fn audit_duration_covers_time_to_response_head() {
        let sink = Arc::new(RecordingSink::default());
        let stamper = stamper(sink.clone());
        let mut response = record(&[]);
        std::thread::sleep(std::time::Duration::from_millis(20));

        stamper.on_response(ListenerPort::new(8092), Some(&mut response));

        let records = sink.records.lock().unwrap();
        assert!(records[0].duration_ms >= 20);
    }

    #[test]
    fn audit_failure_does_not_block_stamping() {
        let stamper = stamper(Arc::new(FailingSink));
        let mut response = record(&[]);

        stamper.on_response(ListenerPort::new(8092), Some(&mut response));

        assert_eq!(response.headers()["x-bruno-proxy-app"], "via-mitmproxy");
    }

    #[test]
    fn custom_sentinel_value() {
        let mut config = ProxyConfig::default();
        config.stamp.header_value = "via-stamp-proxy".into();
        let stamper = ResponseStamper::from_config(&config, Arc::new(DiscardAudit)).unwrap();
        let mut response = record(&[]);

        stamper.on_response(ListenerPort::new(8091), Some(&mut response));

        assert_eq!(response.headers()["x-bruno-proxy-system"], "via-stamp-proxy");
    }

    #[test]
    fn concurrent_stamping_of_independent_responses() {
        let stamper = Arc::new(stamper(Arc::new(DiscardAudit)));
        let handles: Vec<_> = (0..8u16)
            .map(|i| {
                let stamper = Arc::clone(&stamper);
                std::thread::spawn(move || {
                    let port = ListenerPort::new(if i % 2 == 0 { 8091 } else { 9000 + i });
                    let mut response = record(&[]);
                    stamper.on_response(port, Some(&mut response));
                    (port, response)
                })
            })
            .collect();

        for handle in handles {
            let (port, response) = handle.join().unwrap();
            let expected = stamper.registry().resolve(port);
            assert_eq!(response.headers()[expected], "via-mitmproxy");
            assert_eq!(response.headers().len(), 1);
        }
    }
}
