//! End-to-end stamping through real listeners.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use stamp_proxy::config::{ListenerConfig, ProxyConfig};

mod common;

fn reverse_listener(port: u16, header: Option<&str>, upstream: SocketAddr) -> ListenerConfig {
    let mut listener = ListenerConfig::new(port, header);
    listener.upstream = Some(upstream.to_string());
    listener
}

#[tokio::test]
async fn test_reverse_listeners_stamp_per_port() {
    let backend_addr: SocketAddr = "127.0.0.1:28510".parse().unwrap();
    common::start_echo_backend(
        backend_addr,
        &[("Content-Type", "text/plain"), ("X-Proxy-Test", "old")],
    )
    .await;

    let audit_path = common::audit_path("stamp-reverse");
    let mut config = ProxyConfig::default();
    config.listeners = vec![
        reverse_listener(28511, Some("X-Proxy-Test"), backend_addr),
        reverse_listener(28512, None, backend_addr),
    ];
    config.audit.path = Some(audit_path.to_string_lossy().into_owned());

    let (shutdown, handle) = common::start_proxy(config).await;
    let client = common::direct_client();

    // Mapped port replaces the upstream's value and keeps other headers.
    let res = client
        .get("http://127.0.0.1:28511/hello?x=1")
        .send()
        .await
        .expect("Proxy unreachable");
    assert_eq!(res.status(), 200);
    let values: Vec<_> = res.headers().get_all("x-proxy-test").iter().collect();
    assert_eq!(values, vec!["via-mitmproxy"]);
    assert_eq!(res.headers()["content-type"], "text/plain");
    assert_eq!(res.text().await.unwrap(), "GET /hello?x=1 HTTP/1.1");

    // Port without a mapping gets the fallback header.
    let res = client.get("http://127.0.0.1:28512/").send().await.unwrap();
    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-bruno-proxy"], "via-mitmproxy");
    assert_eq!(res.headers()["x-proxy-test"], "old");

    shutdown.trigger();
    let result = tokio::time::timeout(Duration::from_secs(15), handle)
        .await
        .expect("proxy did not stop")
        .unwrap();
    assert!(result.is_ok());

    let audit = tokio::fs::read_to_string(&audit_path).await.unwrap();
    let records: Vec<serde_json::Value> = audit
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["listener_port"], 28511);
    assert_eq!(records[0]["header_name"], "x-proxy-test");
    assert_eq!(records[0]["header_value"], "via-mitmproxy");
    assert_eq!(records[0]["request_url"], "http://127.0.0.1:28510/hello?x=1");
    assert_eq!(records[0]["flow_id"], 1);
    assert_eq!(records[0]["method"], "GET");
    assert_eq!(records[0]["status"], 200);
    assert_eq!(records[0]["content_length"], "GET /hello?x=1 HTTP/1.1".len());
    assert_eq!(records[0]["source"], "terminal");
    assert!(records[0]["duration_ms"].is_u64());
    assert!(records[0]["timestamp"].is_string());
    assert!(records[0]["request_id"].is_string());
    assert_eq!(records[1]["flow_id"], 2);
    assert_eq!(records[1]["listener_port"], 28512);
    assert_eq!(records[1]["header_name"], "x-bruno-proxy");

    let _ = tokio::fs::remove_file(&audit_path).await;
}

#[tokio::test]
async fn test_wire_header_is_title_cased() {
    let backend_addr: SocketAddr = "127.0.0.1:28550".parse().unwrap();
    common::start_echo_backend(backend_addr, &[("Content-Type", "text/plain")]).await;

    let audit_path = common::audit_path("stamp-wire");
    let mut config = ProxyConfig::default();
    config.listeners = vec![reverse_listener(28551, Some("X-Bruno-Proxy-System"), backend_addr)];
    config.audit.path = Some(audit_path.to_string_lossy().into_owned());

    let (shutdown, handle) = common::start_proxy(config).await;

    let mut stream = TcpStream::connect("127.0.0.1:28551").await.unwrap();
    stream
        .write_all(
            b"GET /wire HTTP/1.1\r\nHost: 127.0.0.1:28551\r\nUser-Agent: curl/8.5.0\r\nConnection: close\r\n\r\n",
        )
        .await
        .unwrap();
    let mut raw = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut raw))
        .await
        .expect("proxy did not close the connection")
        .unwrap();
    let raw = String::from_utf8_lossy(&raw);

    assert!(raw.starts_with("HTTP/1.1 200 OK\r\n"), "{}", raw);
    assert!(raw.contains("\r\nX-Bruno-Proxy-System: via-mitmproxy\r\n"), "{}", raw);
    assert!(raw.contains("\r\nContent-Type: text/plain\r\n"), "{}", raw);
    assert!(raw.ends_with("GET /wire HTTP/1.1"), "{}", raw);

    shutdown.trigger();
    let _ = tokio::time::timeout(Duration::from_secs(15), handle).await;

    let audit = tokio::fs::read_to_string(&audit_path).await.unwrap();
    let record: serde_json::Value = serde_json::from_str(audit.lines().next().unwrap()).unwrap();
    assert_eq!(record["source"], "curl");
    assert_eq!(record["method"], "GET");
    assert_eq!(record["request_url"], "http://127.0.0.1:28550/wire");

    let _ = tokio::fs::remove_file(&audit_path).await;
}

#[tokio::test]
async fn test_forward_listener_stamps_absolute_requests() {
    let backend_addr: SocketAddr = "127.0.0.1:28520".parse().unwrap();
    common::start_echo_backend(backend_addr, &[("Cache-Control", "no-store")]).await;

    let mut config = ProxyConfig::default();
    config.listeners = vec![ListenerConfig::new(28521, Some("X-Bruno-Proxy-System"))];
    config.audit.enabled = false;

    let (shutdown, handle) = common::start_proxy(config).await;

    let client = reqwest::Client::builder()
        .proxy(reqwest::Proxy::http("http://127.0.0.1:28521").unwrap())
        .build()
        .unwrap();
    let res = client
        .get(format!("http://{}/forwarded", backend_addr))
        .send()
        .await
        .expect("Proxy unreachable");

    assert_eq!(res.status(), 200);
    assert_eq!(res.headers()["x-bruno-proxy-system"], "via-mitmproxy");
    assert_eq!(res.headers()["cache-control"], "no-store");
    assert_eq!(res.text().await.unwrap(), "GET /forwarded HTTP/1.1");

    // Origin-form requests have no target in forward mode.
    let res = common::direct_client()
        .get("http://127.0.0.1:28521/forwarded")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 400);
    assert!(!res.headers().contains_key("x-bruno-proxy-system"));

    shutdown.trigger();
    let _ = tokio::time::timeout(Duration::from_secs(15), handle).await;
}

#[tokio::test]
async fn test_upstream_failure_is_not_stamped() {
    // Nothing listens on the upstream port.
    let dead_upstream: SocketAddr = "127.0.0.1:28539".parse().unwrap();
    let audit_path = common::audit_path("stamp-failure");

    let mut config = ProxyConfig::default();
    config.listeners = vec![reverse_listener(28531, Some("X-Bruno-Proxy-App"), dead_upstream)];
    config.audit.path = Some(audit_path.to_string_lossy().into_owned());

    let (shutdown, handle) = common::start_proxy(config).await;

    let res = common::direct_client()
        .get("http://127.0.0.1:28531/")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), 502);
    assert!(!res.headers().contains_key("x-bruno-proxy-app"));

    shutdown.trigger();
    let _ = tokio::time::timeout(Duration::from_secs(15), handle).await;

    let audit = tokio::fs::read_to_string(&audit_path).await.unwrap_or_default();
    assert_eq!(audit.lines().count(), 0);

    let _ = tokio::fs::remove_file(&audit_path).await;
}
