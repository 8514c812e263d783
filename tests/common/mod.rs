//! Shared utilities for integration testing.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

use stamp_proxy::config::ProxyConfig;
use stamp_proxy::lifecycle::{self, Shutdown, StartupError};

/// Start a mock backend that answers every request with the given extra
/// headers and a body echoing the request line.
pub async fn start_echo_backend(addr: SocketAddr, headers: &'static [(&'static str, &'static str)]) {
    let listener = TcpListener::bind(addr).await.unwrap();

    tokio::spawn(async move {
        loop {
            match listener.accept().await {
                Ok((mut socket, _)) => {
                    tokio::spawn(async move {
                        let head = read_head(&mut socket).await;
                        let request_line = head.lines().next().unwrap_or_default().to_string();

                        let mut response = String::from("HTTP/1.1 200 OK\r\n");
                        for (name, value) in headers {
                            response.push_str(&format!("{}: {}\r\n", name, value));
                        }
                        response.push_str(&format!(
                            "Content-Length: {}\r\nConnection: close\r\n\r\n{}",
                            request_line.len(),
                            request_line
                        ));
                        let _ = socket.write_all(response.as_bytes()).await;
                        let _ = socket.shutdown().await;
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    });
                }
                Err(_) => break,
            }
        }
    });
}

async fn read_head(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    while !buf.windows(4).any(|w| w == b"\r\n\r\n") {
        match socket.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}

/// Run the proxy in the background; returns its shutdown trigger and task.
#[allow(dead_code)]
pub async fn start_proxy(config: ProxyConfig) -> (Shutdown, JoinHandle<Result<(), StartupError>>) {
    let shutdown = Shutdown::new();
    let receiver = shutdown.subscribe();
    let handle = tokio::spawn(lifecycle::run(config, receiver));
    tokio::time::sleep(Duration::from_millis(500)).await;
    (shutdown, handle)
}

/// Unique scratch path for an audit file.
#[allow(dead_code)]
pub fn audit_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{}-{}.jsonl", name, uuid::Uuid::new_v4()))
}

/// Client that never routes through a system proxy.
#[allow(dead_code)]
pub fn direct_client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}
