//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use edge_proxy::config::{ProxyConfig, RouteConfig, TlsConfig, UpstreamConfig};
use edge_proxy::{EdgeServer, Shutdown};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

/// Read one request (head plus Content-Length body) from the socket.
async fn read_request(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = find_head_end(&buf) {
            let head = String::from_utf8_lossy(&buf[..end]).to_string();
            let body_len = content_length(&head);
            while buf.len() < end + 4 + body_len {
                let n = socket.read(&mut chunk).await.ok()?;
                if n == 0 {
                    break;
                }
                buf.extend_from_slice(&chunk[..n]);
            }
            return Some(String::from_utf8_lossy(&buf).to_string());
        }
    }
}

fn find_head_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}

fn content_length(head: &str) -> usize {
    head.lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse().ok())
        .unwrap_or(0)
}

async fn respond(socket: &mut TcpStream, status: &str, extra_headers: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
        status,
        body.len(),
        extra_headers,
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Start a mock backend on an ephemeral port that returns a fixed body.
pub async fn start_mock_backend(body: &'static str) -> SocketAddr {
    start_counting_backend(body, Arc::new(AtomicU32::new(0))).await
}

/// Like `start_mock_backend`, counting every request it answers.
pub async fn start_counting_backend(body: &'static str, hits: Arc<AtomicU32>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let hits = hits.clone();
            tokio::spawn(async move {
                if read_request(&mut socket).await.is_some() {
                    hits.fetch_add(1, Ordering::SeqCst);
                    respond(
                        &mut socket,
                        "200 OK",
                        "ETag: \"upstream-etag\"\r\nLast-Modified: Mon, 01 Jan 2001 00:00:00 GMT\r\n",
                        body,
                    )
                    .await;
                }
            });
        }
    });

    addr
}

/// Start a backend that answers with the raw request it received.
pub async fn start_echo_backend() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if let Some(request) = read_request(&mut socket).await {
                    respond(&mut socket, "200 OK", "", &request).await;
                }
            });
        }
    });

    addr
}

/// Start a backend that accepts, reads the request, then drops the socket
/// without answering.
pub async fn start_hangup_backend(hits: Arc<AtomicU32>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let hits = hits.clone();
            tokio::spawn(async move {
                if read_request(&mut socket).await.is_some() {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
                drop(socket);
            });
        }
    });

    addr
}

/// Start a backend that reads the request and never answers.
pub async fn start_stalled_backend(hits: Arc<AtomicU32>) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            let hits = hits.clone();
            tokio::spawn(async move {
                if read_request(&mut socket).await.is_some() {
                    hits.fetch_add(1, Ordering::SeqCst);
                }
                std::future::pending::<()>().await;
                drop(socket);
            });
        }
    });

    addr
}

/// An address nothing is listening on.
pub async fn closed_port() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    addr
}

/// Config with a single catch-all route to pool `app`.
pub fn config_for(servers: &[SocketAddr], fail_timeout_secs: u64) -> ProxyConfig {
    let mut config = ProxyConfig::default();
    config.upstreams = vec![UpstreamConfig {
        name: "app".to_string(),
        servers: servers.iter().map(|s| s.to_string()).collect(),
        fail_timeout_secs,
        max_fails: 1,
    }];
    config.routes = vec![RouteConfig {
        name: "default".to_string(),
        path_prefix: None,
        pool: "app".to_string(),
    }];
    config
}

/// A running proxy bound to ephemeral loopback ports.
pub struct RunningProxy {
    pub http_addr: SocketAddr,
    pub https_addr: Option<SocketAddr>,
    pub shutdown: Shutdown,
    pub task: tokio::task::JoinHandle<()>,
}

impl RunningProxy {
    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.http_addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(std::time::Duration::from_secs(5), self.task).await;
    }
}

pub async fn start_proxy(config: ProxyConfig) -> RunningProxy {
    let tls_enabled = config.tls.is_some();
    let server = EdgeServer::new(config).unwrap();

    let plaintext = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let http_addr = plaintext.local_addr().unwrap();

    let tls = tls_enabled.then(|| std::net::TcpListener::bind("127.0.0.1:0").unwrap());
    let https_addr = tls.as_ref().map(|l| l.local_addr().unwrap());

    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.clone();
    let task = tokio::spawn(async move {
        let _ = server.serve(plaintext, tls, &server_shutdown).await;
    });

    RunningProxy {
        http_addr,
        https_addr,
        shutdown,
        task,
    }
}

/// Plain HTTP client without connection reuse.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Self-signed certificate and key for `localhost`, written as PEM.
pub struct TlsFixture {
    pub dir: tempfile::TempDir,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl TlsFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let cert = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, cert.cert.pem()).unwrap();
        std::fs::write(&key_path, cert.signing_key.serialize_pem()).unwrap();
        Self {
            dir,
            cert_path,
            key_path,
        }
    }

    pub fn tls_config(&self) -> TlsConfig {
        TlsConfig::with_files(path_str(&self.cert_path), path_str(&self.key_path))
    }
}

fn path_str(path: &Path) -> String {
    path.to_string_lossy().to_string()
}
