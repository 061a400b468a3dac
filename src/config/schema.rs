//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the edge proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the edge proxy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (plaintext and TLS bind addresses).
    pub listener: ListenerConfig,

    /// TLS termination policy. The TLS listener is disabled when absent.
    pub tls: Option<TlsConfig>,

    /// Route definitions mapping request paths to upstream pools.
    pub routes: Vec<RouteConfig>,

    /// Upstream pool definitions.
    pub upstreams: Vec<UpstreamConfig>,

    /// Static passthrough files served before proxying.
    pub static_files: StaticFilesConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Request limits.
    pub security: SecurityConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

impl Default for ProxyConfig {
    /// Mirrors the reference deployment: a single catch-all route to the
    /// `app` pool with one endpoint and `fail_timeout = 0`.
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            tls: None,
            routes: vec![RouteConfig {
                name: "default".to_string(),
                path_prefix: None,
                pool: "app".to_string(),
            }],
            upstreams: vec![UpstreamConfig {
                name: "app".to_string(),
                servers: vec!["app:5000".to_string()],
                fail_timeout_secs: 0,
                max_fails: default_max_fails(),
            }],
            static_files: StaticFilesConfig::default(),
            timeouts: TimeoutConfig::default(),
            security: SecurityConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Plaintext bind address (e.g., "0.0.0.0:80").
    pub http_address: String,

    /// TLS bind address (e.g., "0.0.0.0:443"). Only bound when `tls` is set.
    pub https_address: String,

    /// Answer plaintext requests with a redirect to HTTPS instead of proxying.
    pub redirect_to_https: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            http_address: "0.0.0.0:80".to_string(),
            https_address: "0.0.0.0:443".to_string(),
            redirect_to_https: false,
        }
    }
}

/// TLS policy for the HTTPS listener.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to certificate chain file (PEM).
    pub cert_path: String,

    /// Path to private key file (PEM).
    pub key_path: String,

    /// Allowed protocol versions ("TLSv1", "TLSv1.1", "TLSv1.2", "TLSv1.3").
    #[serde(default = "default_protocols")]
    pub protocols: Vec<String>,

    /// Cipher suites in preference order. OpenSSL or IANA names.
    /// Empty means the provider's default order.
    #[serde(default = "default_ciphers")]
    pub ciphers: Vec<String>,

    /// Use the server's cipher order instead of the client's.
    #[serde(default = "default_true")]
    pub prefer_server_ciphers: bool,

    /// Session cache size in megabytes. 0 disables session resumption.
    #[serde(default = "default_session_cache_mb")]
    pub session_cache_size_mb: usize,

    /// Lifetime of a cached session in seconds.
    #[serde(default = "default_session_timeout")]
    pub session_timeout_secs: u64,

    /// ALPN protocols offered during the handshake.
    #[serde(default = "default_alpn")]
    pub alpn: Vec<String>,

    /// Staple an OCSP response into the handshake.
    #[serde(default = "default_true")]
    pub ocsp_stapling: bool,

    /// Certificate used to verify OCSP responses (PEM).
    #[serde(default)]
    pub trusted_certificate: Option<String>,

    /// Pre-fetched DER encoded OCSP response to staple.
    #[serde(default)]
    pub ocsp_response_path: Option<String>,
}

impl TlsConfig {
    /// TLS config with the default policy for the given certificate pair.
    pub fn with_files(cert_path: impl Into<String>, key_path: impl Into<String>) -> Self {
        Self {
            cert_path: cert_path.into(),
            key_path: key_path.into(),
            protocols: default_protocols(),
            ciphers: default_ciphers(),
            prefer_server_ciphers: true,
            session_cache_size_mb: default_session_cache_mb(),
            session_timeout_secs: default_session_timeout(),
            alpn: default_alpn(),
            ocsp_stapling: true,
            trusted_certificate: None,
            ocsp_response_path: None,
        }
    }
}

fn default_protocols() -> Vec<String> {
    ["TLSv1", "TLSv1.1", "TLSv1.2"]
        .iter()
        .map(|p| p.to_string())
        .collect()
}

fn default_ciphers() -> Vec<String> {
    [
        "ECDHE-RSA-AES256-GCM-SHA384",
        "ECDHE-ECDSA-AES256-GCM-SHA384",
        "ECDHE-RSA-AES128-GCM-SHA256",
        "ECDHE-ECDSA-AES128-GCM-SHA256",
        "ECDHE-RSA-CHACHA20-POLY1305",
        "ECDHE-ECDSA-CHACHA20-POLY1305",
    ]
    .iter()
    .map(|c| c.to_string())
    .collect()
}

fn default_alpn() -> Vec<String> {
    vec!["h2".to_string(), "http/1.1".to_string()]
}

fn default_session_cache_mb() -> usize {
    50
}

fn default_session_timeout() -> u64 {
    24 * 60 * 60
}

fn default_true() -> bool {
    true
}

/// Route configuration mapping a path to an upstream pool.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Path prefix to match. `None` or "/" is the catch-all.
    #[serde(default)]
    pub path_prefix: Option<String>,

    /// Upstream pool name to forward to.
    pub pool: String,
}

/// Upstream pool configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    /// Pool name referenced by routes.
    pub name: String,

    /// Endpoints in preference order ("host:port").
    pub servers: Vec<String>,

    /// Seconds an endpoint is excluded after being marked failed.
    /// 0 never marks an endpoint failed.
    #[serde(default = "default_fail_timeout")]
    pub fail_timeout_secs: u64,

    /// Consecutive failures before an endpoint is marked failed.
    /// 0 never marks an endpoint failed.
    #[serde(default = "default_max_fails")]
    pub max_fails: u32,
}

fn default_fail_timeout() -> u64 {
    10
}

fn default_max_fails() -> u32 {
    1
}

/// Static passthrough configuration (`try_files $uri @proxy`).
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StaticFilesConfig {
    /// Document root. Static lookup is disabled when absent.
    pub root: Option<String>,
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Upstream connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Optional total request timeout in seconds.
    pub request_secs: Option<u64>,

    /// Time allowed for in-flight requests to finish on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 60,
            request_secs: None,
            shutdown_grace_secs: 10,
        }
    }
}

/// Request limits.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// Maximum request body size in bytes.
    pub max_body_size: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_body_size: 1024 * 1024, // 1MB
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Enable the Prometheus metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9090".to_string(),
        }
    }
}
