//! HTTPS-terminating edge proxy library.
//!
//! ```text
//!  client ──TLS──▶ net::tls ──▶ http::server ──▶ static_files ──hit──▶ disk
//!                                    │                 │
//!                                    │                miss
//!                                    ▼                 ▼
//!                           security::headers    routing ──▶ upstream pool
//!                                    ▲                            │
//!                                    └──────── http::proxy ◀──────┘
//! ```

// Core subsystems
pub mod config;
pub mod http;
pub mod net;
pub mod routing;
pub mod upstream;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod security;

pub use config::schema::ProxyConfig;
pub use http::EdgeServer;
pub use lifecycle::Shutdown;
