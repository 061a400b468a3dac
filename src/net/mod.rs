//! Network layer subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming TCP connection on the TLS listener
//!     → tls.rs (policy: versions, cipher order, ALPN, OCSP staple)
//!     → session_cache.rs (resumption lookups)
//!     → Hand off to HTTP layer
//! ```
//!
//! # Design Decisions
//! - The TLS policy is built once per socket and never reloaded
//! - A failed handshake closes the connection; there is no plaintext fallback

pub mod session_cache;
pub mod tls;

pub use session_cache::SessionCache;
pub use tls::{TlsError, TlsPolicy, TlsVersion};
