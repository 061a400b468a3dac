//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (Axum setup, middleware, listeners)
//!     → request.rs (request ID, client address, host)
//!     → static_files.rs (document root lookup, falls through on miss)
//!     → [routing layer picks the pool]
//!     → proxy.rs (attempt endpoints in order)
//!     → response.rs (strip hop-by-hop, proxy errors)
//!     → [security headers layer]
//!     → Send to client
//! ```

pub mod proxy;
pub mod request;
pub mod response;
pub mod server;
pub mod static_files;

pub use proxy::Forwarder;
pub use request::X_REQUEST_ID;
pub use server::{EdgeServer, ServerError};
pub use static_files::StaticFiles;
