//! Security subsystem.
//!
//! # Data Flow
//! ```text
//! Request to upstream:
//!     → forwarded.rs (strip hop-by-hop, add X-Forwarded-*)
//!
//! Response to client:
//!     → forwarded.rs (strip hop-by-hop)
//!     → headers.rs (security headers, no-cache, validator rewrite)
//! ```

pub mod forwarded;
pub mod headers;

pub use forwarded::ForwardedProto;
