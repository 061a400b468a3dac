//! Upstream pool selection subsystem.
//!
//! # Data Flow
//! ```text
//! Route matched → pool name identified
//!     → pool.rs (registry lookup, attempt order)
//!     → endpoint.rs (skip endpoints inside their fail_timeout)
//!     → proxy forwards to each endpoint in order until one answers
//!     → endpoint.rs (record success / failure)
//! ```
//!
//! # Design Decisions
//! - Deterministic declaration order, no weighting
//! - Health table is owned by the registry and shared via Arc
//! - Attempts per request are bounded by pool size

pub mod endpoint;
pub mod pool;

pub use endpoint::{Endpoint, FailurePolicy};
pub use pool::{PoolError, PoolRegistry, UpstreamPool};
