//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming request path
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate prefix patterns)
//!     → Return: the single matching Route (catch-all as fallback)
//!
//! Route Compilation (at startup):
//!     RouteConfig[]
//!     → Parse patterns
//!     → Sort prefixes by length
//!     → Freeze as immutable RouteTable
//! ```

pub mod matcher;
pub mod router;

pub use router::{Route, RouteError, RouteTable};
