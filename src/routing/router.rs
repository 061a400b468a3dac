//! Route lookup and dispatch.
//!
//! # Responsibilities
//! - Store compiled routes
//! - Resolve every request path to exactly one route
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Prefix routes sorted most specific first at build time
//! - The catch-all is stored separately, so lookup cannot miss

use crate::config::RouteConfig;
use crate::routing::matcher::RoutePattern;

/// Error building the route table.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RouteError {
    #[error("route {0:?} has an invalid path prefix")]
    InvalidPrefix(String),
    #[error("route table has no catch-all route")]
    MissingCatchAll,
    #[error("route table has more than one catch-all route")]
    DuplicateCatchAll,
}

/// A resolved route.
#[derive(Debug, Clone)]
pub struct Route {
    /// Route identifier for logs and metrics.
    pub name: String,
    /// Pattern this route was compiled from.
    pub pattern: RoutePattern,
    /// Upstream pool requests are forwarded to.
    pub pool: String,
}

/// Immutable route table.
#[derive(Debug)]
pub struct RouteTable {
    prefixes: Vec<Route>,
    fallback: Route,
}

impl RouteTable {
    /// Compile the route table from configuration.
    pub fn from_config(configs: &[RouteConfig]) -> Result<Self, RouteError> {
        let mut prefixes = Vec::new();
        let mut fallback = None;

        for config in configs {
            let pattern = RoutePattern::parse(config.path_prefix.as_deref())
                .ok_or_else(|| RouteError::InvalidPrefix(config.name.clone()))?;
            let route = Route {
                name: config.name.clone(),
                pattern,
                pool: config.pool.clone(),
            };

            if route.pattern == RoutePattern::CatchAll {
                if fallback.replace(route).is_some() {
                    return Err(RouteError::DuplicateCatchAll);
                }
            } else {
                prefixes.push(route);
            }
        }

        // Stable sort keeps declaration order among equal lengths.
        prefixes.sort_by(|a, b| b.pattern.specificity().cmp(&a.pattern.specificity()));

        Ok(Self {
            prefixes,
            fallback: fallback.ok_or(RouteError::MissingCatchAll)?,
        })
    }

    /// Find the route for a request path.
    pub fn resolve(&self, path: &str) -> &Route {
        self.prefixes
            .iter()
            .find(|route| route.pattern.matches(path))
            .unwrap_or(&self.fallback)
    }

    /// Number of routes, including the catch-all.
    pub fn len(&self) -> usize {
        self.prefixes.len() + 1
    }

    /// Always false; a route table holds at least the catch-all.
    pub fn is_empty(&self) -> bool {
        false
    }
}
