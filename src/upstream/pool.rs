//! Upstream pool management.
//!
//! # Responsibilities
//! - Own every configured pool and its endpoint health table
//! - Produce the per-request attempt order for a pool

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::UpstreamConfig;
use crate::upstream::endpoint::{parse_endpoint, Endpoint, FailurePolicy};

/// Error building the pool registry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    #[error("upstream pool {0:?} has no servers")]
    Empty(String),
    #[error("upstream pool {pool:?} has invalid server {server:?}")]
    InvalidServer { pool: String, server: String },
}

/// A named, ordered group of endpoints serving one logical service.
#[derive(Debug)]
pub struct UpstreamPool {
    name: String,
    policy: FailurePolicy,
    endpoints: Vec<Arc<Endpoint>>,
}

impl UpstreamPool {
    /// Build a pool from configuration. Pools are never empty.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, PoolError> {
        let policy = FailurePolicy::new(
            config.max_fails,
            Duration::from_secs(config.fail_timeout_secs),
        );

        let endpoints = config
            .servers
            .iter()
            .map(|server| {
                parse_endpoint(server)
                    .map(|authority| Arc::new(Endpoint::new(authority, policy)))
                    .ok_or_else(|| PoolError::InvalidServer {
                        pool: config.name.clone(),
                        server: server.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if endpoints.is_empty() {
            return Err(PoolError::Empty(config.name.clone()));
        }

        Ok(Self {
            name: config.name.clone(),
            policy,
            endpoints,
        })
    }

    /// Pool name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Failover policy shared by every endpoint in the pool.
    pub fn policy(&self) -> FailurePolicy {
        self.policy
    }

    /// Endpoints in declaration order.
    pub fn endpoints(&self) -> &[Arc<Endpoint>] {
        &self.endpoints
    }

    /// Clear expired failure marks, returning the endpoints that just
    /// re-entered rotation.
    pub fn recover_expired(&self, now: Instant) -> Vec<Arc<Endpoint>> {
        self.endpoints
            .iter()
            .filter(|endpoint| endpoint.clear_expired(now))
            .cloned()
            .collect()
    }

    /// Endpoints to try for one request, in order.
    ///
    /// Endpoints marked failed at `now` are skipped. When every endpoint is
    /// marked failed the whole pool is returned, so a request always makes
    /// at least one attempt and never more than the pool size.
    pub fn attempt_order(&self, now: Instant) -> Vec<Arc<Endpoint>> {
        let live: Vec<_> = self
            .endpoints
            .iter()
            .filter(|endpoint| endpoint.is_available_at(now))
            .cloned()
            .collect();

        if live.is_empty() {
            tracing::warn!(pool = %self.name, "All endpoints marked failed, trying the whole pool");
            return self.endpoints.clone();
        }
        live
    }
}

/// Registry of upstream pools, keyed by name.
#[derive(Debug)]
pub struct PoolRegistry {
    pools: HashMap<String, Arc<UpstreamPool>>,
}

impl PoolRegistry {
    /// Build every configured pool.
    pub fn from_config(configs: &[UpstreamConfig]) -> Result<Self, PoolError> {
        let mut pools = HashMap::new();
        for config in configs {
            let pool = UpstreamPool::from_config(config)?;
            tracing::debug!(
                pool = %pool.name(),
                endpoints = pool.endpoints().len(),
                fail_timeout = ?pool.policy().fail_timeout,
                "Upstream pool configured"
            );
            pools.insert(config.name.clone(), Arc::new(pool));
        }
        Ok(Self { pools })
    }

    /// Look up a pool by name.
    pub fn get(&self, name: &str) -> Option<Arc<UpstreamPool>> {
        let pool = self.pools.get(name).cloned();
        if pool.is_none() {
            tracing::debug!(pool = %name, "Pool not found in registry");
        }
        pool
    }

    /// Iterate over all pools.
    pub fn pools(&self) -> impl Iterator<Item = &Arc<UpstreamPool>> {
        self.pools.values()
    }
}
