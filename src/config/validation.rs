//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Check referential integrity (routes reference existing pools)
//! - Enforce the route table shape: one catch-all, unique prefixes
//! - Validate listener addresses and endpoint syntax
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::schema::ProxyConfig;
use crate::net::tls::TlsVersion;
use crate::routing::matcher::RoutePattern;
use crate::upstream::endpoint::parse_endpoint;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("invalid listener address {field} = {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("no upstream pools configured")]
    NoUpstreams,

    #[error("upstream pool {0:?} is defined more than once")]
    DuplicatePool(String),

    #[error("upstream pool {0:?} has no servers")]
    EmptyPool(String),

    #[error("upstream pool {pool:?} has invalid server {server:?}")]
    InvalidServer { pool: String, server: String },

    #[error("route {route:?} references unknown pool {pool:?}")]
    UnknownPool { route: String, pool: String },

    #[error("route {route:?} has invalid path prefix {prefix:?}")]
    InvalidPrefix { route: String, prefix: String },

    #[error("path prefix {0:?} is used by more than one route")]
    DuplicatePrefix(String),

    #[error("exactly one catch-all route is required, found {0}")]
    CatchAllCount(usize),

    #[error("tls {field} must not be empty")]
    MissingTlsFile { field: &'static str },

    #[error("unknown TLS protocol version {0:?}")]
    UnknownProtocol(String),

    #[error("tls protocols must not be empty")]
    NoProtocols,
}

/// Validate a parsed configuration, collecting every error found.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    validate_listener(config, &mut errors);
    let pools = validate_upstreams(config, &mut errors);
    validate_routes(config, &pools, &mut errors);
    validate_tls(config, &mut errors);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn validate_listener(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    if config.listener.http_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "http_address",
            value: config.listener.http_address.clone(),
        });
    }
    if config.tls.is_some() && config.listener.https_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field: "https_address",
            value: config.listener.https_address.clone(),
        });
    }
}

fn validate_upstreams<'a>(
    config: &'a ProxyConfig,
    errors: &mut Vec<ValidationError>,
) -> HashSet<&'a str> {
    let mut names = HashSet::new();

    if config.upstreams.is_empty() {
        errors.push(ValidationError::NoUpstreams);
    }

    for upstream in &config.upstreams {
        if !names.insert(upstream.name.as_str()) {
            errors.push(ValidationError::DuplicatePool(upstream.name.clone()));
        }
        if upstream.servers.is_empty() {
            errors.push(ValidationError::EmptyPool(upstream.name.clone()));
        }
        for server in &upstream.servers {
            if parse_endpoint(server).is_none() {
                errors.push(ValidationError::InvalidServer {
                    pool: upstream.name.clone(),
                    server: server.clone(),
                });
            }
        }
    }

    names
}

fn validate_routes(
    config: &ProxyConfig,
    pools: &HashSet<&str>,
    errors: &mut Vec<ValidationError>,
) {
    let mut prefixes = HashSet::new();
    let mut catch_alls = 0;

    for route in &config.routes {
        if !pools.contains(route.pool.as_str()) {
            errors.push(ValidationError::UnknownPool {
                route: route.name.clone(),
                pool: route.pool.clone(),
            });
        }

        match RoutePattern::parse(route.path_prefix.as_deref()) {
            Some(RoutePattern::CatchAll) => catch_alls += 1,
            Some(RoutePattern::Prefix(prefix)) => {
                if !prefixes.insert(prefix.clone()) {
                    errors.push(ValidationError::DuplicatePrefix(prefix));
                }
            }
            None => errors.push(ValidationError::InvalidPrefix {
                route: route.name.clone(),
                prefix: route.path_prefix.clone().unwrap_or_default(),
            }),
        }
    }

    if catch_alls != 1 {
        errors.push(ValidationError::CatchAllCount(catch_alls));
    }
}

fn validate_tls(config: &ProxyConfig, errors: &mut Vec<ValidationError>) {
    let Some(tls) = &config.tls else {
        return;
    };

    if tls.cert_path.is_empty() {
        errors.push(ValidationError::MissingTlsFile { field: "cert_path" });
    }
    if tls.key_path.is_empty() {
        errors.push(ValidationError::MissingTlsFile { field: "key_path" });
    }
    if tls.protocols.is_empty() {
        errors.push(ValidationError::NoProtocols);
    }
    for protocol in &tls.protocols {
        if protocol.parse::<TlsVersion>().is_err() {
            errors.push(ValidationError::UnknownProtocol(protocol.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::{RouteConfig, TlsConfig, UpstreamConfig};

    fn route(name: &str, prefix: Option<&str>, pool: &str) -> RouteConfig {
        RouteConfig {
            name: name.into(),
            path_prefix: prefix.map(Into::into),
            pool: pool.into(),
        }
    }

    #[test]
    fn default_config_is_valid() {
        assert_eq!(validate_config(&ProxyConfig::default()), Ok(()));
    }

    #[test]
    fn collects_all_errors() {
        let mut config = ProxyConfig::default();
        config.listener.http_address = "not-an-address".into();
        config.routes.push(route("api", Some("/api"), "missing"));
        config.upstreams.push(UpstreamConfig {
            name: "app".into(),
            servers: vec![],
            fail_timeout_secs: 10,
            max_fails: 1,
        });

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::InvalidAddress {
            field: "http_address",
            value: "not-an-address".into(),
        }));
        assert!(errors.contains(&ValidationError::UnknownPool {
            route: "api".into(),
            pool: "missing".into(),
        }));
        assert!(errors.contains(&ValidationError::DuplicatePool("app".into())));
        assert!(errors.contains(&ValidationError::EmptyPool("app".into())));
    }

    #[test]
    fn rejects_malformed_server_ports() {
        let mut config = ProxyConfig::default();
        config.upstreams[0].servers = vec!["app:500O".into(), "app:".into(), "app:5000".into()];

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidServer {
                    pool: "app".into(),
                    server: "app:500O".into(),
                },
                ValidationError::InvalidServer {
                    pool: "app".into(),
                    server: "app:".into(),
                },
            ]
        );
    }

    #[test]
    fn requires_exactly_one_catch_all() {
        let mut config = ProxyConfig::default();
        config.routes = vec![route("api", Some("/api"), "app")];
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::CatchAllCount(0)])
        );

        config.routes = vec![route("a", None, "app"), route("b", Some("/"), "app")];
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::CatchAllCount(2)])
        );
    }

    #[test]
    fn rejects_duplicate_and_relative_prefixes() {
        let mut config = ProxyConfig::default();
        config.routes.push(route("a", Some("/api"), "app"));
        config.routes.push(route("b", Some("/api"), "app"));
        config.routes.push(route("c", Some("static"), "app"));

        let errors = validate_config(&config).unwrap_err();
        assert!(errors.contains(&ValidationError::DuplicatePrefix("/api".into())));
        assert!(errors.contains(&ValidationError::InvalidPrefix {
            route: "c".into(),
            prefix: "static".into(),
        }));
    }

    #[test]
    fn rejects_unknown_tls_protocols() {
        let mut config = ProxyConfig::default();
        let mut tls = TlsConfig::with_files("cert.pem", "key.pem");
        tls.protocols = vec!["SSLv3".into()];
        config.tls = Some(tls);

        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::UnknownProtocol("SSLv3".into())])
        );
    }
}
