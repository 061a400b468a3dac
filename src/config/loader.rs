//! Configuration loading from disk and the process environment.

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::schema::{ProxyConfig, UpstreamConfig};
use crate::config::validation::{validate_config, ValidationError};

/// Prefix for environment variables that replace a pool's servers,
/// e.g. `EDGE_UPSTREAM_APP=app:5000,app-2:5000`.
pub const UPSTREAM_ENV_PREFIX: &str = "EDGE_UPSTREAM_";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load configuration from an optional TOML file, apply environment
/// overrides, and validate the result.
pub fn load_config(path: Option<&Path>) -> Result<ProxyConfig, ConfigError> {
    let config = match path {
        Some(path) => {
            let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            parse_config(&content)?
        }
        None => ProxyConfig::default(),
    };

    let config = apply_env_overrides(config, std::env::vars());
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Parse a TOML document without validating it.
pub fn parse_config(content: &str) -> Result<ProxyConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Apply `EDGE_*` overrides from the given variables.
///
/// Unknown `EDGE_UPSTREAM_<NAME>` pools are created with default failover
/// settings; pool names are matched lowercased.
pub fn apply_env_overrides<I>(mut config: ProxyConfig, vars: I) -> ProxyConfig
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, value) in vars {
        match key.as_str() {
            "EDGE_HTTP_ADDRESS" => config.listener.http_address = value,
            "EDGE_HTTPS_ADDRESS" => config.listener.https_address = value,
            "EDGE_LOG_LEVEL" => config.observability.log_level = value,
            _ => {
                if let Some(pool) = key.strip_prefix(UPSTREAM_ENV_PREFIX) {
                    override_pool(&mut config, &pool.to_lowercase(), &value);
                }
            }
        }
    }
    config
}

fn override_pool(config: &mut ProxyConfig, name: &str, value: &str) {
    let servers: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    tracing::debug!(pool = %name, servers = ?servers, "Upstream servers overridden from environment");

    match config.upstreams.iter_mut().find(|u| u.name == name) {
        Some(upstream) => upstream.servers = servers,
        None => config.upstreams.push(UpstreamConfig {
            name: name.to_string(),
            servers,
            fail_timeout_secs: 10,
            max_fails: 1,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_minimal_document() {
        let config = parse_config(
            r#"
            [listener]
            http_address = "127.0.0.1:8080"

            [[upstreams]]
            name = "app"
            servers = ["10.0.0.1:5000", "10.0.0.2:5000"]
            fail_timeout_secs = 0

            [tls]
            cert_path = "/etc/ssl/edge.crt"
            key_path = "/etc/ssl/edge.key"
            "#,
        )
        .unwrap();

        assert_eq!(config.listener.http_address, "127.0.0.1:8080");
        assert_eq!(config.listener.https_address, "0.0.0.0:443");
        assert_eq!(config.upstreams.len(), 1);
        assert_eq!(config.upstreams[0].servers.len(), 2);
        assert_eq!(config.upstreams[0].max_fails, 1);
        // routes fall back to the default catch-all
        assert_eq!(config.routes.len(), 1);

        let tls = config.tls.unwrap();
        assert_eq!(tls.protocols, vec!["TLSv1", "TLSv1.1", "TLSv1.2"]);
        assert_eq!(tls.session_cache_size_mb, 50);
        assert_eq!(tls.session_timeout_secs, 86_400);
        assert!(tls.prefer_server_ciphers);
    }

    #[test]
    fn rejects_malformed_toml() {
        assert!(matches!(
            parse_config("[listener\nhttp_address = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn env_replaces_existing_pool_servers() {
        let config = apply_env_overrides(
            ProxyConfig::default(),
            vars(&[("EDGE_UPSTREAM_APP", "web-1:5000, web-2:5000")]),
        );
        assert_eq!(config.upstreams.len(), 1);
        assert_eq!(config.upstreams[0].servers, vec!["web-1:5000", "web-2:5000"]);
        assert_eq!(config.upstreams[0].fail_timeout_secs, 0);
    }

    #[test]
    fn env_creates_missing_pool_and_listener_overrides() {
        let config = apply_env_overrides(
            ProxyConfig::default(),
            vars(&[
                ("EDGE_UPSTREAM_WORKER", "worker:6000"),
                ("EDGE_HTTP_ADDRESS", "127.0.0.1:8080"),
                ("EDGE_LOG_LEVEL", "debug"),
                ("PATH", "/usr/bin"),
            ]),
        );
        assert_eq!(config.upstreams.len(), 2);
        assert_eq!(config.upstreams[1].name, "worker");
        assert_eq!(config.listener.http_address, "127.0.0.1:8080");
        assert_eq!(config.observability.log_level, "debug");
    }

    #[test]
    fn env_server_with_typo_in_port_fails_validation() {
        let config = apply_env_overrides(
            ProxyConfig::default(),
            vars(&[("EDGE_UPSTREAM_APP", "app:500O")]),
        );
        assert_eq!(
            validate_config(&config),
            Err(vec![ValidationError::InvalidServer {
                pool: "app".into(),
                server: "app:500O".into(),
            }])
        );
    }

    #[test]
    fn validation_errors_are_joined() {
        let err = ConfigError::Validation(vec![
            ValidationError::NoUpstreams,
            ValidationError::CatchAllCount(0),
        ]);
        assert_eq!(
            err.to_string(),
            "validation failed: no upstream pools configured, exactly one catch-all route is required, found 0"
        );
    }
}
