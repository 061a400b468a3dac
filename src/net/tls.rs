//! TLS policy and certificate loading.
//!
//! A [`TlsPolicy`] is built once per listening socket and never mutated.
//! Rotating certificates or changing the policy means binding a new socket.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum_server::tls_rustls::RustlsConfig;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ServerConfig, SupportedCipherSuite, SupportedProtocolVersion};

use crate::config::TlsConfig;
use crate::net::session_cache::SessionCache;

/// Error building a TLS policy.
#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no certificates found in {0:?}")]
    NoCertificates(PathBuf),

    #[error("no private key found in {0:?}")]
    NoPrivateKey(PathBuf),

    #[error("unknown TLS protocol version {0:?}")]
    UnknownProtocol(String),

    #[error("none of the configured protocol versions {0:?} can be served")]
    NoUsableProtocols(Vec<String>),

    #[error("none of the configured cipher suites are supported")]
    NoCipherSuites,

    #[error(transparent)]
    Rustls(#[from] rustls::Error),
}

/// A protocol version as named in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TlsVersion {
    Tls10,
    Tls11,
    Tls12,
    Tls13,
}

impl TlsVersion {
    /// The rustls version, if rustls implements it.
    ///
    /// rustls only speaks TLS 1.2 and 1.3; TLS 1.0 and 1.1 have no
    /// implementation to enable.
    pub fn supported(self) -> Option<&'static SupportedProtocolVersion> {
        match self {
            TlsVersion::Tls12 => Some(&rustls::version::TLS12),
            TlsVersion::Tls13 => Some(&rustls::version::TLS13),
            TlsVersion::Tls10 | TlsVersion::Tls11 => None,
        }
    }
}

impl FromStr for TlsVersion {
    type Err = TlsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tlsv1" | "tlsv1.0" => Ok(TlsVersion::Tls10),
            "tlsv1.1" => Ok(TlsVersion::Tls11),
            "tlsv1.2" => Ok(TlsVersion::Tls12),
            "tlsv1.3" => Ok(TlsVersion::Tls13),
            _ => Err(TlsError::UnknownProtocol(s.to_string())),
        }
    }
}

/// Map OpenSSL cipher names to the IANA names rustls reports.
fn iana_cipher_name(name: &str) -> &str {
    match name {
        "ECDHE-ECDSA-AES256-GCM-SHA384" => "TLS_ECDHE_ECDSA_WITH_AES_256_GCM_SHA384",
        "ECDHE-ECDSA-AES128-GCM-SHA256" => "TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256",
        "ECDHE-ECDSA-CHACHA20-POLY1305" => "TLS_ECDHE_ECDSA_WITH_CHACHA20_POLY1305_SHA256",
        "ECDHE-RSA-AES256-GCM-SHA384" => "TLS_ECDHE_RSA_WITH_AES_256_GCM_SHA384",
        "ECDHE-RSA-AES128-GCM-SHA256" => "TLS_ECDHE_RSA_WITH_AES_128_GCM_SHA256",
        "ECDHE-RSA-CHACHA20-POLY1305" => "TLS_ECDHE_RSA_WITH_CHACHA20_POLY1305_SHA256",
        other => other,
    }
}

fn suite_name(suite: &SupportedCipherSuite) -> String {
    format!("{:?}", suite.suite())
}

/// Order the provider's suites by the configured preference list.
///
/// Names rustls does not implement are skipped with a warning. TLS 1.3
/// suites are not governed by the list (as with OpenSSL cipher strings)
/// and are appended when TLS 1.3 is allowed and none were named.
pub fn resolve_cipher_suites(
    names: &[String],
    available: &[SupportedCipherSuite],
    allow_tls13: bool,
) -> Result<Vec<SupportedCipherSuite>, TlsError> {
    if names.is_empty() {
        return Ok(available.to_vec());
    }

    let mut ordered: Vec<SupportedCipherSuite> = Vec::new();
    for name in names {
        let wanted = iana_cipher_name(name.trim());
        match available.iter().find(|s| suite_name(s) == wanted) {
            Some(suite) => {
                if !ordered.iter().any(|s| s.suite() == suite.suite()) {
                    ordered.push(*suite);
                }
            }
            None => tracing::warn!(cipher = %name, "Cipher suite not supported, skipping"),
        }
    }

    let has_tls13 = ordered
        .iter()
        .any(|s| matches!(s, SupportedCipherSuite::Tls13(_)));
    if allow_tls13 && !has_tls13 {
        ordered.extend(
            available
                .iter()
                .filter(|s| matches!(s, SupportedCipherSuite::Tls13(_)))
                .copied(),
        );
    }

    if ordered.is_empty() {
        return Err(TlsError::NoCipherSuites);
    }
    Ok(ordered)
}

/// Resolve configured protocol names to the versions that will be offered.
pub fn resolve_versions(names: &[String]) -> Result<Vec<TlsVersion>, TlsError> {
    let mut versions = names
        .iter()
        .map(|name| name.parse::<TlsVersion>())
        .collect::<Result<Vec<_>, _>>()?;
    versions.sort();
    versions.dedup();

    let unsupported: Vec<TlsVersion> = versions
        .iter()
        .copied()
        .filter(|v| v.supported().is_none())
        .collect();
    versions.retain(|v| v.supported().is_some());
    if versions.is_empty() {
        return Err(TlsError::NoUsableProtocols(names.to_vec()));
    }

    if !unsupported.is_empty() {
        tracing::warn!(
            configured = ?names,
            not_offered = ?unsupported,
            offered = ?versions,
            "TLS policy is narrower than configured: rustls cannot serve TLS 1.0 or 1.1, \
             clients limited to those versions will fail the handshake"
        );
    }
    Ok(versions)
}

/// Immutable TLS termination policy for one listening socket.
#[derive(Debug, Clone)]
pub struct TlsPolicy {
    server_config: Arc<ServerConfig>,
    versions: Vec<TlsVersion>,
    cipher_suites: Vec<String>,
}

impl TlsPolicy {
    /// Load the certificate, key, and optional OCSP response from disk and
    /// build the policy.
    pub fn from_config(config: &TlsConfig) -> Result<Self, TlsError> {
        let cert_chain = load_certs(Path::new(&config.cert_path))?;
        let key = load_private_key(Path::new(&config.key_path))?;

        let ocsp = if config.ocsp_stapling {
            if let Some(trusted) = &config.trusted_certificate {
                let trusted = load_certs(Path::new(trusted))?;
                if trusted.first() == cert_chain.first() {
                    tracing::warn!(
                        "OCSP trusted certificate is the server certificate itself; responses cannot be verified against an issuer"
                    );
                }
            }
            match &config.ocsp_response_path {
                Some(path) => Some(fs::read(path).map_err(|source| TlsError::Io {
                    path: PathBuf::from(path),
                    source,
                })?),
                None => {
                    tracing::warn!("OCSP stapling enabled but no OCSP response file configured; nothing will be stapled");
                    None
                }
            }
        } else {
            None
        };

        Self::build(config, cert_chain, key, ocsp)
    }

    /// Build the policy from already loaded key material.
    pub fn build(
        config: &TlsConfig,
        cert_chain: Vec<CertificateDer<'static>>,
        key: PrivateKeyDer<'static>,
        ocsp: Option<Vec<u8>>,
    ) -> Result<Self, TlsError> {
        let versions = resolve_versions(&config.protocols)?;
        let allow_tls13 = versions.contains(&TlsVersion::Tls13);

        let mut provider = rustls::crypto::aws_lc_rs::default_provider();
        provider.cipher_suites =
            resolve_cipher_suites(&config.ciphers, &provider.cipher_suites, allow_tls13)?;
        let cipher_suites: Vec<String> = provider.cipher_suites.iter().map(suite_name).collect();

        let protocol_versions: Vec<&'static SupportedProtocolVersion> =
            versions.iter().filter_map(|v| v.supported()).collect();

        let builder = ServerConfig::builder_with_provider(Arc::new(provider))
            .with_protocol_versions(&protocol_versions)?
            .with_no_client_auth();
        let mut server_config = match ocsp {
            Some(ocsp) => builder.with_single_cert_with_ocsp(cert_chain, key, ocsp)?,
            None => builder.with_single_cert(cert_chain, key)?,
        };

        server_config.ignore_client_order = config.prefer_server_ciphers;
        server_config.alpn_protocols = config
            .alpn
            .iter()
            .map(|proto| proto.as_bytes().to_vec())
            .collect();
        server_config.session_storage = Arc::new(SessionCache::with_megabytes(
            config.session_cache_size_mb,
            Duration::from_secs(config.session_timeout_secs),
        ));

        tracing::info!(
            versions = ?versions,
            cipher_suites = ?cipher_suites,
            server_order = config.prefer_server_ciphers,
            alpn = ?config.alpn,
            "TLS policy built"
        );

        Ok(Self {
            server_config: Arc::new(server_config),
            versions,
            cipher_suites,
        })
    }

    /// Versions offered during the handshake.
    pub fn versions(&self) -> &[TlsVersion] {
        &self.versions
    }

    /// Cipher suites in preference order.
    pub fn cipher_suites(&self) -> &[String] {
        &self.cipher_suites
    }

    /// The underlying rustls configuration.
    pub fn server_config(&self) -> Arc<ServerConfig> {
        Arc::clone(&self.server_config)
    }

    /// Configuration handle for an axum-server TLS listener.
    pub fn rustls_config(&self) -> RustlsConfig {
        RustlsConfig::from_config(self.server_config())
    }
}

fn open(path: &Path) -> Result<BufReader<File>, TlsError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })
}

/// Load every certificate from a PEM file.
pub fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
    if certs.is_empty() {
        return Err(TlsError::NoCertificates(path.to_path_buf()));
    }
    Ok(certs)
}

/// Load the first private key (PKCS#8, PKCS#1, or SEC1) from a PEM file.
pub fn load_private_key(path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|source| TlsError::Io {
            path: path.to_path_buf(),
            source,
        })?
        .ok_or_else(|| TlsError::NoPrivateKey(path.to_path_buf()))
}
