//! Upstream forwarding.
//!
//! # Responsibilities
//! - Buffer the request body so it can be replayed on the next endpoint
//! - Walk the pool's attempt order until an endpoint answers
//! - Record endpoint failures and successes
//! - Map exhaustion to 502 Bad Gateway

use std::error::Error as StdError;
use std::net::IpAddr;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::request::Parts;
use axum::http::{header, Request, Response, StatusCode, Version};
use bytes::Bytes;
use http_body_util::LengthLimitError;
use hyper_util::client::legacy::{connect::HttpConnector, Client};
use hyper_util::rt::TokioExecutor;

use crate::config::{SecurityConfig, TimeoutConfig};
use crate::http::request::{original_host, request_id, upstream_uri};
use crate::http::response::{bad_gateway, from_upstream, proxy_error};
use crate::observability::metrics;
use crate::security::forwarded::{upstream_headers, ForwardedProto};
use crate::upstream::UpstreamPool;

/// HTTP/1.1 client plus request limits.
#[derive(Clone)]
pub struct Forwarder {
    client: Client<HttpConnector, Body>,
    max_body_size: usize,
}

impl Forwarder {
    pub fn new(timeouts: &TimeoutConfig, security: &SecurityConfig) -> Self {
        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(timeouts.connect_secs)));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new()).build(connector);
        Self {
            client,
            max_body_size: security.max_body_size,
        }
    }

    /// Forward a request to the pool, trying endpoints in order.
    pub async fn forward(
        &self,
        pool: &UpstreamPool,
        parts: Parts,
        body: Body,
        client_ip: Option<IpAddr>,
        proto: ForwardedProto,
    ) -> Response<Body> {
        let request_id = request_id(&parts).to_string();

        let body = match self.buffer_body(&parts, body).await {
            Ok(body) => body,
            Err(status) => {
                tracing::warn!(request_id = %request_id, status = %status, "Rejected request body");
                return proxy_error(status);
            }
        };

        let host = original_host(&parts);
        let headers = upstream_headers(&parts.headers, host, client_ip, proto);
        let idempotent = parts.method.is_idempotent();

        let now = Instant::now();
        for endpoint in pool.recover_expired(now) {
            tracing::info!(pool = %pool.name(), endpoint = %endpoint, "Endpoint back in rotation");
            metrics::record_endpoint_available(pool.name(), &endpoint.to_string(), true);
        }

        let attempts = pool.attempt_order(now);
        let total = attempts.len();

        for (attempt, endpoint) in attempts.into_iter().enumerate() {
            let Some(uri) = upstream_uri(endpoint.authority(), &parts.uri) else {
                tracing::error!(request_id = %request_id, endpoint = %endpoint, "Could not build upstream URI");
                return bad_gateway();
            };

            let mut request = Request::new(Body::from(body.clone()));
            *request.method_mut() = parts.method.clone();
            *request.uri_mut() = uri;
            *request.version_mut() = Version::HTTP_11;
            *request.headers_mut() = headers.clone();

            tracing::debug!(
                request_id = %request_id,
                pool = %pool.name(),
                endpoint = %endpoint,
                attempt = attempt + 1,
                of = total,
                "Forwarding request"
            );

            match self.client.request(request).await {
                Ok(response) => {
                    endpoint.record_success();
                    metrics::record_endpoint_available(pool.name(), &endpoint.to_string(), true);
                    return from_upstream(response);
                }
                Err(e) => {
                    let connect = e.is_connect();
                    tracing::warn!(
                        request_id = %request_id,
                        pool = %pool.name(),
                        endpoint = %endpoint,
                        connect_error = connect,
                        error = %e,
                        "Upstream error"
                    );
                    metrics::record_upstream_failure(pool.name(), &endpoint.to_string(), connect);

                    if endpoint.record_failure(Instant::now()) {
                        tracing::warn!(
                            pool = %pool.name(),
                            endpoint = %endpoint,
                            fail_timeout = ?pool.policy().fail_timeout,
                            "Endpoint marked failed"
                        );
                        metrics::record_endpoint_available(pool.name(), &endpoint.to_string(), false);
                    }

                    // The request may already have been processed.
                    if !connect && !idempotent {
                        break;
                    }
                }
            }
        }

        tracing::error!(request_id = %request_id, pool = %pool.name(), "No upstream endpoint answered");
        bad_gateway()
    }

    async fn buffer_body(&self, parts: &Parts, body: Body) -> Result<Bytes, StatusCode> {
        let declared = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if declared.is_some_and(|len| len > self.max_body_size) {
            return Err(StatusCode::PAYLOAD_TOO_LARGE);
        }

        axum::body::to_bytes(body, self.max_body_size)
            .await
            .map_err(|e| {
                if is_length_limit(&e) {
                    StatusCode::PAYLOAD_TOO_LARGE
                } else {
                    StatusCode::BAD_REQUEST
                }
            })
    }
}

fn is_length_limit(error: &(dyn StdError + 'static)) -> bool {
    let mut current = Some(error);
    while let Some(err) = current {
        if err.is::<LengthLimitError>() {
            return true;
        }
        current = err.source();
    }
    false
}
