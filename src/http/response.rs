//! Response handling and transformation.
//!
//! # Responsibilities
//! - Convert upstream responses for the client (streamed, not buffered)
//! - Strip hop-by-hop headers from upstream responses
//! - Build proxy-generated error responses
//!
//! # Design Decisions
//! - Security headers are not added here; the router layer covers every
//!   response uniformly

use axum::body::{Body, HttpBody};
use axum::http::{header, HeaderValue, Response, StatusCode};
use axum::response::IntoResponse;

use crate::security::forwarded::strip_hop_by_hop;

/// Pass an upstream response through to the client.
pub fn from_upstream<B>(response: Response<B>) -> Response<Body>
where
    B: HttpBody<Data = bytes::Bytes> + Send + 'static,
    B::Error: Into<axum::BoxError>,
{
    let (mut parts, body) = response.into_parts();
    strip_hop_by_hop(&mut parts.headers);
    Response::from_parts(parts, Body::new(body))
}

/// A short plain-text error generated by the proxy itself.
pub fn proxy_error(status: StatusCode) -> Response<Body> {
    let reason = status.canonical_reason().unwrap_or("Error");
    let mut response = (status, format!("{} {}\n", status.as_u16(), reason)).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// No endpoint in the pool produced a response.
pub fn bad_gateway() -> Response<Body> {
    proxy_error(StatusCode::BAD_GATEWAY)
}
