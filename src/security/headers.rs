//! Security response headers.
//!
//! # Responsibilities
//! - Inject the fixed security header set on every response
//! - Make every response uncacheable
//! - Suppress `ETag` and replace `Last-Modified` with the response time
//!
//! # Design Decisions
//! - Applied as a router layer so proxied, static, and
//!   proxy-generated error responses are all covered
//! - Existing values from the upstream are overwritten, never merged

use axum::http::header::{
    CACHE_CONTROL, ETAG, LAST_MODIFIED, STRICT_TRANSPORT_SECURITY, X_CONTENT_TYPE_OPTIONS,
    X_FRAME_OPTIONS, X_XSS_PROTECTION,
};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::Response;
use chrono::{DateTime, Utc};

pub const FRAME_OPTIONS: &str = "SAMEORIGIN";
pub const CONTENT_TYPE_OPTIONS: &str = "nosniff";
pub const XSS_PROTECTION: &str = "1; mode=block";
/// One year, including subdomains.
pub const STRICT_TRANSPORT: &str = "max-age=31536000; includeSubDomains";
pub const NO_CACHE: &str = "no-store, no-cache, must-revalidate";

/// Format a timestamp as an HTTP-date (RFC 9110 IMF-fixdate).
pub fn http_date(at: DateTime<Utc>) -> String {
    at.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

/// Apply the security header set to a response's headers.
pub fn apply_security_headers(headers: &mut HeaderMap, now: DateTime<Utc>) {
    headers.insert(X_FRAME_OPTIONS, HeaderValue::from_static(FRAME_OPTIONS));
    headers.insert(
        X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static(CONTENT_TYPE_OPTIONS),
    );
    headers.insert(X_XSS_PROTECTION, HeaderValue::from_static(XSS_PROTECTION));
    headers.insert(
        STRICT_TRANSPORT_SECURITY,
        HeaderValue::from_static(STRICT_TRANSPORT),
    );
    headers.insert(CACHE_CONTROL, HeaderValue::from_static(NO_CACHE));

    headers.remove(ETAG);
    match HeaderValue::from_str(&http_date(now)) {
        Ok(value) => {
            headers.insert(LAST_MODIFIED, value);
        }
        Err(_) => {
            headers.remove(LAST_MODIFIED);
        }
    }
}

/// Response mapper for `axum::middleware::map_response`.
pub async fn secure_response(mut response: Response) -> Response {
    apply_security_headers(response.headers_mut(), Utc::now());
    response
}
