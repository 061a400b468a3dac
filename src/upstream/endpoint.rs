//! Upstream endpoint abstraction.
//!
//! # Responsibilities
//! - Represent a single backend endpoint (host, port)
//! - Track passive health: consecutive failures and failed-until deadline
//!
//! # Design Decisions
//! - Health is per-endpoint atomics; no lock on the request path
//! - Deadlines are stored as milliseconds since the endpoint's epoch,
//!   with 0 reserved for "not failed"
//! - Callers pass `now` so expiry is testable without sleeping

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use axum::http::uri::Authority;

/// When an endpoint is taken out of rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailurePolicy {
    /// Consecutive failures before the endpoint is marked failed.
    pub max_fails: u32,
    /// How long a failed endpoint stays excluded.
    pub fail_timeout: Duration,
}

impl FailurePolicy {
    /// Create a policy.
    pub fn new(max_fails: u32, fail_timeout: Duration) -> Self {
        Self {
            max_fails,
            fail_timeout,
        }
    }

    /// Returns true if endpoints are never marked failed.
    pub fn is_disabled(&self) -> bool {
        self.max_fails == 0 || self.fail_timeout.is_zero()
    }
}

/// Parse "host:port" (or bare "host", port 80) into a normalized authority.
pub fn parse_endpoint(value: &str) -> Option<Authority> {
    if value.is_empty() || value.contains('/') || value.contains('@') {
        return None;
    }
    let authority = Authority::from_str(value).ok()?;
    if authority.host().is_empty() {
        return None;
    }
    // `Authority` tolerates an empty or non-numeric port; only a missing
    // port part defaults to 80.
    let port = authority.as_str().get(authority.host().len()..)?;
    match port.strip_prefix(':') {
        None if port.is_empty() => {
            Authority::from_str(&format!("{}:80", authority.host())).ok()
        }
        Some(digits) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
            digits.parse::<u16>().ok().map(|_| authority)
        }
        _ => None,
    }
}

/// A single upstream endpoint.
#[derive(Debug)]
pub struct Endpoint {
    authority: Authority,
    policy: FailurePolicy,
    epoch: Instant,
    consecutive_failures: AtomicU32,
    failed_until: AtomicU64,
}

impl Endpoint {
    /// Create an endpoint with the given failover policy.
    pub fn new(authority: Authority, policy: FailurePolicy) -> Self {
        Self {
            authority,
            policy,
            epoch: Instant::now(),
            consecutive_failures: AtomicU32::new(0),
            failed_until: AtomicU64::new(0),
        }
    }

    /// Endpoint host.
    pub fn host(&self) -> &str {
        self.authority.host()
    }

    /// Endpoint port.
    pub fn port(&self) -> u16 {
        self.authority.port_u16().unwrap_or(80)
    }

    /// Authority used to build the upstream URI.
    pub fn authority(&self) -> &Authority {
        &self.authority
    }

    /// Returns true if the endpoint may be selected at `now`.
    pub fn is_available_at(&self, now: Instant) -> bool {
        let until = self.failed_until.load(Ordering::Acquire);
        until == 0 || self.offset(now) >= until
    }

    /// Record a successful exchange; clears any failure state.
    pub fn record_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        self.failed_until.store(0, Ordering::Release);
    }

    /// Record a failed attempt at `now`.
    ///
    /// Returns true if this failure took the endpoint out of rotation.
    pub fn record_failure(&self, now: Instant) -> bool {
        if self.policy.is_disabled() {
            return false;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::AcqRel) + 1;
        if failures < self.policy.max_fails {
            return false;
        }

        self.consecutive_failures.store(0, Ordering::Relaxed);
        let until = self.offset(now + self.policy.fail_timeout);
        self.failed_until.store(until, Ordering::Release);
        true
    }

    /// Clear a failure mark whose `fail_timeout` has run out.
    ///
    /// Returns true exactly once per expired mark, when the endpoint
    /// re-enters rotation.
    pub fn clear_expired(&self, now: Instant) -> bool {
        let until = self.failed_until.load(Ordering::Acquire);
        if until == 0 || self.offset(now) < until {
            return false;
        }
        self.failed_until
            .compare_exchange(until, 0, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Milliseconds since epoch, shifted by one so 0 stays "not failed".
    fn offset(&self, at: Instant) -> u64 {
        let millis = at.saturating_duration_since(self.epoch).as_millis();
        u64::try_from(millis).unwrap_or(u64::MAX - 1) + 1
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.authority)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint(max_fails: u32, fail_timeout: Duration) -> Endpoint {
        Endpoint::new(
            Authority::from_static("app:5000"),
            FailurePolicy::new(max_fails, fail_timeout),
        )
    }

    #[test]
    fn parses_endpoints() {
        assert_eq!(parse_endpoint("app:5000").unwrap().as_str(), "app:5000");
        assert_eq!(parse_endpoint("app").unwrap().as_str(), "app:80");
        assert_eq!(parse_endpoint("10.0.0.7:8080").unwrap().port_u16(), Some(8080));
        assert_eq!(parse_endpoint(""), None);
        assert_eq!(parse_endpoint("app:notaport"), None);
        assert_eq!(parse_endpoint("app:500O"), None);
        assert_eq!(parse_endpoint("app:"), None);
        assert_eq!(parse_endpoint("app:70000"), None);
        assert_eq!(parse_endpoint("http://app:5000"), None);
    }

    #[test]
    fn failed_endpoint_excluded_until_timeout() {
        let ep = endpoint(1, Duration::from_secs(10));
        let t = Instant::now();

        assert!(ep.is_available_at(t));
        assert!(ep.record_failure(t));
        assert!(!ep.is_available_at(t));
        assert!(!ep.is_available_at(t + Duration::from_secs(9)));
        assert!(ep.is_available_at(t + Duration::from_secs(10)));
    }

    #[test]
    fn zero_fail_timeout_never_marks_failed() {
        let ep = endpoint(1, Duration::ZERO);
        let t = Instant::now();

        assert!(!ep.record_failure(t));
        assert!(ep.is_available_at(t));
    }

    #[test]
    fn max_fails_counts_consecutive_failures() {
        let ep = endpoint(3, Duration::from_secs(5));
        let t = Instant::now();

        assert!(!ep.record_failure(t));
        assert!(!ep.record_failure(t));
        ep.record_success();
        assert!(!ep.record_failure(t));
        assert!(!ep.record_failure(t));
        assert!(ep.is_available_at(t));
        assert!(ep.record_failure(t));
        assert!(!ep.is_available_at(t));
    }

    #[test]
    fn success_restores_failed_endpoint() {
        let ep = endpoint(1, Duration::from_secs(60));
        let t = Instant::now();

        ep.record_failure(t);
        assert!(!ep.is_available_at(t));
        ep.record_success();
        assert!(ep.is_available_at(t));
    }

    #[test]
    fn expired_mark_is_cleared_once() {
        let ep = endpoint(1, Duration::from_secs(10));
        let t = Instant::now();

        assert!(!ep.clear_expired(t));
        ep.record_failure(t);
        assert!(!ep.clear_expired(t + Duration::from_secs(5)));
        assert!(!ep.is_available_at(t + Duration::from_secs(5)));

        assert!(ep.clear_expired(t + Duration::from_secs(10)));
        assert!(!ep.clear_expired(t + Duration::from_secs(11)));
        assert!(ep.is_available_at(t + Duration::from_secs(5)));
    }

    #[test]
    fn display_is_authority() {
        let ep = endpoint(1, Duration::ZERO);
        assert_eq!(ep.to_string(), "app:5000");
        assert_eq!(ep.host(), "app");
        assert_eq!(ep.port(), 5000);
    }
}
