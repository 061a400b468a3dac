//! Route matching logic.
//!
//! # Responsibilities
//! - Parse configured path prefixes into match patterns
//! - Match request paths by prefix (case-sensitive)
//! - Rank matches so the most specific prefix wins
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - `None` and "/" both mean catch-all (nginx `location /`)
//! - No regex to guarantee O(n) matching

/// A compiled route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutePattern {
    /// Matches paths starting with the given prefix.
    Prefix(String),
    /// Matches every path.
    CatchAll,
}

impl RoutePattern {
    /// Parse a configured prefix. Returns `None` for prefixes that do not
    /// start with '/'.
    pub fn parse(prefix: Option<&str>) -> Option<Self> {
        match prefix {
            None | Some("/") => Some(Self::CatchAll),
            Some(p) if p.starts_with('/') => Some(Self::Prefix(p.to_string())),
            Some(_) => None,
        }
    }

    /// Returns true if the path matches this pattern.
    pub fn matches(&self, path: &str) -> bool {
        match self {
            Self::Prefix(prefix) => path.starts_with(prefix.as_str()),
            Self::CatchAll => true,
        }
    }

    /// Match rank; longer prefixes are more specific.
    pub fn specificity(&self) -> usize {
        match self {
            Self::Prefix(prefix) => prefix.len(),
            Self::CatchAll => 0,
        }
    }
}
