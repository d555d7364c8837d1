//! Typed classification of provider-attempt failures.

use serde::{Deserialize, Serialize};

/// Why a single provider attempt failed. The set is closed; any failure not
/// otherwise classified is `Unreachable`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailoverReason {
    /// The provider's auth env var is empty; no request was made.
    MissingAuth,
    /// HTTP 401 or 403.
    AuthError,
    /// HTTP 429.
    RateLimit,
    /// Connection error or status >= 500.
    Unreachable,
    /// The response parsed but did not contain the expected shape.
    InvalidResponse,
    /// The caller's cancellation signal fired; the chain stops.
    Cancelled,
}

impl FailoverReason {
    /// The snake_case wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            FailoverReason::MissingAuth => "missing_auth",
            FailoverReason::AuthError => "auth_error",
            FailoverReason::RateLimit => "rate_limit",
            FailoverReason::Unreachable => "unreachable",
            FailoverReason::InvalidResponse => "invalid_response",
            FailoverReason::Cancelled => "cancelled",
        }
    }

    /// Severity rank used when the chain is exhausted: the most actionable
    /// error surfaces. `missing_auth < invalid_response < unreachable <
    /// rate_limit < auth_error`. Cancellation short-circuits the chain and
    /// outranks everything.
    #[must_use]
    pub const fn severity(self) -> u8 {
        match self {
            FailoverReason::MissingAuth => 0,
            FailoverReason::InvalidResponse => 1,
            FailoverReason::Unreachable => 2,
            FailoverReason::RateLimit => 3,
            FailoverReason::AuthError => 4,
            FailoverReason::Cancelled => 5,
        }
    }

    /// Classify an HTTP status code.
    #[must_use]
    pub const fn from_status(code: u16) -> Self {
        match code {
            401 | 403 => FailoverReason::AuthError,
            429 => FailoverReason::RateLimit,
            _ => FailoverReason::Unreachable,
        }
    }
}

impl std::fmt::Display for FailoverReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(FailoverReason::from_status(401), FailoverReason::AuthError);
        assert_eq!(FailoverReason::from_status(403), FailoverReason::AuthError);
        assert_eq!(FailoverReason::from_status(429), FailoverReason::RateLimit);
        assert_eq!(FailoverReason::from_status(500), FailoverReason::Unreachable);
        assert_eq!(FailoverReason::from_status(503), FailoverReason::Unreachable);
        // Anything not otherwise classified is unreachable.
        assert_eq!(FailoverReason::from_status(404), FailoverReason::Unreachable);
    }

    #[test]
    fn severity_ranking_surfaces_actionable_errors() {
        assert!(FailoverReason::MissingAuth.severity() < FailoverReason::InvalidResponse.severity());
        assert!(FailoverReason::InvalidResponse.severity() < FailoverReason::Unreachable.severity());
        assert!(FailoverReason::Unreachable.severity() < FailoverReason::RateLimit.severity());
        assert!(FailoverReason::RateLimit.severity() < FailoverReason::AuthError.severity());
    }

    #[test]
    fn wire_names_are_snake_case() {
        assert_eq!(
            serde_json::to_string(&FailoverReason::MissingAuth).unwrap(),
            "\"missing_auth\""
        );
        assert_eq!(FailoverReason::RateLimit.as_str(), "rate_limit");
    }
}
