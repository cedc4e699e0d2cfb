//! Error types for the dashboard engine.

use std::fmt;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the dashboard engine.
///
/// All fetch and cache operations return `Result<T>` where `Result` is defined
/// as `std::result::Result<T, Error>`. Transport-level errors propagate to the
/// caller unmodified so the UI shell can decide messaging; dirty-data failures
/// inside aggregation never surface here (see `model::money`).
#[derive(Debug, Clone)]
pub enum Error {
    /// Network-level failure (connection refused, DNS, non-success HTTP status).
    ///
    /// Common causes:
    /// - Backend unreachable
    /// - HTTP 5xx from the API
    /// - TLS handshake failure
    ///
    /// **Recovery:** Retry; the last good cache entry is kept and preferred
    /// over an error screen.
    Network(String),

    /// Request exceeded the configured timeout (design default: 20s).
    ///
    /// Distinct from [`Error::Network`] so callers can offer a "retry"
    /// affordance for slow links.
    Timeout(String),

    /// HTTP 401 from the API.
    ///
    /// Treated as "session expired", never as a generic network error.
    /// The caller maps this to a re-login banner.
    Unauthorized,

    /// Response body could not be decoded as the expected shape.
    ///
    /// During a paginated drain a malformed page does NOT raise this error;
    /// the drain truncates and returns partial data instead. This variant is
    /// reserved for single-page fetches where there is nothing partial to
    /// return.
    MalformedResponse(String),

    /// Configuration error during engine construction or a refused operation.
    ///
    /// Raised when the local-search fallback would scan a collection above
    /// the configured record bound, or when the HTTP client cannot be built.
    Config(String),

    /// Generic error with custom message.
    Other(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Network(msg) => write!(f, "Network error: {}", msg),
            Error::Timeout(msg) => write!(f, "Timeout: {}", msg),
            Error::Unauthorized => write!(f, "Unauthorized: session expired"),
            Error::MalformedResponse(msg) => write!(f, "Malformed response: {}", msg),
            Error::Config(msg) => write!(f, "Config error: {}", msg),
            Error::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

// ============================================================================
// Conversions from other error types
// ============================================================================

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Error::Timeout(e.to_string())
        } else if e.is_decode() {
            Error::MalformedResponse(e.to_string())
        } else {
            Error::Network(e.to_string())
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::MalformedResponse(e.to_string())
    }
}

impl From<String> for Error {
    fn from(e: String) -> Self {
        Error::Other(e)
    }
}

impl From<&str> for Error {
    fn from(e: &str) -> Self {
        Error::Other(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::Timeout("20s elapsed".to_string());
        assert_eq!(err.to_string(), "Timeout: 20s elapsed");
    }

    #[test]
    fn test_unauthorized_display_names_session() {
        let err = Error::Unauthorized;
        assert!(err.to_string().contains("session expired"));
    }

    #[test]
    fn test_error_from_string() {
        let err: Error = "test error".into();
        assert!(matches!(err, Error::Other(_)));
    }

    #[test]
    fn test_error_from_serde_json() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: Error = bad.expect_err("Expected parse failure").into();
        assert!(matches!(err, Error::MalformedResponse(_)));
    }
}
