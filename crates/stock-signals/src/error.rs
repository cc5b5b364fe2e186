//! Error types for signal aggregation
//!
//! Only [`EngineError`] ever aborts a run. Fetch and oracle failures are
//! recovered inside the engine and only show up in logs and degraded payloads.

use std::time::Duration;

use thiserror::Error;

use crate::model::Market;

/// A data source could not produce a payload
#[derive(Debug, Error)]
pub enum FetchError {
    /// Network or HTTP error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Upstream answered with a non-success status
    #[error("{source_name} returned HTTP {status}")]
    Status { source_name: String, status: u16 },

    /// Payload could not be decoded
    #[error("malformed payload: {0}")]
    Malformed(String),

    /// JSON decoding error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Yahoo Finance client error
    #[error("Yahoo Finance error: {0}")]
    Yahoo(String),

    /// Source needs credentials that are not configured
    #[error("{0} is not configured")]
    NotConfigured(String),

    /// Source has nothing for this symbol
    #[error("no data for {symbol}: {reason}")]
    NoData { symbol: String, reason: String },

    /// The URL has no host to rate-limit against
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

/// The analysis oracle could not be reached or did not answer
#[derive(Debug, Error)]
pub enum OracleError {
    /// Backend binary or service is not available
    #[error("oracle unavailable: {0}")]
    Unavailable(String),

    /// Command exited unsuccessfully
    #[error("oracle exited with status {code:?}: {stderr}")]
    ExitStatus { code: Option<i32>, stderr: String },

    /// No answer within the configured timeout
    #[error("oracle timed out after {0:?}")]
    Timeout(Duration),

    /// HTTP transport error
    #[error("oracle request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Service answered with an error status
    #[error("oracle returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// Local I/O while talking to a subprocess
    #[error("oracle I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Response was structurally unusable
    #[error("unexpected oracle response: {0}")]
    UnexpectedResponse(String),
}

/// A ticker cannot be routed to a source set
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RoutingError {
    /// No route is configured for this market
    #[error("no route configured for market {0}")]
    UnknownMarket(Market),

    /// Route names a feed that has no registered adapter
    #[error("no {role} adapter registered for feed {feed}")]
    MissingSource { role: String, feed: String },

    /// Symbol has no listing on the requested market
    #[error("could not resolve {symbol} on market {market}")]
    Unresolved { symbol: String, market: Market },

    /// Symbol matches several listings on the requested market
    #[error("{symbol} is ambiguous on market {market}: {candidates:?}")]
    Ambiguous {
        symbol: String,
        market: Market,
        candidates: Vec<String>,
    },
}

/// Persistence failure
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite error
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Stored JSON could not be decoded
    #[error("stored JSON is invalid: {0}")]
    Json(#[from] serde_json::Error),

    /// A stored value does not match the expected shape
    #[error("corrupt row: {0}")]
    Corrupt(String),

    /// Filesystem error while opening the database
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration error
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A setting has an unusable value
    #[error("invalid {name}: {reason}")]
    Invalid { name: String, reason: String },

    /// A required setting is missing
    #[error("missing {0}")]
    Missing(String),
}

impl ConfigError {
    pub(crate) fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Run-aborting failures
#[derive(Debug, Error)]
pub enum EngineError {
    /// Ticker is not tracked
    #[error("ticker {0} is not tracked")]
    NotFound(String),

    /// Ticker cannot be routed or resolved
    #[error(transparent)]
    Routing(#[from] RoutingError),

    /// Results could not be persisted
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::NotFound("AAPL".to_string());
        assert_eq!(err.to_string(), "ticker AAPL is not tracked");

        let err = EngineError::from(RoutingError::UnknownMarket(Market::Other("JP".to_string())));
        assert_eq!(err.to_string(), "no route configured for market JP");
    }

    #[test]
    fn test_oracle_error_display() {
        let err = OracleError::ExitStatus {
            code: Some(2),
            stderr: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "oracle exited with status Some(2): boom");
    }
}
