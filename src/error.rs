//! Error types shared across the fetch/cache core
//!
//! Upstream failures are classified once, at the source adapter boundary, so
//! the backoff policy only has to look at the variant.

use std::path::PathBuf;

use reqwest::StatusCode;
use thiserror::Error;

/// A classified failure reported by a source adapter
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Timeout, connection failure or 5xx response
    #[error("transient upstream failure: {0}")]
    Transient(String),

    /// HTTP 429 from the provider
    #[error("rate limited by upstream: {0}")]
    RateLimited(String),

    /// Any other 4xx response; retrying will not help
    #[error("upstream rejected request with status {status}: {message}")]
    Client { status: u16, message: String },

    /// The provider answered but had nothing usable for this identifier
    #[error("no usable data from upstream: {0}")]
    NoData(String),

    /// A failure that could not be classified, such as a malformed body
    #[error("upstream failure: {0}")]
    Unclassified(String),
}

impl UpstreamError {
    /// Classifies a non-success HTTP status
    pub fn from_status(status: StatusCode, message: impl Into<String>) -> Self {
        let message = message.into();
        if status == StatusCode::TOO_MANY_REQUESTS {
            UpstreamError::RateLimited(message)
        } else if status.is_server_error() {
            UpstreamError::Transient(format!("{status}: {message}"))
        } else if status.is_client_error() {
            UpstreamError::Client {
                status: status.as_u16(),
                message,
            }
        } else {
            UpstreamError::Unclassified(format!("{status}: {message}"))
        }
    }

    /// Returns true for the 429 class
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, UpstreamError::RateLimited(_))
    }
}

impl From<reqwest::Error> for UpstreamError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return UpstreamError::Transient(err.to_string());
        }
        match err.status() {
            Some(status) => UpstreamError::from_status(status, err.to_string()),
            None if err.is_request() => UpstreamError::Transient(err.to_string()),
            None => UpstreamError::Unclassified(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for UpstreamError {
    fn from(err: serde_json::Error) -> Self {
        UpstreamError::Unclassified(format!("failed to parse response: {err}"))
    }
}

/// Failures inside the on-disk cache; never shown to callers of the read path
#[derive(Debug, Error)]
pub enum CacheError {
    /// Filesystem error on a cache file or directory
    #[error("cache I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A record that exists but cannot be parsed
    #[error("corrupt cache record at {path}: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The payload could not be serialized
    #[error("failed to serialize cache payload: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Errors that stop the binary before or outside a fetch cycle
#[derive(Debug, Error)]
pub enum AppError {
    #[error("could not determine a cache directory; pass --cache-dir")]
    NoCacheDir,

    #[error("failed to install tracing subscriber: {0}")]
    Logging(String),

    #[error(transparent)]
    Cli(#[from] crate::cli::CliError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
