//! Muninn error types

/// Muninn error types
#[derive(Debug, thiserror::Error)]
pub enum MuninnError {
    // Network errors
    #[error("network error fetching {url}: {message}")]
    Network { url: String, message: String },

    #[error("HTTP {status} fetching {url}")]
    Status { url: String, status: u16 },

    // Install errors
    /// A manifest entry could not be fetched; the install attempt is aborted
    /// and the previously current generation keeps serving.
    #[error("precache of {url} failed: {source}")]
    Precache {
        url: String,
        #[source]
        source: Box<MuninnError>,
    },

    #[error("invalid lifecycle transition: cannot {operation} while {state}")]
    InvalidState {
        operation: &'static str,
        state: crate::lifecycle::LifecycleState,
    },

    // Routing errors
    /// Neither the network nor the current generation could satisfy the
    /// request, and there is no safe synthetic substitute.
    #[error("no response available for {url}")]
    NoResponse { url: String },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid URL '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    // Storage errors
    #[error("cache storage error: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Configuration errors
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl MuninnError {
    /// Whether this error means the network could not produce a response
    /// at all (as opposed to a response with an error status).
    ///
    /// The router falls back to the cache only for these.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, MuninnError::Network { .. })
    }

    pub(crate) fn network(url: impl Into<String>, err: impl std::fmt::Display) -> Self {
        MuninnError::Network {
            url: url.into(),
            message: err.to_string(),
        }
    }
}

/// Result type alias for Muninn operations
pub type Result<T> = std::result::Result<T, MuninnError>;
