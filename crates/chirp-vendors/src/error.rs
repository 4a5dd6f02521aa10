//! Vendor error types.

/// Result type alias for vendor operations.
pub type VendorResult<T> = Result<T, VendorError>;

/// Errors that can occur talking to an external vendor.
#[derive(Debug, thiserror::Error)]
pub enum VendorError {
    /// The capability has no credentials configured.
    #[error("{capability} is not configured (missing API key)")]
    NotConfigured {
        /// Which capability (e.g. `"speech synthesis"`).
        capability: &'static str,
    },

    /// HTTP request failed (connect, timeout, TLS, ...).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Vendor returned a non-success response.
    #[error("API error ({status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Error description from the vendor body.
        message: String,
    },

    /// Vendor response was missing an expected field.
    #[error("malformed vendor response: {message}")]
    Malformed {
        /// What was missing or wrong.
        message: String,
    },

    /// Request payload was rejected locally before sending.
    #[error("{message}")]
    InvalidInput {
        /// Description.
        message: String,
    },
}

impl VendorError {
    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s == reqwest::StatusCode::TOO_MANY_REQUESTS || s.is_server_error()
                    })
            }
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            Self::NotConfigured { .. }
            | Self::Json(_)
            | Self::Malformed { .. }
            | Self::InvalidInput { .. } => false,
        }
    }

    /// Error category string for logging and metrics.
    pub fn category(&self) -> &'static str {
        match self {
            Self::NotConfigured { .. } => "config",
            Self::Http(_) => "network",
            Self::Json(_) | Self::Malformed { .. } => "parse",
            Self::Api { .. } => "api",
            Self::InvalidInput { .. } => "input",
        }
    }
}
