//! Error taxonomy for remote communication.

use btnd_ratelimit::RateLimitError;
use thiserror::Error;

/// JSON-RPC error code the remote uses when the call quota is spent.
pub const CODE_CALL_LIMIT_EXCEEDED: i64 = -32002;

/// Result alias for gateway operations.
pub type ApiResult<T> = Result<T, ApiError>;

/// Errors raised by the API gateway.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The HTTP request could not be sent or the connection failed.
    #[error("http transport failed")]
    Transport {
        /// Operation identifier.
        operation: &'static str,
        /// Source HTTP client error.
        source: reqwest::Error,
    },
    /// The remote answered with a non-2xx status.
    #[error("remote returned http status {status}")]
    Http {
        /// HTTP status code.
        status: u16,
        /// Response body, for diagnostics.
        body: String,
    },
    /// The remote answered with a JSON-RPC error object.
    #[error("remote error {code}: {message}")]
    Remote {
        /// Error message from the remote.
        message: String,
        /// Numeric JSON-RPC error code.
        code: i64,
    },
    /// The response body was not the expected JSON shape.
    #[error("failed to parse remote payload: {detail}")]
    Parse {
        /// What was malformed.
        detail: String,
    },
    /// Non-blocking token acquisition found the bucket empty.
    #[error("api token unavailable")]
    WouldBlock,
    /// The durable rate limiter failed.
    #[error("rate limiter failed")]
    RateLimit {
        /// Source bucket error.
        source: RateLimitError,
    },
    /// A credential needed to build the request is not configured.
    #[error("missing required credential `{name}`")]
    MissingCredential {
        /// Name of the absent credential.
        name: &'static str,
    },
}

impl ApiError {
    /// Whether this error is the remote's call-limit signal.
    #[must_use]
    pub const fn is_call_limit(&self) -> bool {
        matches!(
            self,
            Self::Remote {
                code: CODE_CALL_LIMIT_EXCEEDED,
                ..
            }
        )
    }
}

impl From<RateLimitError> for ApiError {
    fn from(source: RateLimitError) -> Self {
        Self::RateLimit { source }
    }
}
