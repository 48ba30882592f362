//! Error types for the scraper workers.

use std::path::PathBuf;

use thiserror::Error;

/// Result alias for scraper operations.
pub type ScrapeResult<T> = Result<T, ScrapeError>;

/// Errors raised by scraper workers. Each worker's outer loop catches
/// these at the step boundary, logs, and retries after a delay.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// A required configuration value is missing.
    #[error("scraper configuration invalid")]
    Config {
        /// Source configuration error.
        source: btnd_config::ConfigError,
    },
    /// Remote communication failed.
    #[error("remote api operation failed")]
    Api {
        /// Source gateway error.
        source: btnd_api::ApiError,
    },
    /// The cache store failed.
    #[error("cache store operation failed")]
    Store {
        /// Source store error.
        source: btnd_data::StoreError,
    },
    /// The durable rate limiter failed.
    #[error("rate limiter failed")]
    RateLimit {
        /// Source bucket error.
        source: btnd_ratelimit::RateLimitError,
    },
    /// A fetched metafile did not decode.
    #[error("metafile for torrent {id} did not decode")]
    Metafile {
        /// Torrent whose metafile is malformed.
        id: i64,
        /// Source codec error.
        source: btnd_metafile::MetafileError,
    },
    /// Writing the raw metafile to disk failed.
    #[error("failed to write raw metafile")]
    Io {
        /// Path that failed.
        path: PathBuf,
        /// Source IO error.
        source: std::io::Error,
    },
}

impl From<btnd_config::ConfigError> for ScrapeError {
    fn from(source: btnd_config::ConfigError) -> Self {
        Self::Config { source }
    }
}

impl From<btnd_api::ApiError> for ScrapeError {
    fn from(source: btnd_api::ApiError) -> Self {
        Self::Api { source }
    }
}

impl From<btnd_data::StoreError> for ScrapeError {
    fn from(source: btnd_data::StoreError) -> Self {
        Self::Store { source }
    }
}

impl From<btnd_ratelimit::RateLimitError> for ScrapeError {
    fn from(source: btnd_ratelimit::RateLimitError) -> Self {
        Self::RateLimit { source }
    }
}
