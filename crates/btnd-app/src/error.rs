//! Application-level errors for bootstrap and supervision.

use thiserror::Error;

/// Result alias for application operations.
pub type AppResult<T> = Result<T, AppError>;

/// Application-level error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Configuration loading or validation failed.
    #[error("configuration failed")]
    Config {
        /// Operation identifier.
        operation: &'static str,
        /// Source configuration error.
        source: btnd_config::ConfigError,
    },
    /// The cache store could not be opened.
    #[error("cache store failed")]
    Store {
        /// Operation identifier.
        operation: &'static str,
        /// Source store error.
        source: btnd_data::StoreError,
    },
    /// The durable rate limiter could not be initialised.
    #[error("rate limiter failed")]
    RateLimit {
        /// Operation identifier.
        operation: &'static str,
        /// Source bucket error.
        source: btnd_ratelimit::RateLimitError,
    },
    /// The API gateway could not be built.
    #[error("api gateway failed")]
    Api {
        /// Operation identifier.
        operation: &'static str,
        /// Source gateway error.
        source: btnd_api::ApiError,
    },
    /// A scraper rejected its configuration.
    #[error("scraper failed")]
    Scrape {
        /// Operation identifier.
        operation: &'static str,
        /// Source scraper error.
        source: btnd_scrape::ScrapeError,
    },
    /// Waiting for shutdown failed.
    #[error("shutdown signal failed")]
    Signal {
        /// Source IO error.
        source: std::io::Error,
    },
}

impl AppError {
    pub(crate) fn config(operation: &'static str) -> impl FnOnce(btnd_config::ConfigError) -> Self {
        move |source| Self::Config { operation, source }
    }

    pub(crate) fn store(operation: &'static str) -> impl FnOnce(btnd_data::StoreError) -> Self {
        move |source| Self::Store { operation, source }
    }

    pub(crate) fn rate_limit(
        operation: &'static str,
    ) -> impl FnOnce(btnd_ratelimit::RateLimitError) -> Self {
        move |source| Self::RateLimit { operation, source }
    }

    pub(crate) fn api(operation: &'static str) -> impl FnOnce(btnd_api::ApiError) -> Self {
        move |source| Self::Api { operation, source }
    }

    pub(crate) fn scrape(operation: &'static str) -> impl FnOnce(btnd_scrape::ScrapeError) -> Self {
        move |source| Self::Scrape { operation, source }
    }
}
