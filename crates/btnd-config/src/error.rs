//! Error types for configuration operations.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Primary error type for configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("failed to read configuration file")]
    Io {
        /// Path that failed to read.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
    /// The configuration file is not valid YAML.
    #[error("failed to parse configuration file")]
    Parse {
        /// Path that failed to parse.
        path: PathBuf,
        /// Source YAML error.
        source: serde_yaml::Error,
    },
    /// A credential required by the requested operation is not configured.
    #[error("missing required credential `{name}`")]
    MissingCredential {
        /// Name of the configuration key that is absent.
        name: &'static str,
    },
    /// The cache directory could not be created.
    #[error("failed to create cache directory")]
    CacheDir {
        /// Directory that could not be created.
        path: PathBuf,
        /// Source IO error.
        source: io::Error,
    },
}

/// Convenience alias for configuration results.
pub type ConfigResult<T> = Result<T, ConfigError>;
