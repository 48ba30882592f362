#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Configuration for the mirror: `config.yaml` loading with documented
//! defaults, credential accessors, and the on-disk cache layout.

mod error;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use error::{ConfigError, ConfigResult};

/// Default generic-bucket refill count.
pub const DEFAULT_TOKEN_RATE: u32 = 20;
/// Default generic-bucket refill period in seconds.
pub const DEFAULT_TOKEN_PERIOD: u64 = 100;
/// Default API-bucket quota.
pub const DEFAULT_API_TOKEN_RATE: u32 = 150;
/// Default API-bucket sliding window in seconds.
pub const DEFAULT_API_TOKEN_PERIOD: u64 = 3600;

const CONFIG_FILE: &str = "config.yaml";
const METADATA_DB_FILE: &str = "metadata.db";
const USER_DB_FILE: &str = "user.db";
const TORRENTS_DIR: &str = "torrents";

/// Options recognised in `config.yaml`. Every key is optional; accessors
/// apply the documented defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// API key sent as the first RPC parameter.
    pub key: Option<String>,
    /// Session credential used when building the feed URL.
    pub auth: Option<String>,
    /// Tracker credential used in download URLs.
    pub authkey: Option<String>,
    /// Tracker credential used in download and announce URLs.
    pub passkey: Option<String>,
    /// Generic bucket refill count.
    pub token_rate: Option<u32>,
    /// Generic bucket refill period in seconds.
    pub token_period: Option<u64>,
    /// API bucket quota.
    pub api_token_rate: Option<u32>,
    /// API bucket sliding window in seconds.
    pub api_token_period: Option<u64>,
    /// Whether metafile bytes are persisted to disk.
    pub store_raw_torrent: Option<bool>,
}

impl Config {
    /// Load the configuration from the given cache layout.
    ///
    /// A missing file yields the empty configuration; every option then
    /// resolves to its default.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load(layout: &CacheLayout) -> ConfigResult<Self> {
        let path = layout.config_path();
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(ConfigError::Io {
                    path,
                    source: err,
                });
            }
        };
        serde_yaml::from_str(&text).map_err(|err| ConfigError::Parse { path, source: err })
    }

    /// Generic bucket refill count, defaulted.
    #[must_use]
    pub fn token_rate(&self) -> u32 {
        self.token_rate.unwrap_or(DEFAULT_TOKEN_RATE)
    }

    /// Generic bucket refill period in seconds, defaulted.
    #[must_use]
    pub fn token_period(&self) -> u64 {
        self.token_period.unwrap_or(DEFAULT_TOKEN_PERIOD)
    }

    /// API bucket quota, defaulted.
    #[must_use]
    pub fn api_token_rate(&self) -> u32 {
        self.api_token_rate.unwrap_or(DEFAULT_API_TOKEN_RATE)
    }

    /// API bucket sliding window in seconds, defaulted.
    #[must_use]
    pub fn api_token_period(&self) -> u64 {
        self.api_token_period.unwrap_or(DEFAULT_API_TOKEN_PERIOD)
    }

    /// Whether metafile bytes are persisted to disk. Defaults to true so
    /// a freshly initialised cache behaves like a mirror.
    #[must_use]
    pub fn store_raw_torrent(&self) -> bool {
        self.store_raw_torrent.unwrap_or(true)
    }

    /// The API key, required by every RPC scraper.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] when unset.
    pub fn require_key(&self) -> ConfigResult<&str> {
        self.key
            .as_deref()
            .ok_or(ConfigError::MissingCredential { name: "key" })
    }

    /// The session credential, required by the feed probe.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] when unset.
    pub fn require_auth(&self) -> ConfigResult<&str> {
        self.auth
            .as_deref()
            .ok_or(ConfigError::MissingCredential { name: "auth" })
    }

    /// The authkey credential, required for download URLs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] when unset.
    pub fn require_authkey(&self) -> ConfigResult<&str> {
        self.authkey
            .as_deref()
            .ok_or(ConfigError::MissingCredential { name: "authkey" })
    }

    /// The passkey credential, required for download and announce URLs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingCredential`] when unset.
    pub fn require_passkey(&self) -> ConfigResult<&str> {
        self.passkey
            .as_deref()
            .ok_or(ConfigError::MissingCredential { name: "passkey" })
    }
}

/// On-disk layout of the cache directory.
#[derive(Debug, Clone)]
pub struct CacheLayout {
    root: PathBuf,
}

impl CacheLayout {
    /// Layout rooted at an explicit directory.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Layout rooted at the default `~/.btn`, or the explicit directory
    /// when one is given.
    #[must_use]
    pub fn resolve(cache_path: Option<PathBuf>) -> Self {
        let root = cache_path.unwrap_or_else(|| {
            let home = std::env::var_os("HOME").map_or_else(|| PathBuf::from("."), PathBuf::from);
            home.join(".btn")
        });
        Self { root }
    }

    /// Root of the cache directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of `config.yaml`.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.root.join(CONFIG_FILE)
    }

    /// Path of the catalog database.
    #[must_use]
    pub fn metadata_db_path(&self) -> PathBuf {
        self.root.join(METADATA_DB_FILE)
    }

    /// Path of the user database (buckets, cursors, account state).
    #[must_use]
    pub fn user_db_path(&self) -> PathBuf {
        self.root.join(USER_DB_FILE)
    }

    /// Directory holding cached raw metafiles.
    #[must_use]
    pub fn torrents_dir(&self) -> PathBuf {
        self.root.join(TORRENTS_DIR)
    }

    /// Path of one cached raw metafile.
    #[must_use]
    pub fn torrent_path(&self, id: i64) -> PathBuf {
        self.torrents_dir().join(format!("{id}.torrent"))
    }

    /// Create the cache root and the metafile directory.
    ///
    /// # Errors
    ///
    /// Returns an error when a directory cannot be created.
    pub fn ensure_dirs(&self) -> ConfigResult<()> {
        for dir in [self.root.clone(), self.torrents_dir()] {
            std::fs::create_dir_all(&dir).map_err(|err| ConfigError::CacheDir {
                path: dir.clone(),
                source: err,
            })?;
        }
        Ok(())
    }
}
