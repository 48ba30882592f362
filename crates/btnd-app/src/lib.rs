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

//! Application bootstrap: wire the cache layout, configuration, store,
//! buckets, and gateway together, then supervise the scraper workers.

mod error;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use btnd_api::{Gateway, SiteCredentials, SiteUrls};
use btnd_config::{CacheLayout, Config};
use btnd_data::CacheStore;
use btnd_ratelimit::{ScheduledTokenBucket, TokenBucket};
use btnd_scrape::{BackfillOptions, BackfillScraper, FileLayoutScraper, TipScraper};
use tokio::task::JoinHandle;
use tracing::info;

pub use error::{AppError, AppResult};

/// Which workers to run.
#[derive(Debug, Clone, Copy)]
pub struct WorkerSelection {
    /// Run the full-catalog backfill pool.
    pub backfill: bool,
    /// Run the head-of-catalog tip worker.
    pub tip: bool,
    /// Run the file-layout worker.
    pub files: bool,
}

impl Default for WorkerSelection {
    fn default() -> Self {
        Self {
            backfill: true,
            tip: true,
            files: true,
        }
    }
}

/// Options for one daemon run.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Explicit cache directory; `~/.btn` when unset.
    pub cache_path: Option<PathBuf>,
    /// Workers to start.
    pub workers: WorkerSelection,
    /// Stop when the selected workers finish one pass instead of
    /// running until interrupted.
    pub once: bool,
}

/// Everything a run needs, wired once at startup.
struct AppContext {
    config: Config,
    layout: CacheLayout,
    store: CacheStore,
    gateway: Gateway,
}

impl AppContext {
    async fn build(cache_path: Option<PathBuf>) -> AppResult<Self> {
        let layout = CacheLayout::resolve(cache_path);
        layout
            .ensure_dirs()
            .map_err(AppError::config("layout.ensure_dirs"))?;
        let config = Config::load(&layout).map_err(AppError::config("config.load"))?;

        let store = CacheStore::open(
            &layout.metadata_db_path(),
            &layout.user_db_path(),
            16,
        )
        .await
        .map_err(AppError::store("store.open"))?;

        let key = config.key.clone().unwrap_or_default();
        let api_bucket = ScheduledTokenBucket::new(
            store.pool().clone(),
            key.clone(),
            i64::from(config.api_token_rate()),
            config.api_token_period() as f64,
        )
        .await
        .map_err(AppError::rate_limit("api_bucket.new"))?;
        let web_bucket = TokenBucket::new(
            store.pool().clone(),
            format!("web:{key}"),
            i64::from(config.token_rate()),
            config.token_period() as f64,
        )
        .await
        .map_err(AppError::rate_limit("web_bucket.new"))?;

        let credentials = SiteCredentials {
            auth: config.auth.clone(),
            authkey: config.authkey.clone(),
            passkey: config.passkey.clone(),
        };
        let gateway = Gateway::new(
            key,
            credentials,
            SiteUrls::default(),
            api_bucket,
            web_bucket,
        )
        .map_err(AppError::api("gateway.new"))?;

        Ok(Self {
            config,
            layout,
            store,
            gateway,
        })
    }
}

/// Run the mirror daemon until interrupted (or, with `once`, until the
/// selected workers finish a pass).
///
/// # Errors
///
/// Returns an error when bootstrap fails or a selected worker rejects
/// the configuration (missing credentials).
pub async fn run(options: RunOptions) -> AppResult<()> {
    let context = AppContext::build(options.cache_path).await?;
    info!(cache = %context.layout.root().display(), "mirror starting");

    // Workers that finish a pass in once mode; the file-layout worker
    // always runs as a background drain.
    let mut handles: Vec<JoinHandle<()>> = Vec::new();
    let mut background: Vec<JoinHandle<()>> = Vec::new();

    if options.workers.backfill {
        let scraper = Arc::new(
            BackfillScraper::new(
                context.gateway.clone(),
                context.store.clone(),
                &context.config,
                BackfillOptions {
                    once: options.once,
                    ..BackfillOptions::default()
                },
            )
            .map_err(AppError::scrape("backfill.new"))?,
        );
        handles.extend(scraper.spawn());
        info!("backfill workers started");
    }

    if options.workers.tip {
        let scraper = Arc::new(
            TipScraper::new(
                context.gateway.clone(),
                context.store.clone(),
                &context.config,
                options.once,
            )
            .map_err(AppError::scrape("tip.new"))?,
        );
        handles.push(scraper.spawn());
        info!("tip worker started");
    }

    if options.workers.files {
        let scraper = Arc::new(
            FileLayoutScraper::new(
                context.gateway.clone(),
                context.store.clone(),
                context.layout.clone(),
                &context.config,
                None::<Duration>,
            )
            .map_err(AppError::scrape("files.new"))?,
        );
        background.push(scraper.spawn());
        info!("file-layout worker started");
    }

    if options.once {
        for handle in handles {
            // A panic inside a worker is already logged by the runtime.
            let _ = handle.await;
        }
        for handle in background {
            handle.abort();
        }
        return Ok(());
    }

    tokio::signal::ctrl_c()
        .await
        .map_err(|source| AppError::Signal { source })?;
    info!("interrupt received, shutting down");
    for handle in handles.into_iter().chain(background) {
        handle.abort();
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bootstrap_creates_the_cache_layout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let context = AppContext::build(Some(dir.path().to_path_buf()))
            .await
            .expect("bootstrap");
        assert!(dir.path().join("metadata.db").exists());
        assert!(dir.path().join("user.db").exists());
        assert!(dir.path().join("torrents").is_dir());
        assert!(context.config.key.is_none());
    }

    #[tokio::test]
    async fn keyless_config_cannot_start_rpc_workers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = run(RunOptions {
            cache_path: Some(dir.path().to_path_buf()),
            workers: WorkerSelection {
                backfill: true,
                tip: false,
                files: false,
            },
            once: true,
        })
        .await;
        assert!(matches!(result, Err(AppError::Scrape { .. })));
    }
}
