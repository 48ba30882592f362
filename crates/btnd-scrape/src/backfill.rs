//! Backfill scraper: long-horizon reconciliation of the whole catalog.
//!
//! Workers step independently: each non-blockingly reserves one API
//! token, atomically claims the next page offset (pages overlap by one
//! id so deletion detection never misses a boundary), fetches the page
//! with the reserved token, and applies it contiguously. When the
//! bucket runs dry the worker backs off and lets the budget refill.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use btnd_api::{ApiError, CallOptions, Gateway, UNBOUNDED_RESULTS};
use btnd_config::Config;
use btnd_data::CacheStore;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::ScrapeResult;

/// Cursor key: offset the next worker should fetch.
pub const KEY_OFFSET: &str = "scrape_next_offset";
/// Cursor key: total result count the remote last claimed.
pub const KEY_RESULTS: &str = "scrape_last_results";

/// Rows requested per page. The cursor advances by one less, so
/// adjacent pages always share one id.
pub const BLOCK_SIZE: i64 = 1000;

const IDLE_DELAY: Duration = Duration::from_secs(60);

/// What one backfill step accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A page was absorbed; step again immediately.
    Progress,
    /// No budget (or the remote said stop); idle before retrying.
    Backoff,
}

/// Tunables for the backfill scraper.
#[derive(Debug, Clone)]
pub struct BackfillOptions {
    /// Tokens to leave in the API bucket for interactive callers.
    pub target_tokens: i64,
    /// Concurrent worker tasks.
    pub num_workers: usize,
    /// Stop once the budget is spent instead of idling forever.
    pub once: bool,
    /// Page size; tests shrink this to exercise the stride.
    pub block_size: i64,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self {
            target_tokens: 0,
            num_workers: 10,
            once: false,
            block_size: BLOCK_SIZE,
        }
    }
}

/// Long-horizon catalog reconciliation worker pool.
pub struct BackfillScraper {
    gateway: Gateway,
    store: CacheStore,
    options: BackfillOptions,
    /// Bucket level seen by the previous `once`-mode step; a rise means
    /// the window rolled over and a one-shot run should stop.
    last_tokens: Mutex<Option<f64>>,
}

impl BackfillScraper {
    /// Build the scraper, validating that the API key is configured.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `key` is unset.
    pub fn new(
        gateway: Gateway,
        store: CacheStore,
        config: &Config,
        options: BackfillOptions,
    ) -> ScrapeResult<Self> {
        config.require_key()?;
        Ok(Self {
            gateway,
            store,
            options,
            last_tokens: Mutex::new(None),
        })
    }

    /// Perform one backfill step.
    ///
    /// # Errors
    ///
    /// Returns an error when the store or remote fails in a way the
    /// step cannot classify as ordinary budget exhaustion.
    pub async fn update_step(&self) -> ScrapeResult<StepOutcome> {
        if self.options.once {
            let level = self.gateway.api_bucket().peek().await?;
            let mut seen = self.last_tokens.lock().expect("token level lock");
            if let Some(previous) = *seen {
                if level.tokens > previous {
                    info!("tokens refilled, stopping one-shot backfill");
                    return Ok(StepOutcome::Backoff);
                }
            }
            *seen = Some(level.tokens);
        }

        let grant = self
            .gateway
            .api_bucket()
            .try_consume(1, self.options.target_tokens)
            .await?;
        if !grant.granted {
            return Ok(StepOutcome::Backoff);
        }

        let offset = self
            .store
            .reserve_scrape_offset(KEY_OFFSET, KEY_RESULTS, self.options.block_size)
            .await?;
        info!(offset, tokens_left = grant.remaining, "backfill update");

        let page = match self
            .gateway
            .get_torrents(json!({}), UNBOUNDED_RESULTS, offset, CallOptions::reserved())
            .await
        {
            Ok(page) => page,
            Err(ApiError::WouldBlock) => {
                info!("out of tokens, backing off");
                return Ok(StepOutcome::Backoff);
            }
            Err(err) if err.is_call_limit() => {
                debug!("call limit exceeded, backing off");
                return Ok(StepOutcome::Backoff);
            }
            Err(err) => return Err(err.into()),
        };

        self.store
            .apply_scrape_page(
                offset,
                &page,
                &[(KEY_RESULTS.to_string(), Some(page.results.to_string()))],
            )
            .await?;
        Ok(StepOutcome::Progress)
    }

    /// Worker loop: step until backoff, then idle (or stop in `once`
    /// mode). Errors are logged and treated as backoff.
    pub async fn run(self: Arc<Self>) {
        loop {
            let outcome = match self.update_step().await {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(error = %err, "backfill step failed");
                    StepOutcome::Backoff
                }
            };
            if outcome == StepOutcome::Backoff {
                if self.options.once {
                    break;
                }
                tokio::time::sleep(IDLE_DELAY).await;
            }
        }
        debug!("backfill worker shutting down");
    }

    /// Spawn the configured number of worker tasks.
    #[must_use]
    pub fn spawn(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.options.num_workers)
            .map(|_| {
                let worker = Arc::clone(self);
                tokio::spawn(worker.run())
            })
            .collect()
    }
}
