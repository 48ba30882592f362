//! File-layout scraper: fills in per-torrent file layouts on demand.
//!
//! Walks torrent rows that have no `file_info` yet, newest id first,
//! fetching each metafile through the gateway (one generic token per
//! fetch), decoding it, and persisting layout rows plus the raw bytes.
//! The working set is rebuilt every reset interval so rows added or
//! undeleted since the last scan are picked up.

use std::collections::{BinaryHeap, HashSet};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use btnd_api::Gateway;
use btnd_config::{CacheLayout, Config};
use btnd_data::CacheStore;
use btnd_metafile::parse_file_layout;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::error::{ScrapeError, ScrapeResult};

/// Default interval between working-set rebuilds, in seconds.
pub const DEFAULT_RESET_TIME: u64 = 3600;

const IDLE_DELAY: Duration = Duration::from_secs(1);
const ERROR_DELAY: Duration = Duration::from_secs(60);

struct ScanState {
    /// High-water `updated_at` from the previous scan; rows stamped
    /// after it are candidates.
    since: i64,
    queue: BinaryHeap<i64>,
    last_reset: Option<Instant>,
}

/// On-demand metafile fetcher and layout writer.
pub struct FileLayoutScraper {
    gateway: Gateway,
    store: CacheStore,
    layout: CacheLayout,
    store_raw: bool,
    reset_time: Duration,
    state: tokio::sync::Mutex<ScanState>,
    in_flight: std::sync::Mutex<HashSet<i64>>,
}

impl FileLayoutScraper {
    /// Build the scraper, validating the download credentials.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `authkey` or `passkey` is
    /// unset.
    pub fn new(
        gateway: Gateway,
        store: CacheStore,
        layout: CacheLayout,
        config: &Config,
        reset_time: Option<Duration>,
    ) -> ScrapeResult<Self> {
        config.require_authkey()?;
        config.require_passkey()?;
        Ok(Self {
            gateway,
            store,
            layout,
            store_raw: config.store_raw_torrent(),
            reset_time: reset_time.unwrap_or(Duration::from_secs(DEFAULT_RESET_TIME)),
            state: tokio::sync::Mutex::new(ScanState {
                since: -1,
                queue: BinaryHeap::new(),
                last_reset: None,
            }),
            in_flight: std::sync::Mutex::new(HashSet::new()),
        })
    }

    /// Perform one step: refresh the working set when due, then fill
    /// the highest-priority torrent. Returns the id processed, or
    /// `None` when the queue is empty.
    ///
    /// # Errors
    ///
    /// Returns an error when the scan, fetch, decode, or write fails.
    pub async fn step(&self) -> ScrapeResult<Option<i64>> {
        let id = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let reset_due = state
                .last_reset
                .is_none_or(|last| now.duration_since(last) > self.reset_time);
            if reset_due {
                state.since = -1;
                state.queue.clear();
                state.last_reset = Some(now);
            }

            for id in self.store.ids_missing_file_info(state.since).await? {
                state.queue.push(id);
            }
            if let Some(stamp) = self.store.max_torrent_stamp().await? {
                state.since = stamp;
            }
            state.queue.pop()
        };

        let Some(id) = id else {
            return Ok(None);
        };
        self.fill_one(id).await?;
        Ok(Some(id))
    }

    /// Fetch, decode, and persist the layout for one torrent.
    async fn fill_one(&self, id: i64) -> ScrapeResult<()> {
        {
            let mut in_flight = self.in_flight.lock().expect("in-flight lock");
            if !in_flight.insert(id) {
                debug!(id, "metafile fetch already in flight");
                return Ok(());
            }
        }
        let result = self.fetch_and_store(id).await;
        self.in_flight.lock().expect("in-flight lock").remove(&id);
        result
    }

    async fn fetch_and_store(&self, id: i64) -> ScrapeResult<()> {
        let Some(entry) = self.store.torrent_entry(id).await? else {
            warn!(id, "torrent disappeared before its metafile was fetched");
            return Ok(());
        };
        debug!(id, release = %entry.release_name, "fetching raw metafile");

        let raw = self.gateway.fetch_raw_torrent(id).await?;
        let files =
            parse_file_layout(&raw).map_err(|source| ScrapeError::Metafile { id, source })?;

        let mut raw_cached = false;
        if self.store_raw {
            let path = self.layout.torrent_path(id);
            write_raw(&path, &raw).await?;
            raw_cached = true;
        }
        self.store.store_file_layout(id, &files, raw_cached).await?;
        info!(id, files = files.len(), "file layout cached");
        Ok(())
    }

    /// Worker loop: drain the queue, idle briefly when it is empty,
    /// sleep longer after errors.
    pub async fn run(self: Arc<Self>) {
        loop {
            match self.step().await {
                Ok(Some(_)) => {}
                Ok(None) => tokio::time::sleep(IDLE_DELAY).await,
                Err(err) => {
                    error!(error = %err, "file-layout step failed");
                    tokio::time::sleep(ERROR_DELAY).await;
                }
            }
        }
    }

    /// Spawn the single file-layout worker.
    #[must_use]
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

async fn write_raw(path: &Path, raw: &[u8]) -> ScrapeResult<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|source| ScrapeError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
    }
    tokio::fs::write(path, raw)
        .await
        .map_err(|source| ScrapeError::Io {
            path: path.to_path_buf(),
            source,
        })
}
