//! Tip scraper: keeps the head of the catalog fresh at low token cost.
//!
//! A cheap feed probe (one generic token) decides whether a paginated
//! pass is needed at all. When it is, the pass walks pages from offset
//! zero, requiring each page to overlap the previous one; a missed
//! overlap (the head moved under us) backs the cursor off by half.

use std::sync::Arc;
use std::time::Duration;

use btnd_api::{CallOptions, Gateway, UNBOUNDED_RESULTS};
use btnd_config::Config;
use btnd_data::CacheStore;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::ScrapeResult;

/// Cursor key: last head id fully absorbed by a completed pass.
pub const KEY_LAST: &str = "tip_last_scraped";
/// Session key: offset of the in-progress pass.
pub const KEY_OFFSET: &str = "tip_scrape_offset";
/// Session key: oldest id absorbed by the in-progress pass.
pub const KEY_OLDEST: &str = "tip_scrape_oldest";
/// Session key: newest id seen by the in-progress pass.
pub const KEY_NEWEST: &str = "tip_scrape_newest";

/// Cached head ids compared against the feed.
const HEAD_COMPARE_LIMIT: i64 = 1000;
const IDLE_DELAY: Duration = Duration::from_secs(60);

/// Rolling state of one paginated pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TipSession {
    pub(crate) offset: i64,
    pub(crate) oldest: Option<i64>,
    pub(crate) newest: Option<i64>,
    pub(crate) last_scraped: Option<i64>,
}

/// Where a pass stands after absorbing one page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TipUpdate {
    /// The pass completed; record the newest id and clear the session.
    Done {
        /// Head id the catalog is now current to.
        newest: Option<i64>,
    },
    /// The pass continues with an adjusted cursor.
    Continue {
        /// Next page offset.
        offset: i64,
        /// Oldest id absorbed so far.
        oldest: Option<i64>,
        /// Newest id seen so far.
        newest: Option<i64>,
    },
}

/// Advance the pass cursor after one page of descending `ids`.
pub(crate) fn update_session(session: TipSession, ids: &[i64], is_end: bool) -> TipUpdate {
    let (Some(first), Some(last)) = (ids.first().copied(), ids.last().copied()) else {
        // An empty page only happens past the end of the catalog.
        return TipUpdate::Done {
            newest: session.newest,
        };
    };

    let newest = match session.newest {
        Some(newest) if first < newest => Some(newest),
        _ => Some(first),
    };

    let good_overlap = session.oldest.is_none_or(|oldest| first >= oldest);
    if good_overlap {
        if is_end {
            info!("reached the oldest torrent entry");
            return TipUpdate::Done { newest };
        }
        if session.last_scraped.is_some_and(|scraped| last <= scraped) {
            info!(current_to = ?newest, "caught up");
            return TipUpdate::Done { newest };
        }
        let oldest = match session.oldest {
            Some(oldest) if last >= oldest => Some(oldest),
            _ => Some(last),
        };
        TipUpdate::Continue {
            offset: session.offset + ids.len() as i64 - 1,
            oldest,
            newest,
        }
    } else {
        info!("missed page overlap, backing off");
        let offset = session.offset - ids.len() as i64 / 2;
        if offset <= 0 {
            TipUpdate::Continue {
                offset: 0,
                oldest: None,
                newest,
            }
        } else {
            TipUpdate::Continue {
                offset,
                oldest: session.oldest,
                newest,
            }
        }
    }
}

/// Short-horizon head reconciliation worker.
pub struct TipScraper {
    gateway: Gateway,
    store: CacheStore,
    once: bool,
}

impl TipScraper {
    /// Build the scraper, validating every credential the feed probe
    /// needs.
    ///
    /// # Errors
    ///
    /// Returns a configuration error when `key`, `auth`, `authkey`, or
    /// `passkey` is unset.
    pub fn new(
        gateway: Gateway,
        store: CacheStore,
        config: &Config,
        once: bool,
    ) -> ScrapeResult<Self> {
        config.require_key()?;
        config.require_auth()?;
        config.require_authkey()?;
        config.require_passkey()?;
        Ok(Self {
            gateway,
            store,
            once,
        })
    }

    /// The account id, from the cache when present, otherwise fetched
    /// and cached.
    async fn user_id(&self) -> ScrapeResult<i64> {
        if let Some(user) = self.store.user_info().await? {
            return Ok(user.id);
        }
        let user = self.gateway.user_info(CallOptions::default()).await?;
        self.store.replace_user_info(&user).await?;
        Ok(user.id)
    }

    /// Perform one tip step. Returns `true` when the head is current
    /// and the worker should idle.
    ///
    /// # Errors
    ///
    /// Returns an error when the feed, the remote, or the store fails.
    pub async fn scrape_step(&self) -> ScrapeResult<bool> {
        let session_offset = self.store.get_global_i64(KEY_OFFSET).await?;
        let last_scraped = self.store.get_global_i64(KEY_LAST).await?;

        let offset = match session_offset {
            Some(offset) => offset,
            None => {
                debug!("no current scrape");
                let db_ids = self.store.top_live_ids(HEAD_COMPARE_LIMIT).await?;
                let feed_ids = self.gateway.feed_ids(self.user_id().await?).await?;
                let db_head: Vec<i64> = db_ids.iter().take(feed_ids.len()).copied().collect();
                if !feed_ids.is_empty()
                    && feed_ids == db_head
                    && feed_ids.first().copied() == last_scraped
                {
                    info!(latest = ?last_scraped, "feed has no changes");
                    return Ok(true);
                }
                let missing: Vec<i64> = feed_ids
                    .iter()
                    .filter(|id| !db_head.contains(id))
                    .copied()
                    .collect();
                if !missing.is_empty() {
                    debug!(?missing, "in feed but not in cache");
                }
                let stale: Vec<i64> = db_head
                    .iter()
                    .filter(|id| !feed_ids.contains(id))
                    .copied()
                    .collect();
                if !stale.is_empty() {
                    debug!(?stale, "in cache but not in feed");
                }
                0
            }
        };

        info!(offset, "tip scrape");
        let page = self
            .gateway
            .get_torrents(json!({}), UNBOUNDED_RESULTS, offset, CallOptions::default())
            .await?;

        let mut ids: Vec<i64> = page.torrents.iter().map(|row| row.entry.id).collect();
        ids.sort_unstable_by_key(|id| std::cmp::Reverse(*id));
        let page_len = i64::try_from(ids.len()).unwrap_or(i64::MAX);
        let is_end = offset + page_len >= page.results;

        let session = TipSession {
            offset,
            oldest: self.store.get_global_i64(KEY_OLDEST).await?,
            newest: self.store.get_global_i64(KEY_NEWEST).await?,
            last_scraped,
        };
        let update = update_session(session, &ids, is_end);
        let (done, cursor_updates) = match update {
            TipUpdate::Done { newest } => (
                true,
                vec![
                    (KEY_LAST.to_string(), newest.map(|id| id.to_string())),
                    (KEY_OFFSET.to_string(), None),
                    (KEY_OLDEST.to_string(), None),
                    (KEY_NEWEST.to_string(), None),
                ],
            ),
            TipUpdate::Continue {
                offset,
                oldest,
                newest,
            } => (
                false,
                vec![
                    (KEY_OFFSET.to_string(), Some(offset.to_string())),
                    (KEY_OLDEST.to_string(), oldest.map(|id| id.to_string())),
                    (KEY_NEWEST.to_string(), newest.map(|id| id.to_string())),
                ],
            ),
        };
        self.store
            .apply_scrape_page(offset, &page, &cursor_updates)
            .await?;
        Ok(done)
    }

    /// Worker loop: pass until current, idle, poll again. Errors are
    /// logged and treated as pass completion.
    pub async fn run(self: Arc<Self>) {
        loop {
            let done = match self.scrape_step().await {
                Ok(done) => done,
                Err(err) => {
                    error!(error = %err, "tip scrape step failed");
                    true
                }
            };
            if done {
                if self.once {
                    break;
                }
                tokio::time::sleep(IDLE_DELAY).await;
            }
        }
        debug!("tip scraper shutting down");
    }

    /// Spawn the single tip worker.
    #[must_use]
    pub fn spawn(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(
        offset: i64,
        oldest: Option<i64>,
        newest: Option<i64>,
        last_scraped: Option<i64>,
    ) -> TipSession {
        TipSession {
            offset,
            oldest,
            newest,
            last_scraped,
        }
    }

    #[test]
    fn fresh_pass_advances_with_page_overlap() {
        let update = update_session(session(0, None, None, Some(50)), &[100, 99, 98], false);
        assert_eq!(
            update,
            TipUpdate::Continue {
                offset: 2,
                oldest: Some(98),
                newest: Some(100),
            }
        );
    }

    #[test]
    fn end_of_catalog_completes_the_pass() {
        let update = update_session(session(0, None, None, None), &[10, 9, 8], true);
        assert_eq!(update, TipUpdate::Done { newest: Some(10) });
    }

    #[test]
    fn catching_up_to_the_previous_head_completes_the_pass() {
        let update = update_session(session(2, Some(98), Some(100), Some(99)), &[98, 97], false);
        assert_eq!(update, TipUpdate::Done { newest: Some(100) });
    }

    #[test]
    fn missed_overlap_backs_the_cursor_off_by_half() {
        let update = update_session(
            session(10, Some(90), Some(100), None),
            &[80, 79, 78, 77],
            false,
        );
        assert_eq!(
            update,
            TipUpdate::Continue {
                offset: 8,
                oldest: Some(90),
                newest: Some(100),
            }
        );
    }

    #[test]
    fn backoff_to_zero_resets_the_oldest_marker() {
        let update = update_session(session(1, Some(90), Some(100), None), &[80, 79], false);
        assert_eq!(
            update,
            TipUpdate::Continue {
                offset: 0,
                oldest: None,
                newest: Some(100),
            }
        );
    }

    #[test]
    fn newest_never_regresses_within_a_pass() {
        let update = update_session(session(4, Some(96), Some(100), None), &[97, 96, 95], false);
        match update {
            TipUpdate::Continue { newest, .. } => assert_eq!(newest, Some(100)),
            TipUpdate::Done { .. } => panic!("pass should continue"),
        }
    }

    #[test]
    fn empty_page_completes_the_pass() {
        let update = update_session(session(12, Some(5), Some(100), None), &[], true);
        assert_eq!(update, TipUpdate::Done { newest: Some(100) });
    }
}
