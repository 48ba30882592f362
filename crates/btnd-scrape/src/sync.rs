//! One-shot fetch-and-cache operations: explicit id lookups, account
//! refresh, and snatch-history synchronisation.
//!
//! These are the paths a caller takes when it wants one specific answer
//! now, as opposed to the workers' continuous reconciliation. Every
//! fetch lands in the cache so later reads are local.

use btnd_api::{CallOptions, Gateway, UNBOUNDED_RESULTS};
use btnd_data::CacheStore;
use btnd_model::{CatalogTorrent, UserInfo};
use tracing::info;

use crate::error::ScrapeResult;

/// Fetch one torrent by id from the remote and cache it. Returns `None`
/// when the remote does not know the id.
///
/// # Errors
///
/// Returns an error when the remote or the store fails.
pub async fn fetch_torrent_by_id(
    gateway: &Gateway,
    store: &CacheStore,
    id: i64,
) -> ScrapeResult<Option<CatalogTorrent>> {
    let Some(row) = gateway
        .get_torrent_by_id(id, CallOptions::default())
        .await?
    else {
        return Ok(None);
    };
    store.upsert_torrents(std::slice::from_ref(&row)).await?;
    Ok(Some(row))
}

/// Fetch the account singleton and replace the cached copy.
///
/// # Errors
///
/// Returns an error when the remote or the store fails.
pub async fn refresh_user_info(gateway: &Gateway, store: &CacheStore) -> ScrapeResult<UserInfo> {
    let user = gateway.user_info(CallOptions::default()).await?;
    store.replace_user_info(&user).await?;
    Ok(user)
}

/// Walk the whole snatch history and upsert every page. Returns the
/// number of snatch rows observed.
///
/// # Errors
///
/// Returns an error when the remote or the store fails.
pub async fn sync_snatchlist(gateway: &Gateway, store: &CacheStore) -> ScrapeResult<usize> {
    let mut offset = 0;
    let mut observed = 0;
    loop {
        let page = gateway
            .get_user_snatchlist(UNBOUNDED_RESULTS, offset, CallOptions::default())
            .await?;
        let page_len = i64::try_from(page.snatches.len()).unwrap_or(i64::MAX);
        observed += page.snatches.len();
        store.upsert_snatches(&page.snatches).await?;
        if page_len == 0 || offset + page_len >= page.results {
            break;
        }
        offset += page_len;
    }
    info!(observed, "snatch history synchronised");
    Ok(observed)
}
