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

//! Reconciliation workers for the metadata mirror.
//!
//! Three cooperating scrapers share the cache store and the durable
//! token buckets. The backfill scraper pages through the entire catalog
//! whenever quota permits; the tip scraper keeps the head fresh with a
//! cheap feed probe and short paginated passes; the file-layout scraper
//! fills in per-torrent file layouts by fetching and decoding
//! metafiles. There is no coordinator: every worker steps against
//! durable cursors, so restarts resume exactly where they left off.

mod backfill;
mod error;
mod files;
mod sync;
mod tip;

pub use backfill::{
    BLOCK_SIZE, BackfillOptions, BackfillScraper, KEY_OFFSET, KEY_RESULTS, StepOutcome,
};
pub use error::{ScrapeError, ScrapeResult};
pub use files::{DEFAULT_RESET_TIME, FileLayoutScraper};
pub use sync::{fetch_torrent_by_id, refresh_user_info, sync_snatchlist};
pub use tip::{
    KEY_LAST as TIP_KEY_LAST, KEY_NEWEST as TIP_KEY_NEWEST, KEY_OFFSET as TIP_KEY_OFFSET,
    KEY_OLDEST as TIP_KEY_OLDEST, TipScraper,
};
