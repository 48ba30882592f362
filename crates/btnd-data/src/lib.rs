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

//! SQLite-backed cache store for the tracker metadata mirror.
//!
//! Two database files make up the store: `metadata.db` holds the catalog
//! (series, groups, torrent entries, file layouts) and `user.db` holds
//! quota, cursor, and account state. The user database is attached to
//! every connection so a single transaction can span both.
//!
//! Writes run under `BEGIN IMMEDIATE` and carry a change-stamp drawn from
//! a persisted counter; rows re-observed without change never advance
//! their stamp, so consumers can tail `updated_at` as a mutation feed.

mod catalog;
mod error;
mod pool;
mod schema;
mod store;
mod tx;

pub use catalog::{PageOutcome, TorrentFilter};
pub use error::{StoreError, StoreResult};
pub use store::CacheStore;
