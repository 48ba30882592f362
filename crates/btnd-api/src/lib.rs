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

//! Gateway to the remote tracker: JSON-RPC 2.0 over HTTPS with durable
//! token accounting, plus the plain-HTTP surfaces (metafile downloads,
//! the recent-uploads feed) and the URL builders they share.
//!
//! The gateway draws every RPC from the sliding-window API bucket and
//! every plain fetch from the generic bucket. When the remote reports a
//! quota breach it rewrites the API bucket to the remote's window, so
//! the budgets converge on the remote's own accounting.

mod decode;
mod error;
mod gateway;
mod urls;

pub use decode::{
    feed_ids_from_xml, search_page_from_json, snatch_from_json, snatch_page_from_json,
    torrent_from_json, user_info_from_json,
};
pub use error::{ApiError, ApiResult, CODE_CALL_LIMIT_EXCEEDED};
pub use gateway::{CallOptions, Gateway, SiteCredentials, UNBOUNDED_RESULTS};
pub use urls::SiteUrls;
