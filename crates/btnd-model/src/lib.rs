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

//! Entity value types shared across the mirror: the catalog graph
//! (series, release groups, torrent entries), per-torrent file layouts,
//! the account singleton, snatch history, and the change-feed records
//! downstream consumers tail.
//!
//! All entities are plain values keyed by the remote's integer
//! identifiers. The cache store owns persistence; decoders in the API
//! gateway produce these values and the store consumes them.

use serde::{Deserialize, Serialize};

/// Seconds an Episode snatch must seed to satisfy tracker rules.
pub const EPISODE_SEED_TIME: i64 = 24 * 3600;
/// Upload/download ratio that satisfies tracker rules for an Episode.
pub const EPISODE_SEED_RATIO: f64 = 1.0;
/// Seconds a Season snatch must seed to satisfy tracker rules.
pub const SEASON_SEED_TIME: i64 = 120 * 3600;
/// Upload/download ratio that satisfies tracker rules for a Season.
pub const SEASON_SEED_RATIO: f64 = 1.0;
/// Minimum completed fraction for a snatch to count on the history.
pub const TORRENT_HISTORY_FRACTION: f64 = 0.1;

/// A show in the remote catalog, with its external cross-references.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Series {
    /// Remote series identifier.
    pub id: i64,
    /// IMDb cross-reference, when the remote knows it.
    pub imdb_id: Option<String>,
    /// Display name.
    pub name: Option<String>,
    /// Banner image URL.
    pub banner: Option<String>,
    /// Poster image URL.
    pub poster: Option<String>,
    /// TVDB cross-reference.
    pub tvdb_id: Option<i64>,
    /// TVRage cross-reference.
    pub tvrage_id: Option<i64>,
    /// Trailer URL.
    pub youtube_trailer: Option<String>,
}

/// Release container category assigned by the remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupCategory {
    /// A single episode release.
    Episode,
    /// A full-season release.
    Season,
    /// A category this client has no special handling for.
    Other(String),
}

impl GroupCategory {
    /// Parse the remote's category label.
    #[must_use]
    pub fn from_label(label: &str) -> Self {
        match label {
            "Episode" => Self::Episode,
            "Season" => Self::Season,
            other => Self::Other(other.to_string()),
        }
    }

    /// The remote's label for this category.
    #[must_use]
    pub fn as_label(&self) -> &str {
        match self {
            Self::Episode => "Episode",
            Self::Season => "Season",
            Self::Other(label) => label,
        }
    }
}

/// A release group under a [`Series`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group {
    /// Remote group identifier.
    pub id: i64,
    /// Category label assigned by the remote.
    pub category: GroupCategory,
    /// Group display name (e.g. `S03E05` or `Season 3`).
    pub name: String,
    /// Owning series identifier.
    pub series_id: i64,
}

/// A specific upload under a [`Group`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentEntry {
    /// Remote torrent identifier.
    pub id: i64,
    /// Owning group identifier.
    pub group_id: i64,
    /// 20-byte info hash as uppercase hex.
    pub info_hash: String,
    /// Video codec label.
    pub codec: String,
    /// Container label.
    pub container: String,
    /// Origin label (e.g. scene or internal).
    pub origin: String,
    /// Resolution label.
    pub resolution: String,
    /// Source label (e.g. HDTV, WEB).
    pub source: String,
    /// Full release name.
    pub release_name: String,
    /// Payload size in bytes.
    pub size: i64,
    /// Upload instant, seconds since epoch.
    pub time: i64,
    /// Seeder count at last observation.
    pub seeders: i64,
    /// Leecher count at last observation.
    pub leechers: i64,
    /// Snatch count at last observation.
    pub snatched: i64,
    /// Whether the raw metafile is cached on disk with file rows present.
    pub raw_torrent_cached: bool,
}

/// One file inside a torrent payload, as a half-open byte range over the
/// concatenated payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Position of the file within the metafile's file list.
    pub index: i64,
    /// Recommended pathname, raw bytes as found in the metafile.
    pub path: Vec<u8>,
    /// First byte of the file within the payload.
    pub start: i64,
    /// One past the last byte of the file within the payload.
    pub stop: i64,
}

impl FileInfo {
    /// Length of the file in bytes.
    #[must_use]
    pub const fn length(&self) -> i64 {
        self.stop - self.start
    }
}

/// Identity and statistics of the configured account. Singleton row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    /// Remote user identifier.
    pub id: i64,
    /// Bonus point balance.
    pub bonus: i64,
    /// User class label.
    pub class_name: String,
    /// Numeric class level.
    pub class_level: i64,
    /// Lifetime downloaded bytes.
    pub download: i64,
    /// Account email address.
    pub email: String,
    /// Whether the account is enabled.
    pub enabled: bool,
    /// Outstanding hit-and-run count.
    pub hnr: i64,
    /// Available invites.
    pub invites: i64,
    /// Join instant, seconds since epoch.
    pub join_date: i64,
    /// Lumen balance.
    pub lumens: i64,
    /// Paranoia level.
    pub paranoia: i64,
    /// Lifetime snatch count.
    pub snatches: i64,
    /// Custom title.
    pub title: String,
    /// Lifetime uploaded bytes.
    pub upload: i64,
    /// Snatches of the user's own uploads.
    pub uploads_snatched: i64,
    /// Account name.
    pub username: String,
}

/// Per-torrent entry in the user's snatch history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snatch {
    /// Torrent identifier the snatch refers to.
    pub id: i64,
    /// Bytes downloaded against this torrent.
    pub downloaded: i64,
    /// Bytes uploaded against this torrent.
    pub uploaded: i64,
    /// Accumulated seed time in seconds.
    pub seed_time: i64,
    /// Whether the torrent is currently seeding.
    pub seeding: bool,
    /// Snatch instant, seconds since epoch.
    pub snatch_time: i64,
    /// Whether the tracker has waived the hit-and-run.
    pub hnr_removed: bool,
}

/// One page of catalog results as returned by the remote, already decoded
/// into the entity graph.
#[derive(Debug, Clone, Default)]
pub struct SearchPage {
    /// Total result count the remote claims for the query.
    pub results: i64,
    /// Decoded rows, one per torrent, each with its parent chain.
    pub torrents: Vec<CatalogTorrent>,
}

/// A torrent entry bundled with its parent group and series, as decoded
/// from one remote result row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogTorrent {
    /// The series the release belongs to.
    pub series: Series,
    /// The release group under the series.
    pub group: Group,
    /// The upload itself.
    pub entry: TorrentEntry,
}

/// One page of snatch-history results as returned by the remote.
#[derive(Debug, Clone, Default)]
pub struct SnatchPage {
    /// Total snatch count the remote claims for the account.
    pub results: i64,
    /// Decoded snatch rows.
    pub snatches: Vec<Snatch>,
}

/// Entity kinds that participate in the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// A torrent entry row.
    TorrentEntry,
    /// A release group row.
    Group,
    /// A series row.
    Series,
}

impl EntityKind {
    /// Name of the backing table for this entity kind.
    #[must_use]
    pub const fn table(self) -> &'static str {
        match self {
            Self::TorrentEntry => "torrent_entry",
            Self::Group => "torrent_entry_group",
            Self::Series => "series",
        }
    }

    /// All kinds, in feed emission order.
    #[must_use]
    pub const fn all() -> [Self; 3] {
        [Self::TorrentEntry, Self::Group, Self::Series]
    }
}

/// What happened to a row, as seen by a change-feed consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeAction {
    /// The row was created or mutated.
    Update,
    /// The row was soft-deleted.
    Delete,
}

/// One observed mutation, ordered by change-stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeRecord {
    /// Which table the change happened in.
    pub kind: EntityKind,
    /// Whether the row was updated or deleted.
    pub action: ChangeAction,
    /// Row identifier.
    pub id: i64,
    /// Change-stamp assigned to the mutation.
    pub stamp: i64,
}

/// Seeding obligation for a snatch of a given category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeedRequirement {
    /// Minimum accumulated seed time in seconds.
    pub seed_time: i64,
    /// Alternatively, minimum upload/download ratio.
    pub seed_ratio: f64,
}

/// The seeding obligation for a category, when the tracker defines one.
///
/// Only Episode and Season carry known thresholds; other categories are
/// not classifiable and yield `None`.
#[must_use]
pub const fn seed_requirement(category: &GroupCategory) -> Option<SeedRequirement> {
    match category {
        GroupCategory::Episode => Some(SeedRequirement {
            seed_time: EPISODE_SEED_TIME,
            seed_ratio: EPISODE_SEED_RATIO,
        }),
        GroupCategory::Season => Some(SeedRequirement {
            seed_time: SEASON_SEED_TIME,
            seed_ratio: SEASON_SEED_RATIO,
        }),
        GroupCategory::Other(_) => None,
    }
}

/// Classify a snatch as a hit-and-run.
///
/// Returns `None` when the snatch does not count on the history (less
/// than [`TORRENT_HISTORY_FRACTION`] of the payload downloaded), when the
/// tracker already waived it, or when the category has no known
/// thresholds. Otherwise `Some(true)` means the seeding obligation is
/// unmet.
#[must_use]
pub fn is_hit_and_run(snatch: &Snatch, size: i64, category: &GroupCategory) -> Option<bool> {
    if snatch.hnr_removed {
        return None;
    }
    if size <= 0 || (snatch.downloaded as f64) < (size as f64) * TORRENT_HISTORY_FRACTION {
        return None;
    }
    let requirement = seed_requirement(category)?;
    let ratio = if snatch.downloaded > 0 {
        snatch.uploaded as f64 / snatch.downloaded as f64
    } else {
        0.0
    };
    let satisfied = snatch.seed_time >= requirement.seed_time || ratio >= requirement.seed_ratio;
    Some(!satisfied)
}
