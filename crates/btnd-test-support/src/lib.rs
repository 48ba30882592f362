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
#![allow(clippy::multiple_crate_versions)]

//! Shared fixtures for workspace tests: temporary cache stores, synthetic
//! catalog pages, canned remote JSON, and hand-assembled metafiles.

use btnd_data::CacheStore;
use btnd_model::{CatalogTorrent, Group, GroupCategory, SearchPage, Series, TorrentEntry};
use serde_json::{Value, json};
use tempfile::TempDir;

/// A cache store rooted in a temporary directory. Dropping the fixture
/// removes the directory.
pub struct TempStore {
    /// Keeps the backing directory alive for the duration of the test.
    pub dir: TempDir,
    /// The opened store.
    pub store: CacheStore,
}

/// Open a fresh store in a temporary directory.
///
/// # Panics
///
/// Panics when the directory or store cannot be created; this is a test
/// fixture.
pub async fn temp_store() -> TempStore {
    let dir = TempDir::new().expect("create temp cache dir");
    let store = CacheStore::open(
        &dir.path().join("metadata.db"),
        &dir.path().join("user.db"),
        4,
    )
    .await
    .expect("open temp store");
    TempStore { dir, store }
}

/// A deterministic catalog row for the given torrent id. Group and
/// series ids are derived so that ids sharing a decade share parents.
#[must_use]
pub fn sample_torrent(id: i64) -> CatalogTorrent {
    let group_id = id / 10;
    let series_id = id / 100;
    CatalogTorrent {
        series: Series {
            id: series_id,
            imdb_id: Some(format!("tt{series_id:07}")),
            name: Some(format!("Series {series_id}")),
            banner: None,
            poster: None,
            tvdb_id: Some(series_id * 7),
            tvrage_id: None,
            youtube_trailer: None,
        },
        group: Group {
            id: group_id,
            category: GroupCategory::Episode,
            name: format!("S01E{:02}", group_id % 100),
            series_id,
        },
        entry: TorrentEntry {
            id,
            group_id,
            info_hash: format!("{id:040X}"),
            codec: "H.264".to_string(),
            container: "MKV".to_string(),
            origin: "Scene".to_string(),
            resolution: "1080p".to_string(),
            source: "WEB-DL".to_string(),
            release_name: format!("Release.{id}"),
            size: 1_000 + id,
            time: 1_600_000_000 + id,
            seeders: 5,
            leechers: 1,
            snatched: 10,
            raw_torrent_cached: false,
        },
    }
}

/// A result page carrying the given ids with the claimed total.
#[must_use]
pub fn sample_page(ids: &[i64], results: i64) -> SearchPage {
    SearchPage {
        results,
        torrents: ids.iter().map(|id| sample_torrent(*id)).collect(),
    }
}

/// The remote's JSON for one catalog row, in wire shape.
#[must_use]
pub fn torrent_json(id: i64) -> Value {
    let row = sample_torrent(id);
    json!({
        "TorrentID": id.to_string(),
        "GroupID": row.group.id.to_string(),
        "Category": row.group.category.as_label(),
        "GroupName": row.group.name,
        "SeriesID": row.series.id.to_string(),
        "Series": row.series.name,
        "SeriesBanner": row.series.banner,
        "SeriesPoster": row.series.poster,
        "ImdbID": row.series.imdb_id,
        "TvdbID": row.series.tvdb_id.map(|id| id.to_string()),
        "TvrageID": row.series.tvrage_id,
        "YoutubeTrailer": row.series.youtube_trailer,
        "Codec": row.entry.codec,
        "Container": row.entry.container,
        "InfoHash": row.entry.info_hash,
        "Leechers": row.entry.leechers.to_string(),
        "Origin": row.entry.origin,
        "ReleaseName": row.entry.release_name,
        "Resolution": row.entry.resolution,
        "Seeders": row.entry.seeders.to_string(),
        "Size": row.entry.size.to_string(),
        "Snatched": row.entry.snatched.to_string(),
        "Source": row.entry.source,
        "Time": row.entry.time.to_string(),
    })
}

/// The remote's `getTorrents` result payload for a page of ids.
#[must_use]
pub fn torrents_result_json(ids: &[i64], results: i64) -> Value {
    let torrents: serde_json::Map<String, Value> = ids
        .iter()
        .map(|id| (id.to_string(), torrent_json(*id)))
        .collect();
    json!({
        "results": results.to_string(),
        "torrents": torrents,
    })
}

fn bencode_bytes(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(bytes.len().to_string().as_bytes());
    out.push(b':');
    out.extend_from_slice(bytes);
}

fn bencode_int(out: &mut Vec<u8>, value: i64) {
    out.push(b'i');
    out.extend_from_slice(value.to_string().as_bytes());
    out.push(b'e');
}

/// A hand-assembled multi-file metafile: `info.name` plus
/// `(length, path parts)` entries in order.
#[must_use]
pub fn multi_file_metafile(name: &[u8], files: &[(i64, &[&[u8]])]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"d4:infod5:filesl");
    for (length, parts) in files {
        out.extend_from_slice(b"d6:length");
        bencode_int(&mut out, *length);
        out.extend_from_slice(b"4:pathl");
        for part in *parts {
            bencode_bytes(&mut out, part);
        }
        out.push(b'e');
        out.push(b'e');
    }
    out.push(b'e');
    out.extend_from_slice(b"4:name");
    bencode_bytes(&mut out, name);
    out.push(b'e');
    out.push(b'e');
    out
}

/// A hand-assembled single-file metafile.
#[must_use]
pub fn single_file_metafile(name: &[u8], length: i64) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(b"d4:infod6:length");
    bencode_int(&mut out, length);
    out.extend_from_slice(b"4:name");
    bencode_bytes(&mut out, name);
    out.push(b'e');
    out.push(b'e');
    out
}
