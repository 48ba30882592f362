//! Normalisation of remote JSON into entity records.
//!
//! The remote is loose with types: integers arrive as strings or
//! numbers, cross-references may be absent, empty, or null. Decoders
//! here coerce leniently and fail only on genuinely missing identity.

use btnd_model::{
    CatalogTorrent, Group, GroupCategory, SearchPage, Series, Snatch, SnatchPage, TorrentEntry,
    UserInfo,
};
use serde_json::Value;

use crate::error::{ApiError, ApiResult};

fn coerce_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) if !text.is_empty() => text.parse().ok(),
        _ => None,
    }
}

fn require_i64(value: &Value, field: &'static str) -> ApiResult<i64> {
    value
        .get(field)
        .and_then(coerce_i64)
        .ok_or_else(|| ApiError::Parse {
            detail: format!("missing integer field `{field}`"),
        })
}

fn optional_i64(value: &Value, field: &'static str) -> Option<i64> {
    value.get(field).and_then(coerce_i64)
}

fn require_string(value: &Value, field: &'static str) -> ApiResult<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| ApiError::Parse {
            detail: format!("missing string field `{field}`"),
        })
}

fn optional_string(value: &Value, field: &'static str) -> Option<String> {
    value
        .get(field)
        .and_then(Value::as_str)
        .filter(|text| !text.is_empty())
        .map(str::to_string)
}

/// Decode one remote catalog row into its entity graph.
///
/// # Errors
///
/// Returns a parse error when identity fields are missing or mistyped.
pub fn torrent_from_json(value: &Value) -> ApiResult<CatalogTorrent> {
    let series = Series {
        id: require_i64(value, "SeriesID")?,
        imdb_id: optional_string(value, "ImdbID"),
        name: optional_string(value, "Series"),
        banner: optional_string(value, "SeriesBanner"),
        poster: optional_string(value, "SeriesPoster"),
        tvdb_id: optional_i64(value, "TvdbID"),
        tvrage_id: optional_i64(value, "TvrageID"),
        youtube_trailer: optional_string(value, "YoutubeTrailer"),
    };
    let group = Group {
        id: require_i64(value, "GroupID")?,
        category: GroupCategory::from_label(&require_string(value, "Category")?),
        name: require_string(value, "GroupName")?,
        series_id: series.id,
    };
    let entry = TorrentEntry {
        id: require_i64(value, "TorrentID")?,
        group_id: group.id,
        info_hash: require_string(value, "InfoHash")?.to_uppercase(),
        codec: require_string(value, "Codec")?,
        container: require_string(value, "Container")?,
        origin: require_string(value, "Origin")?,
        resolution: require_string(value, "Resolution")?,
        source: require_string(value, "Source")?,
        release_name: require_string(value, "ReleaseName")?,
        size: require_i64(value, "Size")?,
        time: require_i64(value, "Time")?,
        seeders: require_i64(value, "Seeders")?,
        leechers: require_i64(value, "Leechers")?,
        snatched: require_i64(value, "Snatched")?,
        raw_torrent_cached: false,
    };
    Ok(CatalogTorrent {
        series,
        group,
        entry,
    })
}

/// Decode a `getTorrents` result into a page, newest id first.
///
/// # Errors
///
/// Returns a parse error when the result shape is wrong.
pub fn search_page_from_json(value: &Value) -> ApiResult<SearchPage> {
    let results = require_i64(value, "results")?;
    let mut torrents = Vec::new();
    match value.get("torrents") {
        Some(Value::Object(map)) => {
            for row in map.values() {
                torrents.push(torrent_from_json(row)?);
            }
        }
        // An exhausted offset yields no torrents key (or an empty array).
        Some(Value::Array(rows)) => {
            for row in rows {
                torrents.push(torrent_from_json(row)?);
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => {
            return Err(ApiError::Parse {
                detail: format!("unexpected torrents payload: {other}"),
            });
        }
    }
    torrents.sort_by_key(|row| std::cmp::Reverse(row.entry.id));
    Ok(SearchPage { results, torrents })
}

/// Decode a `userInfo` result.
///
/// # Errors
///
/// Returns a parse error when required fields are missing.
pub fn user_info_from_json(value: &Value) -> ApiResult<UserInfo> {
    Ok(UserInfo {
        id: require_i64(value, "UserID")?,
        bonus: require_i64(value, "Bonus")?,
        class_name: require_string(value, "Class")?,
        class_level: require_i64(value, "ClassLevel")?,
        download: require_i64(value, "Download")?,
        email: require_string(value, "Email")?,
        enabled: require_i64(value, "Enabled")? != 0,
        hnr: require_i64(value, "HnR")?,
        invites: require_i64(value, "Invites")?,
        join_date: require_i64(value, "JoinDate")?,
        lumens: require_i64(value, "Lumens")?,
        paranoia: require_i64(value, "Paranoia")?,
        snatches: require_i64(value, "Snatches")?,
        title: require_string(value, "Title")?,
        upload: require_i64(value, "Upload")?,
        uploads_snatched: require_i64(value, "UploadsSnatched")?,
        username: require_string(value, "Username")?,
    })
}

/// Decode one snatch-history row.
///
/// # Errors
///
/// Returns a parse error when identity fields are missing.
pub fn snatch_from_json(value: &Value) -> ApiResult<Snatch> {
    Ok(Snatch {
        id: require_i64(value, "TorrentID")?,
        downloaded: optional_i64(value, "Downloaded").unwrap_or(0),
        uploaded: optional_i64(value, "Uploaded").unwrap_or(0),
        seed_time: optional_i64(value, "Seedtime").unwrap_or(0),
        seeding: optional_i64(value, "Seeding").unwrap_or(0) != 0,
        snatch_time: optional_i64(value, "SnatchTime").unwrap_or(0),
        hnr_removed: optional_i64(value, "HnRRemoved").unwrap_or(0) != 0,
    })
}

/// Decode a `getUserSnatchlist` result page.
///
/// # Errors
///
/// Returns a parse error when the result shape is wrong.
pub fn snatch_page_from_json(value: &Value) -> ApiResult<SnatchPage> {
    let results = require_i64(value, "results")?;
    let mut snatches = Vec::new();
    match value.get("snatches") {
        Some(Value::Object(map)) => {
            for row in map.values() {
                snatches.push(snatch_from_json(row)?);
            }
        }
        Some(Value::Array(rows)) => {
            for row in rows {
                snatches.push(snatch_from_json(row)?);
            }
        }
        Some(Value::Null) | None => {}
        Some(other) => {
            return Err(ApiError::Parse {
                detail: format!("unexpected snatches payload: {other}"),
            });
        }
    }
    Ok(SnatchPage { results, snatches })
}

/// Mine torrent ids out of the recent-uploads feed. Each item's link
/// carries the id as a query parameter; anything else is skipped.
#[must_use]
pub fn feed_ids_from_xml(body: &str) -> Vec<i64> {
    let mut ids = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find("<link>") {
        let after = &rest[start + "<link>".len()..];
        let Some(end) = after.find("</link>") else {
            break;
        };
        // Feed links arrive XML-escaped.
        let link = after[..end].trim().replace("&amp;", "&");
        if let Ok(url) = url::Url::parse(&link) {
            let id = url
                .query_pairs()
                .find(|(name, _)| name == "id")
                .and_then(|(_, value)| value.parse::<i64>().ok());
            if let Some(id) = id {
                ids.push(id);
            }
        }
        rest = &after[end..];
    }
    ids
}

#[cfg(test)]
mod tests {
    use super::*;
    use btnd_test_support::{torrent_json, torrents_result_json};
    use serde_json::json;

    #[test]
    fn torrent_row_coerces_stringly_integers() {
        let row = torrent_json(101);
        let decoded = torrent_from_json(&row).expect("decode");
        assert_eq!(decoded.entry.id, 101);
        assert_eq!(decoded.entry.size, 1_101);
        assert_eq!(decoded.series.id, 1);
        assert_eq!(decoded.group.series_id, 1);
    }

    #[test]
    fn info_hash_is_uppercased() {
        let mut row = torrent_json(7);
        row["InfoHash"] = json!("abcdef0123");
        let decoded = torrent_from_json(&row).expect("decode");
        assert_eq!(decoded.entry.info_hash, "ABCDEF0123");
    }

    #[test]
    fn missing_identity_is_a_parse_error() {
        let mut row = torrent_json(7);
        row.as_object_mut().expect("object").remove("TorrentID");
        let err = torrent_from_json(&row).expect_err("must fail");
        assert!(matches!(err, ApiError::Parse { .. }));
    }

    #[test]
    fn search_page_sorts_newest_first() {
        let page = torrents_result_json(&[5, 9, 7], 3);
        let decoded = search_page_from_json(&page).expect("decode");
        assert_eq!(decoded.results, 3);
        let ids: Vec<i64> = decoded.torrents.iter().map(|row| row.entry.id).collect();
        assert_eq!(ids, vec![9, 7, 5]);
    }

    #[test]
    fn empty_page_has_no_torrents() {
        let decoded =
            search_page_from_json(&json!({"results": "0"})).expect("decode");
        assert_eq!(decoded.results, 0);
        assert!(decoded.torrents.is_empty());
    }

    #[test]
    fn snatch_page_decodes_map_payload() {
        let page = json!({
            "results": "2",
            "snatches": {
                "5": {"TorrentID": "5", "Downloaded": "900", "Uploaded": "450",
                       "Seedtime": "3600", "Seeding": "1", "SnatchTime": "1600000000",
                       "HnRRemoved": "0"},
                "6": {"TorrentID": "6"},
            }
        });
        let decoded = snatch_page_from_json(&page).expect("decode");
        assert_eq!(decoded.results, 2);
        assert_eq!(decoded.snatches.len(), 2);
        let five = decoded
            .snatches
            .iter()
            .find(|snatch| snatch.id == 5)
            .expect("snatch 5");
        assert!(five.seeding);
        assert_eq!(five.downloaded, 900);
    }

    #[test]
    fn feed_ids_come_from_link_query_params() {
        let xml = r#"<rss><channel>
            <link>https://broadcasthe.net/</link>
            <item><link>https://broadcasthe.net/torrents.php?action=download&amp;id=101</link></item>
            <item><link>https://broadcasthe.net/torrents.php?action=download&amp;id=100</link></item>
        </channel></rss>"#;
        let ids = feed_ids_from_xml(xml);
        assert_eq!(ids, vec![101, 100]);
    }
}
