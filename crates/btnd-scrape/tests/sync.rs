//! Fetch-and-cache operations against a mock remote: explicit id
//! lookups and snatch-history synchronisation.

use btnd_api::{Gateway, SiteCredentials, SiteUrls};
use btnd_config::Config;
use btnd_data::TorrentFilter;
use btnd_model::{GroupCategory, is_hit_and_run};
use btnd_ratelimit::{ScheduledTokenBucket, TokenBucket};
use btnd_scrape::{fetch_torrent_by_id, sync_snatchlist};
use btnd_test_support::{TempStore, temp_store, torrent_json};
use httpmock::prelude::*;
use serde_json::json;
use url::Url;

async fn gateway_for(server: &MockServer) -> (Gateway, TempStore) {
    let fixture = temp_store().await;
    let api_bucket = ScheduledTokenBucket::new(fixture.store.pool().clone(), "api", 150, 3600.0)
        .await
        .expect("api bucket");
    let web_bucket = TokenBucket::new(fixture.store.pool().clone(), "web", 20, 100.0)
        .await
        .expect("web bucket");
    let base = Url::parse(&server.base_url()).expect("mock url");
    let gateway = Gateway::new(
        "KEY",
        SiteCredentials::default(),
        SiteUrls::new(base.clone(), base.clone(), base),
        api_bucket,
        web_bucket,
    )
    .expect("gateway");
    (gateway, fixture)
}

#[tokio::test]
async fn explicit_id_fetch_lands_in_the_cache() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/")
                .body_includes("\"method\":\"getTorrentById\"");
            then.status(200).json_body(json!({"result": torrent_json(77)}));
        })
        .await;
    let (gateway, fixture) = gateway_for(&server).await;

    let row = fetch_torrent_by_id(&gateway, &fixture.store, 77)
        .await
        .expect("fetch")
        .expect("remote knows the id");
    assert_eq!(row.entry.id, 77);

    let filter = TorrentFilter {
        id: Some(77),
        ..TorrentFilter::default()
    };
    let cached = fixture
        .store
        .query_torrents(&filter, None, None)
        .await
        .expect("query");
    assert_eq!(cached.len(), 1);
    assert_eq!(cached[0].release_name, "Release.77");
}

#[tokio::test]
async fn unknown_id_fetch_returns_none() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/");
            then.status(200).json_body(json!({"result": null}));
        })
        .await;
    let (gateway, fixture) = gateway_for(&server).await;

    let row = fetch_torrent_by_id(&gateway, &fixture.store, 404)
        .await
        .expect("fetch");
    assert!(row.is_none());
}

#[tokio::test]
async fn snatchlist_sync_upserts_and_enables_hnr_checks() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/")
                .body_includes("\"method\":\"getUserSnatchlist\"");
            then.status(200).json_body(json!({"result": {
                "results": "2",
                "snatches": {
                    "5": {"TorrentID": "5", "Downloaded": "1000", "Uploaded": "0",
                           "Seedtime": "90000", "Seeding": "0",
                           "SnatchTime": "1600000000", "HnRRemoved": "0"},
                    "6": {"TorrentID": "6", "Downloaded": "1000", "Uploaded": "100",
                           "Seedtime": "3600", "Seeding": "0",
                           "SnatchTime": "1600000100", "HnRRemoved": "0"},
                }
            }}));
        })
        .await;
    let (gateway, fixture) = gateway_for(&server).await;

    let observed = sync_snatchlist(&gateway, &fixture.store)
        .await
        .expect("sync");
    assert_eq!(observed, 2);

    // 25 hours of seed time satisfies the Episode obligation.
    let kept = fixture
        .store
        .snatch(5)
        .await
        .expect("load")
        .expect("present");
    assert_eq!(
        is_hit_and_run(&kept, 1_000, &GroupCategory::Episode),
        Some(false)
    );

    // One hour and a 0.1 ratio does not.
    let dropped = fixture
        .store
        .snatch(6)
        .await
        .expect("load")
        .expect("present");
    assert_eq!(
        is_hit_and_run(&dropped, 1_000, &GroupCategory::Episode),
        Some(true)
    );
}
