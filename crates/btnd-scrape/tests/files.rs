//! File-layout scraper end-to-end: fetch a metafile through the mock
//! remote, decode it, persist layout rows and the raw bytes.

use std::sync::Arc;
use std::time::Duration;

use btnd_api::{Gateway, SiteCredentials, SiteUrls};
use btnd_config::{CacheLayout, Config};
use btnd_ratelimit::{ScheduledTokenBucket, TokenBucket};
use btnd_scrape::FileLayoutScraper;
use btnd_test_support::{TempStore, multi_file_metafile, sample_torrent, temp_store};
use httpmock::prelude::*;
use url::Url;

async fn scraper_for(server: &MockServer) -> (Arc<FileLayoutScraper>, TempStore) {
    let fixture = temp_store().await;
    let api_bucket = ScheduledTokenBucket::new(fixture.store.pool().clone(), "api", 150, 3600.0)
        .await
        .expect("api bucket");
    let web_bucket = TokenBucket::new(fixture.store.pool().clone(), "web", 20, 100.0)
        .await
        .expect("web bucket");
    let base = Url::parse(&server.base_url()).expect("mock url");
    let credentials = SiteCredentials {
        auth: None,
        authkey: Some("AUTHKEY".to_string()),
        passkey: Some("PASSKEY".to_string()),
    };
    let gateway = Gateway::new(
        "KEY",
        credentials,
        SiteUrls::new(base.clone(), base.clone(), base),
        api_bucket,
        web_bucket,
    )
    .expect("gateway");
    let config = Config {
        key: Some("KEY".to_string()),
        authkey: Some("AUTHKEY".to_string()),
        passkey: Some("PASSKEY".to_string()),
        ..Config::default()
    };
    let layout = CacheLayout::new(fixture.dir.path());
    let scraper = FileLayoutScraper::new(
        gateway,
        fixture.store.clone(),
        layout,
        &config,
        Some(Duration::from_secs(3600)),
    )
    .expect("scraper");
    (Arc::new(scraper), fixture)
}

#[tokio::test]
async fn fills_missing_layouts_newest_first_and_stores_raw_bytes() {
    let server = MockServer::start_async().await;
    let metafile = multi_file_metafile(
        b"x",
        &[(100, &[b"a".as_slice()]), (50, &[b"b".as_slice(), b"c".as_slice()])],
    );
    let body = String::from_utf8(metafile.clone()).expect("ascii metafile");
    let newest = server
        .mock_async({
            let body = body.clone();
            move |when, then| {
                when.method(GET).path("/torrents.php").query_param("id", "43");
                then.status(200).body(&body);
            }
        })
        .await;
    server
        .mock_async(move |when, then| {
            when.method(GET).path("/torrents.php").query_param("id", "42");
            then.status(200).body(&body);
        })
        .await;
    let (scraper, fixture) = scraper_for(&server).await;

    let mut older = sample_torrent(42);
    older.entry.size = 150;
    let mut newer = sample_torrent(43);
    newer.entry.size = 150;
    fixture
        .store
        .upsert_torrents(&[older, newer])
        .await
        .expect("seed");

    // Highest id first.
    let first = scraper.step().await.expect("step");
    assert_eq!(first, Some(43));
    newest.assert_async().await;

    let second = scraper.step().await.expect("step");
    assert_eq!(second, Some(42));

    let layout = fixture.store.file_infos(42).await.expect("layout");
    assert_eq!(layout.len(), 2);
    assert_eq!(layout[0].path, b"x/a".to_vec());
    assert_eq!(layout[1].path, b"x/b/c".to_vec());
    assert_eq!(layout[1].stop, 150);

    let entry = fixture
        .store
        .torrent_entry(42)
        .await
        .expect("load")
        .expect("present");
    assert!(entry.raw_torrent_cached);

    let raw_path = fixture.dir.path().join("torrents").join("42.torrent");
    let raw = std::fs::read(&raw_path).expect("raw metafile on disk");
    assert_eq!(
        raw,
        multi_file_metafile(
            b"x",
            &[(100, &[b"a".as_slice()]), (50, &[b"b".as_slice(), b"c".as_slice()])],
        )
    );

    // Everything is filled: the queue drains to idle.
    let third = scraper.step().await.expect("step");
    assert_eq!(third, None);
}

#[tokio::test]
async fn malformed_metafile_surfaces_and_leaves_the_row_unfilled() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(GET).path("/torrents.php");
            then.status(200).body("this is not bencode");
        })
        .await;
    let (scraper, fixture) = scraper_for(&server).await;

    fixture
        .store
        .upsert_torrents(&[sample_torrent(42)])
        .await
        .expect("seed");

    let err = scraper.step().await.expect_err("must fail");
    let rendered = err.to_string();
    assert!(rendered.contains("42"), "error names the torrent: {rendered}");

    let layout = fixture.store.file_infos(42).await.expect("layout");
    assert!(layout.is_empty(), "no rows for a malformed metafile");
    let entry = fixture
        .store
        .torrent_entry(42)
        .await
        .expect("load")
        .expect("present");
    assert!(!entry.raw_torrent_cached);
}
