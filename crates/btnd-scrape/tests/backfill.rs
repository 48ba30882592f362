//! Backfill end-to-end against a mock remote: overlapping stride,
//! wraparound, and deletion detection across passes.

use std::sync::Arc;

use btnd_api::{Gateway, SiteCredentials, SiteUrls};
use btnd_config::Config;
use btnd_ratelimit::{ScheduledTokenBucket, TokenBucket};
use btnd_scrape::{BackfillOptions, BackfillScraper, KEY_OFFSET, StepOutcome};
use btnd_test_support::{TempStore, temp_store, torrents_result_json};
use httpmock::prelude::*;
use serde_json::json;
use url::Url;

async fn scraper_for(server: &MockServer, block_size: i64) -> (Arc<BackfillScraper>, TempStore) {
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
    let config = Config {
        key: Some("KEY".to_string()),
        ..Config::default()
    };
    let scraper = BackfillScraper::new(
        gateway,
        fixture.store.clone(),
        &config,
        BackfillOptions {
            target_tokens: 0,
            num_workers: 1,
            once: true,
            block_size,
        },
    )
    .expect("scraper");
    (Arc::new(scraper), fixture)
}

fn offset_matcher(offset: i64) -> String {
    format!("2147483648,{offset}]")
}

#[tokio::test]
async fn stride_overlaps_and_wraps_across_the_catalog() {
    let server = MockServer::start_async().await;
    // Twelve-row catalog, five-row pages: offsets 0, 4, 8 cover it with
    // one-id overlaps, and offset 12 falls off the end.
    let pages = [
        (0, vec![112, 111, 110, 109, 108]),
        (4, vec![108, 107, 106, 105, 104]),
        (8, vec![104, 103, 102, 101]),
        (12, Vec::new()),
    ];
    for (offset, ids) in &pages {
        let body = offset_matcher(*offset);
        let ids = ids.clone();
        server
            .mock_async(move |when, then| {
                when.method(POST).path("/").body_includes(body.as_str());
                then.status(200)
                    .json_body(json!({"result": torrents_result_json(&ids, 12)}));
            })
            .await;
    }
    let (scraper, fixture) = scraper_for(&server, 5).await;

    for _ in 0..4 {
        let outcome = scraper.update_step().await.expect("step");
        assert_eq!(outcome, StepOutcome::Progress);
    }

    let mut live = fixture.store.top_live_ids(100).await.expect("top ids");
    live.sort_unstable();
    let expected: Vec<i64> = (101..=112).collect();
    assert_eq!(live, expected);

    // The page past the end wrapped the cursor back to the start.
    let cursor = fixture
        .store
        .get_global_i64(KEY_OFFSET)
        .await
        .expect("cursor")
        .expect("cursor present");
    assert_eq!(cursor, 0);
}

#[tokio::test]
async fn a_row_missing_from_the_window_is_deleted_on_the_next_pass() {
    let server = MockServer::start_async().await;
    let first_pass = [
        (0, vec![112, 111, 110, 109, 108]),
        (4, vec![108, 107, 106, 105, 104]),
        (8, vec![104, 103, 102, 101]),
        (12, Vec::new()),
    ];
    let mut mocks = Vec::new();
    for (offset, ids) in &first_pass {
        let body = offset_matcher(*offset);
        let ids = ids.clone();
        mocks.push(
            server
                .mock_async(move |when, then| {
                    when.method(POST).path("/").body_includes(body.as_str());
                    then.status(200)
                        .json_body(json!({"result": torrents_result_json(&ids, 12)}));
                })
                .await,
        );
    }
    let (scraper, fixture) = scraper_for(&server, 5).await;
    for _ in 0..4 {
        scraper.update_step().await.expect("first pass step");
    }
    for mock in mocks {
        mock.delete_async().await;
    }

    // Torrent 106 vanished from the remote between passes.
    let second_pass = [
        (0, vec![112, 111, 110, 109, 108]),
        (4, vec![108, 107, 105, 104, 103]),
        (8, vec![103, 102, 101]),
    ];
    for (offset, ids) in &second_pass {
        let body = offset_matcher(*offset);
        let ids = ids.clone();
        server
            .mock_async(move |when, then| {
                when.method(POST).path("/").body_includes(body.as_str());
                then.status(200)
                    .json_body(json!({"result": torrents_result_json(&ids, 11)}));
            })
            .await;
    }
    for _ in 0..3 {
        scraper.update_step().await.expect("second pass step");
    }

    let mut live = fixture.store.top_live_ids(100).await.expect("top ids");
    live.sort_unstable();
    let expected: Vec<i64> = (101..=112).filter(|id| *id != 106).collect();
    assert_eq!(live, expected, "the id that fell out of the window is gone");
}

#[tokio::test]
async fn exhausted_bucket_backs_off_without_calling_the_remote() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/");
            then.status(200)
                .json_body(json!({"result": {"results": "0"}}));
        })
        .await;

    let fixture = temp_store().await;
    // A one-token budget that is already spent.
    let api_bucket = ScheduledTokenBucket::new(fixture.store.pool().clone(), "api", 1, 3600.0)
        .await
        .expect("api bucket");
    let grant = api_bucket.try_consume(1, 0).await.expect("drain");
    assert!(grant.granted);
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
    let config = Config {
        key: Some("KEY".to_string()),
        ..Config::default()
    };
    let scraper = BackfillScraper::new(
        gateway,
        fixture.store.clone(),
        &config,
        BackfillOptions::default(),
    )
    .expect("scraper");

    let outcome = scraper.update_step().await.expect("step");
    assert_eq!(outcome, StepOutcome::Backoff);
    assert_eq!(mock.hits_async().await, 0, "no token, no request");
}

#[tokio::test]
async fn missing_key_fails_construction() {
    let server = MockServer::start_async().await;
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

    let result = BackfillScraper::new(
        gateway,
        fixture.store.clone(),
        &Config::default(),
        BackfillOptions::default(),
    );
    assert!(result.is_err(), "a keyless config cannot backfill");
}
