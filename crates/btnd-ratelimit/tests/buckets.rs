//! Bucket behavior against a real on-disk user database: refill math,
//! analytic waits, and the quota-breach rewrite.

use btnd_ratelimit::{ScheduledTokenBucket, TokenBucket, even_fill};
use btnd_test_support::temp_store;

const T0: f64 = 1_700_000_000.0;

#[tokio::test]
async fn generic_bucket_starts_full_and_drains() {
    let fixture = temp_store().await;
    let bucket = TokenBucket::new(fixture.store.pool().clone(), "web:test", 10, 100.0)
        .await
        .expect("bind bucket");

    let grant = bucket.try_consume_at(3, 0, T0).await.expect("consume");
    assert!(grant.granted);
    assert!((grant.remaining - 7.0).abs() < f64::EPSILON);

    let grant = bucket.try_consume_at(7, 0, T0).await.expect("consume");
    assert!(grant.granted);
    assert!((grant.remaining).abs() < f64::EPSILON);
}

#[tokio::test]
async fn zero_token_probe_never_changes_state() {
    let fixture = temp_store().await;
    let bucket = TokenBucket::new(fixture.store.pool().clone(), "web:test", 10, 100.0)
        .await
        .expect("bind bucket");

    bucket.try_consume_at(4, 0, T0).await.expect("drain some");
    let first = bucket.try_consume_at(0, 0, T0).await.expect("probe");
    let second = bucket.try_consume_at(0, 0, T0).await.expect("probe");
    assert!(first.granted && second.granted);
    assert!((first.remaining - 6.0).abs() < f64::EPSILON);
    assert!((second.remaining - first.remaining).abs() < f64::EPSILON);
}

#[tokio::test]
async fn generic_bucket_refills_whole_tokens_over_time() {
    let fixture = temp_store().await;
    let bucket = TokenBucket::new(fixture.store.pool().clone(), "web:test", 10, 100.0)
        .await
        .expect("bind bucket");

    bucket.try_consume_at(10, 0, T0).await.expect("drain");
    // 10 tokens per 100 s means one whole token accrues every 10 s.
    let early = bucket.try_consume_at(1, 0, T0 + 9.0).await.expect("probe");
    assert!(!early.granted);
    let refilled = bucket.try_consume_at(1, 0, T0 + 10.0).await.expect("probe");
    assert!(refilled.granted);
}

#[tokio::test]
async fn generic_bucket_reports_analytic_wait() {
    let fixture = temp_store().await;
    let bucket = TokenBucket::new(fixture.store.pool().clone(), "web:test", 10, 100.0)
        .await
        .expect("bind bucket");

    bucket.try_consume_at(10, 0, T0).await.expect("drain");
    let grant = bucket.try_consume_at(1, 0, T0).await.expect("probe");
    assert!(!grant.granted);
    let wait = grant.wait.as_secs_f64();
    assert!((wait - 10.0).abs() < 0.5, "one token takes ten seconds: {wait}");
}

#[tokio::test]
async fn leave_floor_blocks_consumption() {
    let fixture = temp_store().await;
    let bucket = TokenBucket::new(fixture.store.pool().clone(), "web:test", 10, 100.0)
        .await
        .expect("bind bucket");

    let grant = bucket.try_consume_at(2, 9, T0).await.expect("probe");
    assert!(!grant.granted, "2 + leave 9 exceeds capacity 10");
    let grant = bucket.try_consume_at(1, 9, T0).await.expect("probe");
    assert!(grant.granted);
}

#[tokio::test]
async fn scheduled_bucket_tracks_sliding_window() {
    let fixture = temp_store().await;
    let bucket = ScheduledTokenBucket::new(fixture.store.pool().clone(), "api:test", 5, 100.0)
        .await
        .expect("bind bucket");

    for _ in 0..5 {
        let grant = bucket.try_consume_at(1, 0, T0).await.expect("consume");
        assert!(grant.granted);
    }
    let exhausted = bucket.try_consume_at(1, 0, T0 + 1.0).await.expect("probe");
    assert!(!exhausted.granted);
    let wait = exhausted.wait.as_secs_f64();
    assert!((wait - 99.0).abs() < 0.5, "oldest expires with the window: {wait}");

    let renewed = bucket
        .try_consume_at(1, 0, T0 + 101.0)
        .await
        .expect("probe");
    assert!(renewed.granted, "expired timestamps free the whole window");
}

#[tokio::test]
async fn scheduled_bucket_honours_leave() {
    let fixture = temp_store().await;
    let bucket = ScheduledTokenBucket::new(fixture.store.pool().clone(), "api:test", 5, 100.0)
        .await
        .expect("bind bucket");

    let grant = bucket.try_consume_at(1, 4, T0).await.expect("probe");
    assert!(grant.granted, "exactly the floor remains");
    let grant = bucket.try_consume_at(1, 4, T0).await.expect("probe");
    assert!(!grant.granted, "consuming again would dip under the floor");
}

#[tokio::test]
async fn quota_breach_rewrite_spreads_window_evenly() {
    let fixture = temp_store().await;
    let bucket = ScheduledTokenBucket::new(fixture.store.pool().clone(), "api:test", 5, 100.0)
        .await
        .expect("bind bucket");

    bucket.set(0, T0, even_fill).await.expect("rewrite");

    let grant = bucket.try_consume_at(1, 0, T0).await.expect("probe");
    assert!(!grant.granted, "the remote says the window is spent");
    let wait = grant.wait.as_secs_f64();
    // Evenly spread timestamps drain one per period/rate seconds.
    assert!((wait - 20.0).abs() < 0.5, "next token after period/rate: {wait}");

    let after_one_slot = bucket
        .try_consume_at(1, 0, T0 + 20.5)
        .await
        .expect("probe");
    assert!(after_one_slot.granted);
}

#[tokio::test]
async fn peek_reports_capacity_without_consuming() {
    let fixture = temp_store().await;
    let bucket = ScheduledTokenBucket::new(fixture.store.pool().clone(), "api:test", 5, 100.0)
        .await
        .expect("bind bucket");

    let level = bucket.peek().await.expect("peek");
    assert!((level.tokens - 5.0).abs() < f64::EPSILON);
    assert_eq!(level.rate, 5);
    let level = bucket.peek().await.expect("peek again");
    assert!((level.tokens - 5.0).abs() < f64::EPSILON);
}
