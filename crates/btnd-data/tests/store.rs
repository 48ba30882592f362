//! Integration coverage for the cache store: change-stamp discipline,
//! window reconciliation, deletion cascades, and account state.

use btnd_data::TorrentFilter;
use btnd_model::{ChangeAction, EntityKind, FileInfo, Snatch, UserInfo};
use btnd_test_support::{sample_page, sample_torrent, temp_store};

#[tokio::test]
async fn repeated_upsert_does_not_advance_stamps() {
    let fixture = temp_store().await;
    let store = &fixture.store;
    let rows: Vec<_> = [12, 11, 10].iter().map(|id| sample_torrent(*id)).collect();

    store.upsert_torrents(&rows).await.expect("first upsert");
    let first_pass = store.changes_since(None, 0).await.expect("tail changes");
    let first_max = first_pass.iter().map(|c| c.stamp).max().expect("stamps");

    store.upsert_torrents(&rows).await.expect("second upsert");
    let second_pass = store.changes_since(None, 0).await.expect("tail changes");
    let second_max = second_pass.iter().map(|c| c.stamp).max().expect("stamps");

    assert_eq!(first_max, second_max, "identical rows must keep their stamp");
    // The counter itself advances once per write transaction.
    let counter = store
        .get_global_i64("changestamp")
        .await
        .expect("read counter")
        .expect("counter present");
    assert_eq!(counter, 2);
}

#[tokio::test]
async fn counter_only_changes_do_not_advance_stamps() {
    let fixture = temp_store().await;
    let store = &fixture.store;
    let mut row = sample_torrent(42);

    store
        .upsert_torrents(std::slice::from_ref(&row))
        .await
        .expect("insert");
    let stamps_before = store.changes_since(None, 0).await.expect("tail changes");

    row.entry.seeders += 100;
    store
        .upsert_torrents(std::slice::from_ref(&row))
        .await
        .expect("counter update");

    let entry = store
        .torrent_entry(42)
        .await
        .expect("load")
        .expect("row exists");
    assert_eq!(entry.seeders, 105, "counter column must be updated");

    let stamps_after = store.changes_since(None, 0).await.expect("tail changes");
    assert_eq!(
        stamps_before, stamps_after,
        "counter-only updates must not touch updated_at"
    );
}

#[tokio::test]
async fn important_field_change_advances_stamp() {
    let fixture = temp_store().await;
    let store = &fixture.store;
    let mut row = sample_torrent(42);

    store
        .upsert_torrents(std::slice::from_ref(&row))
        .await
        .expect("insert");
    row.entry.release_name = "Renamed.Release".to_string();
    store
        .upsert_torrents(std::slice::from_ref(&row))
        .await
        .expect("update");

    let changes = store
        .changes_since(Some(EntityKind::TorrentEntry), 0)
        .await
        .expect("tail changes");
    let stamp = changes.last().expect("change present").stamp;
    assert_eq!(stamp, 2, "renaming must take the second transaction's stamp");
}

#[tokio::test]
async fn window_reconciliation_marks_missing_ids_deleted() {
    let fixture = temp_store().await;
    let store = &fixture.store;

    let outcome = store
        .apply_scrape_page(0, &sample_page(&[10, 9, 8, 7, 6], 5), &[])
        .await
        .expect("first page");
    assert!(outcome.is_end);
    assert_eq!(outcome.ids, vec![10, 9, 8, 7, 6]);

    let outcome = store
        .apply_scrape_page(0, &sample_page(&[10, 9, 7, 6], 4), &[])
        .await
        .expect("second page");
    assert!(outcome.is_end);

    let deletions: Vec<_> = store
        .changes_since(Some(EntityKind::TorrentEntry), 0)
        .await
        .expect("tail changes")
        .into_iter()
        .filter(|change| change.action == ChangeAction::Delete)
        .collect();
    assert_eq!(deletions.len(), 1);
    assert_eq!(deletions[0].id, 8);

    let filter = TorrentFilter {
        id: Some(8),
        ..TorrentFilter::default()
    };
    let visible = store
        .query_torrents(&filter, None, None)
        .await
        .expect("query");
    assert!(visible.is_empty(), "deleted rows are hidden from queries");
}

#[tokio::test]
async fn end_page_deletes_below_oldest_id() {
    let fixture = temp_store().await;
    let store = &fixture.store;

    store
        .apply_scrape_page(0, &sample_page(&[10, 9, 8, 7, 6, 5], 6), &[])
        .await
        .expect("seed page");
    // The remote shrank: ids 5 and 6 fell off the end of the catalog.
    store
        .apply_scrape_page(0, &sample_page(&[10, 9, 8, 7], 4), &[])
        .await
        .expect("shrunk page");

    let mut deleted: Vec<i64> = store
        .changes_since(Some(EntityKind::TorrentEntry), 0)
        .await
        .expect("tail changes")
        .into_iter()
        .filter(|change| change.action == ChangeAction::Delete)
        .map(|change| change.id)
        .collect();
    deleted.sort_unstable();
    assert_eq!(deleted, vec![5, 6]);
}

#[tokio::test]
async fn deleting_last_child_cascades_to_parents() {
    let fixture = temp_store().await;
    let store = &fixture.store;

    // Ids 10..=6 share series 0; id 10 is alone in group 1.
    let rows: Vec<_> = [10, 9, 8, 7, 6].iter().map(|id| sample_torrent(*id)).collect();
    store.upsert_torrents(&rows).await.expect("seed");

    store
        .mark_torrents_deleted(&[10])
        .await
        .expect("delete torrent 10");

    let group_changes = store
        .changes_since(Some(EntityKind::Group), 0)
        .await
        .expect("tail groups");
    let deleted_groups: Vec<i64> = group_changes
        .iter()
        .filter(|change| change.action == ChangeAction::Delete)
        .map(|change| change.id)
        .collect();
    assert_eq!(deleted_groups, vec![1], "group 1 lost its only torrent");

    let series_changes = store
        .changes_since(Some(EntityKind::Series), 0)
        .await
        .expect("tail series");
    assert!(
        series_changes
            .iter()
            .all(|change| change.action == ChangeAction::Update),
        "series 0 still has live groups"
    );
}

#[tokio::test]
async fn upsert_resurrects_deleted_rows() {
    let fixture = temp_store().await;
    let store = &fixture.store;
    let row = sample_torrent(7);

    store
        .upsert_torrents(std::slice::from_ref(&row))
        .await
        .expect("insert");
    store.mark_torrents_deleted(&[7]).await.expect("delete");
    store
        .upsert_torrents(std::slice::from_ref(&row))
        .await
        .expect("re-observe");

    let filter = TorrentFilter {
        id: Some(7),
        ..TorrentFilter::default()
    };
    let visible = store
        .query_torrents(&filter, None, None)
        .await
        .expect("query");
    assert_eq!(visible.len(), 1, "re-observed rows come back to life");
}

#[tokio::test]
async fn scrape_offset_reservation_strides_and_wraps() {
    let fixture = temp_store().await;
    let store = &fixture.store;

    let first = store
        .reserve_scrape_offset("scrape_next_offset", "scrape_last_results", 5)
        .await
        .expect("reserve");
    assert_eq!(first, 0);
    let second = store
        .reserve_scrape_offset("scrape_next_offset", "scrape_last_results", 5)
        .await
        .expect("reserve");
    assert_eq!(second, 4, "pages overlap by one id");

    store
        .set_global("scrape_last_results", "10")
        .await
        .expect("set results");
    let third = store
        .reserve_scrape_offset("scrape_next_offset", "scrape_last_results", 5)
        .await
        .expect("reserve");
    assert_eq!(third, 8);
    // 8 + 4 exceeds the catalog, so the cursor wraps for the next caller.
    let wrapped = store
        .reserve_scrape_offset("scrape_next_offset", "scrape_last_results", 5)
        .await
        .expect("reserve");
    assert_eq!(wrapped, 0);
}

#[tokio::test]
async fn file_layout_partitions_payload_and_flags_entry() {
    let fixture = temp_store().await;
    let store = &fixture.store;
    let mut row = sample_torrent(9);
    row.entry.size = 150;
    store
        .upsert_torrents(std::slice::from_ref(&row))
        .await
        .expect("seed");

    let files = vec![
        FileInfo {
            index: 0,
            path: b"x/a".to_vec(),
            start: 0,
            stop: 100,
        },
        FileInfo {
            index: 1,
            path: b"x/b/c".to_vec(),
            start: 100,
            stop: 150,
        },
    ];
    store
        .store_file_layout(9, &files, true)
        .await
        .expect("store layout");
    store
        .store_file_layout(9, &files, true)
        .await
        .expect("idempotent re-store");

    let stored = store.file_infos(9).await.expect("load layout");
    assert_eq!(stored, files);
    assert_eq!(stored[0].start, 0);
    assert_eq!(stored.last().expect("files").stop, row.entry.size);
    let total: i64 = stored.iter().map(FileInfo::length).sum();
    assert_eq!(total, row.entry.size);

    let entry = store
        .torrent_entry(9)
        .await
        .expect("load")
        .expect("row exists");
    assert!(entry.raw_torrent_cached);
}

#[tokio::test]
async fn unfilled_ids_exclude_filled_and_deleted_rows() {
    let fixture = temp_store().await;
    let store = &fixture.store;
    let rows: Vec<_> = [30, 20, 10].iter().map(|id| sample_torrent(*id)).collect();
    store.upsert_torrents(&rows).await.expect("seed");

    store
        .store_file_layout(
            20,
            &[FileInfo {
                index: 0,
                path: b"x".to_vec(),
                start: 0,
                stop: 1_020,
            }],
            false,
        )
        .await
        .expect("fill 20");
    store.mark_torrents_deleted(&[10]).await.expect("drop 10");

    let unfilled = store.ids_missing_file_info(-1).await.expect("scan");
    assert_eq!(unfilled, vec![30]);
}

#[tokio::test]
async fn global_kv_round_trips() {
    let fixture = temp_store().await;
    let store = &fixture.store;

    assert_eq!(store.get_global("cursor").await.expect("get"), None);
    store.set_global("cursor", "17").await.expect("set");
    assert_eq!(store.get_global_i64("cursor").await.expect("get"), Some(17));
    store.delete_global("cursor").await.expect("delete");
    assert_eq!(store.get_global("cursor").await.expect("get"), None);
}

#[tokio::test]
async fn user_info_replaces_singleton() {
    let fixture = temp_store().await;
    let store = &fixture.store;
    let mut user = UserInfo {
        id: 1,
        bonus: 0,
        class_name: "Power User".to_string(),
        class_level: 2,
        download: 1_000,
        email: "user@example.com".to_string(),
        enabled: true,
        hnr: 0,
        invites: 1,
        join_date: 1_500_000_000,
        lumens: 0,
        paranoia: 0,
        snatches: 12,
        title: String::new(),
        upload: 2_000,
        uploads_snatched: 0,
        username: "user".to_string(),
    };

    store.replace_user_info(&user).await.expect("store");
    user.upload = 3_000;
    store.replace_user_info(&user).await.expect("replace");

    let loaded = store.user_info().await.expect("load").expect("present");
    assert_eq!(loaded, user);
}

#[tokio::test]
async fn snatch_pages_upsert_idempotently() {
    let fixture = temp_store().await;
    let store = &fixture.store;
    let page = vec![
        Snatch {
            id: 5,
            downloaded: 900,
            uploaded: 450,
            seed_time: 3_600,
            seeding: true,
            snatch_time: 1_600_000_000,
            hnr_removed: false,
        },
        Snatch {
            id: 6,
            downloaded: 100,
            uploaded: 0,
            seed_time: 0,
            seeding: false,
            snatch_time: 1_600_000_100,
            hnr_removed: true,
        },
    ];

    store.upsert_snatches(&page).await.expect("first page");
    store.upsert_snatches(&page).await.expect("second page");

    let loaded = store.snatch(5).await.expect("load").expect("present");
    assert_eq!(loaded, page[0]);
    let loaded = store.snatch(6).await.expect("load").expect("present");
    assert_eq!(loaded, page[1]);
}

#[tokio::test]
async fn catalog_reads_walk_the_parent_chain() {
    let fixture = temp_store().await;
    let store = &fixture.store;
    let row = sample_torrent(321);
    store
        .upsert_torrents(std::slice::from_ref(&row))
        .await
        .expect("seed");

    let loaded = store
        .catalog_torrent(321)
        .await
        .expect("load")
        .expect("present");
    assert_eq!(loaded.entry, row.entry);
    assert_eq!(loaded.group, row.group);
    assert_eq!(loaded.series, row.series);

    let group = store
        .group(row.group.id)
        .await
        .expect("load group")
        .expect("present");
    assert_eq!(group.category, row.group.category);
    let series = store
        .series(row.series.id)
        .await
        .expect("load series")
        .expect("present");
    assert_eq!(series.name, row.series.name);

    assert!(
        store
            .catalog_torrent(999)
            .await
            .expect("load")
            .is_none()
    );
}

#[tokio::test]
async fn top_live_ids_order_newest_first() {
    let fixture = temp_store().await;
    let store = &fixture.store;
    let rows: Vec<_> = [5, 25, 15].iter().map(|id| sample_torrent(*id)).collect();
    store.upsert_torrents(&rows).await.expect("seed");
    store.mark_torrents_deleted(&[25]).await.expect("delete");

    let top = store.top_live_ids(10).await.expect("top ids");
    assert_eq!(top, vec![15, 5]);
}
