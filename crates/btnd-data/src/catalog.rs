//! Catalog persistence: invariant-preserving upserts, soft deletion with
//! parent cascade, contiguous-page reconciliation, and ordered reads.

use btnd_model::{
    CatalogTorrent, FileInfo, Group, GroupCategory, SearchPage, Series, TorrentEntry,
};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use crate::error::{StoreError, StoreResult};
use crate::store::CacheStore;
use crate::tx;

/// Ids kept per batch when filling the reconciliation id table.
const ID_INSERT_CHUNK: usize = 500;

const SELECT_SERIES_SQL: &str = "
    SELECT id, imdb_id, name, banner, poster, tvdb_id, tvrage_id,
           youtube_trailer, deleted
    FROM series WHERE id = ?
";

const INSERT_SERIES_SQL: &str = "
    INSERT INTO series (
        id, imdb_id, name, banner, poster, tvdb_id, tvrage_id,
        youtube_trailer, updated_at, deleted
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
";

const UPDATE_SERIES_SQL: &str = "
    UPDATE series
    SET imdb_id = ?, name = ?, banner = ?, poster = ?, tvdb_id = ?,
        tvrage_id = ?, youtube_trailer = ?, updated_at = ?, deleted = 0
    WHERE id = ?
";

const SELECT_GROUP_SQL: &str = "
    SELECT torrent_entry_group.id AS id,
           category.name AS category,
           torrent_entry_group.name AS name,
           series_id,
           torrent_entry_group.deleted AS deleted
    FROM torrent_entry_group
    LEFT OUTER JOIN category ON torrent_entry_group.category_id = category.id
    WHERE torrent_entry_group.id = ?
";

const INSERT_GROUP_SQL: &str = "
    INSERT INTO torrent_entry_group (
        id, category_id, name, series_id, updated_at, deleted
    ) VALUES (?, ?, ?, ?, ?, 0)
";

const UPDATE_GROUP_SQL: &str = "
    UPDATE torrent_entry_group
    SET category_id = ?, name = ?, series_id = ?, updated_at = ?, deleted = 0
    WHERE id = ?
";

const SELECT_ENTRY_STATE_SQL: &str = "
    SELECT codec_id, container_id, group_id, info_hash, origin_id,
           release_name, resolution_id, size, source_id, time,
           seeders, leechers, snatched, raw_torrent_cached, deleted
    FROM torrent_entry WHERE id = ?
";

const INSERT_ENTRY_SQL: &str = "
    INSERT INTO torrent_entry (
        id, codec_id, container_id, group_id, info_hash, leechers,
        origin_id, release_name, resolution_id, seeders, size, snatched,
        source_id, time, raw_torrent_cached, updated_at, deleted
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
";

const UPDATE_ENTRY_SQL: &str = "
    UPDATE torrent_entry
    SET codec_id = ?, container_id = ?, group_id = ?, info_hash = ?,
        leechers = ?, origin_id = ?, release_name = ?, resolution_id = ?,
        seeders = ?, size = ?, snatched = ?, source_id = ?, time = ?,
        updated_at = ?, deleted = 0
    WHERE id = ?
";

const UPDATE_ENTRY_COUNTERS_SQL: &str = "
    UPDATE torrent_entry SET seeders = ?, leechers = ?, snatched = ?
    WHERE id = ?
";

const ENTRY_COLUMNS: &str = "
    torrent_entry.id AS id,
    codec.name AS codec,
    container.name AS container,
    torrent_entry.group_id AS group_id,
    info_hash,
    leechers,
    origin.name AS origin,
    release_name,
    resolution.name AS resolution,
    seeders,
    size,
    snatched,
    source.name AS source,
    time,
    raw_torrent_cached
";

const SELECT_ENTRY_SQL: &str = "
    SELECT
        torrent_entry.id AS id,
        codec.name AS codec,
        container.name AS container,
        torrent_entry.group_id AS group_id,
        info_hash,
        leechers,
        origin.name AS origin,
        release_name,
        resolution.name AS resolution,
        seeders,
        size,
        snatched,
        source.name AS source,
        time,
        raw_torrent_cached
    FROM torrent_entry
    LEFT OUTER JOIN codec ON codec.id = codec_id
    LEFT OUTER JOIN container ON container.id = container_id
    LEFT OUTER JOIN origin ON origin.id = origin_id
    LEFT OUTER JOIN resolution ON resolution.id = resolution_id
    LEFT OUTER JOIN source ON source.id = source_id
    WHERE torrent_entry.id = ?
";

const MARK_BELOW_DELETED_SQL: &str = "
    UPDATE torrent_entry SET deleted = 1, updated_at = ?
    WHERE id < ? AND NOT deleted
";

const MARK_WINDOW_DELETED_SQL: &str = "
    UPDATE torrent_entry SET deleted = 1, updated_at = ?
    WHERE NOT deleted AND id < ? AND id > ?
      AND id NOT IN (SELECT id FROM temp.scrape_ids)
";

const CASCADE_GROUPS_SQL: &str = "
    UPDATE torrent_entry_group SET deleted = 1, updated_at = ?
    WHERE NOT deleted AND NOT EXISTS (
        SELECT 1 FROM torrent_entry
        WHERE torrent_entry.group_id = torrent_entry_group.id
          AND NOT torrent_entry.deleted
    )
";

const CASCADE_SERIES_SQL: &str = "
    UPDATE series SET deleted = 1, updated_at = ?
    WHERE NOT deleted AND NOT EXISTS (
        SELECT 1 FROM torrent_entry_group
        WHERE torrent_entry_group.series_id = series.id
          AND NOT torrent_entry_group.deleted
    )
";

const SELECT_UNFILLED_SQL: &str = "
    SELECT torrent_entry.id
    FROM torrent_entry
    LEFT JOIN file_info ON torrent_entry.id = file_info.id
    WHERE file_info.id IS NULL
      AND torrent_entry.deleted = 0
      AND torrent_entry.updated_at > ?
    ORDER BY torrent_entry.updated_at
";

const SELECT_FILE_INFO_SQL: &str = "
    SELECT file_index, path, start, stop
    FROM file_info WHERE id = ? ORDER BY file_index
";

const INSERT_FILE_INFO_SQL: &str = "
    INSERT OR IGNORE INTO file_info (id, file_index, path, start, stop, updated_at)
    VALUES (?, ?, ?, ?, ?, ?)
";

const MARK_RAW_CACHED_SQL: &str = "
    UPDATE torrent_entry SET raw_torrent_cached = 1, updated_at = ?
    WHERE id = ? AND raw_torrent_cached = 0
";

/// Read-side filters for catalog queries. Every field is optional; set
/// fields are conjoined.
#[derive(Debug, Clone, Default)]
pub struct TorrentFilter {
    /// Exact torrent id.
    pub id: Option<i64>,
    /// Series display name.
    pub series: Option<String>,
    /// Group category label.
    pub category: Option<String>,
    /// Group display name.
    pub name: Option<String>,
    /// Codec label.
    pub codec: Option<String>,
    /// Container label.
    pub container: Option<String>,
    /// Source label.
    pub source: Option<String>,
    /// Resolution label.
    pub resolution: Option<String>,
    /// Origin label.
    pub origin: Option<String>,
    /// Uppercase-hex info hash.
    pub info_hash: Option<String>,
    /// Series TVDB cross-reference.
    pub tvdb_id: Option<i64>,
    /// Series TVRage cross-reference.
    pub tvrage_id: Option<i64>,
    /// Exact upload instant.
    pub time: Option<i64>,
}

/// Result of applying one contiguous result page.
#[derive(Debug, Clone)]
pub struct PageOutcome {
    /// Page ids in descending order.
    pub ids: Vec<i64>,
    /// Whether the page reached the end of the catalog.
    pub is_end: bool,
}

impl CacheStore {
    /// Upsert a batch of decoded catalog rows under one change-stamp.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails.
    pub async fn upsert_torrents(&self, rows: &[CatalogTorrent]) -> StoreResult<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let mut conn = self.writer().await?;
        let result = async {
            let stamp = tx::next_changestamp(&mut conn).await?;
            for row in rows {
                upsert_catalog_torrent_tx(&mut conn, row, stamp).await?;
            }
            Ok(())
        }
        .await;
        tx::finish(conn, result).await
    }

    /// Soft-delete the given torrent ids and cascade group/series
    /// deletions, all under one change-stamp.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails.
    pub async fn mark_torrents_deleted(&self, ids: &[i64]) -> StoreResult<()> {
        if ids.is_empty() {
            return Ok(());
        }
        let mut conn = self.writer().await?;
        let result = async {
            let stamp = tx::next_changestamp(&mut conn).await?;
            let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
                "UPDATE torrent_entry SET deleted = 1, updated_at = ",
            );
            builder.push_bind(stamp);
            builder.push(" WHERE NOT deleted AND id IN (");
            let mut separated = builder.separated(", ");
            for id in ids {
                separated.push_bind(*id);
            }
            separated.push_unseparated(")");
            builder
                .build()
                .execute(&mut *conn)
                .await
                .map_err(StoreError::query("mark torrents deleted"))?;
            cascade_deletions_tx(&mut conn, stamp).await
        }
        .await;
        tx::finish(conn, result).await
    }

    /// Reserve the next backfill offset: read the cursor, advance it with
    /// a one-row page overlap, wrap past the end, and return the offset
    /// this caller should fetch. Atomic across processes.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails.
    pub async fn reserve_scrape_offset(
        &self,
        offset_key: &str,
        results_key: &str,
        block_size: i64,
    ) -> StoreResult<i64> {
        let mut conn = self.writer().await?;
        let result = async {
            let offset = get_global_i64_tx(&mut conn, offset_key).await?.unwrap_or(0);
            let results = get_global_i64_tx(&mut conn, results_key).await?;
            let mut next_offset = offset + block_size - 1;
            if let Some(results) = results {
                if next_offset > results {
                    next_offset = 0;
                }
            }
            Self::set_global_tx(&mut conn, offset_key, Some(&next_offset.to_string())).await?;
            Ok(offset)
        }
        .await;
        tx::finish(conn, result).await
    }

    /// Apply one contiguous result page at `offset` per the
    /// reconciliation contract: upsert every row, mark ids that fell out
    /// of the observed window deleted, cascade parents, and persist the
    /// supplied cursor updates, all in one transaction.
    ///
    /// A `None` value removes the cursor key.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails.
    pub async fn apply_scrape_page(
        &self,
        offset: i64,
        page: &SearchPage,
        global_updates: &[(String, Option<String>)],
    ) -> StoreResult<PageOutcome> {
        let mut ids: Vec<i64> = page.torrents.iter().map(|row| row.entry.id).collect();
        ids.sort_unstable_by_key(|id| std::cmp::Reverse(*id));
        let page_len = i64::try_from(ids.len()).unwrap_or(i64::MAX);
        let is_end = offset + page_len >= page.results;

        let mut conn = self.writer().await?;
        let result = async {
            let stamp = tx::next_changestamp(&mut conn).await?;
            for row in &page.torrents {
                upsert_catalog_torrent_tx(&mut conn, row, stamp).await?;
            }
            if let (Some(newest), Some(oldest)) = (ids.first(), ids.last()) {
                if is_end {
                    sqlx::query(MARK_BELOW_DELETED_SQL)
                        .bind(stamp)
                        .bind(*oldest)
                        .execute(&mut *conn)
                        .await
                        .map_err(StoreError::query("mark tail deleted"))?;
                }
                fill_id_table_tx(&mut conn, &ids).await?;
                sqlx::query(MARK_WINDOW_DELETED_SQL)
                    .bind(stamp)
                    .bind(*newest)
                    .bind(*oldest)
                    .execute(&mut *conn)
                    .await
                    .map_err(StoreError::query("mark window deleted"))?;
                clear_id_table_tx(&mut conn).await?;
                cascade_deletions_tx(&mut conn, stamp).await?;
            }
            for (key, value) in global_updates {
                Self::set_global_tx(&mut conn, key, value.as_deref()).await?;
            }
            Ok(())
        }
        .await;
        tx::finish(conn, result).await?;
        Ok(PageOutcome { ids, is_end })
    }

    /// Read one torrent entry with its labels joined back in.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn torrent_entry(&self, id: i64) -> StoreResult<Option<TorrentEntry>> {
        let row = sqlx::query(SELECT_ENTRY_SQL)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(StoreError::query("load torrent entry"))?;
        row.as_ref().map(decode_entry).transpose()
    }

    /// Read one group.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn group(&self, id: i64) -> StoreResult<Option<Group>> {
        let row = sqlx::query(SELECT_GROUP_SQL)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(StoreError::query("load group"))?;
        row.as_ref().map(decode_group).transpose()
    }

    /// Read one series.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn series(&self, id: i64) -> StoreResult<Option<Series>> {
        let row = sqlx::query(SELECT_SERIES_SQL)
            .bind(id)
            .fetch_optional(self.pool())
            .await
            .map_err(StoreError::query("load series"))?;
        row.as_ref().map(decode_series).transpose()
    }

    /// Read one torrent with its full parent chain.
    ///
    /// # Errors
    ///
    /// Returns an error when a query fails.
    pub async fn catalog_torrent(&self, id: i64) -> StoreResult<Option<CatalogTorrent>> {
        let Some(entry) = self.torrent_entry(id).await? else {
            return Ok(None);
        };
        let Some(group) = self.group(entry.group_id).await? else {
            return Ok(None);
        };
        let Some(series) = self.series(group.series_id).await? else {
            return Ok(None);
        };
        Ok(Some(CatalogTorrent {
            series,
            group,
            entry,
        }))
    }

    /// Query non-deleted torrent entries, newest id first.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn query_torrents(
        &self,
        filter: &TorrentFilter,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> StoreResult<Vec<TorrentEntry>> {
        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new("SELECT ");
        builder.push(ENTRY_COLUMNS);
        builder.push(
            " FROM torrent_entry
             INNER JOIN torrent_entry_group
                ON torrent_entry.group_id = torrent_entry_group.id
             INNER JOIN series ON torrent_entry_group.series_id = series.id
             INNER JOIN category ON torrent_entry_group.category_id = category.id
             INNER JOIN codec ON torrent_entry.codec_id = codec.id
             INNER JOIN container ON torrent_entry.container_id = container.id
             INNER JOIN source ON torrent_entry.source_id = source.id
             INNER JOIN resolution ON torrent_entry.resolution_id = resolution.id
             INNER JOIN origin ON torrent_entry.origin_id = origin.id
             WHERE torrent_entry.deleted = 0",
        );
        push_filter(&mut builder, filter);
        builder.push(" ORDER BY torrent_entry.id DESC");
        if let Some(limit) = limit {
            builder.push(" LIMIT ");
            builder.push_bind(limit);
        }
        if let Some(offset) = offset {
            builder.push(" OFFSET ");
            builder.push_bind(offset);
        }
        let rows = builder
            .build()
            .fetch_all(self.pool())
            .await
            .map_err(StoreError::query("query torrents"))?;
        rows.iter().map(decode_entry).collect()
    }

    /// The newest non-deleted torrent ids, up to `limit`.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn top_live_ids(&self, limit: i64) -> StoreResult<Vec<i64>> {
        sqlx::query_scalar::<_, i64>(
            "SELECT id FROM torrent_entry WHERE NOT deleted ORDER BY id DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool())
        .await
        .map_err(StoreError::query("load top ids"))
    }

    /// Non-deleted torrent ids that lack file-layout rows and were
    /// updated after `since`, in `updated_at` order.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn ids_missing_file_info(&self, since: i64) -> StoreResult<Vec<i64>> {
        sqlx::query_scalar::<_, i64>(SELECT_UNFILLED_SQL)
            .bind(since)
            .fetch_all(self.pool())
            .await
            .map_err(StoreError::query("load unfilled ids"))
    }

    /// The highest `updated_at` seen on torrent entries, if any row exists.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn max_torrent_stamp(&self) -> StoreResult<Option<i64>> {
        sqlx::query_scalar::<_, Option<i64>>("SELECT MAX(updated_at) FROM torrent_entry")
            .fetch_one(self.pool())
            .await
            .map_err(StoreError::query("load max stamp"))
    }

    /// Read the file layout for one torrent, in index order.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn file_infos(&self, id: i64) -> StoreResult<Vec<FileInfo>> {
        let rows = sqlx::query(SELECT_FILE_INFO_SQL)
            .bind(id)
            .fetch_all(self.pool())
            .await
            .map_err(StoreError::query("load file infos"))?;
        rows.iter()
            .map(|row| {
                Ok(FileInfo {
                    index: row
                        .try_get("file_index")
                        .map_err(StoreError::query("decode file info"))?,
                    path: row
                        .try_get("path")
                        .map_err(StoreError::query("decode file info"))?,
                    start: row
                        .try_get("start")
                        .map_err(StoreError::query("decode file info"))?,
                    stop: row
                        .try_get("stop")
                        .map_err(StoreError::query("decode file info"))?,
                })
            })
            .collect()
    }

    /// Persist the file layout for a torrent, in one transaction with
    /// the `raw_torrent_cached` flag when the raw bytes landed on disk.
    /// Idempotent on `(id, index)`.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails.
    pub async fn store_file_layout(
        &self,
        id: i64,
        files: &[FileInfo],
        raw_cached: bool,
    ) -> StoreResult<()> {
        let mut conn = self.writer().await?;
        let result = async {
            let stamp = tx::next_changestamp(&mut conn).await?;
            for file in files {
                sqlx::query(INSERT_FILE_INFO_SQL)
                    .bind(id)
                    .bind(file.index)
                    .bind(&file.path)
                    .bind(file.start)
                    .bind(file.stop)
                    .bind(stamp)
                    .execute(&mut *conn)
                    .await
                    .map_err(StoreError::query("insert file info"))?;
            }
            if raw_cached {
                sqlx::query(MARK_RAW_CACHED_SQL)
                    .bind(stamp)
                    .bind(id)
                    .execute(&mut *conn)
                    .await
                    .map_err(StoreError::query("mark raw cached"))?;
            }
            Ok(())
        }
        .await;
        tx::finish(conn, result).await
    }
}

async fn get_global_i64_tx(conn: &mut SqliteConnection, name: &str) -> StoreResult<Option<i64>> {
    let value = sqlx::query_scalar::<_, String>("SELECT value FROM user.global WHERE name = ?")
        .bind(name)
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::query("get global"))?;
    Ok(value.and_then(|value| value.parse().ok()))
}

async fn intern_label(
    conn: &mut SqliteConnection,
    table: &'static str,
    name: &str,
) -> StoreResult<i64> {
    let insert = format!("INSERT OR IGNORE INTO {table} (name) VALUES (?)");
    sqlx::query(&insert)
        .bind(name)
        .execute(&mut *conn)
        .await
        .map_err(StoreError::query("intern label"))?;
    let select = format!("SELECT id FROM {table} WHERE name = ?");
    sqlx::query_scalar::<_, i64>(&select)
        .bind(name)
        .fetch_one(&mut *conn)
        .await
        .map_err(StoreError::query("intern label"))
}

async fn upsert_series_tx(
    conn: &mut SqliteConnection,
    series: &Series,
    stamp: i64,
) -> StoreResult<()> {
    let existing = sqlx::query(SELECT_SERIES_SQL)
        .bind(series.id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::query("load series"))?;
    match existing {
        None => {
            sqlx::query(INSERT_SERIES_SQL)
                .bind(series.id)
                .bind(&series.imdb_id)
                .bind(&series.name)
                .bind(&series.banner)
                .bind(&series.poster)
                .bind(series.tvdb_id)
                .bind(series.tvrage_id)
                .bind(&series.youtube_trailer)
                .bind(stamp)
                .execute(&mut *conn)
                .await
                .map_err(StoreError::query("insert series"))?;
        }
        Some(row) => {
            let current = decode_series(&row)?;
            let deleted: i64 = row
                .try_get("deleted")
                .map_err(StoreError::query("decode series"))?;
            if current != *series || deleted != 0 {
                sqlx::query(UPDATE_SERIES_SQL)
                    .bind(&series.imdb_id)
                    .bind(&series.name)
                    .bind(&series.banner)
                    .bind(&series.poster)
                    .bind(series.tvdb_id)
                    .bind(series.tvrage_id)
                    .bind(&series.youtube_trailer)
                    .bind(stamp)
                    .bind(series.id)
                    .execute(&mut *conn)
                    .await
                    .map_err(StoreError::query("update series"))?;
            }
        }
    }
    Ok(())
}

async fn upsert_group_tx(
    conn: &mut SqliteConnection,
    group: &Group,
    stamp: i64,
) -> StoreResult<()> {
    let category_id = intern_label(conn, "category", group.category.as_label()).await?;
    let existing = sqlx::query(SELECT_GROUP_SQL)
        .bind(group.id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::query("load group"))?;
    match existing {
        None => {
            sqlx::query(INSERT_GROUP_SQL)
                .bind(group.id)
                .bind(category_id)
                .bind(&group.name)
                .bind(group.series_id)
                .bind(stamp)
                .execute(&mut *conn)
                .await
                .map_err(StoreError::query("insert group"))?;
        }
        Some(row) => {
            let current = decode_group(&row)?;
            let deleted: i64 = row
                .try_get("deleted")
                .map_err(StoreError::query("decode group"))?;
            if current != *group || deleted != 0 {
                sqlx::query(UPDATE_GROUP_SQL)
                    .bind(category_id)
                    .bind(&group.name)
                    .bind(group.series_id)
                    .bind(stamp)
                    .bind(group.id)
                    .execute(&mut *conn)
                    .await
                    .map_err(StoreError::query("update group"))?;
            }
        }
    }
    Ok(())
}

async fn upsert_entry_tx(
    conn: &mut SqliteConnection,
    entry: &TorrentEntry,
    stamp: i64,
) -> StoreResult<()> {
    let codec_id = intern_label(conn, "codec", &entry.codec).await?;
    let container_id = intern_label(conn, "container", &entry.container).await?;
    let origin_id = intern_label(conn, "origin", &entry.origin).await?;
    let resolution_id = intern_label(conn, "resolution", &entry.resolution).await?;
    let source_id = intern_label(conn, "source", &entry.source).await?;

    let existing = sqlx::query(SELECT_ENTRY_STATE_SQL)
        .bind(entry.id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(StoreError::query("load torrent entry"))?;

    let Some(row) = existing else {
        sqlx::query(INSERT_ENTRY_SQL)
            .bind(entry.id)
            .bind(codec_id)
            .bind(container_id)
            .bind(entry.group_id)
            .bind(&entry.info_hash)
            .bind(entry.leechers)
            .bind(origin_id)
            .bind(&entry.release_name)
            .bind(resolution_id)
            .bind(entry.seeders)
            .bind(entry.size)
            .bind(entry.snatched)
            .bind(source_id)
            .bind(entry.time)
            .bind(i64::from(entry.raw_torrent_cached))
            .bind(stamp)
            .execute(&mut *conn)
            .await
            .map_err(StoreError::query("insert torrent entry"))?;
        return Ok(());
    };

    let decode = StoreError::query("decode torrent entry");
    let important_changed = row.try_get::<i64, _>("codec_id").map_err(decode)? != codec_id
        || row
            .try_get::<i64, _>("container_id")
            .map_err(StoreError::query("decode torrent entry"))?
            != container_id
        || row
            .try_get::<i64, _>("group_id")
            .map_err(StoreError::query("decode torrent entry"))?
            != entry.group_id
        || row
            .try_get::<Option<String>, _>("info_hash")
            .map_err(StoreError::query("decode torrent entry"))?
            .as_deref()
            != Some(entry.info_hash.as_str())
        || row
            .try_get::<i64, _>("origin_id")
            .map_err(StoreError::query("decode torrent entry"))?
            != origin_id
        || row
            .try_get::<String, _>("release_name")
            .map_err(StoreError::query("decode torrent entry"))?
            != entry.release_name
        || row
            .try_get::<i64, _>("resolution_id")
            .map_err(StoreError::query("decode torrent entry"))?
            != resolution_id
        || row
            .try_get::<i64, _>("size")
            .map_err(StoreError::query("decode torrent entry"))?
            != entry.size
        || row
            .try_get::<i64, _>("source_id")
            .map_err(StoreError::query("decode torrent entry"))?
            != source_id
        || row
            .try_get::<i64, _>("time")
            .map_err(StoreError::query("decode torrent entry"))?
            != entry.time
        || row
            .try_get::<i64, _>("deleted")
            .map_err(StoreError::query("decode torrent entry"))?
            != 0;

    let counters_changed = row
        .try_get::<i64, _>("seeders")
        .map_err(StoreError::query("decode torrent entry"))?
        != entry.seeders
        || row
            .try_get::<i64, _>("leechers")
            .map_err(StoreError::query("decode torrent entry"))?
            != entry.leechers
        || row
            .try_get::<i64, _>("snatched")
            .map_err(StoreError::query("decode torrent entry"))?
            != entry.snatched;

    if important_changed {
        sqlx::query(UPDATE_ENTRY_SQL)
            .bind(codec_id)
            .bind(container_id)
            .bind(entry.group_id)
            .bind(&entry.info_hash)
            .bind(entry.leechers)
            .bind(origin_id)
            .bind(&entry.release_name)
            .bind(resolution_id)
            .bind(entry.seeders)
            .bind(entry.size)
            .bind(entry.snatched)
            .bind(source_id)
            .bind(entry.time)
            .bind(stamp)
            .bind(entry.id)
            .execute(&mut *conn)
            .await
            .map_err(StoreError::query("update torrent entry"))?;
    } else if counters_changed {
        sqlx::query(UPDATE_ENTRY_COUNTERS_SQL)
            .bind(entry.seeders)
            .bind(entry.leechers)
            .bind(entry.snatched)
            .bind(entry.id)
            .execute(&mut *conn)
            .await
            .map_err(StoreError::query("update torrent counters"))?;
    }
    Ok(())
}

pub(crate) async fn upsert_catalog_torrent_tx(
    conn: &mut SqliteConnection,
    row: &CatalogTorrent,
    stamp: i64,
) -> StoreResult<()> {
    upsert_series_tx(conn, &row.series, stamp).await?;
    upsert_group_tx(conn, &row.group, stamp).await?;
    upsert_entry_tx(conn, &row.entry, stamp).await
}

pub(crate) async fn cascade_deletions_tx(
    conn: &mut SqliteConnection,
    stamp: i64,
) -> StoreResult<()> {
    sqlx::query(CASCADE_GROUPS_SQL)
        .bind(stamp)
        .execute(&mut *conn)
        .await
        .map_err(StoreError::query("cascade group deletions"))?;
    sqlx::query(CASCADE_SERIES_SQL)
        .bind(stamp)
        .execute(&mut *conn)
        .await
        .map_err(StoreError::query("cascade series deletions"))?;
    Ok(())
}

async fn fill_id_table_tx(conn: &mut SqliteConnection, ids: &[i64]) -> StoreResult<()> {
    sqlx::query("CREATE TEMP TABLE IF NOT EXISTS scrape_ids (id INTEGER NOT NULL PRIMARY KEY)")
        .execute(&mut *conn)
        .await
        .map_err(StoreError::query("create id table"))?;
    sqlx::query("DELETE FROM temp.scrape_ids")
        .execute(&mut *conn)
        .await
        .map_err(StoreError::query("clear id table"))?;
    for chunk in ids.chunks(ID_INSERT_CHUNK) {
        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("INSERT INTO temp.scrape_ids (id) ");
        builder.push_values(chunk, |mut binder, id| {
            binder.push_bind(*id);
        });
        builder
            .build()
            .execute(&mut *conn)
            .await
            .map_err(StoreError::query("fill id table"))?;
    }
    Ok(())
}

async fn clear_id_table_tx(conn: &mut SqliteConnection) -> StoreResult<()> {
    sqlx::query("DELETE FROM temp.scrape_ids")
        .execute(&mut *conn)
        .await
        .map_err(StoreError::query("clear id table"))
        .map(|_| ())
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &TorrentFilter) {
    if let Some(id) = filter.id {
        builder.push(" AND torrent_entry.id = ");
        builder.push_bind(id);
    }
    if let Some(series) = &filter.series {
        builder.push(" AND series.name = ");
        builder.push_bind(series.clone());
    }
    if let Some(category) = &filter.category {
        builder.push(" AND category.name = ");
        builder.push_bind(category.clone());
    }
    if let Some(name) = &filter.name {
        builder.push(" AND torrent_entry_group.name = ");
        builder.push_bind(name.clone());
    }
    if let Some(codec) = &filter.codec {
        builder.push(" AND codec.name = ");
        builder.push_bind(codec.clone());
    }
    if let Some(container) = &filter.container {
        builder.push(" AND container.name = ");
        builder.push_bind(container.clone());
    }
    if let Some(source) = &filter.source {
        builder.push(" AND source.name = ");
        builder.push_bind(source.clone());
    }
    if let Some(resolution) = &filter.resolution {
        builder.push(" AND resolution.name = ");
        builder.push_bind(resolution.clone());
    }
    if let Some(origin) = &filter.origin {
        builder.push(" AND origin.name = ");
        builder.push_bind(origin.clone());
    }
    if let Some(info_hash) = &filter.info_hash {
        builder.push(" AND torrent_entry.info_hash = ");
        builder.push_bind(info_hash.clone());
    }
    if let Some(tvdb_id) = filter.tvdb_id {
        builder.push(" AND series.tvdb_id = ");
        builder.push_bind(tvdb_id);
    }
    if let Some(tvrage_id) = filter.tvrage_id {
        builder.push(" AND series.tvrage_id = ");
        builder.push_bind(tvrage_id);
    }
    if let Some(time) = filter.time {
        builder.push(" AND torrent_entry.time = ");
        builder.push_bind(time);
    }
}

fn decode_series(row: &SqliteRow) -> StoreResult<Series> {
    let decode = StoreError::query("decode series");
    Ok(Series {
        id: row.try_get("id").map_err(decode)?,
        imdb_id: row
            .try_get("imdb_id")
            .map_err(StoreError::query("decode series"))?,
        name: row
            .try_get("name")
            .map_err(StoreError::query("decode series"))?,
        banner: row
            .try_get("banner")
            .map_err(StoreError::query("decode series"))?,
        poster: row
            .try_get("poster")
            .map_err(StoreError::query("decode series"))?,
        tvdb_id: row
            .try_get("tvdb_id")
            .map_err(StoreError::query("decode series"))?,
        tvrage_id: row
            .try_get("tvrage_id")
            .map_err(StoreError::query("decode series"))?,
        youtube_trailer: row
            .try_get("youtube_trailer")
            .map_err(StoreError::query("decode series"))?,
    })
}

fn decode_group(row: &SqliteRow) -> StoreResult<Group> {
    let decode = StoreError::query("decode group");
    let category: Option<String> = row.try_get("category").map_err(decode)?;
    Ok(Group {
        id: row
            .try_get("id")
            .map_err(StoreError::query("decode group"))?,
        category: GroupCategory::from_label(category.as_deref().unwrap_or_default()),
        name: row
            .try_get("name")
            .map_err(StoreError::query("decode group"))?,
        series_id: row
            .try_get("series_id")
            .map_err(StoreError::query("decode group"))?,
    })
}

fn decode_entry(row: &SqliteRow) -> StoreResult<TorrentEntry> {
    let decode = StoreError::query("decode torrent entry");
    Ok(TorrentEntry {
        id: row.try_get("id").map_err(decode)?,
        group_id: row
            .try_get("group_id")
            .map_err(StoreError::query("decode torrent entry"))?,
        info_hash: row
            .try_get::<Option<String>, _>("info_hash")
            .map_err(StoreError::query("decode torrent entry"))?
            .unwrap_or_default(),
        codec: row
            .try_get::<Option<String>, _>("codec")
            .map_err(StoreError::query("decode torrent entry"))?
            .unwrap_or_default(),
        container: row
            .try_get::<Option<String>, _>("container")
            .map_err(StoreError::query("decode torrent entry"))?
            .unwrap_or_default(),
        origin: row
            .try_get::<Option<String>, _>("origin")
            .map_err(StoreError::query("decode torrent entry"))?
            .unwrap_or_default(),
        resolution: row
            .try_get::<Option<String>, _>("resolution")
            .map_err(StoreError::query("decode torrent entry"))?
            .unwrap_or_default(),
        source: row
            .try_get::<Option<String>, _>("source")
            .map_err(StoreError::query("decode torrent entry"))?
            .unwrap_or_default(),
        release_name: row
            .try_get("release_name")
            .map_err(StoreError::query("decode torrent entry"))?,
        size: row
            .try_get("size")
            .map_err(StoreError::query("decode torrent entry"))?,
        time: row
            .try_get("time")
            .map_err(StoreError::query("decode torrent entry"))?,
        seeders: row
            .try_get("seeders")
            .map_err(StoreError::query("decode torrent entry"))?,
        leechers: row
            .try_get("leechers")
            .map_err(StoreError::query("decode torrent entry"))?,
        snatched: row
            .try_get("snatched")
            .map_err(StoreError::query("decode torrent entry"))?,
        raw_torrent_cached: row
            .try_get::<i64, _>("raw_torrent_cached")
            .map_err(StoreError::query("decode torrent entry"))?
            != 0,
    })
}
