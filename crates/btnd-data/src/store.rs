//! The cache store: one handle over the catalog and user databases.

use std::path::Path;

use btnd_model::{ChangeAction, ChangeRecord, EntityKind, Snatch, UserInfo};
use sqlx::sqlite::SqlitePool;
use sqlx::{Row, SqliteConnection};

use crate::error::{StoreError, StoreResult};
use crate::pool::open_pool;
use crate::tx;

const INSERT_USER_INFO_SQL: &str = "
    INSERT OR REPLACE INTO user.user_info (
        id, bonus, class_name, class_level, download,
        email, enabled, hnr, invites, join_date,
        lumens, paranoia, snatches, title, upload,
        uploads_snatched, username
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
";

const SELECT_USER_INFO_SQL: &str = "SELECT * FROM user.user_info LIMIT 1";

const SELECT_SNATCH_SQL: &str = "
    SELECT id, downloaded, uploaded, seed_time, seeding, snatch_time, hnr_removed
    FROM user.snatch WHERE id = ?
";

const UPDATE_SNATCH_SQL: &str = "
    UPDATE user.snatch
    SET downloaded = ?, uploaded = ?, seed_time = ?, seeding = ?,
        snatch_time = ?, hnr_removed = ?, updated_at = ?
    WHERE id = ?
";

const INSERT_SNATCH_SQL: &str = "
    INSERT INTO user.snatch (
        id, downloaded, uploaded, seed_time, seeding, snatch_time,
        hnr_removed, updated_at
    ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
";

/// Row-level cache of the remote catalog plus account state, shared by
/// every worker through an internal connection pool.
#[derive(Clone)]
pub struct CacheStore {
    pool: SqlitePool,
}

impl CacheStore {
    /// Open (creating if necessary) the catalog and user databases and
    /// bootstrap their schema.
    ///
    /// # Errors
    ///
    /// Returns an error when either database cannot be opened or the
    /// schema cannot be applied.
    pub async fn open(
        metadata_path: &Path,
        user_path: &Path,
        max_connections: u32,
    ) -> StoreResult<Self> {
        let pool = open_pool(metadata_path, user_path, max_connections).await?;
        Ok(Self { pool })
    }

    /// Access the shared pool. The token buckets persist their state
    /// through the same pool so all processes observe one quota.
    #[must_use]
    pub const fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub(crate) async fn writer(&self) -> StoreResult<sqlx::pool::PoolConnection<sqlx::Sqlite>> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(|source| StoreError::Acquire { source })?;
        tx::begin_immediate(&mut conn).await?;
        Ok(conn)
    }

    /// Read one value from the global KV table.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn get_global(&self, name: &str) -> StoreResult<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT value FROM user.global WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::query("get global"))
    }

    /// Read one integer value from the global KV table. Values that do
    /// not parse as integers read as `None`.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn get_global_i64(&self, name: &str) -> StoreResult<Option<i64>> {
        Ok(self
            .get_global(name)
            .await?
            .and_then(|value| value.parse().ok()))
    }

    /// Write one value into the global KV table.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails.
    pub async fn set_global(&self, name: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.writer().await?;
        let result = Self::set_global_tx(&mut conn, name, Some(value)).await;
        tx::finish(conn, result).await
    }

    /// Remove one value from the global KV table.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails.
    pub async fn delete_global(&self, name: &str) -> StoreResult<()> {
        let mut conn = self.writer().await?;
        let result = Self::set_global_tx(&mut conn, name, None).await;
        tx::finish(conn, result).await
    }

    pub(crate) async fn set_global_tx(
        conn: &mut SqliteConnection,
        name: &str,
        value: Option<&str>,
    ) -> StoreResult<()> {
        match value {
            Some(value) => {
                sqlx::query("INSERT OR REPLACE INTO user.global (name, value) VALUES (?, ?)")
                    .bind(name)
                    .bind(value)
                    .execute(&mut *conn)
                    .await
                    .map_err(StoreError::query("set global"))?;
            }
            None => {
                sqlx::query("DELETE FROM user.global WHERE name = ?")
                    .bind(name)
                    .execute(&mut *conn)
                    .await
                    .map_err(StoreError::query("delete global"))?;
            }
        }
        Ok(())
    }

    /// Replace the account singleton.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails.
    pub async fn replace_user_info(&self, user: &UserInfo) -> StoreResult<()> {
        let mut conn = self.writer().await?;
        let result = async {
            sqlx::query("DELETE FROM user.user_info")
                .execute(&mut *conn)
                .await
                .map_err(StoreError::query("clear user info"))?;
            sqlx::query(INSERT_USER_INFO_SQL)
                .bind(user.id)
                .bind(user.bonus)
                .bind(&user.class_name)
                .bind(user.class_level)
                .bind(user.download)
                .bind(&user.email)
                .bind(i64::from(user.enabled))
                .bind(user.hnr)
                .bind(user.invites)
                .bind(user.join_date)
                .bind(user.lumens)
                .bind(user.paranoia)
                .bind(user.snatches)
                .bind(&user.title)
                .bind(user.upload)
                .bind(user.uploads_snatched)
                .bind(&user.username)
                .execute(&mut *conn)
                .await
                .map_err(StoreError::query("insert user info"))?;
            Ok(())
        }
        .await;
        tx::finish(conn, result).await
    }

    /// Read the account singleton, when one has been stored.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn user_info(&self) -> StoreResult<Option<UserInfo>> {
        let row = sqlx::query(SELECT_USER_INFO_SQL)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::query("load user info"))?;
        let Some(row) = row else {
            return Ok(None);
        };
        let decode = StoreError::query("decode user info");
        Ok(Some(UserInfo {
            id: row.try_get("id").map_err(decode)?,
            bonus: row.try_get("bonus").map_err(StoreError::query("decode user info"))?,
            class_name: row
                .try_get("class_name")
                .map_err(StoreError::query("decode user info"))?,
            class_level: row
                .try_get("class_level")
                .map_err(StoreError::query("decode user info"))?,
            download: row
                .try_get("download")
                .map_err(StoreError::query("decode user info"))?,
            email: row
                .try_get("email")
                .map_err(StoreError::query("decode user info"))?,
            enabled: row
                .try_get::<i64, _>("enabled")
                .map_err(StoreError::query("decode user info"))?
                != 0,
            hnr: row.try_get("hnr").map_err(StoreError::query("decode user info"))?,
            invites: row
                .try_get("invites")
                .map_err(StoreError::query("decode user info"))?,
            join_date: row
                .try_get("join_date")
                .map_err(StoreError::query("decode user info"))?,
            lumens: row
                .try_get("lumens")
                .map_err(StoreError::query("decode user info"))?,
            paranoia: row
                .try_get("paranoia")
                .map_err(StoreError::query("decode user info"))?,
            snatches: row
                .try_get("snatches")
                .map_err(StoreError::query("decode user info"))?,
            title: row
                .try_get("title")
                .map_err(StoreError::query("decode user info"))?,
            upload: row
                .try_get("upload")
                .map_err(StoreError::query("decode user info"))?,
            uploads_snatched: row
                .try_get("uploads_snatched")
                .map_err(StoreError::query("decode user info"))?,
            username: row
                .try_get("username")
                .map_err(StoreError::query("decode user info"))?,
        }))
    }

    /// Upsert a page of snatch history. Rows whose fields are unchanged
    /// are left untouched; changed or new rows take the transaction's
    /// change-stamp.
    ///
    /// # Errors
    ///
    /// Returns an error when the write fails.
    pub async fn upsert_snatches(&self, snatches: &[Snatch]) -> StoreResult<()> {
        if snatches.is_empty() {
            return Ok(());
        }
        let mut conn = self.writer().await?;
        let result = async {
            let stamp = tx::next_changestamp(&mut conn).await?;
            for snatch in snatches {
                let existing = sqlx::query(SELECT_SNATCH_SQL)
                    .bind(snatch.id)
                    .fetch_optional(&mut *conn)
                    .await
                    .map_err(StoreError::query("load snatch"))?;
                let changed = match &existing {
                    None => true,
                    Some(row) => decode_snatch(row)? != *snatch,
                };
                if !changed {
                    continue;
                }
                if existing.is_some() {
                    sqlx::query(UPDATE_SNATCH_SQL)
                        .bind(snatch.downloaded)
                        .bind(snatch.uploaded)
                        .bind(snatch.seed_time)
                        .bind(i64::from(snatch.seeding))
                        .bind(snatch.snatch_time)
                        .bind(i64::from(snatch.hnr_removed))
                        .bind(stamp)
                        .bind(snatch.id)
                        .execute(&mut *conn)
                        .await
                        .map_err(StoreError::query("update snatch"))?;
                } else {
                    sqlx::query(INSERT_SNATCH_SQL)
                        .bind(snatch.id)
                        .bind(snatch.downloaded)
                        .bind(snatch.uploaded)
                        .bind(snatch.seed_time)
                        .bind(i64::from(snatch.seeding))
                        .bind(snatch.snatch_time)
                        .bind(i64::from(snatch.hnr_removed))
                        .bind(stamp)
                        .execute(&mut *conn)
                        .await
                        .map_err(StoreError::query("insert snatch"))?;
                }
            }
            Ok(())
        }
        .await;
        tx::finish(conn, result).await
    }

    /// Read one snatch row.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn snatch(&self, id: i64) -> StoreResult<Option<Snatch>> {
        let row = sqlx::query(SELECT_SNATCH_SQL)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(StoreError::query("load snatch"))?;
        row.as_ref().map(decode_snatch).transpose()
    }

    /// Change tail: every mutation with `updated_at > stamp`, in stamp
    /// order, for one entity kind or for all of them.
    ///
    /// # Errors
    ///
    /// Returns an error when the query fails.
    pub async fn changes_since(
        &self,
        kind: Option<EntityKind>,
        stamp: i64,
    ) -> StoreResult<Vec<ChangeRecord>> {
        let kinds = kind.map_or_else(|| EntityKind::all().to_vec(), |kind| vec![kind]);
        let mut records = Vec::new();
        for kind in kinds {
            let sql = format!(
                "SELECT id, updated_at, deleted FROM {} WHERE updated_at > ? ORDER BY updated_at",
                kind.table()
            );
            let rows = sqlx::query(&sql)
                .bind(stamp)
                .fetch_all(&self.pool)
                .await
                .map_err(StoreError::query("tail changes"))?;
            for row in rows {
                let deleted: i64 = row
                    .try_get("deleted")
                    .map_err(StoreError::query("tail changes"))?;
                records.push(ChangeRecord {
                    kind,
                    action: if deleted != 0 {
                        ChangeAction::Delete
                    } else {
                        ChangeAction::Update
                    },
                    id: row.try_get("id").map_err(StoreError::query("tail changes"))?,
                    stamp: row
                        .try_get("updated_at")
                        .map_err(StoreError::query("tail changes"))?,
                });
            }
        }
        records.sort_by_key(|record| record.stamp);
        Ok(records)
    }
}

fn decode_snatch(row: &sqlx::sqlite::SqliteRow) -> StoreResult<Snatch> {
    let decode = StoreError::query("decode snatch");
    Ok(Snatch {
        id: row.try_get("id").map_err(decode)?,
        downloaded: row
            .try_get("downloaded")
            .map_err(StoreError::query("decode snatch"))?,
        uploaded: row
            .try_get("uploaded")
            .map_err(StoreError::query("decode snatch"))?,
        seed_time: row
            .try_get("seed_time")
            .map_err(StoreError::query("decode snatch"))?,
        seeding: row
            .try_get::<i64, _>("seeding")
            .map_err(StoreError::query("decode snatch"))?
            != 0,
        snatch_time: row
            .try_get("snatch_time")
            .map_err(StoreError::query("decode snatch"))?,
        hnr_removed: row
            .try_get::<i64, _>("hnr_removed")
            .map_err(StoreError::query("decode snatch"))?
            != 0,
    })
}
