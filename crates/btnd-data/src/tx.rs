//! Immediate-transaction helpers shared by every write path.
//!
//! Writers take the database write lock up front with `BEGIN IMMEDIATE`.
//! Lock contention surfaces as `SQLITE_BUSY` on the begin statement; that
//! is retried without bound, with a warning, so a write path never fails
//! because another process held the lock.

use std::time::Duration;

use sqlx::SqliteConnection;
use sqlx::pool::PoolConnection;
use tracing::warn;

use crate::error::{StoreError, StoreResult};

const BUSY_RETRY_DELAY: Duration = Duration::from_millis(100);

pub(crate) fn is_busy(err: &sqlx::Error) -> bool {
    err.as_database_error().is_some_and(|db_err| {
        db_err.code().as_deref() == Some("5") || db_err.message().contains("database is locked")
    })
}

/// Start an immediate transaction, retrying busy collisions forever.
pub(crate) async fn begin_immediate(conn: &mut SqliteConnection) -> StoreResult<()> {
    loop {
        match sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await {
            Ok(_) => return Ok(()),
            Err(err) if is_busy(&err) => {
                warn!("database busy while starting immediate transaction, will retry");
                tokio::time::sleep(BUSY_RETRY_DELAY).await;
            }
            Err(err) => return Err(StoreError::query("begin immediate")(err)),
        }
    }
}

/// Commit on success, roll back on failure, and return the body's result.
pub(crate) async fn finish<T>(
    mut conn: PoolConnection<sqlx::Sqlite>,
    result: StoreResult<T>,
) -> StoreResult<T> {
    match result {
        Ok(value) => {
            sqlx::query("COMMIT")
                .execute(&mut *conn)
                .await
                .map_err(StoreError::query("commit"))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                warn!(error = %rollback_err, "rollback after failed write also failed");
            }
            Err(err)
        }
    }
}

/// Advance the persisted change-stamp counter and return the new value.
///
/// Must run inside an open transaction; every row touched by that
/// transaction shares the returned stamp.
pub(crate) async fn next_changestamp(conn: &mut SqliteConnection) -> StoreResult<i64> {
    sqlx::query_scalar::<_, i64>(
        "INSERT INTO user.global (name, value) VALUES ('changestamp', '1')
         ON CONFLICT (name) DO UPDATE SET value = CAST(value AS INTEGER) + 1
         RETURNING CAST(value AS INTEGER)",
    )
    .fetch_one(&mut *conn)
    .await
    .map_err(StoreError::query("advance changestamp"))
}
