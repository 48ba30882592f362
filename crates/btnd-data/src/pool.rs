//! Database open/attach plumbing.
//!
//! The catalog lives in `metadata.db`; bucket, cursor, and account state
//! live in `user.db`. Every pooled connection attaches the user database
//! as schema `user` so both are visible in one namespace and share each
//! transaction.

use std::path::{Path, PathBuf};
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};

use crate::error::{StoreError, StoreResult};
use crate::schema::{METADATA_SCHEMA, USER_SCHEMA};

const BUSY_TIMEOUT: Duration = Duration::from_secs(120);

/// Open the two-database pool and bootstrap the schema.
pub(crate) async fn open_pool(
    metadata_path: &Path,
    user_path: &Path,
    max_connections: u32,
) -> StoreResult<SqlitePool> {
    let options = SqliteConnectOptions::new()
        .filename(metadata_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT);

    let attach = attach_statement(user_path);
    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .after_connect(move |conn, _meta| {
            let attach = attach.clone();
            Box::pin(async move {
                sqlx::query(&attach).execute(&mut *conn).await?;
                sqlx::query("PRAGMA user.journal_mode = WAL")
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect_with(options)
        .await
        .map_err(|err| StoreError::Open {
            path: PathBuf::from(metadata_path),
            source: err,
        })?;

    for statement in METADATA_SCHEMA.iter().chain(USER_SCHEMA) {
        sqlx::query(statement)
            .execute(&pool)
            .await
            .map_err(StoreError::query("schema bootstrap"))?;
    }

    Ok(pool)
}

fn attach_statement(user_path: &Path) -> String {
    // Single quotes in the path are escaped; ATTACH cannot take a bound
    // parameter for the schema name side anyway.
    let path = user_path.to_string_lossy().replace('\'', "''");
    format!("ATTACH DATABASE '{path}' AS user")
}
