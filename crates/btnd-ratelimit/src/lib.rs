#![forbid(unsafe_code)]
#![deny(
    warnings,
    dead_code,
    unused,
    unused_imports,
    unused_must_use,
    unreachable_pub,
    clippy::all,
    rustdoc::broken_intra_doc_links,
    rustdoc::bare_urls,
    missing_docs
)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

//! Durable rate limiting shared by every worker and process.
//!
//! Two bucket shapes cover the remote's budgets. The generic bucket is a
//! classic leaky bucket for the short-period HTTP budget; the scheduled
//! bucket keeps the exact sliding-window queue of consumption timestamps
//! the remote uses for its API quota. Both persist their state in the
//! attached user database, so the quota is a single fact no matter how
//! many threads or processes consume from it, and both compute wait
//! times analytically rather than spin-waiting.

use std::time::Duration;

use chrono::Utc;
use sqlx::sqlite::SqlitePool;
use sqlx::{Row, SqliteConnection};
use thiserror::Error;
use tracing::warn;

const BUSY_RETRY_DELAY: Duration = Duration::from_millis(100);
/// Slack added to analytic waits so a re-check lands after the refill.
const WAIT_SLACK: f64 = 0.01;

/// Result alias for bucket operations.
pub type RateLimitResult<T> = Result<T, RateLimitError>;

/// Errors raised by the token buckets.
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// A database operation failed.
    #[error("token bucket database operation failed")]
    Query {
        /// Operation identifier.
        operation: &'static str,
        /// Source database error.
        source: sqlx::Error,
    },
}

impl RateLimitError {
    fn query(operation: &'static str) -> impl FnOnce(sqlx::Error) -> Self {
        move |source| Self::Query { operation, source }
    }
}

/// Outcome of a non-blocking token request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TokenGrant {
    /// Whether the tokens were taken.
    pub granted: bool,
    /// Tokens remaining (or currently available) after the call.
    pub remaining: f64,
    /// Time until a retry could succeed. Zero when granted.
    pub wait: Duration,
}

/// Snapshot of a bucket's state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketLevel {
    /// Tokens currently available.
    pub tokens: f64,
    /// Bucket capacity.
    pub rate: i64,
    /// Refill period or sliding window, in seconds.
    pub period: f64,
}

/// Current wall-clock time as fractional Unix seconds.
#[must_use]
pub fn now_unix() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

/// The stock fill used after a remote quota breach: `n` synthetic
/// timestamps distributed evenly across `[when - period, when]`, newest
/// at `when`, so subsequent waits drain at the remote's observed pace.
#[must_use]
pub fn even_fill(when: f64, period: f64, n: i64) -> Vec<f64> {
    if n <= 0 {
        return Vec::new();
    }
    let step = period / n as f64;
    (1..=n).map(|i| when - period + i as f64 * step).collect()
}

async fn begin_immediate(conn: &mut SqliteConnection) -> RateLimitResult<()> {
    loop {
        match sqlx::query("BEGIN IMMEDIATE").execute(&mut *conn).await {
            Ok(_) => return Ok(()),
            Err(err)
                if err.as_database_error().is_some_and(|db_err| {
                    db_err.code().as_deref() == Some("5")
                        || db_err.message().contains("database is locked")
                }) =>
            {
                warn!("database busy while locking token bucket, will retry");
                tokio::time::sleep(BUSY_RETRY_DELAY).await;
            }
            Err(err) => return Err(RateLimitError::query("begin immediate")(err)),
        }
    }
}

async fn finish<T>(
    mut conn: sqlx::pool::PoolConnection<sqlx::Sqlite>,
    result: RateLimitResult<T>,
) -> RateLimitResult<T> {
    match result {
        Ok(value) => {
            sqlx::query("COMMIT")
                .execute(&mut *conn)
                .await
                .map_err(RateLimitError::query("commit"))?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
                warn!(error = %rollback_err, "rollback after failed bucket update also failed");
            }
            Err(err)
        }
    }
}

/// Classic leaky bucket `(level, last_refill_time)` persisted in the
/// user database. Covers the generic HTTP budget.
#[derive(Clone)]
pub struct TokenBucket {
    pool: SqlitePool,
    key: String,
    rate: i64,
    period: f64,
}

impl TokenBucket {
    /// Bind a bucket to its durable row, creating the backing table when
    /// missing. The pool must have the user database attached.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing table cannot be created.
    pub async fn new(
        pool: SqlitePool,
        key: impl Into<String>,
        rate: i64,
        period: f64,
    ) -> RateLimitResult<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS user.token_bucket (
                key TEXT PRIMARY KEY,
                tokens REAL NOT NULL,
                last REAL NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(RateLimitError::query("create bucket table"))?;
        Ok(Self {
            pool,
            key: key.into(),
            rate,
            period,
        })
    }

    /// Take `n` tokens, blocking (cooperatively) until the bucket would
    /// retain at least `leave` tokens afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error when the bucket state cannot be read or written.
    pub async fn consume(&self, n: i64, leave: i64) -> RateLimitResult<()> {
        loop {
            let grant = self.try_consume(n, leave).await?;
            if grant.granted {
                return Ok(());
            }
            tokio::time::sleep(grant.wait).await;
        }
    }

    /// Non-blocking twin of [`TokenBucket::consume`]: reports whether the
    /// tokens were taken and, if not, the analytic wait until they could
    /// be.
    ///
    /// # Errors
    ///
    /// Returns an error when the bucket state cannot be read or written.
    pub async fn try_consume(&self, n: i64, leave: i64) -> RateLimitResult<TokenGrant> {
        self.try_consume_at(n, leave, now_unix()).await
    }

    /// [`TokenBucket::try_consume`] against an explicit clock reading.
    ///
    /// # Errors
    ///
    /// Returns an error when the bucket state cannot be read or written.
    pub async fn try_consume_at(&self, n: i64, leave: i64, now: f64) -> RateLimitResult<TokenGrant> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(RateLimitError::query("acquire connection"))?;
        begin_immediate(&mut conn).await?;
        let result = self.try_consume_tx(&mut conn, n, leave, now).await;
        finish(conn, result).await
    }

    async fn try_consume_tx(
        &self,
        conn: &mut SqliteConnection,
        n: i64,
        leave: i64,
        now: f64,
    ) -> RateLimitResult<TokenGrant> {
        let (mut tokens, mut last) = self.load_tx(conn, now).await?;

        // Refill: whole tokens accrued since the last refill, capped at
        // the bucket capacity.
        let accrued = ((now - last) * self.rate as f64 / self.period).floor();
        if accrued > 0.0 {
            tokens = (tokens + accrued).min(self.rate as f64);
            if tokens >= self.rate as f64 {
                last = now;
            } else {
                last += accrued * self.period / self.rate as f64;
            }
        }

        let needed = (n + leave) as f64;
        if tokens >= needed {
            tokens -= n as f64;
            self.save_tx(conn, tokens, last).await?;
            return Ok(TokenGrant {
                granted: true,
                remaining: tokens,
                wait: Duration::ZERO,
            });
        }

        self.save_tx(conn, tokens, last).await?;
        let deficit = needed - tokens;
        let wait = deficit * self.period / self.rate as f64 + WAIT_SLACK;
        Ok(TokenGrant {
            granted: false,
            remaining: tokens,
            wait: Duration::from_secs_f64(wait.max(0.0)),
        })
    }

    /// Read the current level without consuming. `try_consume(0)` by
    /// construction: never changes observable state.
    ///
    /// # Errors
    ///
    /// Returns an error when the bucket state cannot be read.
    pub async fn peek(&self) -> RateLimitResult<BucketLevel> {
        let grant = self.try_consume(0, 0).await?;
        Ok(BucketLevel {
            tokens: grant.remaining,
            rate: self.rate,
            period: self.period,
        })
    }

    async fn load_tx(
        &self,
        conn: &mut SqliteConnection,
        now: f64,
    ) -> RateLimitResult<(f64, f64)> {
        let row = sqlx::query("SELECT tokens, last FROM user.token_bucket WHERE key = ?")
            .bind(&self.key)
            .fetch_optional(&mut *conn)
            .await
            .map_err(RateLimitError::query("load bucket"))?;
        match row {
            Some(row) => Ok((
                row.try_get("tokens")
                    .map_err(RateLimitError::query("decode bucket"))?,
                row.try_get("last")
                    .map_err(RateLimitError::query("decode bucket"))?,
            )),
            // A bucket never seen before starts full.
            None => Ok((self.rate as f64, now)),
        }
    }

    async fn save_tx(
        &self,
        conn: &mut SqliteConnection,
        tokens: f64,
        last: f64,
    ) -> RateLimitResult<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO user.token_bucket (key, tokens, last) VALUES (?, ?, ?)",
        )
        .bind(&self.key)
        .bind(tokens)
        .bind(last)
        .execute(&mut *conn)
        .await
        .map_err(RateLimitError::query("save bucket"))?;
        Ok(())
    }
}

/// Sliding-window bucket modelling the remote's exact API quota: a queue
/// of up to `rate` consumption timestamps. A token is available iff
/// fewer than `rate` timestamps lie within the trailing window.
#[derive(Clone)]
pub struct ScheduledTokenBucket {
    pool: SqlitePool,
    key: String,
    rate: i64,
    period: f64,
}

impl ScheduledTokenBucket {
    /// Bind a bucket to its durable queue, creating the backing table
    /// when missing. The pool must have the user database attached.
    ///
    /// # Errors
    ///
    /// Returns an error when the backing table cannot be created.
    pub async fn new(
        pool: SqlitePool,
        key: impl Into<String>,
        rate: i64,
        period: f64,
    ) -> RateLimitResult<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS user.scheduled_token_bucket (
                key TEXT NOT NULL,
                time REAL NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .map_err(RateLimitError::query("create bucket table"))?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS user.scheduled_token_bucket_key_time
             ON scheduled_token_bucket (key, time)",
        )
        .execute(&pool)
        .await
        .map_err(RateLimitError::query("create bucket index"))?;
        Ok(Self {
            pool,
            key: key.into(),
            rate,
            period,
        })
    }

    /// Take `n` tokens, blocking (cooperatively) until at least `leave`
    /// tokens would remain available afterwards.
    ///
    /// # Errors
    ///
    /// Returns an error when the bucket state cannot be read or written.
    pub async fn consume(&self, n: i64, leave: i64) -> RateLimitResult<()> {
        loop {
            let grant = self.try_consume(n, leave).await?;
            if grant.granted {
                return Ok(());
            }
            tokio::time::sleep(grant.wait).await;
        }
    }

    /// Non-blocking twin of [`ScheduledTokenBucket::consume`].
    ///
    /// # Errors
    ///
    /// Returns an error when the bucket state cannot be read or written.
    pub async fn try_consume(&self, n: i64, leave: i64) -> RateLimitResult<TokenGrant> {
        self.try_consume_at(n, leave, now_unix()).await
    }

    /// [`ScheduledTokenBucket::try_consume`] against an explicit clock
    /// reading.
    ///
    /// # Errors
    ///
    /// Returns an error when the bucket state cannot be read or written.
    pub async fn try_consume_at(&self, n: i64, leave: i64, now: f64) -> RateLimitResult<TokenGrant> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(RateLimitError::query("acquire connection"))?;
        begin_immediate(&mut conn).await?;
        let result = self.try_consume_tx(&mut conn, n, leave, now).await;
        finish(conn, result).await
    }

    async fn try_consume_tx(
        &self,
        conn: &mut SqliteConnection,
        n: i64,
        leave: i64,
        now: f64,
    ) -> RateLimitResult<TokenGrant> {
        sqlx::query("DELETE FROM user.scheduled_token_bucket WHERE key = ? AND time <= ?")
            .bind(&self.key)
            .bind(now - self.period)
            .execute(&mut *conn)
            .await
            .map_err(RateLimitError::query("expire bucket queue"))?;

        let count = sqlx::query_scalar::<_, i64>(
            "SELECT COUNT(*) FROM user.scheduled_token_bucket WHERE key = ?",
        )
        .bind(&self.key)
        .fetch_one(&mut *conn)
        .await
        .map_err(RateLimitError::query("count bucket queue"))?;

        let available = self.rate - count;
        if n > 0 && available - n >= leave {
            for _ in 0..n {
                sqlx::query("INSERT INTO user.scheduled_token_bucket (key, time) VALUES (?, ?)")
                    .bind(&self.key)
                    .bind(now)
                    .execute(&mut *conn)
                    .await
                    .map_err(RateLimitError::query("record consumption"))?;
            }
            return Ok(TokenGrant {
                granted: true,
                remaining: (available - n) as f64,
                wait: Duration::ZERO,
            });
        }
        if n == 0 && available >= leave {
            return Ok(TokenGrant {
                granted: true,
                remaining: available as f64,
                wait: Duration::ZERO,
            });
        }

        // Wait until enough of the oldest timestamps leave the window.
        let need = n + leave - available;
        let wait = if need > count {
            // Not satisfiable within one window; re-check after a full
            // period.
            self.period
        } else {
            let kth = sqlx::query_scalar::<_, f64>(
                "SELECT time FROM user.scheduled_token_bucket
                 WHERE key = ? ORDER BY time LIMIT 1 OFFSET ?",
            )
            .bind(&self.key)
            .bind(need - 1)
            .fetch_one(&mut *conn)
            .await
            .map_err(RateLimitError::query("inspect bucket queue"))?;
            kth + self.period - now
        };
        Ok(TokenGrant {
            granted: false,
            remaining: available as f64,
            wait: Duration::from_secs_f64((wait + WAIT_SLACK).max(0.0)),
        })
    }

    /// Read the currently available token count without consuming.
    ///
    /// # Errors
    ///
    /// Returns an error when the bucket state cannot be read.
    pub async fn peek(&self) -> RateLimitResult<BucketLevel> {
        let grant = self.try_consume(0, 0).await?;
        Ok(BucketLevel {
            tokens: grant.remaining,
            rate: self.rate,
            period: self.period,
        })
    }

    /// Rewrite the queue after the remote reports its own view of the
    /// quota: keep `level` tokens available as of `when` by replacing the
    /// queue with `rate - level` synthetic timestamps from `fill`.
    ///
    /// # Errors
    ///
    /// Returns an error when the bucket state cannot be written.
    pub async fn set<F>(&self, level: i64, when: f64, fill: F) -> RateLimitResult<()>
    where
        F: FnOnce(f64, f64, i64) -> Vec<f64>,
    {
        let timestamps = fill(when, self.period, self.rate - level);
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(RateLimitError::query("acquire connection"))?;
        begin_immediate(&mut conn).await?;
        let result = async {
            sqlx::query("DELETE FROM user.scheduled_token_bucket WHERE key = ?")
                .bind(&self.key)
                .execute(&mut *conn)
                .await
                .map_err(RateLimitError::query("clear bucket queue"))?;
            for timestamp in &timestamps {
                sqlx::query("INSERT INTO user.scheduled_token_bucket (key, time) VALUES (?, ?)")
                    .bind(&self.key)
                    .bind(*timestamp)
                    .execute(&mut *conn)
                    .await
                    .map_err(RateLimitError::query("record synthetic consumption"))?;
            }
            Ok(())
        }
        .await;
        finish(conn, result).await
    }
}
