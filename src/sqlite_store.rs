//! SQLite quota backend.
//!
//! rusqlite is synchronous, so every operation runs under
//! `tokio::task::spawn_blocking`. SQLite transactions give a native atomic
//! `add`: the period check, reset, and increment commit as one unit.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::OptionalExtension;

use crate::record::UsageRecord;
use crate::store::{QuotaBackend, StoreUnavailable};

#[derive(Clone, Debug)]
pub struct SqliteQuotaBackend {
    path: PathBuf,
}

impl SqliteQuotaBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn init(&self) -> Result<(), StoreUnavailable> {
        let path = self.path.clone();
        run_blocking(move || {
            let conn = open_connection(path)?;
            init_schema(&conn)?;
            Ok(())
        })
        .await
    }
}

#[async_trait]
impl QuotaBackend for SqliteQuotaBackend {
    async fn load(&self, key: &str) -> Result<Option<UsageRecord>, StoreUnavailable> {
        let path = self.path.clone();
        let key = key.to_string();
        run_blocking(move || {
            let conn = open_connection(path)?;
            init_schema(&conn)?;

            let record = conn
                .query_row(
                    "SELECT spent_usd_micros, period_tag, request_count, updated_at_ms
                     FROM usage_ledger WHERE key = ?1",
                    rusqlite::params![key],
                    |row| {
                        Ok(UsageRecord {
                            spent_usd_micros: i64_to_u64(row.get(0)?),
                            period_tag: row.get(1)?,
                            request_count: i64_to_u64(row.get(2)?),
                            updated_at_ms: i64_to_u64(row.get(3)?),
                        })
                    },
                )
                .optional()?;
            Ok(record)
        })
        .await
    }

    async fn save(&self, key: &str, record: &UsageRecord) -> Result<(), StoreUnavailable> {
        let path = self.path.clone();
        let key = key.to_string();
        let record = record.clone();
        run_blocking(move || {
            let conn = open_connection(path)?;
            init_schema(&conn)?;

            conn.execute(
                "INSERT INTO usage_ledger (key, spent_usd_micros, period_tag, request_count, updated_at_ms)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT(key) DO UPDATE SET
                     spent_usd_micros = excluded.spent_usd_micros,
                     period_tag = excluded.period_tag,
                     request_count = excluded.request_count,
                     updated_at_ms = excluded.updated_at_ms",
                rusqlite::params![
                    key,
                    u64_to_i64(record.spent_usd_micros),
                    record.period_tag,
                    u64_to_i64(record.request_count),
                    u64_to_i64(record.updated_at_ms),
                ],
            )?;
            Ok(())
        })
        .await
    }

    async fn add(
        &self,
        key: &str,
        period_tag: &str,
        usd_micros: u64,
        now_ms: u64,
    ) -> Result<Option<UsageRecord>, StoreUnavailable> {
        let path = self.path.clone();
        let key = key.to_string();
        let period_tag = period_tag.to_string();
        let amount = u64_to_i64(usd_micros);
        let now = u64_to_i64(now_ms);

        run_blocking(move || {
            let mut conn = open_connection(path)?;
            init_schema(&conn)?;
            let tx = conn.transaction()?;

            tx.execute(
                "INSERT OR IGNORE INTO usage_ledger (key, spent_usd_micros, period_tag, request_count, updated_at_ms)
                 VALUES (?1, 0, ?2, 0, ?3)",
                rusqlite::params![key, period_tag, now],
            )?;

            let stored_period: String = tx.query_row(
                "SELECT period_tag FROM usage_ledger WHERE key = ?1",
                rusqlite::params![key],
                |row| row.get(0),
            )?;
            if stored_period != period_tag {
                tx.execute(
                    "UPDATE usage_ledger
                     SET spent_usd_micros = 0, request_count = 0, period_tag = ?2
                     WHERE key = ?1",
                    rusqlite::params![key, period_tag],
                )?;
            }

            tx.execute(
                "UPDATE usage_ledger
                 SET spent_usd_micros = spent_usd_micros + ?2,
                     request_count = request_count + 1,
                     updated_at_ms = ?3
                 WHERE key = ?1",
                rusqlite::params![key, amount, now],
            )?;

            let record = tx.query_row(
                "SELECT spent_usd_micros, request_count FROM usage_ledger WHERE key = ?1",
                rusqlite::params![key],
                |row| {
                    Ok(UsageRecord {
                        spent_usd_micros: i64_to_u64(row.get(0)?),
                        period_tag: period_tag.clone(),
                        request_count: i64_to_u64(row.get(1)?),
                        updated_at_ms: i64_to_u64(now),
                    })
                },
            )?;

            tx.commit()?;
            Ok(Some(record))
        })
        .await
    }
}

async fn run_blocking<T>(
    operation: impl FnOnce() -> Result<T, rusqlite::Error> + Send + 'static,
) -> Result<T, StoreUnavailable>
where
    T: Send + 'static,
{
    tokio::task::spawn_blocking(operation)
        .await
        .map_err(|err| StoreUnavailable::new(format!("sqlite join error: {err}")))?
        .map_err(|err| StoreUnavailable::new(format!("sqlite error: {err}")))
}

fn open_connection(path: PathBuf) -> Result<rusqlite::Connection, rusqlite::Error> {
    let conn = rusqlite::Connection::open(path)?;
    let _ = conn.busy_timeout(Duration::from_secs(5));
    let _ = conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;");
    Ok(conn)
}

fn init_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS usage_ledger (
            key TEXT PRIMARY KEY NOT NULL,
            spent_usd_micros INTEGER NOT NULL DEFAULT 0,
            period_tag TEXT NOT NULL,
            request_count INTEGER NOT NULL DEFAULT 0,
            updated_at_ms INTEGER NOT NULL
        );",
    )
}

fn u64_to_i64(value: u64) -> i64 {
    if value > i64::MAX as u64 {
        i64::MAX
    } else {
        value as i64
    }
}

fn i64_to_u64(value: i64) -> u64 {
    if value < 0 { 0 } else { value as u64 }
}
