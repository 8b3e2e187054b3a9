use crate::export;
use crate::migrations::{self, MigrationError};
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, Offset, Timelike, Utc};
use rusqlite::{params, ErrorCode, OptionalExtension, TransactionBehavior};
use serde::Serialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Civil timestamp text stored in the `timestamp` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
const DAY_FORMAT: &str = "%Y-%m-%d";

const DEFAULT_MAX_ATTEMPTS: u32 = 3;
const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("failed to create database directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("attendance storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("attendance schema: {0}")]
    Migration(#[from] MigrationError),
    #[error("attendance database busy after {attempts} attempts")]
    Busy { attempts: u32 },
    #[error("attendance database connection closed")]
    Closed,
    #[error("attendance database: {0}")]
    Other(String),
}

impl From<tokio_rusqlite::Error> for LedgerError {
    fn from(err: tokio_rusqlite::Error) -> Self {
        match err {
            tokio_rusqlite::Error::Rusqlite(e) => LedgerError::Sqlite(e),
            tokio_rusqlite::Error::ConnectionClosed => LedgerError::Closed,
            other => LedgerError::Other(other.to_string()),
        }
    }
}

fn is_contention(err: &tokio_rusqlite::Error) -> bool {
    matches!(
        err,
        tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(e, _))
            if matches!(e.code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

/// One stored attendance event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub name: String,
    /// Civil time in the ledger's day zone, whole seconds.
    pub timestamp: NaiveDateTime,
}

/// Result of [`Ledger::mark_present_if_absent`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarkOutcome {
    pub inserted: bool,
    /// The new record when `inserted` is true.
    pub record: Option<AttendanceRecord>,
}

/// Ledger tuning.
#[derive(Debug, Clone)]
pub struct LedgerOptions {
    /// UTC offset whose calendar date defines "today".
    pub day_zone: FixedOffset,
    /// Attempts for a write hitting lock contention before giving up.
    pub max_attempts: u32,
    /// SQLite busy handler timeout per attempt.
    pub busy_timeout: Duration,
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            day_zone: Utc.fix(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }
}

/// Durable attendance log with a once-per-day write path.
///
/// All statements run on the connection's background thread, and the
/// existence check plus insert share one `BEGIN IMMEDIATE` transaction, so
/// two marks for the same identity and day can never both insert, whether
/// they come from this handle, a clone of it, or another process.
#[derive(Clone)]
pub struct Ledger {
    conn: tokio_rusqlite::Connection,
    options: LedgerOptions,
}

impl Ledger {
    /// Open (creating if needed) the database file and migrate its schema.
    pub async fn open(path: &Path, options: LedgerOptions) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| LedgerError::CreateDir {
                path: parent.display().to_string(),
                source,
            })?;
        }
        let conn = tokio_rusqlite::Connection::open(path).await?;
        let ledger = Self::init(conn, options, true).await?;
        tracing::info!(path = %path.display(), "attendance ledger opened");
        Ok(ledger)
    }

    /// Private in-memory ledger, mostly for tests.
    pub async fn open_in_memory(options: LedgerOptions) -> Result<Self, LedgerError> {
        let conn = tokio_rusqlite::Connection::open_in_memory().await?;
        Self::init(conn, options, false).await
    }

    async fn init(
        conn: tokio_rusqlite::Connection,
        options: LedgerOptions,
        wal: bool,
    ) -> Result<Self, LedgerError> {
        let busy_timeout = options.busy_timeout;
        let migrated = conn
            .call(move |conn| {
                conn.busy_timeout(busy_timeout)?;
                if wal {
                    let mode: String = conn.pragma_update_and_check(
                        None,
                        "journal_mode",
                        "WAL",
                        |row| row.get(0),
                    )?;
                    if !mode.eq_ignore_ascii_case("wal") {
                        tracing::warn!(mode = %mode, "could not enable WAL journal mode");
                    }
                }
                Ok(migrations::run_migrations(conn))
            })
            .await?;
        let version = migrated?;
        tracing::debug!(version, "attendance schema ready");
        Ok(Self { conn, options })
    }

    pub fn day_zone(&self) -> FixedOffset {
        self.options.day_zone
    }

    /// Civil time of `at` in the day zone, truncated to whole seconds.
    pub fn civil_time(&self, at: DateTime<Utc>) -> NaiveDateTime {
        let local = at.with_timezone(&self.options.day_zone).naive_local();
        local.with_nanosecond(0).unwrap_or(local)
    }

    /// Record `name` as present at `at` unless already recorded on the same
    /// civil day.
    pub async fn mark_present_if_absent(
        &self,
        name: &str,
        at: DateTime<Utc>,
    ) -> Result<MarkOutcome, LedgerError> {
        let timestamp = self.civil_time(at);
        let day: NaiveDate = timestamp.date();

        let max_attempts = self.options.max_attempts.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            let owned_name = name.to_string();
            let result = self
                .conn
                .call(move |conn| {
                    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                    let day_text = day.format(DAY_FORMAT).to_string();
                    let existing: Option<i64> = tx
                        .query_row(
                            "SELECT id FROM attendance WHERE name = ?1 AND day = ?2 LIMIT 1",
                            params![owned_name, day_text],
                            |row| row.get(0),
                        )
                        .optional()?;
                    if existing.is_some() {
                        tx.commit()?;
                        return Ok(None);
                    }
                    tx.execute(
                        "INSERT INTO attendance (name, timestamp, day) VALUES (?1, ?2, ?3)",
                        params![
                            owned_name,
                            timestamp.format(TIMESTAMP_FORMAT).to_string(),
                            day_text
                        ],
                    )?;
                    let id = tx.last_insert_rowid();
                    tx.commit()?;
                    Ok(Some(id))
                })
                .await;

            match result {
                Ok(Some(id)) => {
                    tracing::info!(name, id, %timestamp, "attendance recorded");
                    return Ok(MarkOutcome {
                        inserted: true,
                        record: Some(AttendanceRecord {
                            id,
                            name: name.to_string(),
                            timestamp,
                        }),
                    });
                }
                Ok(None) => {
                    tracing::debug!(name, %day, "already present today");
                    return Ok(MarkOutcome {
                        inserted: false,
                        record: None,
                    });
                }
                Err(err) if is_contention(&err) => {
                    if attempt >= max_attempts {
                        tracing::error!(name, attempts = attempt, "attendance write gave up on contention");
                        return Err(LedgerError::Busy { attempts: attempt });
                    }
                    tracing::warn!(name, attempt, error = %err, "attendance write contended; retrying");
                    tokio::time::sleep(RETRY_BACKOFF * attempt).await;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// Every record, newest first.
    ///
    /// Rows whose `timestamp` text does not parse are logged and skipped.
    pub async fn list_all(&self) -> Result<Vec<AttendanceRecord>, LedgerError> {
        let rows = self
            .conn
            .call(|conn| {
                let mut stmt = conn.prepare(
                    "SELECT id, name, timestamp FROM attendance ORDER BY timestamp DESC, id DESC",
                )?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;

        let records = rows
            .into_iter()
            .filter_map(|(id, name, raw)| {
                match NaiveDateTime::parse_from_str(&raw, TIMESTAMP_FORMAT) {
                    Ok(timestamp) => Some(AttendanceRecord {
                        id,
                        name,
                        timestamp,
                    }),
                    Err(error) => {
                        tracing::warn!(
                            id,
                            timestamp = %raw,
                            %error,
                            "skipping attendance row with unparsable timestamp"
                        );
                        None
                    }
                }
            })
            .collect();
        Ok(records)
    }

    /// The log as CSV, newest first.
    pub async fn export_csv(&self) -> Result<Vec<u8>, LedgerError> {
        let records = self.list_all().await?;
        Ok(export::to_csv(&records))
    }

    pub async fn count(&self) -> Result<u64, LedgerError> {
        let n = self
            .conn
            .call(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM attendance", [], |row| {
                    row.get::<_, i64>(0)
                })?)
            })
            .await?;
        Ok(n.max(0) as u64)
    }
}
