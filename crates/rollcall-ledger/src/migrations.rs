use rusqlite::{Connection, Transaction};

pub(crate) const CURRENT_SCHEMA_VERSION: i32 = 2;

/// Layout written by earlier deployments; kept so their databases open as-is.
const SCHEMA_V1: &str = "
CREATE TABLE IF NOT EXISTS attendance (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    timestamp TEXT NOT NULL
);
";

/// Civil day column backing the once-per-day lookup.
const SCHEMA_V2: &str = "
ALTER TABLE attendance ADD COLUMN day TEXT;
UPDATE attendance SET day = substr(timestamp, 1, 10) WHERE day IS NULL;
CREATE INDEX IF NOT EXISTS idx_attendance_name_day ON attendance (name, day);
CREATE INDEX IF NOT EXISTS idx_attendance_timestamp ON attendance (timestamp);
";

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("database schema version {found} is newer than supported version {supported}")]
    TooNew { found: i32, supported: i32 },
    #[error("migration to version {version} failed: {source}")]
    Step {
        version: i32,
        #[source]
        source: rusqlite::Error,
    },
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
}

/// Bring the schema up to [`CURRENT_SCHEMA_VERSION`] in one transaction.
pub(crate) fn run_migrations(conn: &mut Connection) -> Result<i32, MigrationError> {
    let mut version: i32 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version > CURRENT_SCHEMA_VERSION {
        return Err(MigrationError::TooNew {
            found: version,
            supported: CURRENT_SCHEMA_VERSION,
        });
    }
    if version == CURRENT_SCHEMA_VERSION {
        return Ok(version);
    }

    let tx = conn.transaction()?;
    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        apply(&tx, next).map_err(|source| MigrationError::Step {
            version: next,
            source,
        })?;
        tracing::info!(version = next, "applied attendance schema migration");
        version = next;
    }
    tx.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION)?;
    tx.commit()?;

    Ok(version)
}

fn apply(tx: &Transaction<'_>, version: i32) -> Result<(), rusqlite::Error> {
    match version {
        1 => tx.execute_batch(SCHEMA_V1),
        2 => tx.execute_batch(SCHEMA_V2),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_database_reaches_current_version() {
        let mut conn = Connection::open_in_memory().unwrap();
        assert_eq!(run_migrations(&mut conn).unwrap(), CURRENT_SCHEMA_VERSION);
        // Idempotent on a second run.
        assert_eq!(run_migrations(&mut conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn test_legacy_rows_get_day_backfilled() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA_V1).unwrap();
        conn.execute(
            "INSERT INTO attendance (name, timestamp) VALUES ('alice', '2024-05-02 09:15:00')",
            [],
        )
        .unwrap();

        run_migrations(&mut conn).unwrap();

        let day: String = conn
            .query_row("SELECT day FROM attendance WHERE name = 'alice'", [], |r| r.get(0))
            .unwrap();
        assert_eq!(day, "2024-05-02");
    }

    #[test]
    fn test_newer_schema_is_refused() {
        let mut conn = Connection::open_in_memory().unwrap();
        conn.pragma_update(None, "user_version", CURRENT_SCHEMA_VERSION + 1)
            .unwrap();
        assert!(matches!(
            run_migrations(&mut conn).unwrap_err(),
            MigrationError::TooNew { .. }
        ));
    }
}
