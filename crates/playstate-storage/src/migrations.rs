//! User data schema management.
//!
//! The base schema is applied idempotently on every startup. Column changes
//! after the first release are listed in [`MIGRATIONS`]; pending steps run
//! together in one transaction and each step checks the live table before
//! altering it, so the list is safe against fresh and legacy files alike.

use rusqlite::{Connection, Transaction};
use tracing::{info, warn};

use playstate_core::error::{PlaystateError, Result};

/// Name of the user data table. Stable across schema versions.
pub const USERDATA_TABLE: &str = "userdata";

/// Base schema: table, obsolete index cleanup, current indexes.
const BASE_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS userdata (
        key                     TEXT NOT NULL,
        userId                  BLOB NOT NULL,
        rating                  REAL,
        played                  INTEGER NOT NULL,
        playCount               INTEGER NOT NULL,
        isFavorite              INTEGER NOT NULL,
        playbackPositionTicks   INTEGER NOT NULL,
        lastPlayedDate          TEXT,
        AudioStreamIndex        INTEGER,
        SubtitleStreamIndex     INTEGER
    );

    -- Indexes from earlier schema iterations.
    DROP INDEX IF EXISTS idx_userdata;
    DROP INDEX IF EXISTS idx_userdata1;
    DROP INDEX IF EXISTS idx_userdata2;
    DROP INDEX IF EXISTS userdataindex;

    CREATE UNIQUE INDEX IF NOT EXISTS userdataindex1
        ON userdata (key, userId);

    CREATE INDEX IF NOT EXISTS userdataindex2
        ON userdata (key, userId, played);

    CREATE INDEX IF NOT EXISTS userdataindex3
        ON userdata (key, userId, playbackPositionTicks);

    CREATE INDEX IF NOT EXISTS userdataindex4
        ON userdata (key, userId, isFavorite);
";

/// Engine tuning. Advisory only.
const TUNING_PRAGMAS: &[&str] = &["PRAGMA temp_store = MEMORY;", "PRAGMA shrink_memory;"];

/// One additive schema step.
struct Migration {
    version: i64,
    name: &'static str,
    apply: fn(&Transaction<'_>) -> Result<()>,
}

const MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "stream_indexes",
    apply: add_stream_index_columns,
}];

/// Bring the user data schema up to date.
///
/// Any DDL failure aborts initialization. Tuning failures do not.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(BASE_SCHEMA)
        .map_err(|e| PlaystateError::Storage(format!("Failed to apply base schema: {}", e)))?;

    apply_tuning(conn, TUNING_PRAGMAS);

    let tx = conn
        .transaction()
        .map_err(|e| PlaystateError::Storage(format!("Failed to begin migration: {}", e)))?;

    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| PlaystateError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version = schema_version(&tx)?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        (migration.apply)(&tx)?;
        tx.execute(
            "INSERT OR IGNORE INTO schema_migrations (version, name) VALUES (?1, ?2)",
            rusqlite::params![migration.version, migration.name],
        )
        .map_err(|e| {
            PlaystateError::Storage(format!(
                "Failed to record migration v{}: {}",
                migration.version, e
            ))
        })?;
        info!(
            "Applied migration v{}: {}",
            migration.version, migration.name
        );
    }

    tx.commit()
        .map_err(|e| PlaystateError::Storage(format!("Failed to commit migration: {}", e)))?;

    Ok(())
}

/// Highest applied migration version, or 0 when none has been recorded.
pub fn schema_version(conn: &Connection) -> Result<i64> {
    let has_table: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type = 'table' AND name = 'schema_migrations'",
            [],
            |row| row.get(0),
        )
        .map_err(|e| PlaystateError::Storage(format!("Failed to inspect schema: {}", e)))?;
    if !has_table {
        return Ok(0);
    }

    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
        [],
        |row| row.get(0),
    )
    .map_err(|e| PlaystateError::Storage(format!("Failed to query migration version: {}", e)))
}

fn apply_tuning(conn: &Connection, pragmas: &[&str]) {
    for pragma in pragmas {
        if let Err(e) = conn.execute_batch(pragma) {
            warn!("Ignoring unsupported tuning directive {}: {}", pragma, e);
        }
    }
}

/// Version 1: per-user stream selections.
fn add_stream_index_columns(tx: &Transaction<'_>) -> Result<()> {
    for column in ["AudioStreamIndex", "SubtitleStreamIndex"] {
        if has_column(tx, USERDATA_TABLE, column)? {
            continue;
        }
        tx.execute_batch(&format!(
            "ALTER TABLE {} ADD COLUMN {} INTEGER;",
            USERDATA_TABLE, column
        ))
        .map_err(|e| PlaystateError::Storage(format!("Failed to add column {}: {}", column, e)))?;
        info!("Added column {}.{}", USERDATA_TABLE, column);
    }
    Ok(())
}

fn has_column(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn
        .prepare(&format!("SELECT name FROM pragma_table_info('{}')", table))
        .map_err(|e| PlaystateError::Storage(e.to_string()))?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|e| PlaystateError::Storage(e.to_string()))?;

    for name in names {
        let name = name.map_err(|e| PlaystateError::Storage(e.to_string()))?;
        // SQLite column names are case-insensitive.
        if name.eq_ignore_ascii_case(column) {
            return Ok(true);
        }
    }
    Ok(false)
}
