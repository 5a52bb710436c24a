//! Database connection management.
//!
//! One writer connection behind a Mutex plus a small pool of reader
//! connections to the same database, so shared-mode reads run on separate
//! connections instead of queueing on the writer.

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info};
use uuid::Uuid;

use playstate_core::config::StorageConfig;
use playstate_core::error::{PlaystateError, Result};

/// Thread-safe SQLite database handle.
///
/// The handle does not coordinate readers against the writer; that is the
/// job of the lock the owner hands to [`crate::UserDataStore`].
pub struct Database {
    uri: String,
    busy_timeout: Duration,
    max_idle_readers: usize,
    writer: Mutex<Connection>,
    readers: Mutex<Vec<Connection>>,
}

impl Database {
    /// Open (or create) a database at the given path.
    ///
    /// Configures the busy timeout and, when enabled, WAL mode. The schema is
    /// not touched here.
    pub fn open(path: &Path, config: &StorageConfig) -> Result<Self> {
        // Ensure parent directory exists.
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let uri = path.to_string_lossy().into_owned();
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let writer = open_connection(&uri, busy_timeout)?;

        if config.wal {
            writer
                .execute_batch(
                    "PRAGMA journal_mode = WAL;
                     PRAGMA synchronous = NORMAL;",
                )
                .map_err(|e| PlaystateError::Storage(format!("Failed to set pragmas: {}", e)))?;
        }

        info!("Database opened at {}", path.display());

        Ok(Self {
            uri,
            busy_timeout,
            max_idle_readers: config.max_idle_readers,
            writer: Mutex::new(writer),
            readers: Mutex::new(Vec::new()),
        })
    }

    /// Open a private in-memory database (for testing).
    ///
    /// Uses a uniquely named shared-cache URI so reader connections attach to
    /// the same data as the writer. The data lives as long as the handle.
    pub fn in_memory() -> Result<Self> {
        let uri = format!(
            "file:playstate-{}?mode=memory&cache=shared",
            Uuid::new_v4().simple()
        );
        let config = StorageConfig::default();
        let busy_timeout = Duration::from_millis(config.busy_timeout_ms);
        let writer = open_connection(&uri, busy_timeout)?;

        Ok(Self {
            uri,
            busy_timeout,
            max_idle_readers: config.max_idle_readers,
            writer: Mutex::new(writer),
            readers: Mutex::new(Vec::new()),
        })
    }

    /// Execute a closure with exclusive access to the writer connection.
    ///
    /// The mutex is held for the duration of the closure. The connection is
    /// mutable so callers can open a transaction on it.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T>,
    {
        let mut conn = self
            .writer
            .lock()
            .map_err(|e| PlaystateError::Storage(format!("Database lock poisoned: {}", e)))?;
        f(&mut conn)
    }

    /// Execute a closure with a query-only reader connection.
    ///
    /// Reuses an idle connection when one is available and opens a new one
    /// otherwise, so concurrent readers never share a connection.
    pub fn with_read_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = match self.checkout_reader()? {
            Some(conn) => conn,
            None => {
                debug!("Opening reader connection");
                let conn = open_connection(&self.uri, self.busy_timeout)?;
                conn.execute_batch("PRAGMA query_only = ON;").map_err(|e| {
                    PlaystateError::Storage(format!("Failed to configure reader: {}", e))
                })?;
                conn
            }
        };

        let result = f(&conn);
        self.checkin_reader(conn)?;
        result
    }

    /// Number of reader connections currently parked in the pool.
    pub fn idle_readers(&self) -> usize {
        self.readers.lock().map(|pool| pool.len()).unwrap_or(0)
    }

    fn checkout_reader(&self) -> Result<Option<Connection>> {
        let mut pool = self
            .readers
            .lock()
            .map_err(|e| PlaystateError::Storage(format!("Reader pool poisoned: {}", e)))?;
        Ok(pool.pop())
    }

    fn checkin_reader(&self, conn: Connection) -> Result<()> {
        let mut pool = self
            .readers
            .lock()
            .map_err(|e| PlaystateError::Storage(format!("Reader pool poisoned: {}", e)))?;
        if pool.len() < self.max_idle_readers {
            pool.push(conn);
        }
        Ok(())
    }
}

fn open_connection(uri: &str, busy_timeout: Duration) -> Result<Connection> {
    let conn = Connection::open_with_flags(uri, OpenFlags::default())
        .map_err(|e| PlaystateError::Storage(format!("Failed to open database: {}", e)))?;
    conn.busy_timeout(busy_timeout)
        .map_err(|e| PlaystateError::Storage(format!("Failed to set busy timeout: {}", e)))?;
    Ok(conn)
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("uri", &self.uri)
            .field("max_idle_readers", &self.max_idle_readers)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn storage_err(e: rusqlite::Error) -> PlaystateError {
        PlaystateError::Storage(e.to_string())
    }

    #[test]
    fn test_in_memory_readers_see_writer_data() {
        let db = Database::in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute_batch("CREATE TABLE t (v INTEGER); INSERT INTO t VALUES (7);")
                .map_err(storage_err)
        })
        .unwrap();

        let v: i64 = db
            .with_read_conn(|conn| {
                conn.query_row("SELECT v FROM t", [], |row| row.get(0))
                    .map_err(storage_err)
            })
            .unwrap();
        assert_eq!(v, 7);
    }

    #[test]
    fn test_in_memory_databases_are_isolated() {
        let a = Database::in_memory().unwrap();
        let b = Database::in_memory().unwrap();
        a.with_conn(|conn| {
            conn.execute_batch("CREATE TABLE only_a (v INTEGER);")
                .map_err(storage_err)
        })
        .unwrap();

        let found: i64 = b
            .with_read_conn(|conn| {
                conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE name = 'only_a'",
                    [],
                    |row| row.get(0),
                )
                .map_err(storage_err)
            })
            .unwrap();
        assert_eq!(found, 0);
    }

    #[test]
    fn test_file_database_uses_wal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("userdata.db");
        let db = Database::open(&path, &StorageConfig::default()).unwrap();

        let mode: String = db
            .with_conn(|conn| {
                conn.query_row("PRAGMA journal_mode", [], |row| row.get(0))
                    .map_err(storage_err)
            })
            .unwrap();
        assert_eq!(mode, "wal");
        assert!(path.exists());
    }

    #[test]
    fn test_reader_connections_are_query_only() {
        let db = Database::in_memory().unwrap();
        let result = db.with_read_conn(|conn| {
            conn.execute_batch("CREATE TABLE nope (v INTEGER);")
                .map_err(storage_err)
        });
        assert!(matches!(result, Err(PlaystateError::Storage(_))));
    }

    #[test]
    fn test_reader_pool_reuses_and_caps_connections() {
        let dir = tempfile::tempdir().unwrap();
        let config = StorageConfig {
            max_idle_readers: 1,
            ..StorageConfig::default()
        };
        let db = Database::open(&dir.path().join("pool.db"), &config).unwrap();
        assert_eq!(db.idle_readers(), 0);

        db.with_read_conn(|_| Ok(())).unwrap();
        assert_eq!(db.idle_readers(), 1);

        // Nested checkout forces a second connection; only one is kept.
        db.with_read_conn(|_| db.with_read_conn(|_| Ok(()))).unwrap();
        assert_eq!(db.idle_readers(), 1);
    }
}
