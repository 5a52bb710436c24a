//! User data repository.
//!
//! [`UserDataStore`] persists per-user playback state. Writes run under the
//! exclusive side of the injected lock and inside one transaction; reads run
//! under the shared side on pooled reader connections.

use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use rusqlite::OptionalExtension;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};
use uuid::Uuid;

use playstate_core::error::{PlaystateError, Result};
use playstate_core::types::UserDataRecord;

use crate::codec;
use crate::db::Database;
use crate::migrations;

/// Reader-writer lock guarding all user data access. Owned by the host and
/// shared with the store at initialization.
pub type StoreLock = Arc<RwLock<()>>;

struct Handles {
    db: Arc<Database>,
    lock: StoreLock,
}

/// Repository for user playback state.
#[derive(Default)]
pub struct UserDataStore {
    handles: Option<Handles>,
}

impl UserDataStore {
    /// Create a store with no database attached. Every operation fails with
    /// [`PlaystateError::NotInitialized`] until [`Self::initialize`] succeeds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create and initialize a store in one step.
    pub fn open(db: Arc<Database>, lock: StoreLock) -> Result<Self> {
        let mut store = Self::new();
        store.initialize(db, lock)?;
        Ok(store)
    }

    /// Attach the store to `db` and `lock`, bringing the schema up to date.
    ///
    /// Any handles from a previous initialization are dropped first. On
    /// failure the store is left uninitialized.
    pub fn initialize(&mut self, db: Arc<Database>, lock: StoreLock) -> Result<()> {
        self.handles = None;

        {
            let _guard = write_guard(&lock)?;
            db.with_conn(migrations::run_migrations)?;
        }

        info!("User data store initialized on {:?}", db);
        self.handles = Some(Handles { db, lock });
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.handles.is_some()
    }

    // =========================================================================
    // Write path
    // =========================================================================

    /// Save `record` as the state of `key` for `user_id`, replacing any
    /// existing row for that pair.
    pub fn save_one(
        &self,
        user_id: Uuid,
        key: &str,
        record: &UserDataRecord,
        cancel: &CancellationToken,
    ) -> Result<()> {
        validate_user_id(&user_id)?;
        validate_key(key)?;
        codec::validate(record)?;

        self.write(cancel, |tx| {
            upsert(tx, &user_id, key, record)?;
            debug!(%user_id, key, "Saved user data");
            Ok(())
        })
    }

    /// Save every record for `user_id` in one transaction. Either all rows
    /// are written or none are.
    pub fn save_all(
        &self,
        user_id: Uuid,
        records: &[UserDataRecord],
        cancel: &CancellationToken,
    ) -> Result<()> {
        validate_user_id(&user_id)?;
        for record in records {
            validate_key(&record.key)?;
            codec::validate(record)?;
        }

        self.write(cancel, |tx| {
            for record in records {
                upsert(tx, &user_id, &record.key, record)?;
            }
            debug!(%user_id, count = records.len(), "Saved user data batch");
            Ok(())
        })
    }

    fn write<F>(&self, cancel: &CancellationToken, f: F) -> Result<()>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<()>,
    {
        let handles = self.handles()?;
        if cancel.is_cancelled() {
            return Err(PlaystateError::Cancelled);
        }

        let _guard = write_guard(&handles.lock)?;
        handles.db.with_conn(|conn| {
            let tx = conn.transaction().map_err(|e| {
                PlaystateError::Storage(format!("Failed to begin transaction: {}", e))
            })?;
            f(&tx)?;
            tx.commit().map_err(|e| {
                PlaystateError::Storage(format!("Failed to commit user data: {}", e))
            })
        })
    }

    // =========================================================================
    // Read path
    // =========================================================================

    /// Look up the state of `key` for `user_id`. `Ok(None)` when never saved.
    pub fn get_one(&self, user_id: Uuid, key: &str) -> Result<Option<UserDataRecord>> {
        validate_user_id(&user_id)?;
        validate_key(key)?;

        let handles = self.handles()?;
        let _guard = read_guard(&handles.lock)?;
        handles.db.with_read_conn(|conn| {
            let mut stmt = conn
                .prepare_cached(&format!(
                    "SELECT {} FROM userdata WHERE key = ?1 AND userId = ?2",
                    codec::SELECT_COLUMNS
                ))
                .map_err(|e| PlaystateError::Storage(e.to_string()))?;

            let result = stmt
                .query_row(
                    rusqlite::params![key, codec::encode_user_id(&user_id)],
                    |row| Ok(codec::decode_row(row)),
                )
                .optional()
                .map_err(|e| PlaystateError::Storage(e.to_string()))?;

            trace!(%user_id, key, found = result.is_some(), "Fetched user data");
            result.transpose()
        })
    }

    /// Look up the state of the first key in `keys`.
    ///
    /// Only `keys[0]` is consulted; later keys are ignored even when the first
    /// has no row. An empty slice yields `Ok(None)` without touching the store.
    pub fn get_first_of<S: AsRef<str>>(
        &self,
        user_id: Uuid,
        keys: &[S],
    ) -> Result<Option<UserDataRecord>> {
        validate_user_id(&user_id)?;

        match keys.first() {
            Some(key) => self.get_one(user_id, key.as_ref()),
            None => Ok(None),
        }
    }

    /// Every record owned by `user_id`, in no particular order.
    pub fn get_all_for_user(&self, user_id: Uuid) -> Result<Vec<UserDataRecord>> {
        validate_user_id(&user_id)?;

        let handles = self.handles()?;
        let _guard = read_guard(&handles.lock)?;
        handles.db.with_read_conn(|conn| {
            let mut stmt = conn
                .prepare_cached(&format!(
                    "SELECT {} FROM userdata WHERE userId = ?1",
                    codec::SELECT_COLUMNS
                ))
                .map_err(|e| PlaystateError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(rusqlite::params![codec::encode_user_id(&user_id)], |row| {
                    Ok(codec::decode_row(row))
                })
                .map_err(|e| PlaystateError::Storage(e.to_string()))?;

            let mut records = Vec::new();
            for row in rows {
                let record = row.map_err(|e| PlaystateError::Storage(e.to_string()))??;
                records.push(record);
            }
            trace!(%user_id, count = records.len(), "Fetched all user data");
            Ok(records)
        })
    }

    fn handles(&self) -> Result<&Handles> {
        self.handles.as_ref().ok_or(PlaystateError::NotInitialized)
    }
}

impl std::fmt::Debug for UserDataStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDataStore")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}

fn upsert(
    tx: &rusqlite::Transaction<'_>,
    user_id: &Uuid,
    key: &str,
    record: &UserDataRecord,
) -> Result<()> {
    let row = codec::encode(user_id, key, record);
    let mut stmt = tx
        .prepare_cached(&format!(
            "INSERT OR REPLACE INTO userdata ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            codec::SELECT_COLUMNS
        ))
        .map_err(|e| PlaystateError::Storage(e.to_string()))?;
    stmt.execute(&row.params()[..])
        .map_err(|e| PlaystateError::Storage(format!("Failed to save user data: {}", e)))?;
    Ok(())
}

fn validate_user_id(user_id: &Uuid) -> Result<()> {
    if user_id.is_nil() {
        return Err(PlaystateError::invalid_argument(
            "user_id",
            "must not be the nil UUID",
        ));
    }
    Ok(())
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(PlaystateError::invalid_argument("key", "must not be empty"));
    }
    Ok(())
}

fn write_guard(lock: &RwLock<()>) -> Result<RwLockWriteGuard<'_, ()>> {
    lock.write()
        .map_err(|e| PlaystateError::Storage(format!("User data lock poisoned: {}", e)))
}

fn read_guard(lock: &RwLock<()>) -> Result<RwLockReadGuard<'_, ()>> {
    lock.read()
        .map_err(|e| PlaystateError::Storage(format!("User data lock poisoned: {}", e)))
}
