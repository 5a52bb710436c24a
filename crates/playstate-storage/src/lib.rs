//! Playstate storage crate - SQLite persistence for per-user playback state.
//!
//! Provides a database handle with a pooled set of reader connections, the
//! `userdata` schema and its migrations, the row codec, and the
//! `UserDataStore` repository that guards every access with an injected
//! reader-writer lock.

pub mod codec;
pub mod db;
pub mod migrations;
pub mod repository;

pub use db::Database;
pub use repository::{StoreLock, UserDataStore};
pub use tokio_util::sync::CancellationToken;
