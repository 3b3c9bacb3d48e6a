//! Persisted state for the dashboard.
//!
//! Plays the role of browser-local storage: a small key/value table that
//! outlives the process when opened on disk.

mod schema;
mod session;
mod state;

pub use schema::*;
pub use session::*;

use std::path::Path;
use std::time::Duration;

use rusqlite::Connection;
use thiserror::Error;
use tracing::debug;

/// How long a write waits on a lock held by another handle to the same file.
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Stored value is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

pub type DbResult<T> = Result<T, DbError>;

/// Handle to the state database, with the schema in place.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the state file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Opening state database");
        Self::with_connection(Connection::open(path)?)
    }

    /// State that lives only as long as this handle.
    pub fn open_in_memory() -> DbResult<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> DbResult<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }
}
