//! camup-db - Camera uploads record store
//!
//! Persists one row per (media item, timestamp, folder type) in SQLite and
//! exposes the query/update contracts the reconciliation layer relies on.

mod schema;
mod migrations;
mod queries;
mod store;
mod error;

pub use schema::*;
pub use queries::*;
pub use store::RecordStore;
pub use error::{DatabaseError, Result};

use rusqlite::Connection;
use std::path::Path;
use tracing::{info, debug};

/// Database connection wrapper with initialization
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open or create database at the given path
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("opening database at {:?}", path);

        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Enable WAL mode for concurrent reads
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch("PRAGMA synchronous=NORMAL;")?;

        let db = Self { conn };
        db.run_migrations()?;

        Ok(db)
    }

    /// Open an in-memory database (for testing)
    pub fn open_in_memory() -> Result<Self> {
        debug!("opening in-memory database");
        let conn = Connection::open_in_memory()?;

        let db = Self { conn };
        db.run_migrations()?;

        Ok(db)
    }

    /// Get a reference to the underlying connection
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Consume the wrapper, returning the migrated connection
    pub fn into_connection(self) -> Connection {
        self.conn
    }

    fn run_migrations(&self) -> Result<()> {
        migrations::run_all(&self.conn)
    }
}
