//! Database migrations

use rusqlite::Connection;
use tracing::info;

use crate::error::{DatabaseError, Result};

/// Current schema version
pub const SCHEMA_VERSION: i64 = 1;

/// Run all pending migrations
pub fn run_all(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(DatabaseError::Migration(format!(
            "database schema v{} is newer than supported v{}",
            current_version, SCHEMA_VERSION
        )));
    }

    if current_version < SCHEMA_VERSION {
        info!("running migrations from v{} to v{}", current_version, SCHEMA_VERSION);

        let tx = conn.unchecked_transaction()?;

        if current_version < 1 {
            migrate_v1(&tx)?;
        }

        set_schema_version(&tx, SCHEMA_VERSION)?;
        tx.commit()?;
    }

    Ok(())
}

pub fn get_schema_version(conn: &Connection) -> Result<i64> {
    let version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
    Ok(version)
}

fn set_schema_version(conn: &Connection, version: i64) -> Result<()> {
    conn.pragma_update(None, "user_version", version)?;
    Ok(())
}

/// Initial schema (v1)
fn migrate_v1(conn: &Connection) -> Result<()> {
    info!("applying migration v1: camera uploads records");

    conn.execute_batch(r#"
        CREATE TABLE IF NOT EXISTS camera_uploads_records (
            media_id INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            folder_type TEXT NOT NULL,
            file_name TEXT NOT NULL,
            file_path TEXT NOT NULL,
            file_type TEXT NOT NULL,
            upload_status TEXT NOT NULL,
            original_fingerprint TEXT NOT NULL,
            generated_fingerprint TEXT,
            temp_file_path TEXT NOT NULL,
            file_size INTEGER NOT NULL CHECK (file_size >= 0),
            PRIMARY KEY (media_id, timestamp, folder_type)
        );

        CREATE INDEX IF NOT EXISTS idx_records_status ON camera_uploads_records(upload_status);
        CREATE INDEX IF NOT EXISTS idx_records_folder ON camera_uploads_records(folder_type);
    "#)?;

    Ok(())
}
