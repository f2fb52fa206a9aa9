//! Versioned SQLite schema.
//!
//! Each entry in [`MIGRATIONS`] moves the schema from version N-1 to N and
//! is recorded in `schema_migrations` inside the same transaction, so a
//! crash mid-upgrade leaves the previous version intact.

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{Result, StoreError};

/// Ordered schema steps; the index plus one is the version.
const MIGRATIONS: &[&str] = &[
    // v1: coValues, their sessions and per-session transaction logs
    r#"
    CREATE TABLE co_values (
        row_id INTEGER PRIMARY KEY,
        id TEXT NOT NULL UNIQUE,          -- co_z<hex>, Blake3 of canonical header
        header TEXT NOT NULL,             -- canonical JSON
        created_at INTEGER NOT NULL       -- Unix ms
    );

    CREATE TABLE sessions (
        row_id INTEGER PRIMARY KEY,
        co_value INTEGER NOT NULL REFERENCES co_values(row_id) ON DELETE CASCADE,
        session_id TEXT NOT NULL,
        last_idx INTEGER NOT NULL,
        last_signature TEXT NOT NULL,     -- signs last_hash
        last_hash BLOB NOT NULL,          -- session chain head
        UNIQUE(co_value, session_id)
    );

    CREATE TABLE transactions (
        ses INTEGER NOT NULL REFERENCES sessions(row_id) ON DELETE CASCADE,
        idx INTEGER NOT NULL,
        tx TEXT NOT NULL,
        PRIMARY KEY (ses, idx)
    ) WITHOUT ROWID;

    CREATE INDEX idx_sessions_co_value ON sessions(co_value);
    "#,
];

/// Schema version this build writes.
pub const CURRENT_VERSION: u32 = MIGRATIONS.len() as u32;

/// Bring the schema up to [`CURRENT_VERSION`]. Safe to call on every open.
pub(crate) fn migrate(conn: &mut Connection) -> Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            applied_at INTEGER NOT NULL
        )",
    )?;

    let applied = schema_version(conn)?;
    if applied > CURRENT_VERSION {
        return Err(StoreError::Migration(format!(
            "database schema v{} is newer than supported v{}",
            applied, CURRENT_VERSION
        )));
    }
    if applied == CURRENT_VERSION {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for (i, sql) in MIGRATIONS.iter().enumerate().skip(applied as usize) {
        let version = i as u32 + 1;
        tx.execute_batch(sql)
            .map_err(|e| StoreError::Migration(format!("v{}: {}", version, e)))?;
        tx.execute(
            "INSERT INTO schema_migrations (version, applied_at) VALUES (?1, ?2)",
            params![version, now_millis()],
        )?;
    }
    tx.commit()?;
    Ok(())
}

/// Highest applied version, 0 for a fresh database.
pub(crate) fn schema_version(conn: &Connection) -> Result<u32> {
    let version: Option<u32> = conn
        .query_row("SELECT MAX(version) FROM schema_migrations", [], |row| row.get(0))
        .optional()?
        .flatten();
    Ok(version.unwrap_or(0))
}

pub(crate) fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}
