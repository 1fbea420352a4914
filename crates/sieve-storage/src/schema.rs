//! Database schema and migrations.

use rusqlite::{Connection, OptionalExtension};
use tracing::info;

use crate::error::{Result, StorageError};

/// Current schema version.
pub const SCHEMA_VERSION: i32 = 2;

/// Migrations in order; entry `i` brings the schema to version `i + 1`.
const MIGRATIONS: [fn(&Connection) -> Result<()>; SCHEMA_VERSION as usize] =
    [migrate_v1, migrate_v2];

/// Run all pending migrations.
///
/// Each migration runs in its own transaction together with the version
/// bump, so an interrupted upgrade resumes from the last complete step.
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version > SCHEMA_VERSION {
        return Err(StorageError::Migration(format!(
            "database schema version {} is newer than supported version {}",
            current_version, SCHEMA_VERSION
        )));
    }

    if current_version < SCHEMA_VERSION {
        info!(
            "Running migrations from version {} to {}",
            current_version, SCHEMA_VERSION
        );

        for version in (current_version + 1)..=SCHEMA_VERSION {
            let migrate = MIGRATIONS[(version - 1) as usize];
            conn.execute_batch("BEGIN")?;
            match migrate(conn).and_then(|()| set_schema_version(conn, version)) {
                Ok(()) => conn.execute_batch("COMMIT")?,
                Err(e) => {
                    let _ = conn.execute_batch("ROLLBACK");
                    return Err(StorageError::Migration(format!("v{}: {}", version, e)));
                }
            }
        }

        info!("Migrations complete");
    }

    Ok(())
}

/// Get the current schema version, 0 for a fresh database.
fn get_schema_version(conn: &Connection) -> Result<i32> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )",
        [],
    )?;

    let version = conn
        .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
            row.get(0)
        })
        .optional()?;

    Ok(version.unwrap_or(0))
}

/// Set the schema version.
fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute("DELETE FROM schema_version", [])?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    Ok(())
}

/// Migration to version 1: Captured sessions and config.
fn migrate_v1(conn: &Connection) -> Result<()> {
    info!("Applying migration v1: Sessions");

    // Sessions table - one row per captured request/response exchange.
    // Header blocks are stored raw ("Name: value\r\n" per header), bodies
    // live on disk and only their paths are kept here.
    conn.execute(
        "CREATE TABLE IF NOT EXISTS sessions (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            method TEXT NOT NULL,
            scheme TEXT NOT NULL,
            host TEXT NOT NULL DEFAULT '',
            port INTEGER,
            uri TEXT NOT NULL DEFAULT '',
            version TEXT NOT NULL DEFAULT 'HTTP/1.1',
            request_headers TEXT NOT NULL DEFAULT '',
            response_headers TEXT NOT NULL DEFAULT '',
            status INTEGER,
            reason TEXT,
            request_body_path TEXT,
            response_body_path TEXT,
            dns_start TEXT,
            connect_start TEXT,
            send_start TEXT,
            send_end TEXT,
            receive_start TEXT,
            receive_end TEXT,
            request_bytes INTEGER NOT NULL DEFAULT 0,
            response_bytes INTEGER NOT NULL DEFAULT 0,
            remote_address TEXT,
            client_identifier TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_host ON sessions (host)",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions (created_at)",
        [],
    )?;

    // Config table - key-value configuration
    conn.execute(
        "CREATE TABLE IF NOT EXISTS config (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        )",
        [],
    )?;

    Ok(())
}

/// Migration to version 2: Stored policies.
fn migrate_v2(conn: &Connection) -> Result<()> {
    info!("Applying migration v2: Policies");

    // Policies table - raw policy documents, parsed on load
    conn.execute(
        "CREATE TABLE IF NOT EXISTS policies (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE,
            text TEXT NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        [],
    )?;

    Ok(())
}
