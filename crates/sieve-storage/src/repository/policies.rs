//! Policies repository.

use rusqlite::{params, Connection, Row};

use crate::error::{Result, StorageError};
use crate::models::{NewPolicy, StoredPolicy};
use crate::repository::sessions::parse_datetime;

/// Repository for stored policy documents.
pub struct PoliciesRepo;

impl PoliciesRepo {
    /// Insert a new policy.
    pub fn insert(conn: &Connection, policy: &NewPolicy) -> Result<i64> {
        conn.execute(
            "INSERT INTO policies (name, text) VALUES (?1, ?2)",
            params![policy.name, policy.text],
        )?;

        Ok(conn.last_insert_rowid())
    }

    /// Get a policy by ID.
    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<StoredPolicy>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, text, created_at, updated_at FROM policies WHERE id = ?1",
        )?;
        Ok(stmt.query_row([id], map_policy).ok())
    }

    /// Get a policy by name.
    pub fn get_by_name(conn: &Connection, name: &str) -> Result<Option<StoredPolicy>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, text, created_at, updated_at FROM policies WHERE name = ?1",
        )?;
        Ok(stmt.query_row([name], map_policy).ok())
    }

    /// Get all policies, ordered by id.
    pub fn get_all(conn: &Connection) -> Result<Vec<StoredPolicy>> {
        let mut stmt = conn.prepare(
            "SELECT id, name, text, created_at, updated_at FROM policies ORDER BY id ASC",
        )?;

        let policies = stmt
            .query_map([], map_policy)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(policies)
    }

    /// Replace a policy's name and text.
    pub fn update(conn: &Connection, id: i64, policy: &NewPolicy) -> Result<()> {
        let updated = conn.execute(
            "UPDATE policies SET name = ?1, text = ?2, updated_at = datetime('now') WHERE id = ?3",
            params![policy.name, policy.text, id],
        )?;

        if updated == 0 {
            return Err(StorageError::NotFound(format!("Policy with id {}", id)));
        }

        Ok(())
    }

    /// Delete a policy.
    pub fn delete(conn: &Connection, id: i64) -> Result<()> {
        let deleted = conn.execute("DELETE FROM policies WHERE id = ?1", [id])?;

        if deleted == 0 {
            return Err(StorageError::NotFound(format!("Policy with id {}", id)));
        }

        Ok(())
    }
}

fn map_policy(row: &Row<'_>) -> rusqlite::Result<StoredPolicy> {
    Ok(StoredPolicy {
        id: row.get(0)?,
        name: row.get(1)?,
        text: row.get(2)?,
        created_at: parse_datetime(&row.get::<_, String>(3)?),
        updated_at: parse_datetime(&row.get::<_, String>(4)?),
    })
}
