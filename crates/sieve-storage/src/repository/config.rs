//! Configuration repository.
//!
//! Values are stored as JSON text. A value that no longer parses reads back
//! as `null` rather than failing the lookup.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::error::Result;
use crate::models::Config;

/// Repository for configuration operations.
pub struct ConfigRepo;

impl ConfigRepo {
    /// Get a configuration value.
    pub fn get(conn: &Connection, key: &str) -> Result<Option<Config>> {
        let mut stmt = conn.prepare("SELECT key, value FROM config WHERE key = ?1")?;
        Ok(stmt.query_row([key], map_config).optional()?)
    }

    /// Set a configuration value (insert or update).
    pub fn set(conn: &Connection, key: &str, value: &serde_json::Value) -> Result<()> {
        let value_json = serde_json::to_string(value)?;

        conn.execute(
            "INSERT INTO config (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            params![key, value_json],
        )?;

        Ok(())
    }

    /// Serialize and store a typed value.
    pub fn set_typed<T: Serialize>(conn: &Connection, key: &str, value: &T) -> Result<()> {
        Self::set(conn, key, &serde_json::to_value(value)?)
    }

    /// Get a typed value. A stored value of the wrong shape is an error.
    pub fn get_typed<T: DeserializeOwned>(conn: &Connection, key: &str) -> Result<Option<T>> {
        match Self::get(conn, key)? {
            Some(config) => Ok(Some(serde_json::from_value(config.value)?)),
            None => Ok(None),
        }
    }

    /// Get a typed value, falling back to `default` when missing or malformed.
    pub fn get_or_default<T: DeserializeOwned>(
        conn: &Connection,
        key: &str,
        default: T,
    ) -> Result<T> {
        match Self::get(conn, key)? {
            Some(config) => match serde_json::from_value(config.value) {
                Ok(value) => Ok(value),
                Err(e) => {
                    warn!(key, error = %e, "Ignoring malformed config value");
                    Ok(default)
                }
            },
            None => Ok(default),
        }
    }

    /// Delete a configuration value.
    pub fn delete(conn: &Connection, key: &str) -> Result<bool> {
        let deleted = conn.execute("DELETE FROM config WHERE key = ?1", [key])?;
        Ok(deleted > 0)
    }

    /// Get all configuration values, ordered by key.
    pub fn get_all(conn: &Connection) -> Result<Vec<Config>> {
        let mut stmt = conn.prepare("SELECT key, value FROM config ORDER BY key")?;

        let configs = stmt
            .query_map([], map_config)?
            .filter_map(|r| r.ok())
            .collect();

        Ok(configs)
    }
}

fn map_config(row: &Row<'_>) -> rusqlite::Result<Config> {
    let value_str: String = row.get(1)?;
    Ok(Config {
        key: row.get(0)?,
        value: serde_json::from_str(&value_str).unwrap_or(serde_json::Value::Null),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::run_migrations;
    use serde::Deserialize;
    use serde_json::json;

    fn setup_db() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        run_migrations(&conn).unwrap();
        conn
    }

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Limits {
        decode_limit: u64,
        product: String,
    }

    #[test]
    fn test_set_overwrites() {
        let conn = setup_db();

        ConfigRepo::set(&conn, "current_policy_id", &json!(1)).unwrap();
        ConfigRepo::set(&conn, "current_policy_id", &json!(2)).unwrap();

        let config = ConfigRepo::get(&conn, "current_policy_id").unwrap().unwrap();
        assert_eq!(config.value, json!(2));
        assert!(ConfigRepo::get(&conn, "missing").unwrap().is_none());
    }

    #[test]
    fn test_typed_round_trip() {
        let conn = setup_db();
        let limits = Limits {
            decode_limit: 65536,
            product: "Sieve".to_string(),
        };

        ConfigRepo::set_typed(&conn, "limits", &limits).unwrap();
        let stored: Option<Limits> = ConfigRepo::get_typed(&conn, "limits").unwrap();
        assert_eq!(stored, Some(limits));

        let missing: Option<Limits> = ConfigRepo::get_typed(&conn, "other").unwrap();
        assert!(missing.is_none());
    }

    #[test]
    fn test_typed_wrong_shape_is_error() {
        let conn = setup_db();
        ConfigRepo::set(&conn, "limits", &json!("not an object")).unwrap();

        let result: Result<Option<Limits>> = ConfigRepo::get_typed(&conn, "limits");
        assert!(result.is_err());

        let fallback: u64 = ConfigRepo::get_or_default(&conn, "limits", 7).unwrap();
        assert_eq!(fallback, 7);
    }

    #[test]
    fn test_corrupt_value_reads_as_null() {
        let conn = setup_db();
        conn.execute(
            "INSERT INTO config (key, value) VALUES ('broken', '{not json')",
            [],
        )
        .unwrap();

        let config = ConfigRepo::get(&conn, "broken").unwrap().unwrap();
        assert!(config.value.is_null());
    }

    #[test]
    fn test_delete_and_get_all() {
        let conn = setup_db();
        ConfigRepo::set(&conn, "b", &json!(2)).unwrap();
        ConfigRepo::set(&conn, "a", &json!(1)).unwrap();

        let keys: Vec<_> = ConfigRepo::get_all(&conn)
            .unwrap()
            .into_iter()
            .map(|c| c.key)
            .collect();
        assert_eq!(keys, ["a", "b"]);

        assert!(ConfigRepo::delete(&conn, "a").unwrap());
        assert!(!ConfigRepo::delete(&conn, "a").unwrap());
    }
}
