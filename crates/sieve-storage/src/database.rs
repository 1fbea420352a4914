//! High-level database interface.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use sieve_core::policy::{Policy, PolicyStore};
use tracing::{info, warn};

use crate::error::{Result, StorageError};
use crate::models::{Config, NewPolicy, NewSession, Session, SessionFilter, StoredPolicy};
use crate::pool::ConnectionPool;
use crate::repository::{ConfigRepo, PoliciesRepo, SessionsRepo};

/// High-level database interface for Sieve.
#[derive(Clone)]
pub struct Database {
    pool: ConnectionPool,
}

impl Database {
    /// Create a new database in the default app data directory.
    pub fn new() -> Result<Self> {
        Self::with_path(Self::default_db_path()?)
    }

    /// Create a new database at a specific path.
    pub fn with_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!("Opening database at: {:?}", path);
        let pool = ConnectionPool::new(&path)?;

        Ok(Self { pool })
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let pool = ConnectionPool::in_memory()?;
        Ok(Self { pool })
    }

    /// Database file, or `None` for an in-memory database.
    pub fn path(&self) -> Option<&Path> {
        self.pool.path()
    }

    /// Get the default database path.
    pub fn default_db_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "sieve", "sieve")
            .ok_or_else(|| StorageError::Config("Could not determine app data directory".into()))?;

        Ok(proj_dirs.data_dir().join("sieve.db"))
    }

    // === Sessions ===

    /// Record a captured session.
    pub fn insert_session(&self, session: &NewSession) -> Result<i64> {
        let conn = self.pool.get();
        SessionsRepo::insert(&conn, session)
    }

    /// Record where a session's bodies were written.
    pub fn set_session_body_paths(
        &self,
        id: i64,
        request: Option<&PathBuf>,
        response: Option<&PathBuf>,
    ) -> Result<()> {
        let conn = self.pool.get();
        SessionsRepo::set_body_paths(&conn, id, request, response)
    }

    /// Get a session by ID.
    pub fn get_session(&self, id: i64) -> Result<Option<Session>> {
        let conn = self.pool.get();
        SessionsRepo::get_by_id(&conn, id)
    }

    /// Get sessions in the given order, skipping unknown ids.
    pub fn get_sessions(&self, ids: &[i64]) -> Result<Vec<Session>> {
        let conn = self.pool.get();
        SessionsRepo::get_many(&conn, ids)
    }

    /// List sessions matching a filter, newest first.
    pub fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>> {
        let conn = self.pool.get();
        SessionsRepo::list(&conn, filter)
    }

    /// Delete a session row. Body files are not touched.
    pub fn delete_session(&self, id: i64) -> Result<()> {
        let conn = self.pool.get();
        SessionsRepo::delete(&conn, id)
    }

    /// Count stored sessions.
    pub fn count_sessions(&self) -> Result<i64> {
        let conn = self.pool.get();
        SessionsRepo::count(&conn)
    }

    // === Policies ===

    /// Store a policy document. The name is taken from the document.
    pub fn create_policy(&self, policy: &Policy) -> Result<i64> {
        let conn = self.pool.get();
        PoliciesRepo::insert(&conn, &to_new_policy(policy)?)
    }

    /// Get a stored policy by ID.
    pub fn get_policy(&self, id: i64) -> Result<Option<StoredPolicy>> {
        let conn = self.pool.get();
        PoliciesRepo::get_by_id(&conn, id)
    }

    /// Get a stored policy by name.
    pub fn get_policy_by_name(&self, name: &str) -> Result<Option<StoredPolicy>> {
        let conn = self.pool.get();
        PoliciesRepo::get_by_name(&conn, name)
    }

    /// Get every stored policy.
    pub fn list_policies(&self) -> Result<Vec<StoredPolicy>> {
        let conn = self.pool.get();
        PoliciesRepo::get_all(&conn)
    }

    /// Replace a stored policy.
    pub fn update_policy(&self, id: i64, policy: &Policy) -> Result<()> {
        let conn = self.pool.get();
        PoliciesRepo::update(&conn, id, &to_new_policy(policy)?)
    }

    /// Delete a stored policy.
    pub fn delete_policy(&self, id: i64) -> Result<()> {
        let conn = self.pool.get();
        PoliciesRepo::delete(&conn, id)
    }

    /// Parses every stored policy into `store`, returning how many loaded.
    pub fn load_policies(&self, store: &PolicyStore) -> Result<usize> {
        let policies = self.list_policies()?;
        let count = policies.len();

        for stored in policies {
            let policy = Policy::parse(&stored.text);
            if policy.name() != stored.name {
                warn!(
                    id = stored.id,
                    stored = %stored.name,
                    document = %policy.name(),
                    "Policy name differs from its document"
                );
            }
            store.insert(stored.id, policy);
        }

        info!(count, "Loaded policies");
        Ok(count)
    }

    // === Config ===

    /// Get a configuration value.
    pub fn get_config(&self, key: &str) -> Result<Option<Config>> {
        let conn = self.pool.get();
        ConfigRepo::get(&conn, key)
    }

    /// Set a configuration value.
    pub fn set_config(&self, key: &str, value: &serde_json::Value) -> Result<()> {
        let conn = self.pool.get();
        ConfigRepo::set(&conn, key, value)
    }

    /// Get a typed configuration value.
    pub fn get_config_typed<T: serde::de::DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        let conn = self.pool.get();
        ConfigRepo::get_typed(&conn, key)
    }

    /// Store a typed configuration value.
    pub fn set_config_typed<T: serde::Serialize>(&self, key: &str, value: &T) -> Result<()> {
        let conn = self.pool.get();
        ConfigRepo::set_typed(&conn, key, value)
    }

    /// Get a typed configuration value with default.
    pub fn get_config_or_default<T: serde::de::DeserializeOwned>(
        &self,
        key: &str,
        default: T,
    ) -> Result<T> {
        let conn = self.pool.get();
        ConfigRepo::get_or_default(&conn, key, default)
    }
}

fn to_new_policy(policy: &Policy) -> Result<NewPolicy> {
    if policy.name().is_empty() {
        return Err(StorageError::InvalidPolicy("policy has no name".into()));
    }

    Ok(NewPolicy {
        name: policy.name().to_string(),
        text: policy.to_text(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sieve_core::policy::{RequestContext, Strategy};

    fn session(host: &str) -> NewSession {
        NewSession {
            method: "GET".to_string(),
            scheme: "https".to_string(),
            host: host.to_string(),
            uri: "/".to_string(),
            version: "HTTP/2".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_with_path_creates_parent() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("sieve.db");

        let db = Database::with_path(&path).unwrap();
        assert_eq!(db.path(), Some(path.as_path()));
        assert!(path.exists());
        assert!(Database::in_memory().unwrap().path().is_none());
    }

    #[test]
    fn test_sessions_crud() {
        let db = Database::in_memory().unwrap();

        let a = db.insert_session(&session("a.com")).unwrap();
        let b = db.insert_session(&session("b.com")).unwrap();
        assert_eq!(db.count_sessions().unwrap(), 2);

        let fetched = db.get_sessions(&[b, a]).unwrap();
        assert_eq!(fetched[0].host, "b.com");

        db.delete_session(a).unwrap();
        assert!(db.get_session(a).unwrap().is_none());
        assert_eq!(db.list_sessions(&SessionFilter::default()).unwrap().len(), 1);
    }

    #[test]
    fn test_policies_crud() {
        let db = Database::in_memory().unwrap();
        let mut policy = Policy::parse("[General]\nname = Strict\n[Rule]\nDOMAIN,a.com,REJECT\n");

        let id = db.create_policy(&policy).unwrap();
        let stored = db.get_policy(id).unwrap().unwrap();
        assert_eq!(stored.name, "Strict");
        assert_eq!(Policy::parse(&stored.text).rules().count(), 1);

        policy.set_name("Lenient");
        db.update_policy(id, &policy).unwrap();
        assert!(db.get_policy_by_name("Lenient").unwrap().is_some());

        db.delete_policy(id).unwrap();
        assert!(db.list_policies().unwrap().is_empty());
    }

    #[test]
    fn test_unnamed_policy_rejected() {
        let db = Database::in_memory().unwrap();
        let result = db.create_policy(&Policy::parse("[Rule]\nDOMAIN,a.com,REJECT\n"));
        assert!(matches!(result, Err(StorageError::InvalidPolicy(_))));
    }

    #[test]
    fn test_load_policies() {
        let db = Database::in_memory().unwrap();
        let id = db
            .create_policy(&Policy::parse(
                "[General]\nname = P\ndefault-strategy = COPY\n[Rule]\nDOMAIN,a.com,REJECT\n",
            ))
            .unwrap();

        let store = PolicyStore::new();
        assert_eq!(db.load_policies(&store).unwrap(), 1);

        let ctx = RequestContext::new("a.com", "/", "");
        let outcome = store.evaluate(id, &ctx).unwrap();
        assert_eq!(outcome.strategy(), Some(Strategy::Reject));
    }

    #[test]
    fn test_config() {
        let db = Database::in_memory().unwrap();

        db.set_config("current_policy_id", &json!(3)).unwrap();
        let config = db.get_config("current_policy_id").unwrap().unwrap();
        assert_eq!(config.value, json!(3));

        let id: Option<i64> = db.get_config_typed("current_policy_id").unwrap();
        assert_eq!(id, Some(3));
        assert_eq!(db.get_config_or_default("missing", 5u32).unwrap(), 5);
    }
}
