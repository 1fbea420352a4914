//! On-disk body storage.
//!
//! Each session owns up to two body files under the store root,
//! `<id>.req` and `<id>.rsp`, and each body file has a JSON sidecar named
//! `<file>.meta` describing it.

use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, warn};

use crate::error::{Result, StorageError};
use crate::models::{BodyMeta, Session};

/// Which half of an exchange a body belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Request,
    Response,
}

impl Direction {
    /// File extension used for this direction.
    pub fn extension(&self) -> &'static str {
        match self {
            Direction::Request => "req",
            Direction::Response => "rsp",
        }
    }
}

/// Directory of stored request and response bodies.
#[derive(Debug, Clone)]
pub struct BodyStore {
    root: PathBuf,
}

impl BodyStore {
    /// Creates a store rooted at `root`. The directory is created on first write.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns where the body for `session_id` in `direction` lives.
    pub fn body_path(&self, session_id: i64, direction: Direction) -> PathBuf {
        self.root
            .join(format!("{}.{}", session_id, direction.extension()))
    }

    /// Returns the sidecar path for a body file.
    pub fn meta_path(body: &Path) -> PathBuf {
        let mut name = OsString::from(body.as_os_str());
        name.push(".meta");
        PathBuf::from(name)
    }

    /// Writes a body and its sidecar, returning the body path.
    pub fn write(
        &self,
        session_id: i64,
        direction: Direction,
        bytes: &[u8],
        content_type: Option<&str>,
        content_encoding: Option<&str>,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.root).map_err(StorageError::body(&self.root))?;

        let path = self.body_path(session_id, direction);
        std::fs::write(&path, bytes).map_err(StorageError::body(&path))?;

        let meta = BodyMeta {
            content_type: content_type.map(str::to_string),
            content_encoding: content_encoding.map(str::to_string),
            size: bytes.len() as u64,
            created_at: Utc::now(),
        };
        let meta_path = Self::meta_path(&path);
        std::fs::write(&meta_path, serde_json::to_vec(&meta)?)
            .map_err(StorageError::body(meta_path))?;

        debug!(session_id, path = %path.display(), size = bytes.len(), "Stored body");
        Ok(path)
    }

    /// Reads a stored body.
    pub fn read(path: &Path) -> Result<Vec<u8>> {
        std::fs::read(path).map_err(StorageError::body(path))
    }

    /// Reads a body's sidecar, if one exists.
    pub fn read_meta(body: &Path) -> Result<Option<BodyMeta>> {
        match std::fs::read(Self::meta_path(body)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::body(Self::meta_path(body))(e)),
        }
    }

    /// Removes a body file and its sidecar.
    ///
    /// Best-effort: failures are logged and skipped. Returns the number of
    /// files actually removed.
    pub fn remove(body: &Path) -> usize {
        [body.to_path_buf(), Self::meta_path(body)]
            .iter()
            .filter(|path| remove_file_logged(path))
            .count()
    }

    /// Removes every body file a session refers to, plus sidecars.
    pub fn remove_session(session: &Session) -> usize {
        [&session.request_body_path, &session.response_body_path]
            .into_iter()
            .flatten()
            .map(|path| Self::remove(path))
            .sum()
    }
}

fn remove_file_logged(path: &Path) -> bool {
    match std::fs::remove_file(path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to remove body file");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_layout() {
        let store = BodyStore::new("/data/bodies");
        let req = store.body_path(7, Direction::Request);

        assert_eq!(req, PathBuf::from("/data/bodies/7.req"));
        assert_eq!(
            store.body_path(7, Direction::Response),
            PathBuf::from("/data/bodies/7.rsp")
        );
        assert_eq!(BodyStore::meta_path(&req), PathBuf::from("/data/bodies/7.req.meta"));
    }

    #[test]
    fn test_write_and_read() {
        let dir = TempDir::new().unwrap();
        let store = BodyStore::new(dir.path().join("bodies"));

        let path = store
            .write(1, Direction::Response, b"{\"ok\":true}", Some("application/json"), None)
            .unwrap();

        assert_eq!(BodyStore::read(&path).unwrap(), b"{\"ok\":true}");

        let meta = BodyStore::read_meta(&path).unwrap().unwrap();
        assert_eq!(meta.content_type.as_deref(), Some("application/json"));
        assert_eq!(meta.content_encoding, None);
        assert_eq!(meta.size, 11);
    }

    #[test]
    fn test_missing_meta() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("1.req");
        std::fs::write(&path, b"x").unwrap();

        assert!(BodyStore::read_meta(&path).unwrap().is_none());
    }

    #[test]
    fn test_read_missing_names_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("9.rsp");

        match BodyStore::read(&path) {
            Err(StorageError::Body { path: failed, .. }) => assert_eq!(failed, path),
            other => panic!("expected body error, got {:?}", other.map(|b| b.len())),
        }
    }

    #[test]
    fn test_remove_is_best_effort() {
        let dir = TempDir::new().unwrap();
        let store = BodyStore::new(dir.path());
        let path = store.write(1, Direction::Request, b"body", None, None).unwrap();

        assert_eq!(BodyStore::remove(&path), 2);
        assert!(!path.exists());
        assert_eq!(BodyStore::remove(&path), 0);
    }

    #[test]
    fn test_remove_session() {
        let dir = TempDir::new().unwrap();
        let store = BodyStore::new(dir.path());
        let req = store.write(3, Direction::Request, b"a", None, None).unwrap();
        let rsp = store.write(3, Direction::Response, b"b", None, Some("gzip")).unwrap();

        let session = Session {
            id: 3,
            method: "POST".to_string(),
            scheme: "http".to_string(),
            host: "a.com".to_string(),
            port: None,
            uri: "/".to_string(),
            version: "HTTP/1.1".to_string(),
            request_headers: String::new(),
            response_headers: String::new(),
            status: Some(200),
            reason: None,
            request_body_path: Some(req.clone()),
            response_body_path: Some(rsp.clone()),
            timings: Default::default(),
            request_bytes: 1,
            response_bytes: 1,
            remote_address: None,
            client_identifier: None,
            created_at: Utc::now(),
        };

        // The response sidecar is already gone
        std::fs::remove_file(BodyStore::meta_path(&rsp)).unwrap();

        assert_eq!(BodyStore::remove_session(&session), 3);
        assert!(!req.exists());
        assert!(!rsp.exists());
    }
}
