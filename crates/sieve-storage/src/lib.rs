//! Sieve Storage - SQLite persistence layer.
//!
//! This crate stores what the capture engine produces and what the user
//! configures:
//!
//! - Captured sessions (request line, raw header blocks, timing marks, byte counters)
//! - Request and response bodies as files on disk, with JSON sidecars
//! - Policy documents
//! - Configuration key-value storage
//!
//! # Example
//!
//! ```no_run
//! use sieve_storage::{Database, NewSession, SessionFilter};
//!
//! let db = Database::in_memory().unwrap();
//!
//! let id = db.insert_session(&NewSession {
//!     method: "GET".to_string(),
//!     scheme: "https".to_string(),
//!     host: "example.com".to_string(),
//!     uri: "/".to_string(),
//!     ..Default::default()
//! }).unwrap();
//!
//! let recent = db.list_sessions(&SessionFilter::default()).unwrap();
//! assert_eq!(recent[0].id, id);
//! ```

pub mod bodies;
mod database;
pub mod error;
pub mod models;
mod pool;
pub mod repository;
mod schema;

pub use bodies::{BodyStore, Direction};
pub use database::Database;
pub use error::{Result, StorageError};
pub use models::{
    BodyMeta, Config, NewPolicy, NewSession, Session, SessionFilter, SessionTimings, StoredPolicy,
};
pub use pool::ConnectionPool;
