//! Sieve Export - turning captured sessions into shareable artifacts.
//!
//! - [`archive`]: one session to one HAR entry, with body recovery
//! - [`curl`]: one session to one curl command line
//! - [`pipeline`]: batches of sessions to URL lists, curl transcripts, HAR
//!   documents, or deletion
//!
//! # Example
//!
//! ```no_run
//! use sieve_export::{ExportKind, ExportOptions, Exporter};
//! use sieve_storage::{BodyStore, Database};
//!
//! let db = Database::new().unwrap();
//! let exporter = Exporter::new(db, BodyStore::new("bodies"), ExportOptions::new("exports"));
//!
//! let artifact = exporter.export(&[1, 2, 3], ExportKind::HarArchive).unwrap();
//! println!("{:?}", artifact.path());
//! ```

pub mod archive;
pub mod curl;
pub mod error;
pub mod har;
pub mod headers;
pub mod pipeline;
pub mod target;

pub use archive::{ArchiveBuilder, DecodedBody, DEFAULT_OPPORTUNISTIC_DECODE_LIMIT};
pub use curl::curl_command;
pub use error::{ExportError, Result};
pub use har::SUPPORTS_MULTIPART;
pub use pipeline::{ExportArtifact, ExportKind, ExportOptions, Exporter};
pub use target::full_url;
