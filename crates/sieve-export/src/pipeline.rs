//! Export pipeline.
//!
//! Turns a batch of stored sessions into one artifact:
//!
//! - `UrlList` / `CurlList`: a text file with one line per session, each
//!   followed by a blank line
//! - `HarArchive`: a HAR 1.2 document, streamed one entry at a time
//! - `Delete`: removes bodies, sidecars and rows; produces no file
//!
//! Each invocation writes through its own file handle and keeps at most one
//! record in memory. A destination that cannot be created aborts the export;
//! a record that cannot be converted is skipped.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::Local;
use serde::{Deserialize, Serialize};
use sieve_storage::{BodyStore, Database, Direction, Session};
use tracing::{debug, info, warn};

use crate::archive::{ArchiveBuilder, DEFAULT_OPPORTUNISTIC_DECODE_LIMIT};
use crate::curl::curl_command;
use crate::error::{ExportError, Result};
use crate::har::{log_header, LOG_FOOTER};
use crate::target::full_url;

/// Attempts at finding a free output name before giving up.
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// What an export produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportKind {
    /// Absolute URLs.
    UrlList,
    /// curl command lines.
    CurlList,
    /// HTTP Archive document.
    HarArchive,
    /// Remove the sessions.
    Delete,
}

impl ExportKind {
    /// Short name, also used as the output file prefix.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExportKind::UrlList => "url",
            ExportKind::CurlList => "curl",
            ExportKind::HarArchive => "har",
            ExportKind::Delete => "delete",
        }
    }

    /// Parses a short name, ignoring case.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "url" => Some(ExportKind::UrlList),
            "curl" => Some(ExportKind::CurlList),
            "har" => Some(ExportKind::HarArchive),
            "delete" => Some(ExportKind::Delete),
            _ => None,
        }
    }

    /// Output file extension, if the kind produces a file.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            ExportKind::UrlList => Some("txt"),
            ExportKind::CurlList => Some("sh"),
            ExportKind::HarArchive => Some("har"),
            ExportKind::Delete => None,
        }
    }
}

impl fmt::Display for ExportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown export kind '{}' (url, curl, har, delete)", s))
    }
}

/// Result of a successful export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportArtifact {
    /// The generated file.
    File(PathBuf),
    /// The operation finished and produced no file.
    Completed,
}

impl ExportArtifact {
    /// Returns the generated file, if any.
    pub fn path(&self) -> Option<&Path> {
        match self {
            ExportArtifact::File(path) => Some(path),
            ExportArtifact::Completed => None,
        }
    }
}

/// Settings for the export pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportOptions {
    /// Directory receiving generated files.
    pub output_dir: PathBuf,
    /// Creator name written into HAR documents.
    pub product_name: String,
    /// Largest body of unknown encoding sent through the codec cascade.
    pub opportunistic_decode_limit: usize,
}

impl ExportOptions {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            product_name: "Sieve".to_string(),
            opportunistic_decode_limit: DEFAULT_OPPORTUNISTIC_DECODE_LIMIT,
        }
    }
}

/// Exports stored sessions.
#[derive(Clone)]
pub struct Exporter {
    db: Database,
    bodies: BodyStore,
    options: ExportOptions,
    builder: ArchiveBuilder,
}

impl Exporter {
    pub fn new(db: Database, bodies: BodyStore, options: ExportOptions) -> Self {
        let builder = ArchiveBuilder::new(options.opportunistic_decode_limit);
        Self {
            db,
            bodies,
            options,
            builder,
        }
    }

    pub fn options(&self) -> &ExportOptions {
        &self.options
    }

    /// Loads the sessions with the given ids and exports them in that order.
    /// Unknown ids are skipped.
    pub fn export(&self, ids: &[i64], kind: ExportKind) -> Result<ExportArtifact> {
        let sessions = self.db.get_sessions(ids)?;
        if sessions.len() < ids.len() {
            warn!(
                requested = ids.len(),
                found = sessions.len(),
                "Some sessions were not found"
            );
        }
        self.export_records(&sessions, kind)
    }

    /// Exports an explicit set of sessions.
    pub fn export_records(&self, sessions: &[Session], kind: ExportKind) -> Result<ExportArtifact> {
        info!(kind = %kind, count = sessions.len(), "Starting export");

        let artifact = match kind {
            ExportKind::Delete => {
                self.delete(sessions);
                ExportArtifact::Completed
            }
            ExportKind::UrlList => self.write_lines(kind, sessions, full_url)?,
            ExportKind::CurlList => {
                self.write_lines(kind, sessions, |s| curl_command(s, &self.builder))?
            }
            ExportKind::HarArchive => self.write_har(sessions)?,
        };

        match artifact.path() {
            Some(path) => info!(kind = %kind, path = %path.display(), "Export finished"),
            None => info!(kind = %kind, "Export finished"),
        }
        Ok(artifact)
    }

    /// Runs [`Exporter::export`] on the blocking pool and hands the result to
    /// `callback` once done.
    pub fn export_with_callback<F>(
        &self,
        ids: Vec<i64>,
        kind: ExportKind,
        callback: F,
    ) -> tokio::task::JoinHandle<()>
    where
        F: FnOnce(Result<ExportArtifact>) + Send + 'static,
    {
        let exporter = self.clone();
        tokio::task::spawn_blocking(move || callback(exporter.export(&ids, kind)))
    }

    /// Runs [`Exporter::export`] on the blocking pool.
    pub async fn export_async(&self, ids: Vec<i64>, kind: ExportKind) -> Result<ExportArtifact> {
        let exporter = self.clone();
        tokio::task::spawn_blocking(move || exporter.export(&ids, kind))
            .await
            .map_err(|e| ExportError::Task(e.to_string()))?
    }

    /// Best-effort removal of bodies, sidecars and rows.
    fn delete(&self, sessions: &[Session]) {
        for session in sessions {
            let mut removed = BodyStore::remove_session(session);

            // Bodies written by the store but never linked to the row
            for direction in [Direction::Request, Direction::Response] {
                let path = self.bodies.body_path(session.id, direction);
                let linked = match direction {
                    Direction::Request => session.request_body_path.as_ref(),
                    Direction::Response => session.response_body_path.as_ref(),
                };
                if linked != Some(&path) {
                    removed += BodyStore::remove(&path);
                }
            }

            if let Err(e) = self.db.delete_session(session.id) {
                warn!(id = session.id, error = %e, "Failed to delete session");
            }
            debug!(id = session.id, files = removed, "Deleted session");
        }
    }

    fn write_lines<F>(
        &self,
        kind: ExportKind,
        sessions: &[Session],
        render: F,
    ) -> Result<ExportArtifact>
    where
        F: Fn(&Session) -> Option<String>,
    {
        let (path, file) = self.create_output(kind)?;
        let mut out = BufWriter::new(file);

        let mut written = 0usize;
        for session in sessions {
            match render(session).filter(|line| !line.is_empty()) {
                Some(line) => {
                    out.write_all(line.as_bytes())?;
                    out.write_all(b"\n\n")?;
                    written += 1;
                }
                None => debug!(id = session.id, "Skipping session without host"),
            }
        }

        out.flush()?;
        debug!(written, skipped = sessions.len() - written, "Wrote lines");
        Ok(ExportArtifact::File(path))
    }

    fn write_har(&self, sessions: &[Session]) -> Result<ExportArtifact> {
        let (path, file) = self.create_output(ExportKind::HarArchive)?;
        let mut out = BufWriter::new(file);

        out.write_all(log_header(&self.options.product_name)?.as_bytes())?;

        let mut written = 0usize;
        for session in sessions {
            let Some(entry) = self.builder.build_entry(session) else {
                debug!(id = session.id, "Skipping session without host");
                continue;
            };

            let encoded = match serde_json::to_vec(&entry) {
                Ok(encoded) => encoded,
                Err(e) => {
                    warn!(id = session.id, error = %e, "Skipping unserializable entry");
                    continue;
                }
            };

            if written > 0 {
                out.write_all(b",")?;
            }
            out.write_all(&encoded)?;
            written += 1;
        }

        out.write_all(LOG_FOOTER.as_bytes())?;
        out.flush()?;

        debug!(written, skipped = sessions.len() - written, "Wrote HAR entries");
        Ok(ExportArtifact::File(path))
    }

    /// Creates a fresh output file named `<kind>_<timestamp>.<ext>`, adding a
    /// `-N` suffix if the name is taken.
    fn create_output(&self, kind: ExportKind) -> Result<(PathBuf, File)> {
        let dir = &self.options.output_dir;
        std::fs::create_dir_all(dir).map_err(|source| ExportError::Destination {
            path: dir.clone(),
            source,
        })?;

        let extension = kind.extension().unwrap_or("txt");
        let stem = format!("{}_{}", kind.as_str(), Local::now().format("%Y%m%d_%H%M%S_%3f"));

        let mut attempt = 0;
        loop {
            let name = if attempt == 0 {
                format!("{}.{}", stem, extension)
            } else {
                format!("{}-{}.{}", stem, attempt, extension)
            };
            let path = dir.join(name);

            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => return Ok((path, file)),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && attempt < MAX_NAME_ATTEMPTS => {
                    attempt += 1;
                }
                Err(source) => return Err(ExportError::Destination { path, source }),
            }
        }
    }
}
