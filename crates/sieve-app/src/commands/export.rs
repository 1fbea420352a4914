//! `sieve export`

use anyhow::{bail, Context, Result};
use sieve_export::{ExportArtifact, ExportKind, Exporter};
use sieve_storage::Database;
use tokio::sync::oneshot;

use crate::config::AppConfig;

/// Exports the given sessions and describes the outcome.
pub async fn run(
    db: &Database,
    config: &AppConfig,
    ids: Vec<i64>,
    kind: ExportKind,
) -> Result<String> {
    if ids.is_empty() {
        bail!("No session ids given");
    }

    let count = ids.len();
    let exporter = Exporter::new(db.clone(), config.body_store(), config.to_export_options());

    let (tx, rx) = oneshot::channel();
    exporter
        .export_with_callback(ids, kind, move |result| {
            let _ = tx.send(result);
        })
        .await
        .context("Export task failed")?;

    let artifact = rx
        .await
        .context("Export finished without a result")?
        .with_context(|| format!("{} export failed", kind))?;

    Ok(describe(&artifact, kind, count))
}

fn describe(artifact: &ExportArtifact, kind: ExportKind, count: usize) -> String {
    match artifact {
        ExportArtifact::File(path) => path.display().to_string(),
        ExportArtifact::Completed if kind == ExportKind::Delete => {
            format!("Deleted {} session(s)", count)
        }
        ExportArtifact::Completed => format!("{} export completed", kind),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sieve_storage::NewSession;
    use std::path::PathBuf;
    use tempfile::TempDir;
    use tokio_test::{assert_err, assert_ok};

    fn setup() -> (TempDir, Database, AppConfig) {
        let dir = TempDir::new().unwrap();
        let db = Database::in_memory().unwrap();
        let config = AppConfig {
            output_dir: dir.path().join("out"),
            bodies_dir: dir.path().join("bodies"),
            ..Default::default()
        };
        (dir, db, config)
    }

    fn insert(db: &Database, host: &str) -> i64 {
        db.insert_session(&NewSession {
            method: "GET".to_string(),
            scheme: "https".to_string(),
            host: host.to_string(),
            uri: "/".to_string(),
            version: "HTTP/1.1".to_string(),
            ..Default::default()
        })
        .unwrap()
    }

    // ==================== Export Command Tests ====================

    #[tokio::test]
    async fn url_export_writes_file() {
        let (_dir, db, config) = setup();
        let a = insert(&db, "a.com");
        let b = insert(&db, "b.com");

        let output = assert_ok!(run(&db, &config, vec![b, a], ExportKind::UrlList).await);

        let path = PathBuf::from(output);
        assert!(path.starts_with(&config.output_dir));
        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content, "https://b.com/\n\nhttps://a.com/\n\n");
    }

    #[tokio::test]
    async fn delete_reports_count() {
        let (_dir, db, config) = setup();
        let a = insert(&db, "a.com");

        let output = assert_ok!(run(&db, &config, vec![a], ExportKind::Delete).await);

        assert_eq!(output, "Deleted 1 session(s)");
        assert_eq!(db.count_sessions().unwrap(), 0);
    }

    #[tokio::test]
    async fn empty_ids_rejected() {
        let (_dir, db, config) = setup();
        assert_err!(run(&db, &config, Vec::new(), ExportKind::HarArchive).await);
    }
}
