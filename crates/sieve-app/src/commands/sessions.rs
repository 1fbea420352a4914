//! `sieve sessions`

use std::fmt::Write as _;

use anyhow::Result;
use sieve_export::full_url;
use sieve_storage::{Database, SessionFilter};

/// Lists sessions matching `filter`, newest first.
pub fn list(db: &Database, filter: &SessionFilter) -> Result<String> {
    let sessions = db.list_sessions(filter)?;
    if sessions.is_empty() {
        return Ok("No sessions\n".to_string());
    }

    let mut out = String::new();
    for session in &sessions {
        let status = session
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        let url = full_url(session).unwrap_or_else(|| session.uri.clone());
        let _ = writeln!(
            out,
            "{:>6}  {}  {:<7} {:>3}  {}",
            session.id,
            session.created_at.format("%Y-%m-%d %H:%M:%S"),
            session.method,
            status,
            url
        );
    }

    let _ = writeln!(
        out,
        "{} of {} session(s)",
        sessions.len(),
        db.count_sessions()?
    );
    Ok(out)
}
