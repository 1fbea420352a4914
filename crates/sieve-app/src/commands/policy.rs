//! `sieve policy`

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use sieve_core::{Policy, RuleLine};
use sieve_storage::Database;
use tracing::info;

/// Summarizes a policy document, listing the lines it did not understand.
pub fn check(path: &Path) -> Result<String> {
    let policy =
        Policy::load(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(summarize(&policy))
}

fn summarize(policy: &Policy) -> String {
    let mut general = 0;
    let mut rules = 0;
    let mut unknown = Vec::new();

    for (index, line) in policy.lines().iter().enumerate() {
        match line {
            RuleLine::General(_) => general += 1,
            RuleLine::Rule(_) => rules += 1,
            RuleLine::Opaque(raw) if is_significant(raw) => unknown.push((index + 1, raw)),
            RuleLine::Section(_) | RuleLine::HostAlias(_) | RuleLine::Opaque(_) => {}
        }
    }

    let mut out = String::new();
    let _ = writeln!(out, "name: {}", policy.name());
    let _ = writeln!(out, "default strategy: {}", policy.default_strategy());
    let _ = writeln!(out, "deny list: {}", enabled(policy.deny_list_enabled()));
    let _ = writeln!(out, "settings: {}", general);
    let _ = writeln!(out, "rules: {}", rules);

    if unknown.is_empty() {
        out.push_str("no unrecognized lines\n");
    } else {
        let _ = writeln!(out, "unrecognized lines: {}", unknown.len());
        for (number, raw) in unknown {
            let _ = writeln!(out, "  {}: {}", number, raw.trim());
        }
    }

    out
}

/// Blank lines and comments are expected to stay opaque.
fn is_significant(raw: &str) -> bool {
    let trimmed = raw.trim();
    !(trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//"))
}

fn enabled(flag: bool) -> &'static str {
    if flag {
        "enabled"
    } else {
        "disabled"
    }
}

/// Stores a policy file, replacing a stored policy of the same name.
///
/// Returns the id of the stored policy.
pub fn import(db: &Database, path: &Path, name: Option<&str>) -> Result<i64> {
    let mut policy =
        Policy::load(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if let Some(name) = name {
        policy.set_name(name);
    }

    let id = match db.get_policy_by_name(policy.name())? {
        Some(existing) => {
            db.update_policy(existing.id, &policy)?;
            info!(id = existing.id, name = %policy.name(), "Replaced policy");
            existing.id
        }
        None => {
            let id = db.create_policy(&policy)?;
            info!(id, name = %policy.name(), "Imported policy");
            id
        }
    };

    Ok(id)
}

/// Lists stored policies, marking the current one.
pub fn list(db: &Database, current: Option<i64>) -> Result<String> {
    let policies = db.list_policies()?;
    if policies.is_empty() {
        return Ok("No policies stored\n".to_string());
    }

    let mut out = String::new();
    for stored in policies {
        let rules = Policy::parse(&stored.text).rules().count();
        let marker = if current == Some(stored.id) { "*" } else { " " };
        let _ = writeln!(
            out,
            "{}{:>4}  {:<24} {:>4} rules  updated {}",
            marker,
            stored.id,
            stored.name,
            rules,
            stored.updated_at.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(out)
}

/// Returns the document text of a stored policy.
pub fn show(db: &Database, id: i64) -> Result<String> {
    let stored = db
        .get_policy(id)?
        .with_context(|| format!("No policy #{}", id))?;
    Ok(Policy::parse(&stored.text).to_text())
}
