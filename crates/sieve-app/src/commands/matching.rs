//! `sieve match`

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{Context, Result};
use sieve_core::{matches, MatchOrigin, MatchOutcome, Policy, PolicyStore, RequestContext};
use sieve_storage::Database;

use crate::config::AppConfig;

/// Where the policy to match against comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySource {
    /// A policy stored in the database.
    Stored(i64),
    /// A policy document on disk.
    File(PathBuf),
}

impl FromStr for PolicySource {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.parse::<i64>() {
            Ok(id) => PolicySource::Stored(id),
            Err(_) => PolicySource::File(PathBuf::from(s)),
        })
    }
}

impl fmt::Display for PolicySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PolicySource::Stored(id) => write!(f, "policy #{}", id),
            PolicySource::File(path) => write!(f, "{}", path.display()),
        }
    }
}

/// Matches a request against a policy.
///
/// Without an explicit source, the configured current policy is used.
pub fn evaluate(
    db: &Database,
    config: &AppConfig,
    source: Option<PolicySource>,
    ctx: &RequestContext<'_>,
) -> Result<MatchOutcome> {
    let source = match source {
        Some(source) => source,
        None => PolicySource::Stored(
            config
                .current_policy_id
                .context("No policy given and no current policy configured")?,
        ),
    };

    match &source {
        PolicySource::Stored(id) => {
            let store = PolicyStore::new();
            db.load_policies(&store).context("Failed to load policies")?;
            store
                .evaluate(*id, ctx)
                .with_context(|| format!("No {}", source))
        }
        PolicySource::File(path) => {
            let policy =
                Policy::load(path).with_context(|| format!("Failed to read {}", source))?;
            Ok(matches(ctx, &policy))
        }
    }
}

/// Describes an outcome on one line.
pub fn describe(outcome: &MatchOutcome) -> String {
    match outcome {
        MatchOutcome::Matched { rule, origin } => {
            let origin = match origin {
                MatchOrigin::DenyList => "deny list",
                MatchOrigin::Policy => "policy",
            };
            format!("{} ({}: {})", rule.strategy, origin, rule)
        }
        MatchOutcome::Unmatched => "no match".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const POLICY: &str = "[General]\nname = Test\ndefault-strategy = DIRECT\n[Rule]\nDOMAIN-SUFFIX,example.com,REJECT\n";

    fn ctx(host: &str) -> RequestContext<'_> {
        RequestContext::new(host, "/v1/x", "agent/1.0")
    }

    // ==================== Source Tests ====================

    #[test]
    fn source_from_str() {
        assert_eq!("12".parse::<PolicySource>().unwrap(), PolicySource::Stored(12));
        assert_eq!(
            "rules.conf".parse::<PolicySource>().unwrap(),
            PolicySource::File(PathBuf::from("rules.conf"))
        );
    }

    // ==================== Evaluate Tests ====================

    #[test]
    fn match_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(POLICY.as_bytes()).unwrap();

        let db = Database::in_memory().unwrap();
        let source = Some(PolicySource::File(file.path().to_path_buf()));
        let config = AppConfig::default();

        let outcome = evaluate(&db, &config, source.clone(), &ctx("api.example.com")).unwrap();
        assert_eq!(
            describe(&outcome),
            "REJECT (policy: DOMAIN-SUFFIX, example.com, REJECT)"
        );

        let outcome = evaluate(&db, &config, source, &ctx("other.com")).unwrap();
        assert_eq!(describe(&outcome), "no match");
    }

    #[test]
    fn match_uses_current_policy() {
        let db = Database::in_memory().unwrap();
        let id = db.create_policy(&Policy::parse(POLICY)).unwrap();
        let config = AppConfig {
            current_policy_id: Some(id),
            ..Default::default()
        };

        let outcome = evaluate(&db, &config, None, &ctx("api.example.com")).unwrap();
        assert!(outcome.is_match());
    }

    #[test]
    fn missing_policy_is_an_error() {
        let db = Database::in_memory().unwrap();
        let config = AppConfig::default();

        assert!(evaluate(&db, &config, None, &ctx("a.com")).is_err());
        assert!(evaluate(&db, &config, Some(PolicySource::Stored(9)), &ctx("a.com")).is_err());
    }
}
