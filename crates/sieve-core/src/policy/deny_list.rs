//! Bundled default deny-list.
//!
//! Hosts listed here are consulted before a policy's own rules while the
//! policy passes traffic through by default. The list ships with the binary
//! and is parsed once per process.

use std::sync::Arc;

use once_cell::sync::Lazy;

use super::line::{MatchRule, RuleLine};
use super::parse::parse_lines;

/// Source text of the bundled list.
const BUNDLED_SOURCE: &str = include_str!("../../resources/default_deny_list.conf");

static BUNDLED: Lazy<Arc<DenyList>> = Lazy::new(|| Arc::new(DenyList::parse(BUNDLED_SOURCE)));

/// An ordered, read-only list of match rules.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DenyList {
    rules: Vec<MatchRule>,
}

impl DenyList {
    /// Creates a list from rules in evaluation order.
    pub fn new(rules: Vec<MatchRule>) -> Self {
        Self { rules }
    }

    /// Parses a document in the `[Rule]` grammar. Lines that are not rules
    /// are ignored.
    pub fn parse(text: &str) -> Self {
        let rules = parse_lines(text)
            .into_iter()
            .filter_map(|line| match line {
                RuleLine::Rule(rule) => Some(rule),
                _ => None,
            })
            .collect();
        Self { rules }
    }

    /// Returns the list bundled with the binary.
    pub fn bundled() -> Arc<DenyList> {
        Arc::clone(&BUNDLED)
    }

    /// Returns the rules in evaluation order.
    pub fn rules(&self) -> &[MatchRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::line::{MatchKind, Strategy};

    #[test]
    fn bundled_list_loads() {
        let list = DenyList::bundled();
        assert!(!list.is_empty());
        assert!(list.rules().iter().all(|r| r.strategy == Strategy::Direct));
    }

    #[test]
    fn bundled_list_is_shared() {
        assert!(Arc::ptr_eq(&DenyList::bundled(), &DenyList::bundled()));
    }

    #[test]
    fn parse_keeps_only_rules() {
        let list = DenyList::parse("// header\n[Rule]\nDOMAIN,a.com,DIRECT\ngarbage\n");
        assert_eq!(list.len(), 1);
        assert_eq!(list.rules()[0].kind, MatchKind::Domain);
    }
}
