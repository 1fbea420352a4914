//! Registry of loaded policies.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::document::Policy;
use super::matcher::{matches, MatchOutcome, RequestContext};

/// Identifier of a stored policy.
pub type PolicyId = i64;

/// Loaded policies keyed by id.
///
/// Constructed once and handed to every caller that matches requests or
/// edits policies. Callers name the policy they want; the store keeps no
/// notion of a current one. Policies are shared behind `Arc`, so a match in
/// progress keeps its policy alive while another thread replaces it.
#[derive(Debug, Default)]
pub struct PolicyStore {
    policies: RwLock<HashMap<PolicyId, Arc<Policy>>>,
}

impl PolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a policy, returning the previous one.
    pub fn insert(&self, id: PolicyId, policy: Policy) -> Option<Arc<Policy>> {
        self.policies.write().insert(id, Arc::new(policy))
    }

    pub fn get(&self, id: PolicyId) -> Option<Arc<Policy>> {
        self.policies.read().get(&id).cloned()
    }

    pub fn remove(&self, id: PolicyId) -> Option<Arc<Policy>> {
        self.policies.write().remove(&id)
    }

    /// Returns the ids of every loaded policy, sorted.
    pub fn ids(&self) -> Vec<PolicyId> {
        let mut ids: Vec<_> = self.policies.read().keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn len(&self) -> usize {
        self.policies.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.read().is_empty()
    }

    /// Matches a request against the policy with the given id.
    ///
    /// Returns `None` if no such policy is loaded.
    pub fn evaluate(&self, id: PolicyId, ctx: &RequestContext<'_>) -> Option<MatchOutcome> {
        let policy = self.get(id)?;
        Some(matches(ctx, &policy))
    }
}
