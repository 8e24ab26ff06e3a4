//! Per-skill conflict resolution.

use skill_core::{ConflictDecision, ConflictPolicy};
use std::collections::HashMap;

/// Resolves `(skill_name, target_exists)` to a decision.
///
/// Lookup order: explicit per-skill decision, then the batch policy (only when the
/// target exists), then `Overwrite` for a fresh target. `None` is an unresolved
/// conflict.
#[derive(Debug, Clone, Copy)]
pub struct ConflictResolver<'a> {
    decisions: &'a HashMap<String, ConflictDecision>,
    policy: Option<ConflictPolicy>,
}

impl<'a> ConflictResolver<'a> {
    pub fn new(
        decisions: &'a HashMap<String, ConflictDecision>,
        policy: Option<ConflictPolicy>,
    ) -> Self {
        Self { decisions, policy }
    }

    pub fn resolve(&self, skill_name: &str, target_exists: bool) -> Option<ConflictDecision> {
        self.explicit(skill_name)
            .or_else(|| self.policy_default(target_exists))
    }

    fn explicit(&self, skill_name: &str) -> Option<ConflictDecision> {
        self.decisions.get(skill_name).copied()
    }

    fn policy_default(&self, target_exists: bool) -> Option<ConflictDecision> {
        if !target_exists {
            return Some(ConflictDecision::Overwrite);
        }
        self.policy.map(|policy| match policy {
            ConflictPolicy::SkipAll => ConflictDecision::Skip,
            ConflictPolicy::OverwriteAll => ConflictDecision::Overwrite,
        })
    }
}
