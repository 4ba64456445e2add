//! Group membership bookkeeping.
//!
//! Groups are identified by name. A user's membership set is replaced
//! wholesale on each login; `MembershipChange` describes that replacement
//! so stores can apply it and callers can log it.

use std::collections::BTreeSet;

/// Difference between a user's stored groups and the groups from new claims.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MembershipChange {
    added: BTreeSet<String>,
    removed: BTreeSet<String>,
}

impl MembershipChange {
    /// Computes the change that turns `current` into `desired`.
    #[must_use]
    pub fn between(current: &BTreeSet<String>, desired: &BTreeSet<String>) -> Self {
        Self {
            added: desired.difference(current).cloned().collect(),
            removed: current.difference(desired).cloned().collect(),
        }
    }

    /// Groups the user joins.
    #[must_use]
    pub fn added(&self) -> &BTreeSet<String> {
        &self.added
    }

    /// Groups the user leaves.
    #[must_use]
    pub fn removed(&self) -> &BTreeSet<String> {
        &self.removed
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn identical_sets_produce_no_change() {
        let change = MembershipChange::between(&set(&["a", "b"]), &set(&["b", "a"]));
        assert!(change.is_empty());
    }

    #[test]
    fn stale_groups_are_removed_and_new_ones_added() {
        let change =
            MembershipChange::between(&set(&["editors", "old"]), &set(&["editors", "new"]));
        assert_eq!(change.added(), &set(&["new"]));
        assert_eq!(change.removed(), &set(&["old"]));
        assert!(!change.is_empty());
    }

    #[test]
    fn empty_claims_remove_everything() {
        let change = MembershipChange::between(&set(&["editors"]), &BTreeSet::new());
        assert!(change.added().is_empty());
        assert_eq!(change.removed(), &set(&["editors"]));
    }
}
