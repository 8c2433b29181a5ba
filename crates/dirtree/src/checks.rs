//! Registry of directories marked for inclusion.
//!
//! The registry outlives the node forest: after a rebuild it is the only
//! record of what the user had checked, and `DirectoryTree::replay_onto_tree`
//! re-derives every checkbox from it.

use std::collections::BTreeSet;

use crate::node::CheckState;
use crate::taxonomy;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CheckStateRegistry {
    /// Directories included together with everything below them.
    nested: BTreeSet<String>,
    /// Partially included directories.
    non_nested: BTreeSet<String>,
}

impl CheckStateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a committed checkbox change for `path`.
    pub fn check_changed(&mut self, path: &str, status: CheckState) {
        match status {
            CheckState::Checked => {
                self.non_nested.remove(path);
                self.remove_nested_at_or_below(path);
                if !self.has_nested_ancestor(path) {
                    self.nested.insert(path.to_string());
                }
            }
            CheckState::Unchecked => {
                self.non_nested.remove(path);
                self.remove_nested_at_or_below(path);
            }
            CheckState::Indeterminate => {
                self.nested.remove(path);
                self.non_nested.insert(path.to_string());
            }
        }
    }

    /// True if `path` is partially included or covered by a nested entry.
    pub fn is_checked(&self, path: &str) -> bool {
        self.non_nested.contains(path) || self.has_nested_ancestor(path)
    }

    /// Checkbox value a freshly materialized node at `path` should start with.
    pub fn status_of(&self, path: &str) -> CheckState {
        if self.has_nested_ancestor(path) {
            CheckState::Checked
        } else if self.non_nested.contains(path) {
            CheckState::Indeterminate
        } else {
            CheckState::Unchecked
        }
    }

    /// True if `path` or one of its ancestors is a nested entry.
    pub fn has_nested_ancestor(&self, path: &str) -> bool {
        if self.nested.is_empty() {
            return false;
        }
        taxonomy::ancestor_chain(path)
            .iter()
            .any(|ancestor| self.nested.contains(ancestor))
    }

    /// Entries in replay order: nested entries first, then non-nested ones.
    pub fn replay_plan(&self) -> Vec<(String, CheckState)> {
        self.nested
            .iter()
            .map(|path| (path.clone(), CheckState::Checked))
            .chain(
                self.non_nested
                    .iter()
                    .map(|path| (path.clone(), CheckState::Indeterminate)),
            )
            .collect()
    }

    pub fn nested(&self) -> impl Iterator<Item = &str> {
        self.nested.iter().map(String::as_str)
    }

    pub fn non_nested(&self) -> impl Iterator<Item = &str> {
        self.non_nested.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.nested.is_empty() && self.non_nested.is_empty()
    }

    pub fn clear(&mut self) {
        self.nested.clear();
        self.non_nested.clear();
    }

    /// Rewrites entries at or below `old_path` after a directory rename.
    pub fn rename_prefix(&mut self, old_path: &str, new_path: &str) {
        self.nested = rebase_set(std::mem::take(&mut self.nested), old_path, new_path);
        self.non_nested = rebase_set(std::mem::take(&mut self.non_nested), old_path, new_path);
    }

    /// Drops entries at or below `path` after the directory disappeared.
    pub fn forget_subtree(&mut self, path: &str) {
        self.remove_nested_at_or_below(path);
        self.non_nested
            .retain(|entry| !taxonomy::is_same_or_descendant(path, entry, false));
    }

    fn remove_nested_at_or_below(&mut self, path: &str) {
        self.nested
            .retain(|entry| !taxonomy::is_same_or_descendant(path, entry, false));
    }
}

fn rebase_set(set: BTreeSet<String>, old_path: &str, new_path: &str) -> BTreeSet<String> {
    set.into_iter()
        .map(|entry| taxonomy::rebase(&entry, old_path, new_path).unwrap_or(entry))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_entry_subsumes_descendants() {
        let mut reg = CheckStateRegistry::new();
        reg.check_changed("C:\\A\\B", CheckState::Checked);
        reg.check_changed("C:\\A\\C", CheckState::Checked);
        reg.check_changed("C:\\A", CheckState::Checked);

        assert_eq!(reg.nested().collect::<Vec<_>>(), vec!["C:\\A"]);
        assert!(reg.is_checked("C:\\A\\B\\Deep"));
    }

    #[test]
    fn nested_entry_under_covered_ancestor_is_rejected() {
        let mut reg = CheckStateRegistry::new();
        reg.check_changed("C:\\A", CheckState::Checked);
        reg.check_changed("C:\\A\\B", CheckState::Checked);
        assert_eq!(reg.nested().collect::<Vec<_>>(), vec!["C:\\A"]);
    }

    #[test]
    fn similar_prefix_is_not_subsumed() {
        let mut reg = CheckStateRegistry::new();
        reg.check_changed("C:\\Foobar", CheckState::Checked);
        reg.check_changed("C:\\Foo", CheckState::Checked);
        assert_eq!(
            reg.nested().collect::<Vec<_>>(),
            vec!["C:\\Foo", "C:\\Foobar"]
        );
        reg.check_changed("C:\\Foo", CheckState::Unchecked);
        assert_eq!(reg.nested().collect::<Vec<_>>(), vec!["C:\\Foobar"]);
    }

    #[test]
    fn indeterminate_moves_entry_to_non_nested() {
        let mut reg = CheckStateRegistry::new();
        reg.check_changed("C:\\A", CheckState::Checked);
        reg.check_changed("C:\\A", CheckState::Indeterminate);

        assert!(reg.nested().next().is_none());
        assert_eq!(reg.non_nested().collect::<Vec<_>>(), vec!["C:\\A"]);
        assert!(reg.is_checked("C:\\A"));
        assert!(!reg.is_checked("C:\\A\\B"));
        assert_eq!(reg.status_of("C:\\A"), CheckState::Indeterminate);
        assert_eq!(reg.status_of("C:\\A\\B"), CheckState::Unchecked);

        reg.check_changed("C:\\A", CheckState::Unchecked);
        assert!(reg.is_empty());
    }

    #[test]
    fn replay_plan_lists_nested_first() {
        let mut reg = CheckStateRegistry::new();
        reg.check_changed("C:\\A", CheckState::Indeterminate);
        reg.check_changed("C:\\A\\B", CheckState::Checked);

        assert_eq!(
            reg.replay_plan(),
            vec![
                ("C:\\A\\B".to_string(), CheckState::Checked),
                ("C:\\A".to_string(), CheckState::Indeterminate),
            ]
        );
    }

    #[test]
    fn rename_and_forget_rewrite_entries() {
        let mut reg = CheckStateRegistry::new();
        reg.check_changed("C:\\A\\Old", CheckState::Indeterminate);
        reg.check_changed("C:\\A\\Old\\Sub", CheckState::Checked);
        reg.check_changed("C:\\A\\Keep", CheckState::Checked);

        reg.rename_prefix("C:\\A\\Old", "C:\\A\\New");
        assert_eq!(reg.status_of("C:\\A\\New"), CheckState::Indeterminate);
        assert_eq!(reg.status_of("C:\\A\\New\\Sub"), CheckState::Checked);
        assert_eq!(reg.status_of("C:\\A\\Old\\Sub"), CheckState::Unchecked);

        reg.forget_subtree("C:\\A\\New");
        assert_eq!(reg.nested().collect::<Vec<_>>(), vec!["C:\\A\\Keep"]);
        assert!(reg.non_nested().next().is_none());
    }
}
