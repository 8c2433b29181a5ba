//! Tri-state checkbox propagation.
//!
//! A change is forced down through enumerated descendants, inferred upward
//! as indeterminate, and replayed sideways onto every other node that
//! mirrors the same physical directory under another root.

use fnv::FnvHashSet;

use super::DirectoryTree;
use crate::arena::NodeId;
use crate::error::Result;
use crate::node::CheckState;

#[inline]
fn depth(path: &str) -> usize {
    path.matches(['\\', '/']).count()
}

impl DirectoryTree {
    /// Sets the checkbox of `id` and propagates the change.
    ///
    /// Returns the number of node states that changed, mirrors included.
    pub fn set_is_checked(&mut self, id: NodeId, state: CheckState) -> Result<usize> {
        let node = self.get(id)?;
        if node.full_path.is_empty() || node.checked == state {
            return Ok(0);
        }
        let origin = node.full_path.clone();

        let mut touched = FnvHashSet::default();
        let mut pending = self.apply_check(id, state, &mut touched)?;
        let mut total = pending.len();

        while !pending.is_empty() {
            pending.sort_by_key(|(path, _)| depth(path));
            let mut next = Vec::new();
            for (path, state) in pending {
                for mirror in self.materialized_nodes(&path) {
                    if touched.contains(&mirror) || self.get(mirror)?.checked == state {
                        continue;
                    }
                    let changes = self.apply_check(mirror, state, &mut touched)?;
                    total += changes.len();
                    next.extend(changes);
                }
            }
            pending = next;
        }

        log::debug!(
            "check changed path={} state={} nodes={}",
            origin,
            state.as_str(),
            total
        );
        Ok(total)
    }

    /// Runs one downward-commit-upward pass from `id` and records every
    /// committed change in the registry, in commit order.
    fn apply_check(
        &mut self,
        id: NodeId,
        state: CheckState,
        touched: &mut FnvHashSet<NodeId>,
    ) -> Result<Vec<(String, CheckState)>> {
        let mut changes = Vec::new();

        if state != CheckState::Indeterminate {
            let mut stack: Vec<NodeId> = self.get(id)?.children.to_vec();
            while let Some(current) = stack.pop() {
                let node = self.node_mut(current)?;
                stack.extend(node.children.iter().copied());
                if node.checked != state {
                    node.checked = state;
                    touched.insert(current);
                    changes.push((node.full_path.clone(), state));
                }
            }
        }

        let mut demoted = Vec::new();
        let node = self.node_mut(id)?;
        if node.checked == CheckState::Checked && state == CheckState::Indeterminate {
            demoted.push(id);
        }
        node.checked = state;
        touched.insert(id);
        changes.push((node.full_path.clone(), state));

        let mut current = id;
        let mut settled = state;
        while let Some(parent) = self.get(current)?.parent {
            let Some(next) = self.parent_transition(parent, current, settled)? else {
                break;
            };
            let node = self.node_mut(parent)?;
            node.checked = next;
            touched.insert(parent);
            changes.push((node.full_path.clone(), next));
            if next == CheckState::Indeterminate {
                demoted.push(parent);
            }
            settled = next;
            current = parent;
        }

        for (path, state) in &changes {
            self.checks.check_changed(path, *state);
        }
        // A demoted ancestor no longer covers its subtree, so its children
        // that are still checked need entries of their own.
        for parent in demoted {
            let covered: Vec<String> = self
                .get(parent)?
                .children
                .iter()
                .filter_map(|&child| self.node(child))
                .filter(|child| child.checked == CheckState::Checked)
                .map(|child| child.full_path.clone())
                .collect();
            for path in covered {
                self.checks.check_changed(&path, CheckState::Checked);
            }
        }

        Ok(changes)
    }

    /// New value for `parent` after `child` settled to `settled`, or `None`
    /// when the upward walk stops.
    fn parent_transition(
        &self,
        parent: NodeId,
        child: NodeId,
        settled: CheckState,
    ) -> Result<Option<CheckState>> {
        let parent_node = self.get(parent)?;
        let next = match settled {
            CheckState::Checked => {
                if parent_node.checked != CheckState::Indeterminate {
                    return Ok(None);
                }
                let siblings_checked = parent_node
                    .children
                    .iter()
                    .filter(|&&sibling| sibling != child)
                    .filter_map(|&sibling| self.node(sibling))
                    .all(|sibling| sibling.checked == CheckState::Checked);
                siblings_checked.then_some(CheckState::Checked)
            }
            CheckState::Unchecked | CheckState::Indeterminate => {
                (parent_node.checked == CheckState::Checked).then_some(CheckState::Indeterminate)
            }
        };
        Ok(next)
    }
}

#[cfg(test)]
mod tests {
    use crate::node::CheckState;
    use crate::testing::{node_at, tree_with, FakeFs};
    use crate::tree::DirectoryTree;

    fn state(tree: &DirectoryTree, path: &str) -> CheckState {
        tree.get(node_at(tree, path)).unwrap().checked()
    }

    fn expand_all(tree: &mut DirectoryTree, paths: &[&str]) {
        for path in paths {
            let id = node_at(tree, path);
            tree.set_is_expanded(id, true).unwrap();
        }
    }

    fn chain_tree() -> DirectoryTree {
        let fs = FakeFs::with_dirs(&["C:\\A\\B\\C", "C:\\A\\B\\D", "C:\\A\\E"]);
        let (mut tree, _) = tree_with(&fs, &[]);
        tree.initialize(&["C:\\"]).unwrap();
        expand_all(&mut tree, &["C:\\", "C:\\A", "C:\\A\\B"]);
        tree
    }

    #[test]
    fn checking_forces_descendants() {
        let mut tree = chain_tree();
        let a = node_at(&tree, "C:\\A");
        let changed = tree.set_is_checked(a, CheckState::Checked).unwrap();

        // A, B, C, D, E
        assert_eq!(changed, 5);
        for path in ["C:\\A", "C:\\A\\B", "C:\\A\\B\\C", "C:\\A\\B\\D", "C:\\A\\E"] {
            assert_eq!(state(&tree, path), CheckState::Checked, "{path}");
        }
        // an unchecked parent is not promoted
        assert_eq!(state(&tree, "C:\\"), CheckState::Unchecked);
        assert_eq!(tree.checks().nested().collect::<Vec<_>>(), vec!["C:\\A"]);
    }

    #[test]
    fn repeated_check_is_a_no_op() {
        let mut tree = chain_tree();
        let a = node_at(&tree, "C:\\A");
        assert!(tree.set_is_checked(a, CheckState::Checked).unwrap() > 0);
        let registry = tree.checks().clone();

        assert_eq!(tree.set_is_checked(a, CheckState::Checked).unwrap(), 0);
        assert_eq!(tree.checks(), &registry);
    }

    #[test]
    fn unchecking_leaf_makes_checked_ancestors_indeterminate() {
        let mut tree = chain_tree();
        let root = tree.roots()[0];
        tree.set_is_checked(root, CheckState::Checked).unwrap();

        let c = node_at(&tree, "C:\\A\\B\\C");
        tree.set_is_checked(c, CheckState::Unchecked).unwrap();

        assert_eq!(state(&tree, "C:\\A\\B\\C"), CheckState::Unchecked);
        for path in ["C:\\A\\B", "C:\\A", "C:\\"] {
            assert_eq!(state(&tree, path), CheckState::Indeterminate, "{path}");
        }
        assert_eq!(state(&tree, "C:\\A\\B\\D"), CheckState::Checked);
        assert_eq!(state(&tree, "C:\\A\\E"), CheckState::Checked);

        let nested: Vec<_> = tree.checks().nested().collect();
        assert_eq!(nested, vec!["C:\\A\\B\\D", "C:\\A\\E"]);
        let non_nested: Vec<_> = tree.checks().non_nested().collect();
        assert_eq!(non_nested, vec!["C:\\", "C:\\A", "C:\\A\\B"]);
    }

    #[test]
    fn rechecking_last_sibling_promotes_indeterminate_parent() {
        let mut tree = chain_tree();
        let b = node_at(&tree, "C:\\A\\B");
        tree.set_is_checked(b, CheckState::Checked).unwrap();
        let c = node_at(&tree, "C:\\A\\B\\C");
        tree.set_is_checked(c, CheckState::Unchecked).unwrap();
        assert_eq!(state(&tree, "C:\\A\\B"), CheckState::Indeterminate);

        tree.set_is_checked(c, CheckState::Checked).unwrap();
        assert_eq!(state(&tree, "C:\\A\\B"), CheckState::Checked);
        // A was never checked and stays untouched
        assert_eq!(state(&tree, "C:\\A"), CheckState::Unchecked);
        assert_eq!(tree.checks().nested().collect::<Vec<_>>(), vec!["C:\\A\\B"]);
        assert!(tree.checks().non_nested().next().is_none());
    }

    #[test]
    fn indeterminate_does_not_cascade_down() {
        let mut tree = chain_tree();
        let a = node_at(&tree, "C:\\A");
        tree.set_is_checked(a, CheckState::Checked).unwrap();
        let changed = tree.set_is_checked(a, CheckState::Indeterminate).unwrap();

        assert_eq!(changed, 1);
        assert_eq!(state(&tree, "C:\\A\\B"), CheckState::Checked);
    }

    #[test]
    fn lazy_children_inherit_on_kick() {
        let fs = FakeFs::with_dirs(&["C:\\A\\B\\C"]);
        let (mut tree, _) = tree_with(&fs, &[]);
        tree.initialize(&["C:\\"]).unwrap();
        expand_all(&mut tree, &["C:\\"]);
        let a = node_at(&tree, "C:\\A");
        tree.set_is_checked(a, CheckState::Checked).unwrap();
        assert!(!tree.get(a).unwrap().is_kicked());

        expand_all(&mut tree, &["C:\\A", "C:\\A\\B"]);
        assert_eq!(state(&tree, "C:\\A\\B\\C"), CheckState::Checked);
    }

    #[test]
    fn special_folder_mirror_is_synced_once() {
        let fs = FakeFs::with_dirs(&[
            "C:\\Users\\X\\Documents\\Work\\Q1",
            "C:\\Users\\X\\Documents\\Home",
        ]);
        let documents = "C:\\Users\\X\\Documents";
        let (mut tree, _) = tree_with(&fs, &[documents]);
        tree.initialize(&["C:\\"]).unwrap();
        expand_all(&mut tree, &["C:\\", "C:\\Users", "C:\\Users\\X", documents]);
        let special = tree.special_roots()[0];
        tree.set_is_expanded(special, true).unwrap();
        let work_mirror = tree.descend(special, "C:\\Users\\X\\Documents\\Work").unwrap();
        tree.set_is_expanded(work_mirror, true).unwrap();

        let mirrors = tree.locator().find_all(documents);
        assert_eq!(mirrors.len(), 2);

        let drive_documents = node_at(&tree, documents);
        let changed = tree
            .set_is_checked(drive_documents, CheckState::Checked)
            .unwrap();

        // drive side: Documents, Work, Home; special side: Documents, Work,
        // Home, Q1. Every physical directory changes once per mirror.
        assert_eq!(changed, 7);
        for id in tree.locator().find_all(documents) {
            assert_eq!(tree.get(id).unwrap().checked(), CheckState::Checked);
        }
        for id in tree.locator().find_all("C:\\Users\\X\\Documents\\Work") {
            assert_eq!(tree.get(id).unwrap().checked(), CheckState::Checked);
        }
        assert_eq!(tree.checks().nested().collect::<Vec<_>>(), vec![documents]);
        assert_eq!(
            tree.set_is_checked(special, CheckState::Checked).unwrap(),
            0
        );
    }

    #[test]
    fn mirror_uncheck_flows_back_to_drive_tree() {
        let fs = FakeFs::with_dirs(&["C:\\Users\\X\\Documents\\Work"]);
        let documents = "C:\\Users\\X\\Documents";
        let (mut tree, _) = tree_with(&fs, &[documents]);
        tree.initialize(&["C:\\"]).unwrap();
        expand_all(&mut tree, &["C:\\", "C:\\Users", "C:\\Users\\X", documents]);
        let special = tree.special_roots()[0];
        tree.set_is_expanded(special, true).unwrap();

        let users = node_at(&tree, "C:\\Users");
        tree.set_is_checked(users, CheckState::Checked).unwrap();
        assert_eq!(tree.get(special).unwrap().checked(), CheckState::Checked);

        let work_mirror = tree.descend(special, "C:\\Users\\X\\Documents\\Work").unwrap();
        tree.set_is_checked(work_mirror, CheckState::Unchecked)
            .unwrap();

        assert_eq!(state(&tree, "C:\\Users\\X\\Documents\\Work"), CheckState::Unchecked);
        assert_eq!(state(&tree, documents), CheckState::Indeterminate);
        assert_eq!(state(&tree, "C:\\Users\\X"), CheckState::Indeterminate);
        assert_eq!(state(&tree, "C:\\Users"), CheckState::Indeterminate);
        assert_eq!(tree.get(special).unwrap().checked(), CheckState::Indeterminate);
        assert!(!tree.checks().is_checked("C:\\Users\\X\\Documents\\Work"));
    }
}
