//! Re-deriving checkboxes from the registry after a rebuild.

use super::DirectoryTree;
use crate::arena::NodeId;
use crate::error::Result;
use crate::taxonomy;

impl DirectoryTree {
    /// Applies every registry entry back onto the forest.
    ///
    /// Each target is materialized by kicking and expanding its ancestors,
    /// then its checkbox is assigned directly without propagation. Entries
    /// on drives that are missing or not ready are skipped. Returns the
    /// number of nodes assigned.
    pub fn replay_onto_tree(&mut self) -> Result<usize> {
        let plan = self.checks.replay_plan();
        let mut assigned = 0;
        for (path, state) in &plan {
            let targets = self.materialize_path(path)?;
            if targets.is_empty() {
                log::debug!("replay skipped path={}", path);
                continue;
            }
            for target in targets {
                self.node_mut(target)?.checked = *state;
                assigned += 1;
            }
        }
        log::info!(
            "check state replayed entries={} nodes={}",
            plan.len(),
            assigned
        );
        Ok(assigned)
    }

    /// Creates the nodes on the way to `path` under every root that can hold
    /// it and returns the nodes found for `path` itself.
    pub(crate) fn materialize_path(&mut self, path: &str) -> Result<Vec<NodeId>> {
        let path = taxonomy::normalize(path);
        let mut starts = Vec::new();
        if let Some(root) = taxonomy::drive_root_of(&path).and_then(|r| self.drive_root(&r)) {
            starts.push(root);
        }
        for &special in &self.special_roots {
            let under = self
                .nodes
                .get(special)
                .is_some_and(|node| self.taxonomy.is_under(&node.full_path, &path));
            if under {
                starts.push(special);
            }
        }

        let mut found = Vec::new();
        for start in starts {
            if let Some(id) = self.walk_materializing(start, &path)? {
                found.push(id);
            }
        }
        Ok(found)
    }

    fn walk_materializing(&mut self, start: NodeId, path: &str) -> Result<Option<NodeId>> {
        let start_path = self.get(start)?.full_path.clone();
        let Some(rest) = path.get(start_path.len()..) else {
            return Ok(None);
        };

        let mut current = start;
        for segment in rest.split(['\\', '/']).filter(|s| !s.is_empty()) {
            let node = self.get(current)?;
            if !node.is_ready() {
                return Ok(None);
            }
            let candidate = taxonomy::join(&node.full_path, segment);
            self.kick_child(current, false)?;
            self.set_is_expanded(current, true)?;
            match self.find_child(current, &candidate)? {
                Some(child) => current = child,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use crate::node::CheckState;
    use crate::testing::{node_at, tree_with, FakeFs};
    use crate::tree::DirectoryTree;

    fn marked(tree: &DirectoryTree) -> BTreeMap<String, CheckState> {
        tree.iter()
            .filter(|(_, node)| node.checked() != CheckState::Unchecked)
            .map(|(_, node)| (node.full_path().to_string(), node.checked()))
            .collect()
    }

    fn all_states(tree: &DirectoryTree) -> BTreeMap<String, CheckState> {
        tree.iter()
            .map(|(_, node)| (node.full_path().to_string(), node.checked()))
            .collect()
    }

    #[test]
    fn rebuild_restores_checkboxes() {
        let fs = FakeFs::with_dirs(&[
            "C:\\A\\B\\C",
            "C:\\A\\B\\D",
            "C:\\A\\E",
            "C:\\F\\G",
            "D:\\Data",
        ]);
        let (mut tree, _) = tree_with(&fs, &[]);
        tree.initialize(&["C:\\", "D:\\"]).unwrap();
        for path in ["C:\\", "C:\\A", "C:\\A\\B", "C:\\F", "D:\\"] {
            let id = node_at(&tree, path);
            tree.set_is_expanded(id, true).unwrap();
        }
        let a = node_at(&tree, "C:\\A");
        tree.set_is_checked(a, CheckState::Checked).unwrap();
        let c = node_at(&tree, "C:\\A\\B\\C");
        tree.set_is_checked(c, CheckState::Unchecked).unwrap();
        let g = node_at(&tree, "C:\\F\\G");
        tree.set_is_checked(g, CheckState::Checked).unwrap();
        let data = node_at(&tree, "D:\\Data");
        tree.set_is_checked(data, CheckState::Indeterminate).unwrap();

        let before = all_states(&tree);
        let before_marked = marked(&tree);
        let registry = tree.checks().clone();

        tree.rebuild(&["C:\\", "D:\\"]).unwrap();

        assert_eq!(tree.checks(), &registry);
        let after = all_states(&tree);
        for (path, state) in &after {
            assert_eq!(before.get(path), Some(state), "{path}");
        }
        for path in before_marked.keys() {
            assert!(after.contains_key(path), "{path} was not restored");
        }
    }

    #[test]
    fn replay_skips_vanished_and_unready_entries() {
        let fs = FakeFs::with_dirs(&["C:\\Gone\\Sub", "C:\\Kept", "E:\\Usb"]);
        let (mut tree, _) = tree_with(&fs, &[]);
        tree.initialize(&["C:\\", "E:\\"]).unwrap();
        for path in ["C:\\", "C:\\Gone", "E:\\"] {
            let id = node_at(&tree, path);
            tree.set_is_expanded(id, true).unwrap();
        }
        for path in ["C:\\Gone\\Sub", "C:\\Kept", "E:\\Usb"] {
            let id = node_at(&tree, path);
            tree.set_is_checked(id, CheckState::Checked).unwrap();
        }

        fs.remove_dir("C:\\Gone");
        fs.set_ready("E:\\", false);
        tree.rebuild(&["C:\\", "E:\\"]).unwrap();

        assert_eq!(
            tree.get(node_at(&tree, "C:\\Kept")).unwrap().checked(),
            CheckState::Checked
        );
        assert!(tree.locator().find_node_for_path("C:\\Gone").is_none());
        assert!(tree.locator().find_node_for_path("E:\\Usb").is_none());
        // the registry keeps entries it could not apply
        assert!(tree.checks().is_checked("E:\\Usb"));
    }

    #[test]
    fn replay_reaches_special_folder_mirrors() {
        let fs = FakeFs::with_dirs(&["C:\\Users\\X\\Documents\\Work"]);
        let documents = "C:\\Users\\X\\Documents";
        let (mut tree, _) = tree_with(&fs, &[documents]);
        tree.initialize(&["C:\\"]).unwrap();
        for path in ["C:\\", "C:\\Users", "C:\\Users\\X", documents] {
            let id = node_at(&tree, path);
            tree.set_is_expanded(id, true).unwrap();
        }
        let work = node_at(&tree, "C:\\Users\\X\\Documents\\Work");
        tree.set_is_checked(work, CheckState::Checked).unwrap();

        tree.rebuild(&["C:\\"]).unwrap();

        let mirrors = tree.locator().find_all("C:\\Users\\X\\Documents\\Work");
        assert_eq!(mirrors.len(), 2);
        for id in mirrors {
            assert_eq!(tree.get(id).unwrap().checked(), CheckState::Checked);
        }
    }
}
