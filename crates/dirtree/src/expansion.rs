//! Registry of directories currently shown as expanded.
//!
//! Paths are tracked in three disjoint groups:
//! - special-folder roots, fixed at construction and never removed
//! - expanded directories below a special-folder root
//! - every other expanded directory

use std::collections::BTreeSet;

use crate::config::SyncConfig;
use crate::taxonomy;

#[derive(Debug, Default, Clone)]
pub struct ExpansionRegistry {
    ordinary: BTreeSet<String>,
    special_roots: Vec<String>,
    special_descendants: BTreeSet<String>,
    case_insensitive: bool,
}

impl ExpansionRegistry {
    /// Creates a registry for the given known-folder roots.
    pub fn new<I, S>(special_roots: I, case_insensitive: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut roots: Vec<String> = special_roots
            .into_iter()
            .map(|root| taxonomy::normalize(root.as_ref()))
            .filter(|root| !root.is_empty())
            .collect();
        roots.sort();
        roots.dedup();
        Self {
            ordinary: BTreeSet::new(),
            special_roots: roots,
            special_descendants: BTreeSet::new(),
            case_insensitive,
        }
    }

    pub fn from_config<I, S>(special_roots: I, config: &SyncConfig) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self::new(special_roots, config.case_insensitive_paths)
    }

    #[inline]
    pub fn special_roots(&self) -> &[String] {
        &self.special_roots
    }

    /// True if `path` is exactly a registered special-folder root.
    pub fn is_special_root(&self, path: &str) -> bool {
        self.special_roots.iter().any(|root| {
            if self.case_insensitive {
                root.eq_ignore_ascii_case(path)
            } else {
                root == path
            }
        })
    }

    /// True if `path` is a special-folder root or lies below one.
    pub fn has_special_sub_folder(&self, path: &str) -> bool {
        self.special_roots
            .iter()
            .any(|root| taxonomy::is_same_or_descendant(root, path, self.case_insensitive))
    }

    /// Records `path` as expanded. Returns true if it was newly tracked.
    pub fn add_directory(&mut self, path: &str) -> bool {
        if self.is_special_root(path) {
            return false;
        }
        if self.has_special_sub_folder(path) {
            self.special_descendants.insert(path.to_string())
        } else {
            self.ordinary.insert(path.to_string())
        }
    }

    /// Stops tracking `path`. Special-folder roots are never removed.
    pub fn remove_directory(&mut self, path: &str) -> bool {
        if self.is_special_root(path) {
            return false;
        }
        if self.has_special_sub_folder(path) {
            self.special_descendants.remove(path)
        } else {
            self.ordinary.remove(path)
        }
    }

    pub fn is_expanded_directory(&self, path: &str) -> bool {
        self.ordinary.contains(path) || self.special_descendants.contains(path)
    }

    /// Iterates every tracked expanded directory, ordinary ones first.
    pub fn expanded_directories(&self) -> impl Iterator<Item = &str> {
        self.ordinary
            .iter()
            .chain(self.special_descendants.iter())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.ordinary.len() + self.special_descendants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every tracked entry at or below `path`.
    pub fn forget_subtree(&mut self, path: &str) {
        self.ordinary
            .retain(|entry| !taxonomy::is_same_or_descendant(path, entry, false));
        self.special_descendants
            .retain(|entry| !taxonomy::is_same_or_descendant(path, entry, false));
    }

    /// Moves tracked entries from under `old_path` to under `new_path`.
    pub fn rebase(&mut self, old_path: &str, new_path: &str) {
        let moved: Vec<String> = self
            .expanded_directories()
            .filter_map(|entry| taxonomy::rebase(entry, old_path, new_path))
            .collect();
        if moved.is_empty() {
            return;
        }
        self.forget_subtree(old_path);
        for entry in moved {
            self.add_directory(&entry);
        }
    }

    /// Forgets every expanded entry; special-folder roots stay registered.
    pub fn clear_expanded(&mut self) {
        self.ordinary.clear();
        self.special_descendants.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ExpansionRegistry {
        ExpansionRegistry::new(["C:\\Users\\X\\Documents"], true)
    }

    #[test]
    fn special_root_is_never_tracked() {
        let mut reg = registry();
        assert!(!reg.add_directory("C:\\Users\\X\\Documents"));
        assert!(!reg.is_expanded_directory("C:\\Users\\X\\Documents"));
        assert!(!reg.remove_directory("C:\\Users\\X\\Documents"));
        assert_eq!(reg.special_roots(), ["C:\\Users\\X\\Documents"]);
    }

    #[test]
    fn special_descendants_and_ordinary_are_separate() {
        let mut reg = registry();
        assert!(reg.add_directory("C:\\Users\\X\\Documents\\Work"));
        assert!(reg.add_directory("C:\\Windows"));
        assert!(!reg.add_directory("C:\\Windows"));

        assert!(reg.is_expanded_directory("C:\\Users\\X\\Documents\\Work"));
        assert!(reg.is_expanded_directory("C:\\Windows"));
        assert_eq!(reg.len(), 2);

        assert!(reg.remove_directory("C:\\Users\\X\\Documents\\Work"));
        assert!(!reg.is_expanded_directory("C:\\Users\\X\\Documents\\Work"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn special_prefix_test_honours_case_rule() {
        let reg = registry();
        assert!(reg.has_special_sub_folder("c:\\users\\x\\documents\\a"));
        assert!(!reg.has_special_sub_folder("C:\\Users\\X\\DocumentsOld"));

        let strict = ExpansionRegistry::new(["C:\\Users\\X\\Documents"], false);
        assert!(!strict.has_special_sub_folder("c:\\users\\x\\documents\\a"));
    }

    #[test]
    fn rebase_moves_entries() {
        let mut reg = registry();
        reg.add_directory("C:\\A\\Old");
        reg.add_directory("C:\\A\\Old\\Sub");
        reg.add_directory("C:\\A\\Other");

        reg.rebase("C:\\A\\Old", "C:\\A\\New");

        assert!(reg.is_expanded_directory("C:\\A\\New"));
        assert!(reg.is_expanded_directory("C:\\A\\New\\Sub"));
        assert!(!reg.is_expanded_directory("C:\\A\\Old"));
        assert!(reg.is_expanded_directory("C:\\A\\Other"));
    }

    #[test]
    fn forget_subtree_keeps_similar_prefixes() {
        let mut reg = registry();
        reg.add_directory("C:\\Foo");
        reg.add_directory("C:\\Foo\\Bar");
        reg.add_directory("C:\\Foobar");

        reg.forget_subtree("C:\\Foo");

        let remaining: Vec<_> = reg.expanded_directories().collect();
        assert_eq!(remaining, vec!["C:\\Foobar"]);
    }
}
