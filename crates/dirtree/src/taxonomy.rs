//! Path classification helpers.
//!
//! Tree identities are plain strings rather than `PathBuf`s: a drive-letter
//! path such as `C:\Users` must classify the same way regardless of the host
//! platform the engine is compiled for. Both `\` and `/` are accepted as
//! separators; the separator already present in a path is reused when joining.
//!
//! All functions here are pure. Given the same input they return the same
//! output, which lets the reconciler restart a walk at any time.

use std::cmp::Ordering;

use crate::config::SyncConfig;

#[inline]
fn is_separator(c: char) -> bool {
    c == '\\' || c == '/'
}

/// Returns the separator used by `path`.
///
/// Drive-letter paths without any separator yet default to `\`.
pub fn separator_of(path: &str) -> char {
    if path.contains('\\') {
        '\\'
    } else if path.contains('/') {
        '/'
    } else if has_drive_prefix(path) {
        '\\'
    } else {
        std::path::MAIN_SEPARATOR
    }
}

#[inline]
fn has_drive_prefix(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

/// Returns the byte length of the raw root prefix (`C:\`, `C:`, `/` or `\`).
fn raw_root_len(path: &str) -> Option<usize> {
    let bytes = path.as_bytes();
    if has_drive_prefix(path) {
        if bytes.len() >= 3 && is_separator(bytes[2] as char) {
            Some(3)
        } else {
            Some(2)
        }
    } else if bytes.first().is_some_and(|&b| is_separator(b as char)) {
        Some(1)
    } else {
        None
    }
}

/// Returns the canonical root of an absolute path, or `None` for relative paths.
///
/// ```text
/// C:\Users\X  -> C:\
/// D:          -> D:\
/// /home/x     -> /
/// ```
pub fn root_of(path: &str) -> Option<String> {
    let len = raw_root_len(path)?;
    if has_drive_prefix(path) {
        let mut root = path[..2].to_string();
        root.push(separator_of(path));
        Some(root)
    } else {
        Some(path[..len].to_string())
    }
}

/// Canonicalizes separators: repeated separators collapse and trailing
/// separators are stripped, except for the root itself.
pub fn normalize(path: &str) -> String {
    let sep = separator_of(path);
    let (mut out, rest) = match raw_root_len(path) {
        Some(len) => (root_of(path).unwrap_or_default(), &path[len..]),
        None => (String::new(), path),
    };
    let root_len = out.len();
    for segment in rest.split(is_separator).filter(|s| !s.is_empty()) {
        if out.len() > root_len {
            out.push(sep);
        }
        out.push_str(segment);
    }
    out
}

/// True iff `path` is exactly a drive root (`C:\`, `/`).
pub fn is_drive_root(path: &str) -> bool {
    let normalized = normalize(path);
    root_of(&normalized).is_some_and(|root| root == normalized)
}

/// Joins a child name onto a parent path.
pub fn join(parent: &str, name: &str) -> String {
    let mut out = String::with_capacity(parent.len() + name.len() + 1);
    out.push_str(parent);
    if !parent.is_empty() && !parent.ends_with(is_separator) {
        out.push(separator_of(parent));
    }
    out.push_str(name.trim_start_matches(is_separator));
    out
}

/// Decomposes `path` into every ancestor from the root down to `path` itself.
///
/// ```text
/// C:\A\B -> [C:\, C:\A, C:\A\B]
/// ```
pub fn ancestor_chain(path: &str) -> Vec<String> {
    let normalized = normalize(path);
    let (mut current, rest) = match root_of(&normalized) {
        Some(root) => {
            let len = root.len();
            (root, &normalized[len..])
        }
        None => (String::new(), normalized.as_str()),
    };

    let mut chain = Vec::new();
    if !current.is_empty() {
        chain.push(current.clone());
    }
    for segment in rest.split(is_separator).filter(|s| !s.is_empty()) {
        current = if current.is_empty() {
            segment.to_string()
        } else {
            join(&current, segment)
        };
        chain.push(current.clone());
    }
    chain
}

/// Returns the parent directory of `path`, or `None` for roots and single
/// relative segments.
pub fn parent_of(path: &str) -> Option<String> {
    let normalized = normalize(path);
    let root_len = root_of(&normalized).map_or(0, |root| root.len());
    if normalized.len() <= root_len {
        return None;
    }
    match normalized.rfind(is_separator) {
        Some(idx) if idx < root_len => Some(normalized[..root_len].to_string()),
        Some(idx) => Some(normalized[..idx].to_string()),
        None if root_len > 0 => Some(normalized[..root_len].to_string()),
        None => None,
    }
}

/// Returns the drive root that owns `path`.
pub fn drive_root_of(path: &str) -> Option<String> {
    root_of(&normalize(path))
}

/// Returns the last segment of `path`; a root is its own name.
pub fn file_name(path: &str) -> &str {
    let trimmed = if path.len() > 1 {
        path.trim_end_matches(is_separator)
    } else {
        path
    };
    match trimmed.rfind(is_separator) {
        Some(idx) if idx + 1 < trimmed.len() => &trimmed[idx + 1..],
        _ => path,
    }
}

/// Ordinal comparison used as the children sort key.
#[inline]
pub fn compare_paths(a: &str, b: &str) -> Ordering {
    a.cmp(b)
}

/// True if `path` equals `ancestor` or lies below it.
///
/// Compares whole segments: `C:\Foo` is not an ancestor of `C:\Foobar`.
/// Both inputs are expected in normalized form.
pub fn is_same_or_descendant(ancestor: &str, path: &str, case_insensitive: bool) -> bool {
    if ancestor.is_empty() {
        return false;
    }
    let Some(head) = path.get(..ancestor.len()) else {
        return false;
    };
    let head_matches = if case_insensitive {
        head.eq_ignore_ascii_case(ancestor)
    } else {
        head == ancestor
    };
    if !head_matches {
        return false;
    }
    let tail = &path[ancestor.len()..];
    tail.is_empty() || ancestor.ends_with(is_separator) || tail.starts_with(is_separator)
}

/// True if `path` lies strictly below `ancestor`.
pub fn is_descendant(ancestor: &str, path: &str, case_insensitive: bool) -> bool {
    path.len() > ancestor.len() && is_same_or_descendant(ancestor, path, case_insensitive)
}

/// Moves `path` from under `old_prefix` to under `new_prefix`.
///
/// Returns `None` when `path` is not at or below `old_prefix`.
pub fn rebase(path: &str, old_prefix: &str, new_prefix: &str) -> Option<String> {
    if !is_same_or_descendant(old_prefix, path, false) {
        return None;
    }
    let mut out = new_prefix.to_string();
    out.push_str(&path[old_prefix.len()..]);
    Some(out)
}

/// Configured classification: trash detection and case folding rules.
#[derive(Debug, Clone)]
pub struct PathTaxonomy {
    recycle_bin_marker: String,
    case_insensitive: bool,
}

impl Default for PathTaxonomy {
    fn default() -> Self {
        Self::from_config(&SyncConfig::default())
    }
}

impl PathTaxonomy {
    pub fn from_config(config: &SyncConfig) -> Self {
        Self {
            recycle_bin_marker: config.recycle_bin_marker.to_ascii_uppercase(),
            case_insensitive: config.case_insensitive_paths,
        }
    }

    #[inline]
    pub fn case_insensitive(&self) -> bool {
        self.case_insensitive
    }

    /// True if `path` points into the platform trash folder.
    ///
    /// Root-level deletions on some volumes surface only as a change inside
    /// the trash, so the reconciler redirects these to a root diff.
    pub fn is_recycle_bin_path(&self, path: &str) -> bool {
        !self.recycle_bin_marker.is_empty()
            && path
                .to_ascii_uppercase()
                .contains(self.recycle_bin_marker.as_str())
    }

    /// Segment-aware prefix test honouring the configured case rule.
    pub fn is_under(&self, ancestor: &str, path: &str) -> bool {
        is_same_or_descendant(ancestor, path, self.case_insensitive)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drive_roots_are_detected() {
        assert!(is_drive_root("C:\\"));
        assert!(is_drive_root("C:"));
        assert!(is_drive_root("/"));
        assert!(!is_drive_root("C:\\Windows"));
        assert!(!is_drive_root("/home"));
        assert!(!is_drive_root("relative"));
    }

    #[test]
    fn normalize_strips_trailing_and_repeated_separators() {
        assert_eq!(normalize("C:\\A\\B\\"), "C:\\A\\B");
        assert_eq!(normalize("C:\\A\\\\B"), "C:\\A\\B");
        assert_eq!(normalize("C:"), "C:\\");
        assert_eq!(normalize("C:\\"), "C:\\");
        assert_eq!(normalize("/home/user/"), "/home/user");
        assert_eq!(normalize("/"), "/");
    }

    #[test]
    fn ancestor_chain_walks_from_root() {
        assert_eq!(
            ancestor_chain("C:\\A\\B"),
            vec!["C:\\", "C:\\A", "C:\\A\\B"]
        );
        assert_eq!(ancestor_chain("/home/user"), vec!["/", "/home", "/home/user"]);
        assert_eq!(ancestor_chain("D:\\"), vec!["D:\\"]);
    }

    #[test]
    fn ancestor_chain_is_repeatable() {
        let first = ancestor_chain("C:\\Users\\X\\Documents");
        let second = ancestor_chain("C:\\Users\\X\\Documents");
        assert_eq!(first, second);
    }

    #[test]
    fn parent_of_handles_roots() {
        assert_eq!(parent_of("C:\\A\\B").as_deref(), Some("C:\\A"));
        assert_eq!(parent_of("C:\\A").as_deref(), Some("C:\\"));
        assert_eq!(parent_of("C:\\"), None);
        assert_eq!(parent_of("/home").as_deref(), Some("/"));
        assert_eq!(parent_of("/"), None);
    }

    #[test]
    fn drive_root_of_extracts_root() {
        assert_eq!(
            drive_root_of("C:\\$RECYCLE.BIN\\S-1-5").as_deref(),
            Some("C:\\")
        );
        assert_eq!(drive_root_of("/mnt/usb").as_deref(), Some("/"));
        assert_eq!(drive_root_of("relative"), None);
    }

    #[test]
    fn file_name_returns_last_segment() {
        assert_eq!(file_name("C:\\A\\Old"), "Old");
        assert_eq!(file_name("C:\\"), "C:\\");
        assert_eq!(file_name("/home/user"), "user");
    }

    #[test]
    fn join_reuses_separator() {
        assert_eq!(join("C:\\", "A"), "C:\\A");
        assert_eq!(join("C:\\A", "B"), "C:\\A\\B");
        assert_eq!(join("/tmp", "x"), "/tmp/x");
        assert_eq!(join("/", "tmp"), "/tmp");
    }

    #[test]
    fn similar_prefixes_are_not_ancestors() {
        assert!(is_same_or_descendant("C:\\Foo", "C:\\Foo", false));
        assert!(is_same_or_descendant("C:\\Foo", "C:\\Foo\\Bar", false));
        assert!(!is_same_or_descendant("C:\\Foo", "C:\\Foobar", false));
        assert!(is_same_or_descendant("C:\\", "C:\\Foo", false));
        assert!(!is_descendant("C:\\Foo", "C:\\Foo", false));
    }

    #[test]
    fn case_rule_is_configurable() {
        assert!(!is_same_or_descendant("C:\\users", "C:\\Users\\X", false));
        assert!(is_same_or_descendant("C:\\users", "C:\\Users\\X", true));
    }

    #[test]
    fn rebase_moves_descendants() {
        assert_eq!(
            rebase("C:\\A\\Old\\Sub", "C:\\A\\Old", "C:\\A\\New").as_deref(),
            Some("C:\\A\\New\\Sub")
        );
        assert_eq!(rebase("C:\\A\\Other", "C:\\A\\Old", "C:\\A\\New"), None);
    }

    #[test]
    fn recycle_bin_marker_is_case_insensitive() {
        let taxonomy = PathTaxonomy::default();
        assert!(taxonomy.is_recycle_bin_path("C:\\$Recycle.Bin\\S-1-5-21"));
        assert!(!taxonomy.is_recycle_bin_path("C:\\Users"));
    }
}
