//! Root-relative path identities shared by every engine.
//!
//! A `PathRecord` pairs the absolute path with a `/`-separated
//! key relative to the project root. The key is what diffs,
//! baselines, and reports use; the absolute path is only for I/O.

use std::{
    cmp::Ordering,
    path::{Component, Path, PathBuf},
};

/// Label prefix for files that live outside the project root.
pub const EXTERNAL_PREFIX: &str = "[EXTERNAL]";

/// A discovered or resolved file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PathRecord {
    /// Absolute path on disk
    pub abs: PathBuf,
    /// Root-relative key with `/` separators (label for external files)
    pub rel: String,
    /// True when `abs` is not under the project root
    pub external: bool,
}

impl PathRecord {
    /// Build a record for `abs` relative to `root`.
    pub fn new(root: &Path, abs: PathBuf) -> Self {
        match abs.strip_prefix(root) {
            Ok(rel) => Self {
                rel: normalize_rel(rel),
                abs,
                external: false,
            },
            Err(_) => {
                let name = abs
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_default();
                Self {
                    rel: format!("{EXTERNAL_PREFIX}/{name}"),
                    abs,
                    external: true,
                }
            }
        }
    }
}

impl Ord for PathRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rel
            .cmp(&other.rel)
            .then_with(|| self.abs.cmp(&other.abs))
    }
}

impl PartialOrd for PathRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Join the normal components of a relative path with `/`.
pub fn normalize_rel(rel: &Path) -> String {
    let mut out = String::new();
    for c in rel.components() {
        if let Component::Normal(part) = c {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(&part.to_string_lossy());
        }
    }
    out
}

/// Canonicalize without UNC prefixes on Windows; falls back to the input.
pub fn canonical(path: &Path) -> PathBuf {
    dunce::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_root_records_use_forward_slashes() {
        let root = Path::new("/work/proj");
        let rec = PathRecord::new(root, root.join("src").join("pkg").join("mod.py"));
        assert_eq!(rec.rel, "src/pkg/mod.py");
        assert!(!rec.external);
        assert_eq!(rec.abs, root.join("src/pkg/mod.py"));
    }

    #[test]
    fn outside_root_is_tagged_external() {
        let rec = PathRecord::new(Path::new("/work/proj"), PathBuf::from("/opt/lib/util.py"));
        assert!(rec.external);
        assert_eq!(rec.rel, "[EXTERNAL]/util.py");
    }

    #[test]
    fn records_order_by_relative_key() {
        let root = Path::new("/r");
        let mut v = vec![
            PathRecord::new(root, root.join("b.py")),
            PathRecord::new(root, root.join("a/z.py")),
            PathRecord::new(root, root.join("a.py")),
        ];
        v.sort();
        let keys: Vec<_> = v.iter().map(|r| r.rel.as_str()).collect();
        assert_eq!(keys, ["a.py", "a/z.py", "b.py"]);
    }
}
