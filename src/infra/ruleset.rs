//! Filepath: src/infra/ruleset.rs
//! Compiled ignore rules plus the tracked-file allow-list.
//! - Sources: compiled-in defaults, the workspace `.gitignore`,
//!   and caller overrides, merged into one matcher per root
//! - Union semantics: a path is ignored if ANY pattern matches;
//!   `!` negations are dropped so order never changes the outcome
//! - Trailing `/` patterns only match directories
//!
//! Backed by the `ignore` crate's gitignore matcher.

use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::{debug, warn};

use crate::infra::{
    config::{ARTIFACT_DIR_NAME, DEFAULT_IGNORE_PATTERNS},
    walk::ScanError,
};

/// Extensions and basenames eligible for discovery.
#[derive(Debug, Clone, Default)]
pub struct TrackedSet
{
    /// Lowercase extensions without the leading dot
    extensions: HashSet<String>,

    /// Exact file names (e.g. `Dockerfile`, `.gitignore`)
    basenames: HashSet<String>,
}

impl TrackedSet
{
    /// Build from config-style entries. `.py` is an extension and also
    /// a dotfile basename; `Dockerfile` is a basename only.
    pub fn from_entries<S: AsRef<str>>(entries: &[S]) -> Self
    {
        let mut set = Self::default();

        for raw in entries
        {
            let entry = raw
                .as_ref()
                .trim();

            if entry.is_empty()
            {
                continue;
            }

            if let Some(ext) = entry.strip_prefix('.')
            {
                set.extensions
                    .insert(ext.to_ascii_lowercase());
            }

            set.basenames
                .insert(entry.to_string());
        }

        set
    }

    /// True if the file name or extension is allow-listed.
    pub fn contains(
        &self,
        path: &Path,
    ) -> bool
    {
        let by_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| {
                self.basenames
                    .contains(n)
            });

        by_name
            || path
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| {
                    self.extensions
                        .contains(&e.to_ascii_lowercase())
                })
    }

    pub fn is_empty(&self) -> bool
    {
        self.extensions
            .is_empty()
            && self
                .basenames
                .is_empty()
    }
}

/// Immutable ignore rules for one scan root.
#[derive(Debug, Clone)]
pub struct IgnoreRuleset
{
    /// Root the patterns are anchored to
    root: PathBuf,

    /// Compiled union of every accepted pattern
    matcher: Gitignore,

    /// Accepted pattern lines, in insertion order (diagnostics)
    patterns: Vec<String>,

    /// Allow-list applied to files
    tracked: TrackedSet,
}

impl IgnoreRuleset
{
    /// Compile defaults ∪ `<root>/.gitignore` (when `use_workspace_file`)
    /// ∪ `overrides`. Invalid override patterns are errors; invalid
    /// workspace lines are logged and skipped.
    pub fn build(
        root: &Path,
        tracked: TrackedSet,
        overrides: &[String],
        use_workspace_file: bool,
    ) -> Result<Self, ScanError>
    {
        let mut builder = GitignoreBuilder::new(root);
        let mut patterns = Vec::new();

        let artifact = format!("{ARTIFACT_DIR_NAME}/");
        for line in DEFAULT_IGNORE_PATTERNS
            .iter()
            .copied()
            .chain(std::iter::once(artifact.as_str()))
        {
            if builder
                .add_line(None, line)
                .is_ok()
            {
                patterns.push(line.to_string());
            }
        }

        if use_workspace_file
        {
            let path = root.join(".gitignore");
            if let Ok(text) = fs::read_to_string(&path)
            {
                for line in text.lines()
                {
                    let line = line.trim_end();
                    if !accept_line(line)
                    {
                        continue;
                    }
                    match builder.add_line(Some(path.clone()), line)
                    {
                        Ok(_) => patterns.push(line.to_string()),
                        Err(err) => warn!(%err, line, "skipping invalid .gitignore pattern"),
                    }
                }
            }
        }

        for line in overrides
        {
            if !accept_line(line)
            {
                continue;
            }
            builder
                .add_line(None, line)
                .map_err(|source| ScanError::InvalidPattern {
                    pattern: line.clone(),
                    source,
                })?;
            patterns.push(line.clone());
        }

        let matcher = builder
            .build()
            .map_err(|source| ScanError::InvalidPattern {
                pattern: "<combined ruleset>".to_string(),
                source,
            })?;

        debug!(root = %root.display(), count = patterns.len(), "compiled ignore ruleset");

        Ok(Self {
            root: root.to_path_buf(),
            matcher,
            patterns,
            tracked,
        })
    }

    /// True if `path` (absolute under the root, or root-relative) is
    /// excluded by any pattern, including via an ignored parent dir.
    /// Paths outside the root are never ignored.
    pub fn is_ignored(
        &self,
        path: &Path,
        is_dir: bool,
    ) -> bool
    {
        let rel = if path.is_absolute()
        {
            match path.strip_prefix(&self.root)
            {
                Ok(r) => r,
                Err(_) => return false,
            }
        }
        else
        {
            path
        };

        if rel
            .as_os_str()
            .is_empty()
        {
            return false;
        }

        self.matcher
            .matched_path_or_any_parents(rel, is_dir)
            .is_ignore()
    }

    /// True if a file passes the allow-list.
    pub fn is_tracked(
        &self,
        path: &Path,
    ) -> bool
    {
        self.tracked
            .contains(path)
    }

    pub fn root(&self) -> &Path
    {
        &self.root
    }

    pub fn patterns(&self) -> &[String]
    {
        &self.patterns
    }
}

/// Blank lines and comments are no-ops; negations are unsupported
/// under union semantics.
fn accept_line(line: &str) -> bool
{
    let t = line.trim();
    if t.is_empty() || t.starts_with('#')
    {
        return false;
    }
    if t.starts_with('!')
    {
        debug!(line, "dropping negated ignore pattern");
        return false;
    }
    true
}

#[cfg(test)]
mod tests
{
    use tempfile::TempDir;

    use super::*;

    fn py_only() -> TrackedSet
    {
        TrackedSet::from_entries(&[".py", "Dockerfile"])
    }

    #[test]
    fn allow_list_matches_extension_and_basename()
    {
        let t = TrackedSet::from_entries(&[".py", ".gitignore", "Dockerfile"]);
        assert!(t.contains(Path::new("a/b.py")));
        assert!(t.contains(Path::new("a/B.PY")));
        assert!(t.contains(Path::new(".gitignore")));
        assert!(t.contains(Path::new("ops/Dockerfile")));
        assert!(!t.contains(Path::new("notes.txt")));
    }

    #[test]
    fn directory_only_pattern_spares_same_named_file() -> anyhow::Result<()>
    {
        let tmp = TempDir::new()?;
        let rules = IgnoreRuleset::build(tmp.path(), py_only(), &["cache/".to_string()], false)?;

        assert!(rules.is_ignored(Path::new("cache"), true));
        assert!(!rules.is_ignored(Path::new("cache"), false));
        assert!(rules.is_ignored(Path::new("cache/x.py"), false));
        Ok(())
    }

    #[test]
    fn union_semantics_ignore_negations() -> anyhow::Result<()>
    {
        let tmp = TempDir::new()?;
        fs::write(tmp.path().join(".gitignore"), "*.log\n!keep.log\n# comment\n")?;
        let rules = IgnoreRuleset::build(tmp.path(), py_only(), &[], true)?;

        assert!(rules.is_ignored(Path::new("keep.log"), false));
        assert!(rules.is_ignored(Path::new("other.log"), false));
        assert!(
            !rules
                .patterns()
                .iter()
                .any(|p| p.starts_with('!'))
        );
        Ok(())
    }

    #[test]
    fn defaults_and_artifact_dir_are_always_ignored() -> anyhow::Result<()>
    {
        let tmp = TempDir::new()?;
        let rules = IgnoreRuleset::build(tmp.path(), py_only(), &[], false)?;

        assert!(rules.is_ignored(Path::new(".codigest"), true));
        assert!(rules.is_ignored(Path::new("node_modules"), true));
        assert!(rules.is_ignored(Path::new("pkg/__pycache__/m.pyc"), false));
        assert!(!rules.is_ignored(Path::new("src/main.py"), false));
        Ok(())
    }

    #[test]
    fn absolute_paths_outside_root_are_not_ignored() -> anyhow::Result<()>
    {
        let tmp = TempDir::new()?;
        let other = TempDir::new()?;
        let rules = IgnoreRuleset::build(tmp.path(), py_only(), &["*.py".to_string()], false)?;

        assert!(rules.is_ignored(&tmp.path().join("a.py"), false));
        assert!(!rules.is_ignored(&other.path().join("a.py"), false));
        Ok(())
    }

    #[test]
    fn invalid_override_is_reported() -> anyhow::Result<()>
    {
        let tmp = TempDir::new()?;
        let err = IgnoreRuleset::build(tmp.path(), py_only(), &["a[".to_string()], false)
            .expect_err("unclosed class must fail");
        assert!(matches!(err, ScanError::InvalidPattern { .. }));
        Ok(())
    }
}
