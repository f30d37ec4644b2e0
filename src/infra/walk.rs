//! Filepath: src/infra/walk.rs
//! Ignore-aware file discovery producing the Scan Result.
//! - Rules come from one `IgnoreRuleset` per root (defaults,
//!   workspace `.gitignore`, caller overrides)
//! - Directories are pruned early (filter_entry); files must be
//!   allow-listed and not ignored
//! - Children are visited in name order and the final list is
//!   sorted by relative key, so repeated scans are byte-identical
//! - A hard cap aborts the walk as soon as it is exceeded
//!
//! Backed by ripgrep's `ignore` crate with its standard filters
//! disabled: the ruleset is the single source of exclusions.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use ignore::{DirEntry, WalkBuilder};
use miette::Diagnostic;
use tracing::{debug, instrument, warn};

use crate::infra::{
    config::DEFAULT_MAX_FILES,
    paths::{PathRecord, canonical},
    ruleset::{IgnoreRuleset, TrackedSet},
};

/// Fatal discovery failures. Unreadable subtrees are not errors.
#[derive(Debug, Diagnostic, thiserror::Error)]
pub enum ScanError
{
    /// Root is missing or not a directory
    #[error("scan root not found or not a directory: {0}")]
    NotFound(PathBuf),

    /// Safety valve tripped; the threshold is carried for the caller
    #[error("too many files (> {limit}); is an ignore configuration missing?")]
    #[diagnostic(help(
        "add patterns to .gitignore or [filter].exclude_patterns in .codigest/config.toml, or pass narrower targets"
    ))]
    ScanLimitExceeded
    {
        limit: usize,
    },

    /// A caller-supplied pattern failed to compile
    #[error("invalid ignore pattern `{pattern}`: {source}")]
    InvalidPattern
    {
        pattern: String,
        #[source]
        source: ignore::Error,
    },
}

/// Inputs for one discovery pass.
#[derive(Debug, Clone)]
pub struct ScanOptions
{
    /// Allow-listed extensions/basenames
    pub tracked: TrackedSet,

    /// Extra gitignore-style patterns (config + CLI)
    pub extra_ignores: Vec<String>,

    /// Read `<root>/.gitignore`
    pub use_workspace_ignore: bool,

    /// Abort when more files than this are accepted
    pub max_files: usize,

    /// Optional sub-paths; only files under one of them survive
    pub scope: Vec<PathBuf>,
}

impl Default for ScanOptions
{
    fn default() -> Self
    {
        Self {
            tracked: crate::infra::config::default_tracked_set(),
            extra_ignores: Vec::new(),
            use_workspace_ignore: true,
            max_files: DEFAULT_MAX_FILES,
            scope: Vec::new(),
        }
    }
}

/// Walker bound to one root and one immutable ruleset.
pub struct FileDiscoverer
{
    /// Canonical scan root
    root: PathBuf,

    /// Shared with the walker's entry filter
    ruleset: Arc<IgnoreRuleset>,

    /// Cap on accepted files
    max_files: usize,

    /// Canonical scope prefixes (empty = whole root)
    scope: Vec<PathBuf>,
}

impl FileDiscoverer
{
    /// Validate `root` and compile its ruleset.
    pub fn new(
        root: &Path,
        options: &ScanOptions,
    ) -> Result<Self, ScanError>
    {
        if !root.is_dir()
        {
            return Err(ScanError::NotFound(root.to_path_buf()));
        }

        let root = canonical(root);
        let ruleset = IgnoreRuleset::build(
            &root,
            options
                .tracked
                .clone(),
            &options.extra_ignores,
            options.use_workspace_ignore,
        )?;

        Ok(Self::from_ruleset(ruleset)
            .with_max_files(options.max_files)
            .with_scope(&options.scope))
    }

    /// Wrap a prebuilt ruleset; the root is taken from it.
    pub fn from_ruleset(ruleset: IgnoreRuleset) -> Self
    {
        Self {
            root: ruleset
                .root()
                .to_path_buf(),
            ruleset: Arc::new(ruleset),
            max_files: DEFAULT_MAX_FILES,
            scope: Vec::new(),
        }
    }

    /// (Optional) Override the file-count cap.
    pub fn with_max_files(
        mut self,
        max_files: usize,
    ) -> Self
    {
        self.max_files = max_files;
        self
    }

    /// (Optional) Restrict results to files under these paths.
    /// Relative paths are taken relative to the root.
    pub fn with_scope(
        mut self,
        scope: &[PathBuf],
    ) -> Self
    {
        self.scope = scope
            .iter()
            .map(|p| {
                if p.is_absolute()
                {
                    canonical(p)
                }
                else
                {
                    canonical(&self.root.join(p))
                }
            })
            .collect();

        for p in &self.scope
        {
            if !p.starts_with(&self.root)
            {
                warn!(path = %p.display(), root = %self.root.display(), "scope is outside detected root");
            }
        }
        self
    }

    /// Internal: configure the walker for the root.
    fn build_walk(&self) -> WalkBuilder
    {
        let mut b = WalkBuilder::new(&self.root);

        // The ruleset replaces .gitignore/.ignore/hidden handling.
        b.standard_filters(false);
        b.hidden(false);
        b.follow_links(false);
        b.sort_by_file_name(|a, b| a.cmp(b));

        let rules = Arc::clone(&self.ruleset);
        b.filter_entry(move |ent: &DirEntry| {
            if ent.depth() == 0
            {
                return true;
            }
            let is_dir = ent
                .file_type()
                .is_some_and(|ft| ft.is_dir());

            !rules.is_ignored(ent.path(), is_dir)
        });

        b
    }

    /// Walk the root and return the ordered Scan Result.
    #[instrument(skip(self), fields(root = %self.root.display(), max = self.max_files))]
    pub fn discover(&self) -> Result<Vec<PathRecord>, ScanError>
    {
        let mut out: Vec<PathRecord> = Vec::new();

        for res in self
            .build_walk()
            .build()
        {
            let entry = match res
            {
                Ok(e) => e,
                Err(err) =>
                {
                    // Unreadable subtree: skip it, keep scanning.
                    warn!(%err, "skipping unreadable entry");
                    continue;
                }
            };

            let is_file = entry
                .file_type()
                .is_some_and(|ft| ft.is_file());

            if !is_file
                || !self
                    .ruleset
                    .is_tracked(entry.path())
            {
                continue;
            }

            out.push(PathRecord::new(&self.root, entry.into_path()));

            if out.len() > self.max_files
            {
                return Err(ScanError::ScanLimitExceeded {
                    limit: self.max_files,
                });
            }
        }

        if !self
            .scope
            .is_empty()
        {
            out.retain(|rec| {
                self.scope
                    .iter()
                    .any(|s| {
                        rec.abs
                            .starts_with(s)
                    })
            });
        }

        out.sort();
        debug!(files = out.len(), "discovery finished");

        Ok(out)
    }
}

/// One-shot discovery: `FileDiscoverer::new(root, options)?.discover()`.
pub fn discover(
    root: &Path,
    options: &ScanOptions,
) -> Result<Vec<PathRecord>, ScanError>
{
    FileDiscoverer::new(root, options)?.discover()
}

#[cfg(test)]
mod tests
{
    use std::fs;

    use anyhow::Result;
    use tempfile::TempDir;

    use super::*;

    /// Create a file with parent dirs as needed
    fn write_file(
        root: &Path,
        rel: &str,
        contents: &str,
    ) -> Result<()>
    {
        let path = root.join(rel);
        if let Some(parent) = path.parent()
        {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, contents)?;
        Ok(())
    }

    fn rels(records: &[PathRecord]) -> Vec<&str>
    {
        records
            .iter()
            .map(|r| r.rel.as_str())
            .collect()
    }

    #[test]
    fn test_discovery_sorted_and_filtered() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let root = tmp.path();

        write_file(root, "src/b.py", "x = 1")?;
        write_file(root, "src/a/inner.py", "")?;
        write_file(root, "a.py", "")?;
        write_file(root, "image.png", "bin")?;
        write_file(root, "Dockerfile", "FROM scratch")?;

        let files = discover(root, &ScanOptions::default())?;
        assert_eq!(rels(&files), ["Dockerfile", "a.py", "src/a/inner.py", "src/b.py"]);
        Ok(())
    }

    #[test]
    fn test_repeat_scans_identical() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let root = tmp.path();
        for i in 0..20
        {
            write_file(root, &format!("pkg{}/m{}.py", i % 3, i), "pass")?;
        }

        let a = discover(root, &ScanOptions::default())?;
        let b = discover(root, &ScanOptions::default())?;
        assert_eq!(a, b);
        Ok(())
    }

    #[test]
    fn test_cap_fails_fast() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let root = tmp.path();
        write_file(root, "a.py", "")?;
        write_file(root, "b.py", "")?;
        write_file(root, "c.py", "")?;

        let opts = ScanOptions {
            max_files: 2,
            ..ScanOptions::default()
        };
        match discover(root, &opts)
        {
            Err(ScanError::ScanLimitExceeded { limit }) => assert_eq!(limit, 2),
            other => panic!("expected ScanLimitExceeded, got {other:?}"),
        }
        Ok(())
    }

    #[test]
    fn test_missing_root_is_not_found() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let missing = tmp.path().join("nope");
        assert!(matches!(
            discover(&missing, &ScanOptions::default()),
            Err(ScanError::NotFound(_))
        ));
        Ok(())
    }

    #[test]
    fn test_gitignore_and_overrides_prune() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let root = tmp.path();

        write_file(root, ".gitignore", "generated/\n")?;
        write_file(root, "generated/out.py", "")?;
        write_file(root, "vendor/lib.py", "")?;
        write_file(root, "node_modules/pkg/index.js", "")?;
        write_file(root, ".codigest/anchor/a.py", "")?;
        write_file(root, "app.py", "")?;

        let opts = ScanOptions {
            extra_ignores: vec!["vendor/".to_string()],
            ..ScanOptions::default()
        };
        let files = discover(root, &opts)?;
        assert_eq!(rels(&files), [".gitignore", "app.py"]);
        Ok(())
    }

    #[test]
    fn test_scope_filters_post_discovery() -> Result<()>
    {
        let tmp = TempDir::new()?;
        let root = tmp.path();
        write_file(root, "src/a.py", "")?;
        write_file(root, "tests/t.py", "")?;

        let opts = ScanOptions {
            scope: vec![PathBuf::from("src")],
            ..ScanOptions::default()
        };
        let files = discover(root, &opts)?;
        assert_eq!(rels(&files), ["src/a.py"]);
        Ok(())
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_subtree_is_skipped() -> Result<()>
    {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new()?;
        let root = tmp.path();
        write_file(root, "ok.py", "")?;
        write_file(root, "locked/secret.py", "")?;
        let locked = root.join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000))?;

        let result = discover(root, &ScanOptions::default());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755))?;

        let files = result?;
        assert!(
            files
                .iter()
                .any(|r| r.rel == "ok.py")
        );
        Ok(())
    }
}
