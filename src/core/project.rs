//! Project root detection and the discovery façade used by every command.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, instrument};

use crate::{
    core::{anchor::ContextAnchor, resolve::resolve_dependencies},
    infra::{
        config::{ARTIFACT_DIR_NAME, Config, DEFAULT_MAX_FILES, default_tracked_set, load_config},
        paths::{PathRecord, canonical},
        walk::{FileDiscoverer, ScanOptions},
    },
};

/// A detected project root plus its loaded configuration.
#[derive(Debug, Clone)]
pub struct ProjectContext {
    root: PathBuf,
    config: Config,
}

impl ProjectContext {
    /// Walk up from `start` (or its parent, for a file) to the first
    /// directory holding `.codigest/` or `.git/`. Without a marker,
    /// `start` itself is the root.
    pub fn discover(start: &Path) -> Result<Self> {
        let root = find_root(start);
        let config = load_config(&root);
        debug!(root = %root.display(), "project root detected");
        Ok(Self { root, config })
    }

    /// Use `root` as-is with explicit configuration.
    pub fn with_config(root: &Path, config: Config) -> Self {
        Self {
            root: canonical(root),
            config,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn artifact_dir(&self) -> PathBuf {
        self.root.join(ARTIFACT_DIR_NAME)
    }

    pub fn anchor(&self) -> ContextAnchor {
        ContextAnchor::new(&self.root)
    }

    /// Discovery options; `ignore_config` keeps only the built-in
    /// filters and the workspace ignore file.
    pub fn scan_options(&self, scope: &[PathBuf], ignore_config: bool) -> ScanOptions {
        let filter = &self.config.filter;
        let (tracked, extra_ignores, max_files) = if ignore_config {
            (default_tracked_set(), Vec::new(), DEFAULT_MAX_FILES)
        } else {
            (filter.tracked_set(), filter.exclude_patterns.clone(), filter.max_files)
        };

        ScanOptions {
            tracked,
            extra_ignores,
            use_workspace_ignore: true,
            max_files,
            scope: scope.iter().map(|p| absolutize(p)).collect(),
        }
    }

    /// The Scan Result for this project, optionally narrowed to `scope`
    /// and expanded along import edges.
    #[instrument(skip(self, scope), fields(root = %self.root.display()))]
    pub fn target_files(
        &self,
        scope: &[PathBuf],
        ignore_config: bool,
        resolve_deps: bool,
    ) -> Result<Vec<PathRecord>> {
        let options = self.scan_options(scope, ignore_config);
        let files = FileDiscoverer::new(&self.root, &options)?.discover()?;

        if !resolve_deps {
            return Ok(files);
        }
        resolve_dependencies(&self.root, &files).context("Failed to expand imports")
    }
}

fn find_root(start: &Path) -> PathBuf {
    let start = absolutize(start);
    let base = if start.is_file() {
        start.parent().map(Path::to_path_buf).unwrap_or_else(|| start.clone())
    } else {
        start.clone()
    };

    base.ancestors()
        .find(|dir| dir.join(ARTIFACT_DIR_NAME).is_dir() || dir.join(".git").exists())
        .map(Path::to_path_buf)
        .unwrap_or(base)
}

/// Canonical form of `p`, resolved against the current directory.
fn absolutize(p: &Path) -> PathBuf {
    if p.is_absolute() {
        return canonical(p);
    }
    match std::env::current_dir() {
        Ok(cwd) => canonical(&cwd.join(p)),
        Err(_) => canonical(p),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    #[test]
    fn root_is_nearest_marked_ancestor() {
        let tmp = TempDir::new().unwrap();
        let root = canonical(tmp.path());
        fs::create_dir_all(root.join(".git")).unwrap();
        fs::create_dir_all(root.join("pkg/deep")).unwrap();
        fs::write(root.join("pkg/deep/m.py"), "").unwrap();

        let ctx = ProjectContext::discover(&root.join("pkg/deep/m.py")).unwrap();
        assert_eq!(ctx.root(), root);

        fs::create_dir_all(root.join("pkg/.codigest")).unwrap();
        let ctx = ProjectContext::discover(&root.join("pkg/deep")).unwrap();
        assert_eq!(ctx.root(), root.join("pkg"));
    }

    #[test]
    fn target_files_applies_config_and_resolution() {
        let tmp = TempDir::new().unwrap();
        let root = canonical(tmp.path());
        fs::create_dir_all(root.join(ARTIFACT_DIR_NAME)).unwrap();
        fs::write(
            root.join(ARTIFACT_DIR_NAME).join("config.toml"),
            "[filter]\nexclude_patterns = [\"lib/\"]\n",
        )
        .unwrap();
        fs::create_dir_all(root.join("app")).unwrap();
        fs::create_dir_all(root.join("lib")).unwrap();
        fs::write(root.join("app/main.py"), "import helper\n").unwrap();
        fs::write(root.join("lib/helper.py"), "").unwrap();
        fs::write(root.join("helper.py"), "").unwrap();

        let ctx = ProjectContext::discover(&root).unwrap();
        let rels = |v: Vec<PathRecord>| v.into_iter().map(|r| r.rel).collect::<Vec<_>>();

        assert_eq!(
            rels(ctx.target_files(&[], false, false).unwrap()),
            ["app/main.py", "helper.py"]
        );
        assert_eq!(
            rels(ctx.target_files(&[], true, false).unwrap()),
            ["app/main.py", "helper.py", "lib/helper.py"]
        );
        assert_eq!(
            rels(ctx.target_files(&[root.join("app")], false, true).unwrap()),
            ["app/main.py", "helper.py"]
        );
    }
}
