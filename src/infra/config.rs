use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::{
    cli::{AppContext, InitArgs},
    infra::ruleset::TrackedSet,
};

/// Per-project artifact directory (config, baseline, saved diffs).
pub const ARTIFACT_DIR_NAME: &str = ".codigest";

/// Default discovery cap.
pub const DEFAULT_MAX_FILES: usize = 10_000;

/// Patterns ignored in every scan, before `.gitignore` and overrides.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[
    ".git/",
    ".venv/",
    "venv/",
    "env/",
    "__pycache__/",
    "node_modules/",
    "dist/",
    "build/",
    "wheels/",
    ".idea/",
    ".vscode/",
    ".mypy_cache/",
    ".pytest_cache/",
    "*.pyc",
    "*.DS_Store",
    "*.egg-info",
];

/// Extensions (leading dot) and basenames tracked by default.
pub const DEFAULT_TRACKED: &[&str] = &[
    ".py",
    ".pyi",
    ".ts",
    ".tsx",
    ".js",
    ".jsx",
    ".json",
    ".css",
    ".scss",
    ".html",
    ".md",
    ".yaml",
    ".yml",
    ".toml",
    ".xml",
    ".gitignore",
    ".dockerignore",
    "Dockerfile",
    "pyproject.toml",
];

pub fn default_tracked_set() -> TrackedSet {
    TrackedSet::from_entries(DEFAULT_TRACKED)
}

/// `.codigest/config.toml`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Free-form project metadata
    pub project: ProjectConfig,

    /// Discovery filters
    pub filter: FilterConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub description: String,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            description: "Auto-generated context configuration".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    /// Allow-list; empty means the compiled-in default
    pub extensions: Vec<String>,

    /// Extra gitignore-style patterns
    pub exclude_patterns: Vec<String>,

    /// Discovery safety valve
    pub max_files: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            extensions: DEFAULT_TRACKED.iter().map(|s| s.to_string()).collect(),
            exclude_patterns: vec![
                "*.lock".to_string(),
                "dist/".to_string(),
                "build/".to_string(),
                "node_modules/".to_string(),
                "__pycache__/".to_string(),
            ],
            max_files: DEFAULT_MAX_FILES,
        }
    }
}

impl FilterConfig {
    /// Allow-list with the empty-list fallback applied.
    pub fn tracked_set(&self) -> TrackedSet {
        if self.extensions.is_empty() {
            default_tracked_set()
        } else {
            TrackedSet::from_entries(&self.extensions)
        }
    }
}

/// Path of the config file for a project root.
pub fn config_path(root: &Path) -> PathBuf {
    root.join(ARTIFACT_DIR_NAME).join("config.toml")
}

/// Load `<root>/.codigest/config.toml` layered with `CODIGEST_*` env vars.
/// A missing or malformed file yields defaults; the latter with a warning.
pub fn load_config(root: &Path) -> Config {
    match try_load_config(root) {
        Ok(cfg) => cfg,
        Err(err) => {
            warn!(error = %format!("{err:#}"), "ignoring configuration; using defaults");
            Config::default()
        }
    }
}

fn try_load_config(root: &Path) -> Result<Config> {
    let path = config_path(root);

    let cfg = config::Config::builder()
        .add_source(config::File::from(path.clone()).required(false))
        .add_source(
            config::Environment::with_prefix("CODIGEST")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    let parsed: Config = cfg
        .try_deserialize()
        .context("Failed to parse configuration")?;

    debug!(path = %path.display(), "loaded config");
    Ok(parsed)
}

pub fn init(args: InitArgs, ctx: &AppContext) -> Result<()> {
    let root = &args.path;
    let config_dir = root.join(ARTIFACT_DIR_NAME);
    let config_file = config_path(root);

    fs::create_dir_all(&config_dir)
        .with_context(|| format!("Failed to create {}", config_dir.display()))?;

    if config_file.exists() && !args.force {
        anyhow::bail!(
            "Config file already exists at {}. Use --force to overwrite.",
            config_file.display()
        );
    }

    let toml_string =
        toml::to_string_pretty(&Config::default()).context("Failed to serialize default config")?;
    fs::write(&config_file, format!("# Codigest Configuration File\n{toml_string}"))
        .context("Failed to write config file")?;

    let added = ensure_gitignore_entry(&root.join(".gitignore"))?;

    if !ctx.quiet {
        println!("Created config file at {}", config_file.display());
        if added {
            println!("Added {ARTIFACT_DIR_NAME}/ to .gitignore");
        }
    }
    Ok(())
}

/// Append `.codigest/` to a `.gitignore`, creating it if needed.
/// Returns false when the entry was already present.
pub fn ensure_gitignore_entry(path: &Path) -> Result<bool> {
    let entry = format!("{ARTIFACT_DIR_NAME}/");

    if !path.exists() {
        fs::write(path, format!("# Git Ignore\n{entry}\n"))
            .with_context(|| format!("Failed to create {}", path.display()))?;
        return Ok(true);
    }

    let text =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    if text.lines().any(|l| l.trim() == entry) {
        return Ok(false);
    }

    let mut f = OpenOptions::new()
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open {}", path.display()))?;
    writeln!(f, "\n{entry}")?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() -> Result<()> {
        let tmp = TempDir::new()?;
        let cfg = load_config(tmp.path());
        assert_eq!(cfg.filter.max_files, DEFAULT_MAX_FILES);
        assert!(cfg.filter.tracked_set().contains(Path::new("x.py")));
        Ok(())
    }

    #[test]
    fn partial_file_keeps_other_defaults() -> Result<()> {
        let tmp = TempDir::new()?;
        fs::create_dir_all(tmp.path().join(ARTIFACT_DIR_NAME))?;
        fs::write(
            config_path(tmp.path()),
            "[filter]\nextensions = [\".rs\"]\nmax_files = 5\n",
        )?;

        let cfg = load_config(tmp.path());
        assert_eq!(cfg.filter.max_files, 5);
        let tracked = cfg.filter.tracked_set();
        assert!(tracked.contains(Path::new("lib.rs")));
        assert!(!tracked.contains(Path::new("x.py")));
        assert!(!cfg.project.description.is_empty());
        Ok(())
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() -> Result<()> {
        let tmp = TempDir::new()?;
        fs::create_dir_all(tmp.path().join(ARTIFACT_DIR_NAME))?;
        fs::write(config_path(tmp.path()), "[filter\nmax_files = ")?;

        assert!(try_load_config(tmp.path()).is_err());
        let cfg = load_config(tmp.path());
        assert_eq!(cfg.filter.max_files, DEFAULT_MAX_FILES);
        assert!(cfg.filter.tracked_set().contains(Path::new("x.py")));
        Ok(())
    }

    #[test]
    fn gitignore_entry_added_once() -> Result<()> {
        let tmp = TempDir::new()?;
        let gi = tmp.path().join(".gitignore");
        fs::write(&gi, "target/\n")?;

        assert!(ensure_gitignore_entry(&gi)?);
        assert!(!ensure_gitignore_entry(&gi)?);

        let text = fs::read_to_string(&gi)?;
        assert_eq!(text.matches(".codigest/").count(), 1);
        assert!(text.starts_with("target/"));
        Ok(())
    }
}
