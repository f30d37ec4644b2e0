//! `cdg scan`: discover, record the pre-scan delta, commit the new baseline.

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use owo_colors::OwoColorize;
use serde::Serialize;
use tracing::info;

use crate::{
    cli::{AppContext, ScanArgs},
    core::{
        anchor::{CommitOutcome, ContextAnchor},
        project::ProjectContext,
    },
    infra::paths::PathRecord,
};

/// Pre-scan diff file inside the artifact dir.
pub const PREVIOUS_CHANGES_FILE: &str = "previous_changes.diff";

/// Rough bytes-per-token ratio for the plan estimate.
const BYTES_PER_TOKEN: u64 = 4;

/// What one scan did.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub files: usize,
    pub bytes: u64,
    pub estimated_tokens: u64,
    /// Size of the diff saved before committing; 0 when nothing changed
    pub previous_changes: usize,
    #[serde(skip)]
    pub outcome: Option<CommitOutcome>,
}

/// Diff against the old baseline (saved if non-empty), then commit.
pub fn scan(project: &ProjectContext, files: &[PathRecord]) -> Result<ScanSummary> {
    let anchor: ContextAnchor = project.anchor();

    let mut previous_changes = 0;
    if anchor.has_history() {
        let diff = anchor.diff(files);
        if !diff.is_empty() {
            let out = project.artifact_dir().join(PREVIOUS_CHANGES_FILE);
            fs::write(&out, &diff).with_context(|| format!("Failed to write {}", out.display()))?;
            previous_changes = diff.len();
        }
    }

    let outcome = anchor.commit(files);
    let bytes: u64 = files
        .iter()
        .filter_map(|f| fs::metadata(&f.abs).ok())
        .map(|m| m.len())
        .sum();

    info!(files = files.len(), bytes, ?outcome, "scan finished");
    Ok(ScanSummary {
        files: files.len(),
        bytes,
        estimated_tokens: bytes / BYTES_PER_TOKEN,
        previous_changes,
        outcome: Some(outcome),
    })
}

pub fn run(args: ScanArgs, ctx: &AppContext) -> Result<()> {
    let start = args
        .targets
        .first()
        .map(|p| p.as_path())
        .unwrap_or(Path::new("."));
    let project = ProjectContext::discover(start)?;

    let spinner = if ctx.quiet {
        ProgressBar::hidden()
    } else {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.enable_steady_tick(Duration::from_millis(100));
        pb
    };

    spinner.set_message("Discovering files...");
    let files = project.target_files(
        &args.targets,
        args.selection.all,
        args.selection.resolve,
    )?;

    spinner.set_message("Updating baseline...");
    let summary = scan(&project, &files)?;
    spinner.finish_and_clear();

    if !ctx.quiet {
        print_summary(&summary, project.root(), ctx);
    }
    Ok(())
}

fn print_summary(s: &ScanSummary, root: &Path, ctx: &AppContext) {
    let title = format!("Scanned {}", root.display());
    if ctx.no_color {
        println!("{title}");
    } else {
        println!("{}", title.bold());
    }
    println!("  Files:   {}", s.files);
    println!("  Size:    {} bytes", s.bytes);
    println!("  Tokens:  ~{}", s.estimated_tokens);

    match &s.outcome {
        Some(CommitOutcome::Created(id)) => println!("  Baseline: committed {id}"),
        Some(CommitOutcome::Unchanged) => println!("  Baseline: unchanged"),
        Some(CommitOutcome::Skipped) | None => println!("  Baseline: not updated (see log)"),
    }
    if s.previous_changes > 0 {
        println!("  Previous changes saved to .codigest/{PREVIOUS_CHANGES_FILE}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::config::{ARTIFACT_DIR_NAME, Config};
    use crate::infra::paths::canonical;
    use tempfile::TempDir;

    #[test]
    fn second_scan_saves_the_delta() -> Result<()> {
        let tmp = TempDir::new()?;
        let root = canonical(tmp.path());
        fs::write(root.join("a.py"), "x = 1\n")?;

        let project = ProjectContext::with_config(&root, Config::default());
        let files = project.target_files(&[], false, false)?;

        let first = scan(&project, &files)?;
        assert_eq!(first.files, 1);
        assert_eq!(first.bytes, 6);
        assert_eq!(first.estimated_tokens, 1);
        assert_eq!(first.previous_changes, 0);
        assert!(matches!(first.outcome, Some(CommitOutcome::Created(_))));

        fs::write(root.join("a.py"), "x = 2\n")?;
        let second = scan(&project, &files)?;
        assert!(second.previous_changes > 0);
        let saved = fs::read_to_string(root.join(ARTIFACT_DIR_NAME).join(PREVIOUS_CHANGES_FILE))?;
        assert!(saved.contains("+x = 2"));

        let third = scan(&project, &files)?;
        assert_eq!(third.outcome, Some(CommitOutcome::Unchanged));
        Ok(())
    }
}
