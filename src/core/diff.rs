//! `cdg diff`: unified text diff of the live selection against the last scan.

use std::fs;

use anyhow::{Context, Result, bail};
use owo_colors::OwoColorize;

use crate::{
    cli::{AppContext, DiffArgs},
    core::project::ProjectContext,
};

pub const CHANGES_FILE: &str = "changes.diff";

pub fn run(args: DiffArgs, ctx: &AppContext) -> Result<()> {
    let project = ProjectContext::discover(&args.path)?;
    let anchor = project.anchor();

    if !anchor.has_history() {
        bail!("No scan history found. Run `cdg scan` first.");
    }

    let since = anchor.last_update_label();
    let files = project.target_files(&[], false, args.resolve)?;
    let diff = anchor.diff(&files);

    if diff.is_empty() {
        if !ctx.quiet {
            println!("No changes since {since}.");
        }
        return Ok(());
    }

    if args.save {
        let out = project.artifact_dir().join(CHANGES_FILE);
        fs::write(&out, &diff).with_context(|| format!("Failed to write {}", out.display()))?;
        if !ctx.quiet {
            eprintln!("Saved to {}", out.display());
        }
    }

    if ctx.no_color {
        print!("{diff}");
    } else {
        for line in diff.lines() {
            println!("{}", colorize(line));
        }
    }
    Ok(())
}

fn colorize(line: &str) -> String {
    if line.starts_with("+++") || line.starts_with("---") || line.starts_with("diff --git") {
        line.bold().to_string()
    } else if line.starts_with('+') {
        line.green().to_string()
    } else if line.starts_with('-') {
        line.red().to_string()
    } else if line.starts_with("@@") {
        line.cyan().to_string()
    } else {
        line.to_string()
    }
}
