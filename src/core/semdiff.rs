//! Symbol-level change detection.
//!
//! Both versions of a file are parsed into symbol tables keyed by
//! (kind, qualified name). A name only in the new table is ADDED,
//! only in the old table REMOVED. Shared names compare signatures
//! first (MODIFIED) and body fingerprints second (LOGIC_CHANGED), so
//! one symbol yields at most one record. A side that fails to parse
//! is an empty table.

use std::{fmt, fs, path::Path};

use anyhow::{Context, Result, bail};
use indexmap::IndexMap;
use owo_colors::OwoColorize;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::{
    cli::{AppContext, SemdiffArgs},
    core::{
        anchor::ContextAnchor,
        project::ProjectContext,
        symbols::{Symbol, SymbolExtractor, SymbolKind, get_extractor},
    },
    infra::{io::read_text_or_empty, paths::PathRecord},
    parsers::PythonExtractor,
};

/// Classification of one symbol-level change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeKind {
    Added,
    Removed,
    /// Signature changed (takes precedence over body changes)
    Modified,
    /// Body changed, signature stable
    LogicChanged,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChangeKind::Added => "ADDED",
            ChangeKind::Removed => "REMOVED",
            ChangeKind::Modified => "MODIFIED",
            ChangeKind::LogicChanged => "LOGIC_CHANGED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SymbolChange {
    pub kind: ChangeKind,
    /// New version for ADDED/MODIFIED/LOGIC_CHANGED, old for REMOVED
    pub symbol: Symbol,
    pub detail: Option<String>,
}

impl fmt::Display for SymbolChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}{}",
            self.kind, self.symbol.kind, self.symbol.name, self.symbol.signature
        )?;
        if let Some(d) = &self.detail {
            write!(f, " :: {d}")?;
        }
        Ok(())
    }
}

/// Comparator bound to one grammar.
pub struct SemanticDiffer {
    extractor: Box<dyn SymbolExtractor>,
}

impl SemanticDiffer {
    pub fn new(extractor: Box<dyn SymbolExtractor>) -> Self {
        Self { extractor }
    }

    pub fn python() -> Result<Self> {
        Ok(Self::new(Box::new(PythonExtractor::new()?)))
    }

    /// None when `path` has no symbol grammar.
    pub fn for_path(path: &Path) -> Option<Self> {
        get_extractor(path).map(Self::new)
    }

    /// Symbol table keyed by identity; parse failures give an empty table.
    fn table(&self, text: &str) -> IndexMap<(SymbolKind, String), Symbol> {
        let symbols = match self.extractor.symbol_table(text) {
            Ok(s) => s,
            Err(err) => {
                debug!(%err, lang = self.extractor.lang(), "treating unparsable side as empty");
                Vec::new()
            }
        };

        let mut table = IndexMap::with_capacity(symbols.len());
        for sym in symbols {
            // A redefinition keeps the first position and the last body.
            table.insert((sym.kind, sym.name.clone()), sym);
        }
        table
    }

    pub fn compare(&self, old_text: &str, new_text: &str) -> Vec<SymbolChange> {
        let old = self.table(old_text);
        let new = self.table(new_text);
        let mut out = Vec::new();

        for (key, sym) in &new {
            match old.get(key) {
                None => out.push(SymbolChange {
                    kind: ChangeKind::Added,
                    symbol: sym.clone(),
                    detail: None,
                }),
                Some(prev) if prev.signature != sym.signature => out.push(SymbolChange {
                    kind: ChangeKind::Modified,
                    symbol: sym.clone(),
                    detail: Some(format!("{} -> {}", display_sig(&prev.signature), display_sig(&sym.signature))),
                }),
                Some(prev) if prev.fingerprint != sym.fingerprint => out.push(SymbolChange {
                    kind: ChangeKind::LogicChanged,
                    symbol: sym.clone(),
                    detail: None,
                }),
                Some(_) => {}
            }
        }

        for (key, sym) in &old {
            if !new.contains_key(key) {
                out.push(SymbolChange {
                    kind: ChangeKind::Removed,
                    symbol: sym.clone(),
                    detail: None,
                });
            }
        }

        out
    }
}

/// Class signatures may be empty; show them as `()`.
fn display_sig(sig: &str) -> &str {
    if sig.is_empty() { "()" } else { sig }
}

/// Compare two Python texts.
pub fn compare(old_text: &str, new_text: &str) -> Vec<SymbolChange> {
    match SemanticDiffer::python() {
        Ok(differ) => differ.compare(old_text, new_text),
        Err(err) => {
            warn!(%err, "python grammar unavailable; no semantic diff");
            Vec::new()
        }
    }
}

/// Whole-file state relative to the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Modified,
    New,
    Deleted,
}

/// Symbol changes for one file.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub path: String,
    pub status: FileStatus,
    pub changes: Vec<SymbolChange>,
}

impl fmt::Display for FileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self.status {
            FileStatus::Modified => "",
            FileStatus::New => " (NEW)",
            FileStatus::Deleted => " (DELETED)",
        };
        writeln!(f, "{}{}", self.path, tag)?;
        for change in &self.changes {
            writeln!(f, "  {change}")?;
        }
        Ok(())
    }
}

/// Semantic reports for every grammar-eligible file whose text changed
/// since the last commit. Results follow path order.
#[instrument(skip_all, fields(files = files.len()))]
pub fn analyze(anchor: &ContextAnchor, files: &[PathRecord]) -> Result<Vec<FileReport>> {
    let changed: Vec<PathRecord> = anchor
        .changed_files(files)?
        .into_iter()
        .filter(|rec| !rec.external)
        .collect();

    let reports: Vec<Option<FileReport>> = changed
        .par_iter()
        .map(|rec| {
            let differ = SemanticDiffer::for_path(&rec.abs)?;
            let new_text = read_text_or_empty(&rec.abs);
            let old_text = anchor.read_committed(&rec.rel);

            let changes = differ.compare(&old_text, &new_text);
            if changes.is_empty() {
                return None;
            }

            let status = if new_text.is_empty() {
                FileStatus::Deleted
            } else if old_text.is_empty() {
                FileStatus::New
            } else {
                FileStatus::Modified
            };

            Some(FileReport {
                path: rec.rel.clone(),
                status,
                changes,
            })
        })
        .collect();

    Ok(reports.into_iter().flatten().collect())
}

pub fn run(args: SemdiffArgs, ctx: &AppContext) -> Result<()> {
    let project = ProjectContext::discover(&args.path)?;
    let anchor = project.anchor();

    if !anchor.has_history() {
        bail!("No scan history found. Run `cdg scan` first.");
    }

    let since = anchor.last_update_label();
    let files = project.target_files(&[], false, args.resolve)?;
    let reports = analyze(&anchor, &files)?;

    if reports.is_empty() {
        if !ctx.quiet {
            println!("No structural (AST) changes detected since {since}.");
        }
        return Ok(());
    }

    let body: String = reports.iter().map(|r| r.to_string()).collect();

    if args.save {
        let out = project.artifact_dir().join("semdiff.txt");
        fs::write(&out, &body).with_context(|| format!("Failed to write {}", out.display()))?;
        if !ctx.quiet {
            eprintln!("Saved to {}", out.display());
        }
    }

    if !ctx.quiet {
        let header = format!("Structural changes since {since}");
        if ctx.no_color {
            println!("{header}");
        } else {
            println!("{}", header.bold());
        }
    }
    print!("{body}");
    Ok(())
}
