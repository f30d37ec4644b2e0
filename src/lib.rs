//! **codigest** - Incremental source-tree tracker for LLM context workflows
//!
//! Ignore-aware discovery, local-import expansion, a content-addressed
//! baseline with scope-aware diffs, and tree-sitter symbol-level diffs.

/// Command-line interface with clap integration
pub mod cli;

/// Shell completion generation
pub mod completion;

/// Engines and command runners
pub mod core {
    /// Project root detection and the discovery façade
    pub mod project;
    pub use project::ProjectContext;

    /// Import-driven fixpoint expansion of a file set
    pub mod resolve;
    pub use resolve::{DependencyResolver, resolve_dependencies};

    /// Content-addressed baseline store with scope-aware diffs
    pub mod anchor;
    pub use anchor::{ChangeRecord, ChangeStatus, CommitOutcome, ContextAnchor};

    /// Symbol model and grammar capability check
    pub mod symbols;
    pub use symbols::{Symbol, SymbolKind};

    /// Symbol-level change classification
    pub mod semdiff;
    pub use semdiff::{ChangeKind, SemanticDiffer, SymbolChange, run as semdiff_run};

    /// Baseline commit with pre-scan delta
    pub mod scan;
    pub use scan::run as scan_run;

    /// Text diff against the last scan
    pub mod diff;
    pub use diff::run as diff_run;

    /// Scan Result tree view with line counts
    pub mod tree;
    pub use tree::run as tree_run;
}

/// Language processing - tree-sitter grammars
pub mod parsers {
    /// Python symbols, signatures, fingerprints and imports
    pub mod python_parser;
    pub use python_parser::PythonExtractor;

    // Re-export common extractor interface
    pub use crate::core::symbols::{SymbolExtractor, get_extractor};
}

/// Infrastructure - configuration, I/O, paths and walking
pub mod infra {
    /// `.codigest/config.toml` + env layering, compiled-in defaults
    pub mod config;
    pub use config::{Config, init as config_init, load_config};

    /// Memory-mapped file I/O for large files (>1MB threshold)
    pub mod io;
    pub use io::{FileContent, read_file_smart};

    /// Root-relative path records
    pub mod paths;
    pub use paths::PathRecord;

    /// Union-semantics ignore rules and the tracked allow-list
    pub mod ruleset;
    pub use ruleset::{IgnoreRuleset, TrackedSet};

    /// Deterministic, capped discovery
    pub mod walk;
    pub use walk::{FileDiscoverer, ScanError, ScanOptions, discover};
}

// Strategic re-exports for clean CLI interface
pub use cli::{AppContext, Cli, Commands};
pub use core::{diff_run, scan_run, semdiff_run, tree_run};
pub use infra::{Config, FileDiscoverer, PathRecord, load_config};
pub use parsers::{PythonExtractor, SymbolExtractor};

// Core types for external consumers
pub use core::semdiff::compare;
pub use core::symbols::{Symbol, SymbolKind};
