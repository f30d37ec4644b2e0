//! Filepath: src/core/symbols.rs
//! Symbol model shared by the parsers and the semantic differ,
//! plus the extension-based grammar capability check.
use std::{fmt, path::Path};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::parsers::PythonExtractor;

/// A function or class extracted from one version of a file
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Symbol
{
    /// Normalized symbol kind
    pub kind: SymbolKind,

    /// Dotted qualified name (`Outer.method`)
    pub name: String,

    /// Parameter list (functions) or base list (classes)
    pub signature: String,

    /// Hash of the body tokens
    pub fingerprint: u64,

    /// 1-based line of the definition
    pub start_line: usize,
}

/// Symbol kinds tracked by the differ
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SymbolKind
{
    Function,
    Class,
}

impl fmt::Display for SymbolKind
{
    fn fmt(
        &self,
        f: &mut fmt::Formatter<'_>,
    ) -> fmt::Result
    {
        match self
        {
            SymbolKind::Function => write!(f, "function"),
            SymbolKind::Class => write!(f, "class"),
        }
    }
}

/// A static module reference (`import a.b` => level 0,
/// `from .. import x` => level 2)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImportRef
{
    /// Dotted module path; empty segments never appear
    pub module: String,

    /// Leading-dot count; 0 for absolute references
    pub level: usize,
}

/// Language grammar capable of producing a symbol table
pub trait SymbolExtractor: Send + Sync
{
    /// Language label
    fn lang(&self) -> &'static str;

    /// Symbols in first-appearance order; Err on parse failure
    fn symbol_table(
        &self,
        content: &str,
    ) -> Result<Vec<Symbol>>;
}

/// Extensions with a symbol grammar
const GRAMMAR_EXTENSIONS: &[&str] = &["py", "pyi"];

/// True if `path` has a symbol-extraction grammar
pub fn has_grammar(path: &Path) -> bool
{
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| {
            GRAMMAR_EXTENSIONS.contains(
                &e.to_ascii_lowercase()
                    .as_str(),
            )
        })
}

/// Grammar for `path`, or None when the file is not eligible
pub fn get_extractor(path: &Path) -> Option<Box<dyn SymbolExtractor>>
{
    if !has_grammar(path)
    {
        return None;
    }

    match PythonExtractor::new()
    {
        Ok(ex) => Some(Box::new(ex)),
        Err(err) =>
        {
            warn!(%err, "python grammar unavailable");
            None
        }
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn only_python_files_have_a_grammar()
    {
        assert!(has_grammar(Path::new("a/b.py")));
        assert!(has_grammar(Path::new("stubs/x.PYI")));
        assert!(!has_grammar(Path::new("README.md")));
        assert!(!has_grammar(Path::new("Dockerfile")));

        assert!(get_extractor(Path::new("m.py")).is_some());
        assert!(get_extractor(Path::new("m.ts")).is_none());
    }
}
