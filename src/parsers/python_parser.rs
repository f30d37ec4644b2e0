//! Filepath: src/parsers/python_parser.rs
//! ------------------------------------------------------------------
//! Python grammar built on Tree-sitter 0.25.x.
//! Two jobs:
//!   - Symbol tables for the semantic differ: module-level
//!     functions/classes plus class members, each with a
//!     signature and a body fingerprint.
//!   - Static import references for the dependency resolver.
//!
//! Notes:
//!   - A tree containing ERROR/MISSING nodes is a parse failure;
//!     callers decide how to degrade.
//!   - Functions nested in function bodies belong to that body.
//!   - Fingerprints hash leaf tokens (kind + text), skipping
//!     comments, so whitespace and comment edits are invisible.
//!   - Imports are collected anywhere in the tree, including
//!     inside functions and conditionals.
//! ------------------------------------------------------------------

use anyhow::{Context, Result, anyhow, bail};
use tree_sitter::{Language, Node, Parser, Query, QueryCursor, StreamingIterator, Tree};
use xxhash_rust::xxh64::Xxh64;

use crate::core::symbols::{ImportRef, Symbol, SymbolExtractor, SymbolKind};

/// Python symbol and import extractor.
pub struct PythonExtractor {
    /// Python language handle for Tree-sitter.
    language: Language,
    /// Captures every import statement in the tree.
    import_query: Query,
}

impl PythonExtractor {
    pub fn new() -> Result<Self> {
        let language = tree_sitter_python::LANGUAGE.into();

        let query_src = r#"
            (import_statement) @import
            (import_from_statement) @import
        "#;
        let import_query = Query::new(&language, query_src).context("create Python import query")?;

        Ok(Self {
            language,
            import_query,
        })
    }

    /// Parse and reject trees with syntax errors.
    fn parse(&self, content: &str) -> Result<Tree> {
        let mut parser = Parser::new();
        parser
            .set_language(&self.language)
            .context("set Python language")?;

        let tree = parser
            .parse(content, None)
            .ok_or_else(|| anyhow!("Failed to parse Python source"))?;

        if tree.root_node().has_error() {
            bail!("Python source contains syntax errors");
        }
        Ok(tree)
    }

    /// Static import references, in source order.
    pub fn imports(&self, content: &str) -> Result<Vec<ImportRef>> {
        let tree = self.parse(content)?;
        let bytes = content.as_bytes();

        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&self.import_query, tree.root_node(), bytes);

        let mut out = Vec::new();
        while let Some(m) = matches.next() {
            for cap in m.captures {
                let node = cap.node;
                match node.kind() {
                    "import_statement" => collect_plain_import(node, bytes, &mut out),
                    "import_from_statement" => collect_from_import(node, bytes, &mut out),
                    _ => {}
                }
            }
        }
        Ok(out)
    }
}

impl SymbolExtractor for PythonExtractor {
    fn lang(&self) -> &'static str {
        "python"
    }

    fn symbol_table(&self, content: &str) -> Result<Vec<Symbol>> {
        let tree = self.parse(content)?;
        let mut out = Vec::with_capacity(16);
        collect_scope(tree.root_node(), None, content.as_bytes(), &mut out);
        Ok(out)
    }
}

/// Walk the direct statements of a module or class body.
fn collect_scope(scope: Node, prefix: Option<&str>, bytes: &[u8], out: &mut Vec<Symbol>) {
    for stmt in named_children(scope) {
        let Some((def, decorators)) = definition_of(stmt) else {
            continue;
        };
        let Some(name) = def
            .child_by_field_name("name")
            .and_then(|n| n.utf8_text(bytes).ok())
        else {
            continue;
        };

        let qualified = match prefix {
            Some(p) => format!("{p}.{name}"),
            None => name.to_string(),
        };

        let mut hasher = Xxh64::new(0);
        if let Some(d) = decorators {
            for dec in named_children(d).filter(|n| n.kind() == "decorator") {
                feed_tokens(dec, bytes, &mut hasher);
            }
        }

        match def.kind() {
            "function_definition" => {
                if let Some(body) = def.child_by_field_name("body") {
                    feed_tokens(body, bytes, &mut hasher);
                }
                out.push(Symbol {
                    kind: SymbolKind::Function,
                    name: qualified,
                    signature: function_signature(def, bytes),
                    fingerprint: hasher.digest(),
                    start_line: def.start_position().row + 1,
                });
            }
            "class_definition" => {
                let body = def.child_by_field_name("body");
                if let Some(body) = body {
                    // Members are their own symbols; hash everything else.
                    for member in named_children(body) {
                        if definition_of(member).is_none() {
                            feed_tokens(member, bytes, &mut hasher);
                        }
                    }
                }
                let signature = def
                    .child_by_field_name("superclasses")
                    .and_then(|n| n.utf8_text(bytes).ok())
                    .map(collapse_ws)
                    .unwrap_or_default();

                out.push(Symbol {
                    kind: SymbolKind::Class,
                    name: qualified.clone(),
                    signature,
                    fingerprint: hasher.digest(),
                    start_line: def.start_position().row + 1,
                });

                if let Some(body) = body {
                    collect_scope(body, Some(&qualified), bytes, out);
                }
            }
            _ => {}
        }
    }
}

/// Unwrap `decorated_definition`; returns (definition, decorated wrapper).
fn definition_of(node: Node) -> Option<(Node, Option<Node>)> {
    match node.kind() {
        "function_definition" | "class_definition" => Some((node, None)),
        "decorated_definition" => {
            let def = node.child_by_field_name("definition")?;
            matches!(def.kind(), "function_definition" | "class_definition")
                .then_some((def, Some(node)))
        }
        _ => None,
    }
}

/// `(params)` plus ` -> ret` when annotated.
fn function_signature(def: Node, bytes: &[u8]) -> String {
    let params = def
        .child_by_field_name("parameters")
        .and_then(|n| n.utf8_text(bytes).ok())
        .map(collapse_ws)
        .unwrap_or_else(|| "()".to_string());

    match def
        .child_by_field_name("return_type")
        .and_then(|n| n.utf8_text(bytes).ok())
    {
        Some(ret) => format!("{params} -> {}", collapse_ws(ret)),
        None => params,
    }
}

/// Hash leaf tokens under `node`, skipping comments.
fn feed_tokens(node: Node, bytes: &[u8], hasher: &mut Xxh64) {
    if node.kind() == "comment" {
        return;
    }
    if node.child_count() == 0 {
        hasher.update(node.kind().as_bytes());
        hasher.update(&[0]);
        hasher.update(&bytes[node.start_byte()..node.end_byte()]);
        hasher.update(&[0xff]);
        return;
    }
    for i in 0..node.child_count() {
        if let Some(child) = node.child(i) {
            feed_tokens(child, bytes, hasher);
        }
    }
}

/// `import a.b, c as d`
fn collect_plain_import(node: Node, bytes: &[u8], out: &mut Vec<ImportRef>) {
    let mut cursor = node.walk();
    for name in node.children_by_field_name("name", &mut cursor) {
        if let Some(module) = imported_name(name, bytes) {
            out.push(ImportRef { module, level: 0 });
        }
    }
}

/// `from M import x` yields M and M.x; `from . import x` yields x at level 1.
fn collect_from_import(node: Node, bytes: &[u8], out: &mut Vec<ImportRef>) {
    let Some(module_node) = node.child_by_field_name("module_name") else {
        return;
    };

    let (module, level) = if module_node.kind() == "relative_import" {
        let mut level = 0;
        let mut module = String::new();
        for i in 0..module_node.child_count() {
            let Some(part) = module_node.child(i) else {
                continue;
            };
            match part.kind() {
                "import_prefix" => {
                    level = part
                        .utf8_text(bytes)
                        .map(|t| t.chars().filter(|c| *c == '.').count())
                        .unwrap_or(0);
                }
                "dotted_name" => module = dotted_text(part, bytes),
                _ => {}
            }
        }
        (module, level)
    } else {
        (dotted_text(module_node, bytes), 0)
    };

    if !module.is_empty() {
        out.push(ImportRef {
            module: module.clone(),
            level,
        });
    }

    let mut cursor = node.walk();
    for name in node.children_by_field_name("name", &mut cursor) {
        let Some(alias) = imported_name(name, bytes) else {
            continue;
        };
        let full = if module.is_empty() {
            alias
        } else {
            format!("{module}.{alias}")
        };
        out.push(ImportRef {
            module: full,
            level,
        });
    }
}

/// Name of a `dotted_name` or the target of an `aliased_import`.
fn imported_name(node: Node, bytes: &[u8]) -> Option<String> {
    let target = match node.kind() {
        "dotted_name" => node,
        "aliased_import" => node.child_by_field_name("name")?,
        _ => return None,
    };
    let text = dotted_text(target, bytes);
    (!text.is_empty()).then_some(text)
}

fn dotted_text(node: Node, bytes: &[u8]) -> String {
    node.utf8_text(bytes)
        .map(|t| t.split_whitespace().collect())
        .unwrap_or_default()
}

fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn named_children(node: Node) -> impl Iterator<Item = Node> {
    (0..node.named_child_count()).filter_map(move |i| node.named_child(i))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(src: &str) -> Vec<Symbol> {
        PythonExtractor::new().unwrap().symbol_table(src).unwrap()
    }

    fn get<'a>(syms: &'a [Symbol], name: &str) -> &'a Symbol {
        syms.iter()
            .find(|s| s.name == name)
            .expect("symbol not found")
    }

    #[test]
    fn functions_and_classes_in_order() {
        let syms = table(
            r#"
class Base:
    pass

def helper(a, b=2) -> int:
    return a

class Child(Base, Mixin):
    def run(self):
        def inner():
            pass
        return inner
"#,
        );
        let names: Vec<_> = syms.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["Base", "helper", "Child", "Child.run"]);

        assert_eq!(get(&syms, "helper").signature, "(a, b=2) -> int");
        assert_eq!(get(&syms, "Child").signature, "(Base, Mixin)");
        assert_eq!(get(&syms, "Base").signature, "");
        assert_eq!(get(&syms, "Child").kind, SymbolKind::Class);
        assert_eq!(get(&syms, "Child.run").kind, SymbolKind::Function);
        assert_eq!(get(&syms, "helper").start_line, 5);
    }

    #[test]
    fn fingerprint_ignores_comments_and_spacing() {
        let a = table("def f(x):\n    return x + 1\n");
        let b = table("def f(x):\n    # note\n    return x  +  1\n");
        let c = table("def f(x):\n    return x + 2\n");
        assert_eq!(a[0].fingerprint, b[0].fingerprint);
        assert_ne!(a[0].fingerprint, c[0].fingerprint);
    }

    #[test]
    fn class_fingerprint_excludes_methods() {
        let a = table("class C:\n    x = 1\n    def m(self):\n        return 1\n");
        let b = table("class C:\n    x = 1\n    def m(self):\n        return 2\n");
        assert_eq!(get(&a, "C").fingerprint, get(&b, "C").fingerprint);
        assert_ne!(get(&a, "C.m").fingerprint, get(&b, "C.m").fingerprint);
    }

    #[test]
    fn decorated_definitions_are_symbols() {
        let syms = table("@cache\ndef f():\n    return 1\n\nclass K:\n    @property\n    def p(self):\n        return 0\n");
        assert!(syms.iter().any(|s| s.name == "f"));
        assert!(syms.iter().any(|s| s.name == "K.p"));
    }

    #[test]
    fn syntax_error_is_a_parse_failure() {
        let ex = PythonExtractor::new().unwrap();
        assert!(ex.symbol_table("def broken(:\n").is_err());
        assert!(ex.imports("import (\n").is_err());
    }

    #[test]
    fn import_forms() {
        let ex = PythonExtractor::new().unwrap();
        let src = r#"
import os, pkg.mod as m
from lib import a, b as c
from . import sibling
from ..up import thing
from .star import *

def late():
    import lazy
"#;
        let refs: Vec<(String, usize)> = ex
            .imports(src)
            .unwrap()
            .into_iter()
            .map(|r| (r.module, r.level))
            .collect();

        let want: Vec<(String, usize)> = [
            ("os", 0),
            ("pkg.mod", 0),
            ("lib", 0),
            ("lib.a", 0),
            ("lib.b", 0),
            ("sibling", 1),
            ("up", 2),
            ("up.thing", 2),
            ("star", 1),
            ("lazy", 0),
        ]
        .into_iter()
        .map(|(m, l)| (m.to_string(), l))
        .collect();
        assert_eq!(refs, want);
    }
}
