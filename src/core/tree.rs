//! Filepath: src/core/tree.rs
//! Tree view of a Scan Result with per-file line counts as `name:lines`,
//! e.g. `main.py:100`. Only discovered files (and their directories)
//! appear; ignored paths never do.
//!
//! Performance notes:
//! - Counts lines by scanning bytes for '\n' (CRLF-safe).
//! - Large files go through the memory-mapped reader.
//! - BTreeMap children keep sibling order deterministic.

use anyhow::Result;
use memchr::memchr_iter;
use owo_colors::OwoColorize;
use ptree::TreeBuilder;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::cli::{AppContext, TreeArgs};
use crate::core::project::ProjectContext;
use crate::infra::io::read_file_smart;
use crate::infra::paths::PathRecord;

pub fn run(args: TreeArgs, ctx: &AppContext) -> Result<()> {
    let project = ProjectContext::discover(&args.path)?;
    let scope = std::slice::from_ref(&args.path);
    let files = project.target_files(scope, args.selection.all, args.selection.resolve)?;

    let tree = build_tree(project.root(), &files);

    if !ctx.quiet {
        print_tree(&tree, !ctx.no_color)?;
    }
    Ok(())
}

#[derive(Debug, Default)]
struct TreeNode {
    name: String,
    is_dir: bool,
    /// For files, total line count; None for directories.
    line_count: Option<usize>,
    children: BTreeMap<String, TreeNode>,
}

impl TreeNode {
    fn dir(name: String) -> Self {
        Self {
            name,
            is_dir: true,
            ..Self::default()
        }
    }

    /// Insert a `/`-separated key, creating intermediate directories.
    fn insert(&mut self, rel: &str, lines: usize) {
        let mut node = self;
        let mut parts = rel.split('/').peekable();

        while let Some(part) = parts.next() {
            let is_last = parts.peek().is_none();
            node = node
                .children
                .entry(part.to_string())
                .or_insert_with(|| TreeNode::dir(part.to_string()));
            if is_last {
                node.is_dir = false;
                node.line_count = Some(lines);
            }
        }
    }
}

/// Build the tree; external records hang under their `[EXTERNAL]` label.
fn build_tree(root: &Path, files: &[PathRecord]) -> TreeNode {
    let name = root
        .file_name()
        .unwrap_or(root.as_os_str())
        .to_string_lossy()
        .to_string();
    let mut tree = TreeNode::dir(name);

    for rec in files {
        let lines = match count_lines_fast(&rec.abs) {
            Ok(n) => n,
            Err(err) => {
                debug!(path = %rec.rel, %err, "line count unavailable");
                0
            }
        };
        tree.insert(&rec.rel, lines);
    }
    tree
}

fn print_tree(tree: &TreeNode, color: bool) -> Result<()> {
    let mut builder = TreeBuilder::new(format_node_label(tree, color));
    add_children_to_builder(&mut builder, &tree.children, color);

    let tree = builder.build();
    ptree::print_tree(&tree)?;
    Ok(())
}

fn add_children_to_builder(
    builder: &mut TreeBuilder,
    children: &BTreeMap<String, TreeNode>,
    color: bool,
) {
    for child in children.values() {
        if child.children.is_empty() {
            builder.add_empty_child(format_node_label(child, color));
        } else {
            builder.begin_child(format_node_label(child, color));
            add_children_to_builder(builder, &child.children, color);
            builder.end_child();
        }
    }
}

/// Directories end in `/`; files carry `:lines`.
fn format_node_label(node: &TreeNode, color: bool) -> String {
    if node.is_dir {
        if color {
            format!("{}/", node.name.blue())
        } else {
            format!("{}/", node.name)
        }
    } else {
        let name = if color {
            color_by_ext(&node.name)
        } else {
            node.name.clone()
        };
        match node.line_count {
            Some(n) => format!("{name}:{n}"),
            None => name,
        }
    }
}

fn color_by_ext(name: &str) -> String {
    match Path::new(name).extension().and_then(|e| e.to_str()) {
        Some("py" | "pyi") => name.green().to_string(),
        Some("js" | "jsx" | "ts" | "tsx") => name.cyan().to_string(),
        Some("html" | "css" | "scss") => name.magenta().to_string(),
        Some("md") => name.white().to_string(),
        Some("toml" | "yaml" | "yml" | "json" | "xml") => name.bright_blue().to_string(),
        _ => name.to_string(),
    }
}

/// Counts '\n' bytes, plus one for a non-empty unterminated last line.
fn count_lines_fast(path: &Path) -> Result<usize> {
    let content = read_file_smart(path)?;
    let bytes = content.as_bytes();
    if bytes.is_empty() {
        return Ok(0);
    }
    let nl = memchr_iter(b'\n', bytes).count();
    Ok(if bytes.ends_with(b"\n") { nl } else { nl + 1 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn tree_mirrors_scan_result_with_counts() -> Result<()> {
        let tmp = TempDir::new()?;
        let root = tmp.path();

        fs::create_dir_all(root.join("src/pkg"))?;
        fs::write(root.join("src/pkg/main.py"), b"def main():\n    pass\n")?;
        fs::write(root.join("README.md"), b"# Test\nSecond line")?;
        fs::write(root.join("empty.py"), b"")?;

        let files: Vec<PathRecord> = ["README.md", "empty.py", "src/pkg/main.py"]
            .iter()
            .map(|rel| PathRecord::new(root, root.join(rel)))
            .collect();
        let tree = build_tree(root, &files);

        let src = tree.children.get("src").expect("src dir present");
        assert!(src.is_dir);
        let main = src
            .children
            .get("pkg")
            .and_then(|p| p.children.get("main.py"))
            .expect("main.py present");
        assert_eq!(main.line_count, Some(2));
        assert!(!main.is_dir);

        assert_eq!(tree.children["README.md"].line_count, Some(2));
        assert_eq!(tree.children["empty.py"].line_count, Some(0));
        Ok(())
    }

    #[test]
    fn plain_labels_without_color() {
        let mut tree = TreeNode::dir("root".into());
        tree.insert("a/b.py", 3);
        let a = &tree.children["a"];
        assert_eq!(format_node_label(a, false), "a/");
        assert_eq!(format_node_label(&a.children["b.py"], false), "b.py:3");
    }
}
