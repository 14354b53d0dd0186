//! Breakpoint metadata for debuggable files.

use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::warn;

use super::resolve_within;

/// A location the debugger may set a breakpoint at. `line` is 1-based,
/// `column` 0-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Breakpoint {
    pub line: usize,
    pub column: usize,
}

/// Supplies breakpoint locations for a file, addressed by its path relative
/// to the files root. Unknown files yield no breakpoints.
pub trait BreakpointSource: Send + Sync {
    fn breakpoints(&self, relative_path: &str) -> Vec<Breakpoint>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoBreakpoints;

impl BreakpointSource for NoBreakpoints {
    fn breakpoints(&self, _relative_path: &str) -> Vec<Breakpoint> {
        Vec::new()
    }
}

/// Reports one breakpoint per line on which a statement or declaration
/// starts, using the tree-sitter JavaScript grammar.
#[derive(Debug, Clone)]
pub struct StatementScanner {
    root: PathBuf,
}

/// Map file extension to a tree-sitter language. Only JavaScript is
/// debuggable.
fn language_for_path(path: &str) -> Option<tree_sitter::Language> {
    let ext = path.rsplit('.').next()?.to_lowercase();
    match ext.as_str() {
        "js" | "jsx" | "mjs" | "cjs" => Some(tree_sitter_javascript::LANGUAGE.into()),
        _ => None,
    }
}

fn is_statement(kind: &str) -> bool {
    kind.ends_with("_statement") || kind.ends_with("_declaration")
}

impl StatementScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Breakpoints for a JavaScript source, ordered by line. When several
    /// statements start on one line, the leftmost wins.
    pub fn scan(source: &str) -> Vec<Breakpoint> {
        Self::scan_with(&tree_sitter_javascript::LANGUAGE.into(), source)
    }

    fn scan_with(language: &tree_sitter::Language, source: &str) -> Vec<Breakpoint> {
        let mut parser = tree_sitter::Parser::new();
        if let Err(e) = parser.set_language(language) {
            warn!("Failed to load JavaScript grammar: {}", e);
            return Vec::new();
        }
        let Some(tree) = parser.parse(source, None) else {
            return Vec::new();
        };

        let mut starts: BTreeMap<usize, usize> = BTreeMap::new();
        let mut cursor = tree.walk();
        'walk: loop {
            let node = cursor.node();
            if node.is_named() && is_statement(node.kind()) {
                let pos = node.start_position();
                starts
                    .entry(pos.row + 1)
                    .and_modify(|column| *column = (*column).min(pos.column))
                    .or_insert(pos.column);
            }

            if cursor.goto_first_child() {
                continue;
            }
            while !cursor.goto_next_sibling() {
                if !cursor.goto_parent() {
                    break 'walk;
                }
            }
        }

        starts
            .into_iter()
            .map(|(line, column)| Breakpoint { line, column })
            .collect()
    }
}

impl BreakpointSource for StatementScanner {
    fn breakpoints(&self, relative_path: &str) -> Vec<Breakpoint> {
        let Some(language) = language_for_path(relative_path) else {
            return Vec::new();
        };
        resolve_within(&self.root, relative_path)
            .and_then(|path| std::fs::read(path).ok())
            .map(|bytes| Self::scan_with(&language, &String::from_utf8_lossy(&bytes)))
            .unwrap_or_default()
    }
}
