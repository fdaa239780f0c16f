//! Tree-sitter based code parsing: symbol extraction, cyclomatic complexity,
//! and entrypoint heuristics for the Tree-sitter adapter.

use serde::{Deserialize, Serialize};
use std::path::Path;

#[cfg(feature = "tree-sitter-parsing")]
use tree_sitter::{Language, Node, Parser};

const FUNCTION_NODES: &[&str] = &["function_item", "function_declaration", "function_definition"];
const METHOD_NODES: &[&str] = &["method_definition", "method_declaration"];
const DECISION_NODES: &[&str] = &[
    "if_expression",
    "if_statement",
    "match_expression",
    "match_arm",
    "while_expression",
    "while_statement",
    "for_expression",
    "for_statement",
    "binary_expression",
    "catch_clause",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SupportedLanguage {
    Rust,
    Python,
    TypeScript,
    JavaScript,
}

impl SupportedLanguage {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_lowercase().as_str() {
            "rs" => Some(Self::Rust),
            "py" => Some(Self::Python),
            "ts" | "tsx" => Some(Self::TypeScript),
            "js" | "jsx" => Some(Self::JavaScript),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Rust => "rust",
            Self::Python => "python",
            Self::TypeScript => "typescript",
            Self::JavaScript => "javascript",
        }
    }

    #[cfg(feature = "tree-sitter-parsing")]
    fn tree_sitter_language(&self) -> Language {
        match self {
            Self::Rust => tree_sitter_rust::LANGUAGE.into(),
            Self::Python => tree_sitter_python::LANGUAGE.into(),
            Self::TypeScript => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
            Self::JavaScript => tree_sitter_javascript::LANGUAGE.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedSymbol {
    pub name: String,
    pub is_method: bool,
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
    pub is_public: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedFile {
    pub language: SupportedLanguage,
    pub symbols: Vec<ParsedSymbol>,
    pub cyclomatic: u32,
    pub line_count: u32,
}

/// Heuristic basis strings recognized when scanning for entrypoints
/// (language-specific keywords like "main", "handler", "#[test]").
const ENTRYPOINT_NAME_HINTS: &[(&str, &str)] = &[
    ("main", "process entrypoint (fn main)"),
    ("handle_", "event/job handler (handle_* naming)"),
    ("on_", "event handler (on_* naming)"),
    ("handler", "HTTP/RPC handler (handler naming)"),
];

pub struct CodeParser;

impl CodeParser {
    #[cfg(feature = "tree-sitter-parsing")]
    pub fn parse_file(path: &Path, source: &str) -> Option<ParsedFile> {
        let extension = path.extension().and_then(|e| e.to_str())?;
        let language = SupportedLanguage::from_extension(extension)?;

        let mut parser = Parser::new();
        parser.set_language(&language.tree_sitter_language()).ok()?;
        let tree = parser.parse(source, None)?;
        let root = tree.root_node();

        let mut symbols = Vec::new();
        let mut cyclomatic = 1;
        walk(root, source, &mut symbols, &mut cyclomatic);

        Some(ParsedFile {
            language,
            symbols,
            cyclomatic,
            line_count: source.lines().count() as u32,
        })
    }

    #[cfg(not(feature = "tree-sitter-parsing"))]
    pub fn parse_file(_path: &Path, _source: &str) -> Option<ParsedFile> {
        None
    }

    /// Entrypoint detection basis for a parsed symbol name, or `None`.
    pub fn entrypoint_basis(name: &str) -> Option<&'static str> {
        ENTRYPOINT_NAME_HINTS
            .iter()
            .find(|(hint, _)| name == *hint || name.starts_with(hint))
            .map(|(_, basis)| *basis)
    }
}

#[cfg(feature = "tree-sitter-parsing")]
fn walk(node: Node, source: &str, symbols: &mut Vec<ParsedSymbol>, cyclomatic: &mut u32) {
    let kind = node.kind();
    if DECISION_NODES.contains(&kind) {
        *cyclomatic += 1;
    }
    if FUNCTION_NODES.contains(&kind) || METHOD_NODES.contains(&kind) {
        if let Some(name_node) = node.child_by_field_name("name") {
            let name = name_node.utf8_text(source.as_bytes()).unwrap_or("").to_string();
            let is_public = node
                .prev_sibling()
                .map(|s| s.kind() == "visibility_modifier")
                .unwrap_or(false)
                || source[..node.start_byte().min(source.len())].ends_with("pub fn")
                || source
                    .get(node.start_byte().saturating_sub(8)..node.start_byte())
                    .map(|s| s.contains("pub "))
                    .unwrap_or(false);
            symbols.push(ParsedSymbol {
                name,
                is_method: METHOD_NODES.contains(&kind),
                start_line: node.start_position().row as u32 + 1,
                start_col: node.start_position().column as u32,
                end_line: node.end_position().row as u32 + 1,
                end_col: node.end_position().column as u32,
                is_public,
            });
        }
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        walk(child, source, symbols, cyclomatic);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_language_from_extension() {
        assert_eq!(SupportedLanguage::from_extension("rs"), Some(SupportedLanguage::Rust));
        assert_eq!(SupportedLanguage::from_extension("txt"), None);
    }

    #[test]
    fn entrypoint_basis_matches_main() {
        assert_eq!(CodeParser::entrypoint_basis("main"), Some("process entrypoint (fn main)"));
        assert_eq!(CodeParser::entrypoint_basis("handle_request"), Some("event/job handler (handle_* naming)"));
        assert_eq!(CodeParser::entrypoint_basis("compute"), None);
    }

    #[cfg(feature = "tree-sitter-parsing")]
    #[test]
    fn parses_rust_function_symbol() {
        let source = "pub fn add(a: i32, b: i32) -> i32 { if a > 0 { a + b } else { b } }";
        let parsed = CodeParser::parse_file(Path::new("a.rs"), source).unwrap();
        assert_eq!(parsed.symbols.len(), 1);
        assert_eq!(parsed.symbols[0].name, "add");
        assert!(parsed.cyclomatic >= 2);
    }
}
