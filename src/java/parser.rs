#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt::Formatter;

use anyhow::{Context, Result, anyhow};
use tree_sitter::{InputEdit, Node, Point, Query, QueryCursor, Range, StreamingIterator, Tree};

use crate::Dict;

#[derive(Clone)]
/// A struct that wraps a tree-sitter parse tree and the source code it was
/// parsed from
pub struct Parser {
    /// the source code being parsed
    code: String,
    /// the parse tree
    tree: Tree,
    /// the tree-sitter java grammar language
    lang: tree_sitter::Language,
}

/// A single capture of a query: its text and where it sits in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Capture {
    /// Source text of the captured node.
    pub text:  String,
    /// Byte and point range of the captured node.
    pub range: Range,
}

/// Returns the compiled tree-sitter Java language.
fn java_language() -> tree_sitter::Language {
    tree_sitter_java::LANGUAGE.into()
}

impl std::fmt::Debug for Parser {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Parser")
            .field("len", &self.code.len())
            .field("has_error", &self.tree.root_node().has_error())
            .finish()
    }
}

impl Parser {
    /// Returns a new parser object
    ///
    /// * `source_code`: the source code to be parsed
    pub fn new(source_code: String) -> Result<Self> {
        let language = java_language();
        let tree = parse(&language, &source_code, None)?;

        Ok(Self {
            code: source_code,
            tree,
            lang: language,
        })
    }

    /// A getter for parser's source code
    pub fn code(&self) -> &str {
        self.code.as_str()
    }

    /// Root node of the parse tree.
    pub fn root(&self) -> Node<'_> {
        self.tree.root_node()
    }

    /// Applies a tree sitter query and returns the result as a collection of
    /// HashMaps
    ///
    /// * `q`: the tree-sitter query to be applied
    pub fn query(&self, q: &str) -> Result<Vec<Dict>> {
        let mut results = vec![];
        let query = self.compile(q)?;
        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, self.tree.root_node(), self.code.as_bytes());
        let mut capture_indices = Vec::new();

        for name in query.capture_names() {
            let index = query
                .capture_index_for_name(name)
                .ok_or_else(|| anyhow!("Capture name {name} has no index associated."))?;
            capture_indices.push((index, name.to_string()));
        }

        while let Some(m) = matches.next() {
            let mut result = Dict::new();

            for (index, name) in &capture_indices {
                let value = match m.captures.iter().find(|c| c.index == *index) {
                    Some(v) => v,
                    None => continue,
                };

                let value = value
                    .node
                    .utf8_text(self.code.as_bytes())
                    .with_context(|| {
                        format!(
                            "Cannot match query result indices with source code for capture name: \
                             {name}."
                        )
                    })?;

                result.insert(name.clone(), value.to_string());
            }
            results.push(result);
        }

        Ok(results)
    }

    /// Returns the text and range of each occurrence of the requested capture,
    /// in document order.
    pub fn captures(&self, q: &str, capture_name: &str) -> Result<Vec<Capture>> {
        let query = self.compile(q)?;
        let capture_index = query
            .capture_index_for_name(capture_name)
            .ok_or_else(|| anyhow!("Capture name {capture_name} not present in query"))?;

        let mut cursor = QueryCursor::new();
        let mut matches = cursor.matches(&query, self.tree.root_node(), self.code.as_bytes());
        let mut results = Vec::new();

        while let Some(m) = matches.next() {
            for capture in m.captures.iter().filter(|c| c.index == capture_index) {
                let text = capture
                    .node
                    .utf8_text(self.code.as_bytes())
                    .context("Cannot map capture to source text")?;
                results.push(Capture {
                    text:  text.to_string(),
                    range: capture.node.range(),
                });
            }
        }

        results.sort_by_key(|c| c.range.start_byte);
        Ok(results)
    }

    /// Finds the smallest node spanning `range`.
    pub fn node_at(&self, range: &Range) -> Option<Node<'_>> {
        self.tree
            .root_node()
            .descendant_for_byte_range(range.start_byte, range.end_byte)
    }

    /// Blanks out `range` and re-parses.
    ///
    /// Every character in the range except line breaks becomes a space, so
    /// the text after the range keeps its line and column.
    pub fn blank(&mut self, range: &Range) -> Result<()> {
        let start = range.start_byte;
        let end = range.end_byte;
        let removed = self
            .code
            .get(start..end)
            .with_context(|| format!("Range {start}..{end} is not on a char boundary"))?;
        let blanked: String = removed
            .chars()
            .map(|c| if c == '\n' || c == '\r' { c } else { ' ' })
            .collect();

        let mut code = String::with_capacity(self.code.len());
        code.push_str(&self.code[..start]);
        code.push_str(&blanked);
        code.push_str(&self.code[end..]);

        let new_end_byte = start + blanked.len();
        let edit = InputEdit {
            start_byte: start,
            old_end_byte: end,
            new_end_byte,
            start_position: range.start_point,
            old_end_position: range.end_point,
            new_end_position: point_at(&code, new_end_byte),
        };

        let mut tree = self.tree.clone();
        tree.edit(&edit);
        self.tree = parse(&self.lang, &code, Some(&tree))?;
        self.code = code;
        Ok(())
    }

    /// Compiles a query against the Java grammar.
    fn compile(&self, q: &str) -> Result<Query> {
        Query::new(&self.lang, q).with_context(|| format!("Failed to compile tree-sitter query: {q}"))
    }
}

/// Parses `code`, reusing `old` for an incremental parse when given.
fn parse(lang: &tree_sitter::Language, code: &str, old: Option<&Tree>) -> Result<Tree> {
    let mut parser = tree_sitter::Parser::new();
    parser
        .set_language(lang)
        .with_context(|| "Failed to load Java grammar")?;
    parser
        .parse(code, old)
        .ok_or_else(|| anyhow!("Error parsing Java code"))
}

/// Row and byte column of `byte` within `code`.
fn point_at(code: &str, byte: usize) -> Point {
    let before = &code[..byte];
    let row = before.matches('\n').count();
    let column = before.rfind('\n').map(|i| byte - i - 1).unwrap_or(byte);
    Point { row, column }
}
