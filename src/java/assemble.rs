#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Merges a submission into one compilable unit.

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use itertools::Itertools;
use tracing::{debug, instrument};
use tree_sitter::Node;

use super::{
    parser::Parser,
    queries::{PACKAGE_QUERY, method_named_query},
};
use crate::{
    constants::{ENTRY_POINT, PRELUDE_FILENAME},
    error::GraderError,
    types::Submission,
};

/// Node kinds that declare a type.
const TYPE_DECLARATIONS: &[&str] = &[
    "class_declaration",
    "interface_declaration",
    "enum_declaration",
    "record_declaration",
    "annotation_type_declaration",
];

/// Node kinds that do not count as class members.
const TRIVIA: &[&str] = &["line_comment", "block_comment"];

/// Decodes one request line into a [`Submission`].
pub fn parse_request(line: &str) -> Result<Submission, GraderError> {
    if line.trim().is_empty() {
        return Err(GraderError::EmptyInput);
    }

    let submission: Option<Submission> =
        serde_json::from_str(line).map_err(|e| GraderError::Deserialize(e.to_string()))?;
    submission.ok_or_else(|| GraderError::Deserialize("request was null".into()))
}

/// A parsed source file tagged with the name it was submitted under.
#[derive(Debug, Clone)]
pub struct SourceTree {
    /// Submitted filename.
    filename:            String,
    /// Parse tree and text.
    parser:              Parser,
    /// Whether an entry point was stripped from this file.
    removed_entry_point: bool,
}

impl SourceTree {
    /// Parses `source` as a Java file named `filename`.
    pub fn parse(filename: impl Into<String>, source: impl Into<String>) -> Result<Self> {
        let filename = filename.into();
        let parser = Parser::new(source.into())
            .with_context(|| format!("Could not parse {filename}"))?;
        Ok(Self {
            filename,
            parser,
            removed_entry_point: false,
        })
    }

    /// Submitted filename.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Current source text.
    pub fn code(&self) -> &str {
        self.parser.code()
    }

    /// Borrow the underlying parser.
    pub fn parser(&self) -> &Parser {
        &self.parser
    }

    /// Whether [`SourceTree::strip_entry_point`] removed something.
    pub fn removed_entry_point(&self) -> bool {
        self.removed_entry_point
    }

    /// Declared package, if any.
    pub fn package_name(&self) -> Result<Option<String>> {
        Ok(self
            .parser
            .query(PACKAGE_QUERY)?
            .into_iter()
            .next()
            .and_then(|m| m.get("name").cloned()))
    }

    /// Names of methods called [`ENTRY_POINT`], in document order.
    pub fn entry_points(&self) -> Result<Vec<String>> {
        Ok(self
            .parser
            .captures(&method_named_query(ENTRY_POINT), "name")?
            .into_iter()
            .map(|c| c.text)
            .collect())
    }

    /// Removes the first entry point declaration, and its class when nothing
    /// else is left in it.
    ///
    /// The declaration is blanked rather than cut out so that every other
    /// token keeps its line and column. Running this on a tree without an
    /// entry point leaves it untouched.
    pub fn strip_entry_point(&mut self) -> Result<bool> {
        let Some(method) = self
            .parser
            .captures(&method_named_query(ENTRY_POINT), "method")?
            .into_iter()
            .next()
        else {
            return Ok(false);
        };

        let target = {
            let node = self
                .parser
                .node_at(&method.range)
                .context("entry point vanished from its own tree")?;
            let body = node.parent().filter(|p| p.kind() == "class_body");
            let class = body.and_then(|b| b.parent()).filter(|c| c.kind() == "class_declaration");

            match (body, class) {
                (Some(body), Some(class)) => {
                    let mut cursor = body.walk();
                    let others = body
                        .named_children(&mut cursor)
                        .filter(|child| child.id() != node.id())
                        .filter(|child| !TRIVIA.contains(&child.kind()))
                        .count();
                    if others == 0 { class.range() } else { method.range }
                }
                _ => method.range,
            }
        };

        debug!(
            file = %self.filename,
            row = target.start_point.row,
            whole_class = target != method.range,
            "removing entry point"
        );
        self.parser.blank(&target)?;
        self.removed_entry_point = true;
        Ok(true)
    }

    /// Binary names of the classes JUnit could run: concrete top-level
    /// classes and concrete static nested classes, in document order.
    ///
    /// Annotations are not consulted. Tests may be inherited from a base
    /// class or interface, so only the launcher can tell which classes really
    /// hold tests.
    pub fn test_classes(&self) -> Result<Vec<String>> {
        let prefix = match self.package_name()? {
            Some(pkg) => format!("{pkg}."),
            None => String::new(),
        };
        let mut out = Vec::new();
        collect_runnable(self.parser.root(), self.code().as_bytes(), &prefix, true, &mut out);
        Ok(out.into_iter().unique().collect())
    }

    /// Name of the first public top-level type, which javac insists the file
    /// be named after.
    pub fn public_type(&self) -> Option<String> {
        let root = self.parser.root();
        let mut cursor = root.walk();
        root.named_children(&mut cursor)
            .filter(|decl| TYPE_DECLARATIONS.contains(&decl.kind()))
            .find(|decl| modifiers(*decl).contains(&"public"))
            .and_then(|decl| decl.child_by_field_name("name"))
            .and_then(|name| name.utf8_text(self.code().as_bytes()).ok())
            .map(str::to_string)
    }

    /// File name to write this tree under.
    ///
    /// The public type wins. Otherwise the submitted name is kept, with a
    /// `.java` extension forced onto it.
    pub fn disk_name(&self, index: usize) -> String {
        if let Some(name) = self.public_type() {
            return format!("{name}.java");
        }
        let stem = Path::new(&self.filename)
            .file_stem()
            .map(|n| n.to_string_lossy().into_owned())
            .filter(|n| !n.is_empty() && !n.starts_with('.'));
        match stem {
            Some(stem) => format!("{stem}.java"),
            None => format!("Source{index}.java"),
        }
    }
}

/// Walks the type declarations directly inside `container`, pushing runnable
/// class names and descending into nested bodies.
///
/// `members_static` is true where every nested type is implicitly static:
/// at the top level and inside interfaces.
fn collect_runnable(
    container: Node<'_>,
    code: &[u8],
    prefix: &str,
    members_static: bool,
    out: &mut Vec<String>,
) {
    let mut cursor = container.walk();
    for decl in container.named_children(&mut cursor) {
        if decl.kind() == "enum_body_declarations" {
            collect_runnable(decl, code, prefix, members_static, out);
            continue;
        }
        if !TYPE_DECLARATIONS.contains(&decl.kind()) {
            continue;
        }
        let Some(name) = decl
            .child_by_field_name("name")
            .and_then(|n| n.utf8_text(code).ok())
        else {
            continue;
        };

        let keywords = modifiers(decl);
        let is_static = members_static || keywords.contains(&"static");
        if decl.kind() == "class_declaration" && is_static && !keywords.contains(&"abstract") {
            out.push(format!("{prefix}{name}"));
        }

        if let Some(body) = decl.child_by_field_name("body") {
            let nested_static =
                matches!(decl.kind(), "interface_declaration" | "annotation_type_declaration");
            collect_runnable(body, code, &format!("{prefix}{name}$"), nested_static, out);
        }
    }
}

/// Modifier keywords (`public`, `static`, `abstract`, ...) on a declaration.
fn modifiers(decl: Node<'_>) -> Vec<&'static str> {
    let mut cursor = decl.walk();
    let Some(list) = decl.children(&mut cursor).find(|c| c.kind() == "modifiers") else {
        return vec![];
    };
    let mut cursor = list.walk();
    list.children(&mut cursor).map(|c| c.kind()).collect()
}

/// Where the prelude was spliced into a materialized file, in 0-indexed
/// character coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Injection {
    /// Line the prelude was written on.
    pub line:   u32,
    /// Column the prelude starts at.
    pub column: u32,
    /// Number of characters inserted.
    pub len:    u32,
}

/// A submitted file as written to disk.
#[derive(Debug, Clone)]
pub struct MappedSource {
    /// Path handed to the compiler.
    pub path:      PathBuf,
    /// Submitted filename.
    pub filename:  String,
    /// Where the prelude went.
    pub injection: Option<Injection>,
}

/// Lookup table from compiler paths back to submitted files.
#[derive(Debug, Clone, Default)]
pub struct SourceMap {
    /// One entry per materialized file, in compilation order.
    entries: Vec<MappedSource>,
}

impl SourceMap {
    /// Creates a map from explicit entries.
    pub fn new(entries: Vec<MappedSource>) -> Self {
        Self { entries }
    }

    /// Paths to hand to the compiler.
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.entries.iter().map(|e| e.path.as_path())
    }

    /// All entries.
    pub fn entries(&self) -> &[MappedSource] {
        &self.entries
    }

    /// Finds the entry for a path reported by the compiler.
    ///
    /// The compiler echoes paths the way it was given them, but may also
    /// report them relative to another directory, so a suffix match is tried
    /// after an exact one.
    pub fn lookup(&self, path: &Path) -> Option<&MappedSource> {
        self.entries
            .iter()
            .find(|e| e.path == path)
            .or_else(|| {
                self.entries
                    .iter()
                    .find(|e| e.path.ends_with(path) || path.ends_with(&e.path))
            })
    }
}

/// The implicit imports prelude, followed by the submitted trees.
#[derive(Debug, Clone)]
pub struct AssembledUnit {
    /// Synthetic tree holding the implicit imports.
    prelude: SourceTree,
    /// Submitted trees, tests first.
    trees:   Vec<SourceTree>,
}

impl AssembledUnit {
    /// Synthetic imports tree.
    pub fn prelude(&self) -> &SourceTree {
        &self.prelude
    }

    /// Submitted trees in compilation order.
    pub fn trees(&self) -> &[SourceTree] {
        &self.trees
    }

    /// Whether there is nothing to compile.
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Binary names of every class JUnit should be pointed at.
    pub fn test_classes(&self) -> Result<Vec<String>> {
        let mut all = Vec::new();
        for tree in &self.trees {
            all.extend(tree.test_classes()?);
        }
        Ok(all.into_iter().unique().collect())
    }

    /// Writes every tree below `root`, one directory per file so that equal
    /// filenames do not overwrite each other, splicing the prelude into each.
    #[instrument(skip(self), fields(files = self.trees.len()))]
    pub fn materialize(&self, root: &Path) -> Result<SourceMap> {
        if root.exists() {
            fs::remove_dir_all(root)
                .with_context(|| format!("Could not clear {}", root.display()))?;
        }

        let prelude = self.prelude.code().trim();
        let mut entries = Vec::with_capacity(self.trees.len());
        for (index, tree) in self.trees.iter().enumerate() {
            let dir = root.join(index.to_string());
            fs::create_dir_all(&dir)
                .with_context(|| format!("Could not create {}", dir.display()))?;

            let name = tree.disk_name(index);
            let path = dir.join(name);

            let (code, injection) = splice(tree, prelude)?;
            fs::write(&path, code).with_context(|| format!("Could not write {}", path.display()))?;
            entries.push(MappedSource {
                path,
                filename: tree.filename().to_string(),
                injection,
            });
        }

        debug!(root = %root.display(), "materialized sources");
        Ok(SourceMap::new(entries))
    }
}

/// Inserts `prelude` right after the package declaration, or at the very
/// start of the file when there is none, without adding a line.
fn splice(tree: &SourceTree, prelude: &str) -> Result<(String, Option<Injection>)> {
    let code = tree.code();
    if prelude.is_empty() {
        return Ok((code.to_string(), None));
    }

    let package = tree
        .parser()
        .captures(PACKAGE_QUERY, "declaration")?
        .into_iter()
        .next();

    let at = package.map(|decl| decl.range.end_byte).unwrap_or(0);
    let text = format!("{prelude} ");

    let before = &code[..at];
    let line = before.matches('\n').count() as u32;
    let column = before
        .rsplit('\n')
        .next()
        .map(|l| l.chars().count())
        .unwrap_or(0) as u32;

    let mut spliced = String::with_capacity(code.len() + text.len());
    spliced.push_str(before);
    spliced.push_str(&text);
    spliced.push_str(&code[at..]);

    Ok((
        spliced,
        Some(Injection {
            line,
            column,
            len: text.chars().count() as u32,
        }),
    ))
}

/// Source text of the implicit imports tree.
fn prelude_source(imports: &[String]) -> String {
    imports
        .iter()
        .map(|i| format!("import {i}.*;"))
        .join(" ")
}

/// Turns a submission into an [`AssembledUnit`].
///
/// Files are taken tests first, blank files are dropped, and each remaining
/// file loses its entry point.
#[instrument(skip_all, fields(tests = submission.tests.len(), sources = submission.sources.len()))]
pub fn assemble(submission: &Submission, imports: &[String]) -> Result<AssembledUnit> {
    let mut trees = Vec::new();
    for file in submission.files().filter(|f| !f.is_blank()) {
        let mut tree = SourceTree::parse(&file.filename, &file.source)?;
        tree.strip_entry_point()?;
        trees.push(tree);
    }

    let prelude = SourceTree::parse(PRELUDE_FILENAME, prelude_source(imports))?;
    debug!(
        trees = trees.len(),
        stripped = trees.iter().filter(|t| t.removed_entry_point()).count(),
        "assembled submission"
    );
    Ok(AssembledUnit { prelude, trees })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prelude_is_a_single_line() {
        let src = prelude_source(&["java.util".into(), "java.io".into()]);
        assert_eq!(src, "import java.util.*; import java.io.*;");
    }

    #[test]
    fn splice_after_package_keeps_lines() {
        let tree = SourceTree::parse("A.java", "package p;\n\nclass A {}\n").unwrap();
        let (code, injection) = splice(&tree, "import java.util.*;").unwrap();
        assert_eq!(code, "package p;import java.util.*; \n\nclass A {}\n");
        assert_eq!(
            injection,
            Some(Injection {
                line:   0,
                column: 10,
                len:    20,
            })
        );
    }

    #[test]
    fn splice_without_package_goes_first() {
        let tree = SourceTree::parse("A.java", "class A {}\n").unwrap();
        let (code, injection) = splice(&tree, "import java.io.*;").unwrap();
        assert_eq!(code, "import java.io.*; class A {}\n");
        assert_eq!(injection.map(|i| (i.line, i.column, i.len)), Some((0, 0, 18)));
    }
}
