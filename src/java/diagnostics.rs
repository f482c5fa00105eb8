#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    fmt::{self, Display},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use super::{
    assemble::{Injection, SourceMap},
    parsers::{JavacLine, parser},
};
use crate::{constants::PRELUDE_FILENAME, types::CompileError};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
/// Severity of a diagnostic emitted by `javac`.
pub enum Severity {
    /// Diagnostic raised as an error.
    Error,
    /// Diagnostic raised as a warning.
    Warning,
}

impl Severity {
    /// Indicates whether the severity represents an error.
    pub fn is_error(self) -> bool {
        matches!(self, Severity::Error)
    }
}

impl Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Severity::Error => "ERROR",
            Severity::Warning => "WARNING",
        })
    }
}

/// A 0-indexed line and character position in a materialized file.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    /// 0-indexed line.
    pub line:   u32,
    /// 0-indexed character.
    pub column: u32,
}

/// A compiler diagnostic in the compiler's own coordinates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// File the diagnostic points into, as the compiler reported it.
    pub path:     Option<PathBuf>,
    /// Error or warning.
    pub severity: Severity,
    /// Message, including any detail lines.
    pub message:  String,
    /// Start of the offending span; `None` when there is no source.
    pub start:    Option<Position>,
}

impl Diagnostic {
    /// An error without a source location.
    pub fn detached(message: impl Into<String>) -> Self {
        Self {
            path:     None,
            severity: Severity::Error,
            message:  message.into(),
            start:    None,
        }
    }

    /// An error at `line`/`column` (both 0-indexed) in `path`.
    pub fn at(path: impl Into<PathBuf>, line: u32, column: u32, message: impl Into<String>) -> Self {
        Self {
            path:     Some(path.into()),
            severity: Severity::Error,
            message:  message.into(),
            start:    Some(Position { line, column }),
        }
    }
}

/// Collects javac's human readable output into [`Diagnostic`]s.
///
/// A diagnostic is its header line, the echoed source line, a caret line that
/// gives the column, and any detail lines (`symbol:`, `location:`, ...) which
/// are appended to the message.
pub fn parse_javac_output(output: &str) -> Vec<Diagnostic> {
    let mut collector = JavacCollector::default();
    for line in output.lines() {
        collector.feed(line);
    }
    collector.finish()
}

/// State for [`parse_javac_output`].
#[derive(Default)]
struct JavacCollector<'a> {
    /// Diagnostics completed so far, plus the open one at the end.
    diags:   Vec<Diagnostic>,
    /// Unclassified lines since the header or the caret.
    pending: Vec<&'a str>,
    /// Whether the last diagnostic still accepts lines.
    open:    bool,
    /// Whether the open diagnostic has seen its caret.
    caret:   bool,
}

impl<'a> JavacCollector<'a> {
    /// Classifies one line of output.
    fn feed(&mut self, line: &'a str) {
        match parser::javac_line(line) {
            Ok(JavacLine::Located {
                path,
                line,
                severity,
                message,
            }) => self.open_with(Diagnostic {
                path: Some(PathBuf::from(path)),
                severity,
                message,
                start: Some(Position {
                    line:   line.saturating_sub(1),
                    column: 0,
                }),
            }),
            Ok(JavacLine::Bare { severity, message }) => self.open_with(Diagnostic {
                path: None,
                severity,
                message,
                start: None,
            }),
            Ok(JavacLine::Caret(column)) if self.open && !self.caret => {
                // The line right before the caret is the echoed source.
                self.pending.pop();
                self.flush();
                self.caret = true;
                if let Some(start) = self.diags.last_mut().and_then(|d| d.start.as_mut()) {
                    start.column = column;
                }
            }
            Ok(JavacLine::Summary) | Ok(JavacLine::Note) => self.close(),
            Ok(JavacLine::Caret(_)) => {}
            Err(_) if self.open => self.pending.push(line),
            Err(_) => {}
        }
    }

    /// Closes the open diagnostic, if any, and starts `diag`.
    fn open_with(&mut self, diag: Diagnostic) {
        self.close();
        self.diags.push(diag);
        self.open = true;
        self.caret = false;
    }

    /// Moves pending lines into the open diagnostic's message.
    fn flush(&mut self) {
        if self.open
            && let Some(diag) = self.diags.last_mut()
        {
            for line in &self.pending {
                diag.message.push('\n');
                diag.message.push_str(line.trim_end());
            }
        }
        self.pending.clear();
    }

    /// Finishes the open diagnostic.
    fn close(&mut self) {
        let located = self.diags.last().is_some_and(|d| d.start.is_some());
        if self.open && located && !self.caret && !self.pending.is_empty() {
            // Located without a caret: the last line is still the source echo.
            self.pending.pop();
        }
        self.flush();
        self.open = false;
    }

    /// Returns everything collected.
    fn finish(mut self) -> Vec<Diagnostic> {
        self.close();
        self.diags
    }
}

/// Where a position in a materialized file came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    /// The submitted file, at this position.
    Submitted(Position),
    /// The spliced prelude, at this offset into it.
    Prelude(Position),
}

/// Maps a position in a materialized file back by undoing the prelude splice.
fn unshift(start: Position, injection: Option<Injection>) -> Origin {
    match injection {
        Some(inj) if start.line == inj.line && start.column >= inj.column => {
            if start.column >= inj.column + inj.len {
                Origin::Submitted(Position {
                    line:   start.line,
                    column: start.column - inj.len,
                })
            } else {
                Origin::Prelude(Position {
                    line:   0,
                    column: start.column - inj.column,
                })
            }
        }
        _ => Origin::Submitted(start),
    }
}

/// Converts compiler diagnostics into the external, 1-indexed error model.
///
/// Warnings are dropped. Order is preserved. Errors inside the prelude are
/// attributed to [`PRELUDE_FILENAME`]; javac repeats them for every file, so
/// only the first copy is kept.
pub fn translate(diagnostics: &[Diagnostic], sources: &SourceMap) -> Vec<CompileError> {
    let mut errors: Vec<CompileError> = Vec::new();
    for d in diagnostics.iter().filter(|d| d.severity.is_error()) {
        let mapped = d.path.as_deref().and_then(|p| sources.lookup(p));
        let submitted = match (mapped, d.path.as_deref()) {
            (Some(source), _) => source.filename.clone(),
            (None, Some(path)) => display_name(path),
            (None, None) => String::new(),
        };
        let origin = match d.start {
            Some(start) => unshift(start, mapped.and_then(|m| m.injection)),
            None => Origin::Submitted(Position::default()),
        };

        let (filename, start) = match origin {
            Origin::Submitted(start) => (submitted, start),
            Origin::Prelude(start) => (PRELUDE_FILENAME.to_string(), start),
        };
        let error = CompileError {
            filename,
            message: d.message.clone(),
            line: start.line + 1,
            character: start.column + 1,
        };

        if error.filename == PRELUDE_FILENAME && errors.contains(&error) {
            continue;
        }
        errors.push(error);
    }
    errors
}

/// File name of a path the compiler mentioned but we did not write.
fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unshift_moves_columns_after_the_splice() {
        let inj = Some(Injection {
            line:   0,
            column: 10,
            len:    20,
        });
        let before = Position { line: 0, column: 4 };
        let inside = Position { line: 0, column: 15 };
        let after = Position { line: 0, column: 35 };
        let other_line = Position { line: 3, column: 35 };
        assert_eq!(unshift(before, inj), Origin::Submitted(before));
        assert_eq!(unshift(inside, inj), Origin::Prelude(Position { line: 0, column: 5 }));
        assert_eq!(unshift(after, inj), Origin::Submitted(Position { line: 0, column: 15 }));
        assert_eq!(unshift(other_line, inj), Origin::Submitted(other_line));
    }
}
