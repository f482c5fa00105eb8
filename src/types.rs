#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// A single file sent for grading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFile {
    /// Name the file was submitted under, used to attribute diagnostics.
    #[serde(default)]
    pub filename: String,
    /// Contents of the file.
    #[serde(default, rename = "src")]
    pub source:   String,
}

impl SourceFile {
    /// Creates a new source file.
    pub fn new(filename: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            source:   source.into(),
        }
    }

    /// Whether this file has nothing worth compiling.
    pub fn is_blank(&self) -> bool {
        self.source.trim().is_empty()
    }
}

/// Test sources and primary sources of one grading request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    /// Test source files, compiled ahead of the primary sources.
    #[serde(default, rename = "src_test")]
    pub tests:   Vec<SourceFile>,
    /// Primary source files.
    #[serde(default, rename = "src")]
    pub sources: Vec<SourceFile>,
}

impl Submission {
    /// All files in compilation order: tests first, then primary sources.
    pub fn files(&self) -> impl Iterator<Item = &SourceFile> {
        self.tests.iter().chain(self.sources.iter())
    }
}

/// Tri-state outcome of the build phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    /// Compiled; tests were (or can be) run.
    #[default]
    #[serde(rename = "OK")]
    Ok,
    /// The submission failed to compile.
    #[serde(rename = "ERROR")]
    Error,
    /// Something unrelated to the submission went wrong.
    #[serde(rename = "INTERNAL_ERROR")]
    InternalError,
}

impl Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Status::Ok => "OK",
            Status::Error => "ERROR",
            Status::InternalError => "INTERNAL_ERROR",
        })
    }
}

/// A compiler error in the submitter's coordinate system (1-indexed).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileError {
    /// Submitted filename, empty when the error has no source location.
    #[serde(default)]
    pub filename:  String,
    /// Compiler message.
    #[serde(default)]
    pub message:   String,
    /// 1-indexed line.
    #[serde(default = "one")]
    pub line:      u32,
    /// 1-indexed character within the line.
    #[serde(default = "one")]
    pub character: u32,
}

/// Default for 1-indexed coordinates.
fn one() -> u32 {
    1
}

impl Default for CompileError {
    fn default() -> Self {
        Self {
            filename:  String::new(),
            message:   String::new(),
            line:      1,
            character: 1,
        }
    }
}

/// Outcome of assembling and compiling a submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildResult {
    /// Overall status.
    #[serde(default)]
    pub status:             Status,
    /// Free-text explanation for internal errors.
    #[serde(default)]
    pub message:            String,
    /// Compiler errors for `Status::Error`.
    #[serde(default)]
    pub compilation_errors: Vec<CompileError>,
}

impl BuildResult {
    /// A successful build.
    pub fn ok() -> Self {
        Self::default()
    }

    /// A build that failed because of the submission.
    pub fn error(compilation_errors: Vec<CompileError>) -> Self {
        Self {
            status: Status::Error,
            compilation_errors,
            ..Self::default()
        }
    }

    /// A compile failure that produced no diagnostics we could attribute.
    pub fn error_message(message: impl Into<String>) -> Self {
        Self {
            status: Status::Error,
            message: message.into(),
            ..Self::default()
        }
    }

    /// A failure not attributable to the submission.
    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: Status::InternalError,
            message: message.into(),
            ..Self::default()
        }
    }

    /// Whether tests should run.
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }
}

/// Outcome of one test.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestResult {
    /// Whether the test passed.
    #[serde(default)]
    pub passed:      bool,
    /// Display name of the test.
    #[serde(default)]
    pub name:        String,
    /// Failure output, empty for passing tests.
    #[serde(default)]
    pub stack_trace: String,
}

impl TestResult {
    /// A passing test.
    pub fn passed(name: impl Into<String>) -> Self {
        Self {
            passed:      true,
            name:        name.into(),
            stack_trace: String::new(),
        }
    }

    /// A failing test with the engine's failure output.
    pub fn failed(name: impl Into<String>, stack_trace: impl Into<String>) -> Self {
        Self {
            passed:      false,
            name:        name.into(),
            stack_trace: stack_trace.into(),
        }
    }
}

/// Final, terminal result of one grading request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradeResult {
    /// Build outcome.
    pub build: BuildResult,
    /// Test outcomes; present only when the build succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tests: Option<Vec<TestResult>>,
}

impl GradeResult {
    /// Result of a build that did not succeed.
    pub fn build_only(build: BuildResult) -> Self {
        Self { build, tests: None }
    }

    /// Result of a successful build followed by a test run.
    pub fn with_tests(tests: Vec<TestResult>) -> Self {
        Self {
            build: BuildResult::ok(),
            tests: Some(tests),
        }
    }
}
