//! # umm-grader
//!
//! A build-and-test grading backend for Java submissions. A submission (test
//! sources plus primary sources) is merged into one compilation unit with
//! conflicting `main` methods neutralized, compiled with javac, and, when it
//! compiles, its JUnit tests are run and reported one result per test.

#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Environment driven settings
pub mod config;
/// A module defining a bunch of constant values to be used throughout
pub mod constants;
/// The error type for failures outside the submission's control
pub mod error;
/// Sequencing of the build and test phases
pub mod grade;
/// Assembling, compiling and testing Java sources
pub mod java;
/// Subprocess helpers
pub mod process;
/// Request and result types
pub mod types;
/// Utility functions for convenience
pub mod util;

pub use error::GraderError;
pub use grade::Grader;
pub use types::{BuildResult, CompileError, GradeResult, Status, Submission, TestResult};

/// Defined for convenience
type Dict = std::collections::HashMap<String, String>;
