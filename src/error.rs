#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::time::Duration;

/// Failures that are not attributable to the submitted code.
///
/// Every variant ends up as an `INTERNAL_ERROR` build status; the display
/// text becomes the result's `message`.
#[derive(thiserror::Error, Debug)]
pub enum GraderError {
    /// The request line was empty.
    #[error("empty input")]
    EmptyInput,
    /// The request line was not a JSON submission.
    #[error("serialization failed: {0}")]
    Deserialize(String),
    /// No reference libraries were found to compile against.
    #[error("no reference libraries found in {0}")]
    NoReferences(String),
    /// `javac` or `java` could not be located.
    #[error("{0}")]
    Toolchain(String),
    /// A compiler or test process ran past its deadline.
    #[error("{what} timed out after {}s", .after.as_secs())]
    Timeout {
        /// What was running.
        what:  &'static str,
        /// The deadline that was exceeded.
        after: Duration,
    },
    /// The test engine failed outside of any individual test.
    #[error("test execution failed: {0}")]
    Harness(String),
    /// Anything else.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
