#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Merging a submission into one compilable unit.
pub mod assemble;
/// Compiled artifacts and runtime classpath resolution.
pub mod artifact;
/// The javac driver.
pub mod compile;
/// Compiler diagnostics and their translation to submitted coordinates.
pub mod diagnostics;
/// Test execution and result collection.
pub mod harness;
/// Tree-sitter parser wrapper.
pub mod parser;
/// Parsers for javac and JUnit outputs.
pub mod parsers;
/// Tree-sitter query strings used by the assembler.
pub mod queries;

pub use artifact::{Artifact, ClasspathResolver};
pub use assemble::{AssembledUnit, SourceMap, SourceTree, assemble, parse_request};
pub use compile::{
    CompileOptions, Compilation, Compiler, CompilerOutput, Javac, ReferenceLibraries, compile,
};
pub use diagnostics::{Diagnostic, Position, Severity, parse_javac_output, translate};
pub use harness::{
    ExecutionRequest, FeedParser, HarnessState, JUnitEngine, ResultCollector, TestEngine,
    TestHarness, TestListener,
};
pub use parser::Parser;
