#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! # umm-grader
//!
//! Reads one JSON submission from stdin, compiles it, runs its JUnit tests
//! and writes one JSON result line to stdout.
//!
//! ```text
//! echo '{"src_test":[...],"src":[...]}' | umm-grader
//! ```
//!
//! Logs go to stderr; set `UMM_LOG` (for example `UMM_LOG=debug`) to see
//! them.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bpaf::*;
use dotenvy::dotenv;
use serde::Serialize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{EnvFilter, fmt, prelude::*, util::SubscriberInitExt};
use umm_grader::{
    config, constants::ARTIFACT_NAME, grade::Grader, java::parse_request, types::BuildResult,
};

/// Top-level CLI commands.
#[derive(Debug, Clone)]
enum Cmd {
    /// Build and test a submission read from stdin
    Grade,
    /// Only build a submission read from stdin
    Build,
    /// Run the tests of an existing artifact
    Run(Option<PathBuf>),
}

/// Parse the command line arguments and return a `Cmd` enum
fn options() -> Cmd {
    /// parses an artifact directory
    fn a() -> impl Parser<Option<PathBuf>> {
        positional::<PathBuf>("ARTIFACT")
            .help("Compiled artifact directory, defaults to <work dir>/main")
            .optional()
    }

    let grade = pure(Cmd::Grade)
        .to_options()
        .command("grade")
        .help("Build a submission from stdin and run its tests (default)");

    let build = pure(Cmd::Build)
        .to_options()
        .command("build")
        .help("Build a submission from stdin without running tests");

    let run = construct!(Cmd::Run(a()))
        .to_options()
        .command("run")
        .help("Run the tests of an already built artifact");

    let cmd = construct!([grade, build, run]).fallback(Cmd::Grade);

    cmd.to_options()
        .descr("Build-and-test grading backend for Java submissions")
        .run()
}

/// Reads the single request line from stdin.
async fn read_request() -> String {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    match lines.next_line().await {
        Ok(Some(line)) => line,
        Ok(None) => String::new(),
        Err(e) => {
            tracing::warn!(error = %e, "could not read stdin");
            String::new()
        }
    }
}

/// Writes `value` as one JSON line on stdout.
fn emit<T: Serialize>(value: &T) -> Result<()> {
    let line = serde_json::to_string(value).context("Could not encode result")?;
    println!("{line}");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv().ok();

    let fmt = fmt::layer()
        .with_writer(std::io::stderr)
        .without_time()
        .with_file(false)
        .with_line_number(false);
    let filter_layer = EnvFilter::try_from_env("UMM_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(fmt)
        .with(filter_layer)
        .init();

    let cmd = options();
    let grader = Grader::new((*config::get()).clone());

    match cmd {
        Cmd::Grade => {
            let line = read_request().await;
            emit(&grader.grade_line(&line).await)?;
        }
        Cmd::Build => {
            let line = read_request().await;
            let build = match parse_request(&line) {
                Ok(submission) => grader.build(&submission).await,
                Err(e) => BuildResult::internal(e.to_string()),
            };
            emit(&build)?;
        }
        Cmd::Run(artifact) => {
            let dir = artifact.unwrap_or_else(|| grader.config().work_dir().join(ARTIFACT_NAME));
            let tests = grader
                .run_artifact(&dir)
                .await
                .with_context(|| format!("Failed to run tests in {}", dir.display()))?;
            emit(&tests)?;
        }
    };

    Ok(())
}
