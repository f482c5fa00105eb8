#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Runs the tests inside an [`Artifact`] and gathers one result per test.

use std::{
    collections::HashSet,
    ffi::OsString,
    fmt::{self, Display},
    path::PathBuf,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{Context, Result, bail};
use futures::future::BoxFuture;
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinSet,
    time::timeout,
};
use tracing::{debug, info, instrument, warn};

use super::{
    artifact::{Artifact, ClasspathResolver},
    parsers::{FeedStatus, parser},
};
use crate::{
    constants::JUNIT_LAUNCHER,
    error::GraderError,
    process::run_lines,
    types::TestResult,
    util::{java_path, join_classpath},
};

/// Receives test outcomes as the engine produces them.
///
/// Implementations must tolerate calls from several threads at once.
pub trait TestListener: Send + Sync {
    /// A test failed with `stack_trace`.
    fn on_test_failed(&self, name: &str, stack_trace: &str);
    /// A test passed.
    fn on_test_passed(&self, name: &str);
    /// Every result has been reported.
    fn on_execution_complete(&self);
}

/// Everything an engine needs to run one artifact.
#[derive(Clone)]
pub struct ExecutionRequest {
    /// Runtime classpath, in lookup order.
    pub classpath:    Vec<PathBuf>,
    /// Fully qualified names of the classes to run.
    pub test_classes: Vec<String>,
    /// Where results go.
    pub listener:     Arc<dyn TestListener>,
}

impl fmt::Debug for ExecutionRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionRequest")
            .field("classpath", &self.classpath)
            .field("test_classes", &self.test_classes)
            .finish_non_exhaustive()
    }
}

/// Something that runs tests and reports them to a [`TestListener`].
///
/// An engine must call `on_execution_complete` exactly once, after every
/// other callback, unless it returns an error.
pub trait TestEngine: Send + Sync {
    /// Starts running `request`; the future resolves when the engine is done
    /// scheduling work.
    fn execute(&self, request: ExecutionRequest) -> BoxFuture<'static, Result<()>>;
}

/// Forwards listener callbacks into a channel and fires a one-shot signal on
/// completion.
#[derive(Debug)]
pub struct ResultCollector {
    /// Result sink.
    results: mpsc::UnboundedSender<TestResult>,
    /// Completion signal, taken on first use.
    done:    Mutex<Option<oneshot::Sender<()>>>,
}

impl ResultCollector {
    /// Wraps the two channel ends.
    pub fn new(results: mpsc::UnboundedSender<TestResult>, done: oneshot::Sender<()>) -> Self {
        Self {
            results,
            done: Mutex::new(Some(done)),
        }
    }

    /// Pushes a result, logging if the harness already went away.
    fn push(&self, result: TestResult) {
        if self.results.send(result).is_err() {
            warn!("test result arrived after the harness stopped listening");
        }
    }
}

impl TestListener for ResultCollector {
    fn on_test_failed(&self, name: &str, stack_trace: &str) {
        self.push(TestResult::failed(name, stack_trace));
    }

    fn on_test_passed(&self, name: &str) {
        self.push(TestResult::passed(name));
    }

    fn on_execution_complete(&self) {
        let sender = match self.done.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match sender {
            Some(sender) => {
                let _ = sender.send(());
            }
            None => warn!("test engine signalled completion twice"),
        }
    }
}

/// Lifecycle of a [`TestHarness`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HarnessState {
    /// Not yet run.
    NotStarted,
    /// Waiting on the engine.
    Running,
    /// Results were drained.
    Completed,
}

impl Display for HarnessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            HarnessState::NotStarted => "not started",
            HarnessState::Running => "running",
            HarnessState::Completed => "completed",
        })
    }
}

/// Runs one artifact's tests through an engine and collects the results.
pub struct TestHarness<E> {
    /// The engine that runs the tests.
    engine:   Arc<E>,
    /// Classpath lookup for the artifact.
    resolver: ClasspathResolver,
    /// Deadline for the whole run.
    limit:    Duration,
    /// Where in its lifecycle the harness is.
    state:    HarnessState,
}

impl<E: TestEngine + 'static> TestHarness<E> {
    /// Creates a harness that has not run yet.
    pub fn new(engine: Arc<E>, resolver: ClasspathResolver, limit: Duration) -> Self {
        Self {
            engine,
            resolver,
            limit,
            state: HarnessState::NotStarted,
        }
    }

    /// Current state.
    pub fn state(&self) -> HarnessState {
        self.state
    }

    /// Runs every test in `artifact`.
    ///
    /// Waits for the engine's completion signal, then drains what the
    /// listener collected. A harness runs once.
    #[instrument(skip_all, fields(artifact = %artifact.dir().display()))]
    pub async fn run(&mut self, artifact: &Artifact) -> Result<Vec<TestResult>, GraderError> {
        if self.state != HarnessState::NotStarted {
            return Err(GraderError::Harness(format!("harness is already {}", self.state)));
        }

        let classpath = self
            .resolver
            .resolve(artifact)
            .map_err(|e| GraderError::Harness(format!("{e:#}")))?;

        let (results_tx, mut results_rx) = mpsc::unbounded_channel();
        let (done_tx, done_rx) = oneshot::channel();
        let request = ExecutionRequest {
            classpath,
            test_classes: artifact.test_classes().to_vec(),
            listener: Arc::new(ResultCollector::new(results_tx, done_tx)),
        };

        self.state = HarnessState::Running;
        debug!(classes = request.test_classes.len(), "starting test engine");
        let mut engine_task = tokio::spawn(self.engine.execute(request));

        let run = async {
            match (&mut engine_task).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => return Err(GraderError::Harness(format!("{e:#}"))),
                Err(e) => return Err(GraderError::Harness(format!("test engine crashed: {e}"))),
            }
            done_rx.await.map_err(|_| {
                GraderError::Harness("test engine stopped without signalling completion".into())
            })
        };
        let outcome = timeout(self.limit, run).await;

        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                engine_task.abort();
                return Err(GraderError::Timeout {
                    what:  "test execution",
                    after: self.limit,
                });
            }
        }

        let mut results = Vec::new();
        while let Ok(result) = results_rx.try_recv() {
            results.push(result);
        }
        self.state = HarnessState::Completed;
        info!(
            total = results.len(),
            failed = results.iter().filter(|r| !r.passed).count(),
            "tests finished"
        );
        Ok(results)
    }
}

/// Turns the JUnit console launcher's test feed into listener callbacks.
///
/// Feed lines look like `JUnit Jupiter > CalcTest > adds() :: SUCCESSFUL`.
/// A `FAILED` line is followed by tab-indented failure detail.
pub struct FeedParser {
    /// Where results go.
    listener: Arc<dyn TestListener>,
    /// Tests that started but have not finished.
    started:  HashSet<String>,
    /// What indented lines belong to.
    detail:   Detail,
    /// Number of feed events seen.
    events:   usize,
}

/// Owner of the indented lines following an event.
enum Detail {
    /// Nothing is collecting.
    None,
    /// A failed test and its trace so far. The flag is set once stack frames
    /// have started.
    Failure(String, Vec<String>, bool),
    /// A skipped or aborted test whose detail is dropped.
    Ignored,
}

impl FeedParser {
    /// Creates a parser reporting to `listener`.
    pub fn new(listener: Arc<dyn TestListener>) -> Self {
        Self {
            listener,
            started: HashSet::new(),
            detail: Detail::None,
            events: 0,
        }
    }

    /// Number of feed events seen so far.
    pub fn events(&self) -> usize {
        self.events
    }

    /// Handles one line of launcher output.
    pub fn push(&mut self, line: &str) {
        if let Ok((path, status)) = parser::feed_event(line) {
            self.end_detail();
            self.events += 1;
            let name = test_name(&path);
            match status {
                FeedStatus::Started => {
                    self.started.insert(name);
                }
                FeedStatus::Successful => {
                    if self.started.remove(&name) {
                        self.listener.on_test_passed(&name);
                    }
                }
                FeedStatus::Failed => {
                    if !self.started.remove(&name) {
                        debug!(%name, "container failed");
                    }
                    self.detail = Detail::Failure(name, Vec::new(), false);
                }
                FeedStatus::Aborted | FeedStatus::Skipped => {
                    self.started.remove(&name);
                    self.detail = Detail::Ignored;
                }
            }
            return;
        }

        if !(line.starts_with('\t') || line.starts_with(' ')) {
            self.end_detail();
            return;
        }
        let Detail::Failure(_, trace, framed) = &mut self.detail else {
            return;
        };
        let text = line.strip_prefix('\t').unwrap_or(line);
        let frame = parser::trace_line(text).is_ok();
        if *framed && !frame {
            // Output printed after the trace, e.g. by an `@AfterAll` hook.
            self.end_detail();
            return;
        }
        *framed |= frame;
        trace.push(text.to_string());
    }

    /// Flushes any failure still collecting detail.
    pub fn finish(&mut self) {
        self.end_detail();
    }

    /// Reports the failure being collected, if any.
    fn end_detail(&mut self) {
        if let Detail::Failure(name, trace, _) = std::mem::replace(&mut self.detail, Detail::None) {
            self.listener.on_test_failed(&name, trace.join("\n").trim_end());
        }
    }
}

/// Drops the engine segment from a feed display path.
fn test_name(path: &str) -> String {
    match path.split_once(" > ") {
        Some((_, rest)) => rest.to_string(),
        None => path.to_string(),
    }
}

/// Runs test classes with the JUnit Platform console launcher, one launcher
/// per batch, several batches at a time.
#[derive(Debug, Clone)]
pub struct JUnitEngine {
    /// Number of concurrent launchers.
    workers: usize,
}

impl JUnitEngine {
    /// Engine running at most `workers` launchers at once.
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }
}

/// Splits `classes` round-robin into at most `workers` batches.
fn batches(classes: &[String], workers: usize) -> Vec<Vec<String>> {
    let count = workers.max(1).min(classes.len());
    let mut out = vec![Vec::new(); count];
    for (index, class) in classes.iter().enumerate() {
        out[index % count].push(class.clone());
    }
    out
}

/// Launcher command line for one batch.
fn launcher_args(classpath: &str, classes: &[String]) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-Duser.language=en".into(),
        "-Dfile.encoding=UTF-8".into(),
        "-Dstdout.encoding=UTF-8".into(),
        "-Dstderr.encoding=UTF-8".into(),
        "-cp".into(),
        classpath.into(),
        JUNIT_LAUNCHER.into(),
        "execute".into(),
        "--disable-banner".into(),
        "--disable-ansi-colors".into(),
        "--details=testfeed".into(),
    ];
    args.extend(classes.iter().map(|c| OsString::from(format!("--select-class={c}"))));
    args
}

impl TestEngine for JUnitEngine {
    fn execute(&self, request: ExecutionRequest) -> BoxFuture<'static, Result<()>> {
        let workers = self.workers;
        Box::pin(async move {
            let batches = batches(&request.test_classes, workers);
            if !batches.is_empty() {
                let java = java_path()?;
                let classpath = join_classpath(&request.classpath);
                let mut pool = JoinSet::new();

                for batch in batches {
                    let args = launcher_args(&classpath, &batch);
                    let java = java.clone();
                    let listener = request.listener.clone();
                    pool.spawn(async move {
                        let mut feed = FeedParser::new(listener);
                        let (status, stderr) =
                            run_lines(&java, &args, None, None, |line| feed.push(line)).await?;
                        feed.finish();
                        // Exit code 1 just means some test failed.
                        if !status.success() && feed.events() == 0 {
                            bail!("test launcher exited with {status}: {}", stderr.trim());
                        }
                        debug!(classes = batch.len(), events = feed.events(), "batch finished");
                        Ok::<(), anyhow::Error>(())
                    });
                }

                while let Some(joined) = pool.join_next().await {
                    joined.context("test worker panicked")??;
                }
            }

            request.listener.on_execution_complete();
            Ok(())
        })
    }
}
