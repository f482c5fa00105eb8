use std::{
    collections::HashSet,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use futures::future::BoxFuture;
use umm_grader::{
    GraderError,
    java::{
        Artifact, ClasspathResolver, ExecutionRequest, FeedParser, HarnessState, ReferenceLibraries,
        TestEngine, TestHarness, TestListener,
    },
    types::TestResult,
};

#[derive(Default)]
struct Recorder {
    results:   Mutex<Vec<TestResult>>,
    completed: AtomicUsize,
}

impl TestListener for Recorder {
    fn on_test_failed(&self, name: &str, stack_trace: &str) {
        self.results
            .lock()
            .unwrap()
            .push(TestResult::failed(name, stack_trace));
    }

    fn on_test_passed(&self, name: &str) {
        self.results.lock().unwrap().push(TestResult::passed(name));
    }

    fn on_execution_complete(&self) {
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

/// Fires callbacks from several OS threads after `execute` has returned.
struct ThreadedEngine {
    tests:   usize,
    threads: usize,
}

impl TestEngine for ThreadedEngine {
    fn execute(&self, request: ExecutionRequest) -> BoxFuture<'static, anyhow::Result<()>> {
        let (tests, threads) = (self.tests, self.threads);
        Box::pin(async move {
            let listener = request.listener;
            std::thread::spawn(move || {
                let workers: Vec<_> = (0..threads)
                    .map(|t| {
                        let listener = Arc::clone(&listener);
                        std::thread::spawn(move || {
                            for i in (t..tests).step_by(threads) {
                                let name = format!("Suite > test{i}()");
                                if i % 3 == 0 {
                                    listener.on_test_failed(&name, "java.lang.AssertionError");
                                } else {
                                    listener.on_test_passed(&name);
                                }
                            }
                        })
                    })
                    .collect();
                for worker in workers {
                    worker.join().unwrap();
                }
                listener.on_execution_complete();
            });
            Ok(())
        })
    }
}

/// Never finishes.
struct StuckEngine;

impl TestEngine for StuckEngine {
    fn execute(&self, _request: ExecutionRequest) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(futures::future::pending())
    }
}

/// Fails before reporting anything.
struct BrokenEngine;

impl TestEngine for BrokenEngine {
    fn execute(&self, _request: ExecutionRequest) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async { Err::<(), _>(anyhow::anyhow!("launcher could not start")) })
    }
}

/// Returns successfully but forgets to signal completion.
struct ForgetfulEngine;

impl TestEngine for ForgetfulEngine {
    fn execute(&self, request: ExecutionRequest) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            request.listener.on_test_passed("Suite > lonely()");
            Ok(())
        })
    }
}

fn resolver() -> ClasspathResolver {
    ClasspathResolver::new(
        std::env::temp_dir().join(format!("umm-base-{}", uuid::Uuid::new_v4())),
        ReferenceLibraries::from_jars("lib", vec![PathBuf::from("lib/junit.jar")]),
    )
}

fn artifact() -> Artifact {
    Artifact::new("target/never-read", vec!["SuiteTest".into()])
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callbacks_are_all_collected() {
    const TESTS: usize = 64;
    let engine = Arc::new(ThreadedEngine {
        tests:   TESTS,
        threads: 8,
    });

    for _ in 0..50 {
        let mut harness = TestHarness::new(Arc::clone(&engine), resolver(), Duration::from_secs(10));
        assert_eq!(harness.state(), HarnessState::NotStarted);

        let results = harness.run(&artifact()).await.unwrap();
        assert_eq!(harness.state(), HarnessState::Completed);
        assert_eq!(results.len(), TESTS);

        let names: HashSet<_> = results.iter().map(|r| r.name.clone()).collect();
        assert_eq!(names.len(), TESTS);
        assert_eq!(results.iter().filter(|r| !r.passed).count(), TESTS.div_ceil(3));
        assert!(
            results
                .iter()
                .filter(|r| r.passed)
                .all(|r| r.stack_trace.is_empty())
        );
    }
}

#[tokio::test]
async fn a_harness_runs_once() {
    let engine = Arc::new(ThreadedEngine {
        tests:   2,
        threads: 1,
    });
    let mut harness = TestHarness::new(engine, resolver(), Duration::from_secs(10));
    harness.run(&artifact()).await.unwrap();
    let err = harness.run(&artifact()).await.unwrap_err();
    assert!(matches!(err, GraderError::Harness(_)));
}

#[tokio::test]
async fn stuck_engines_time_out() {
    let mut harness =
        TestHarness::new(Arc::new(StuckEngine), resolver(), Duration::from_millis(100));
    let err = harness.run(&artifact()).await.unwrap_err();
    assert!(matches!(err, GraderError::Timeout { .. }));
    assert_eq!(harness.state(), HarnessState::Running);
}

#[tokio::test]
async fn engine_errors_surface_as_harness_errors() {
    let mut harness = TestHarness::new(Arc::new(BrokenEngine), resolver(), Duration::from_secs(5));
    let err = harness.run(&artifact()).await.unwrap_err();
    assert!(matches!(err, GraderError::Harness(_)));
    assert_eq!(
        err.to_string(),
        "test execution failed: launcher could not start"
    );
}

#[tokio::test]
async fn missing_completion_signal_is_an_error() {
    let mut harness =
        TestHarness::new(Arc::new(ForgetfulEngine), resolver(), Duration::from_secs(5));
    let err = harness.run(&artifact()).await.unwrap_err();
    assert!(err.to_string().contains("without signalling completion"));
}

const FEED: &str = "\
JUnit Jupiter > CalcTest > adds() :: STARTED
JUnit Jupiter > CalcTest > adds() :: SUCCESSFUL
JUnit Jupiter > CalcTest > fails() :: STARTED
JUnit Jupiter > CalcTest > fails() :: FAILED
\torg.opentest4j.AssertionFailedError: expected: <3> but was: <2>
\t\tat calc.CalcTest.fails(CalcTest.java:9)
JUnit Jupiter > CalcTest > skipped() :: SKIPPED
\tReason: disabled
JUnit Jupiter > CalcTest > assumed() :: STARTED
JUnit Jupiter > CalcTest > assumed() :: ABORTED
\torg.opentest4j.TestAbortedException: Assumption failed
JUnit Jupiter > BrokenTest :: FAILED
\tjava.lang.ExceptionInInitializerError
Test run finished after 40 ms
[         3 containers found      ]
";

#[test]
fn feed_lines_become_results() {
    let recorder = Arc::new(Recorder::default());
    let mut feed = FeedParser::new(recorder.clone());
    for line in FEED.lines() {
        feed.push(line);
    }
    feed.finish();

    let results = recorder.results.lock().unwrap().clone();
    assert_eq!(results, vec![
        TestResult::passed("CalcTest > adds()"),
        TestResult::failed(
            "CalcTest > fails()",
            "org.opentest4j.AssertionFailedError: expected: <3> but was: \
             <2>\n\tat calc.CalcTest.fails(CalcTest.java:9)"
        ),
        TestResult::failed("BrokenTest", "java.lang.ExceptionInInitializerError"),
    ]);
    assert_eq!(recorder.completed.load(Ordering::SeqCst), 0);
    assert_eq!(feed.events(), 8);
}

#[test]
fn trailing_failure_is_flushed_on_finish() {
    let recorder = Arc::new(Recorder::default());
    let mut feed = FeedParser::new(recorder.clone());
    feed.push("JUnit Jupiter > T > t() :: STARTED");
    feed.push("JUnit Jupiter > T > t() :: FAILED");
    feed.push("\tjava.lang.AssertionError");
    assert!(recorder.results.lock().unwrap().is_empty());

    feed.finish();
    assert_eq!(recorder.results.lock().unwrap().clone(), vec![TestResult::failed(
        "T > t()",
        "java.lang.AssertionError"
    )]);
}

#[test]
fn output_after_the_trace_is_not_part_of_it() {
    let recorder = Arc::new(Recorder::default());
    let mut feed = FeedParser::new(recorder.clone());
    for line in [
        "JUnit Jupiter > CalcTest > t() :: STARTED",
        "JUnit Jupiter > CalcTest > t() :: FAILED",
        "\tjava.lang.IllegalStateException: broken",
        "\t  second line of the message",
        "\t\tat calc.CalcTest.t(CalcTest.java:4)",
        "\tCaused by: java.io.IOException: disk",
        "\t\t... 3 more",
        "    closing shared fixture",
        "\tstill from the teardown",
        "JUnit Jupiter > CalcTest :: SUCCESSFUL",
    ] {
        feed.push(line);
    }
    feed.finish();

    assert_eq!(recorder.results.lock().unwrap().clone(), vec![TestResult::failed(
        "CalcTest > t()",
        "java.lang.IllegalStateException: broken\n  second line of the message\n\tat \
         calc.CalcTest.t(CalcTest.java:4)\nCaused by: java.io.IOException: disk\n\t... 3 more"
    )]);
}
