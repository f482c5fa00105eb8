use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::future::BoxFuture;
use umm_grader::{
    GradeResult, Grader, GraderError, Status,
    config::GraderConfig,
    java::{
        CompileOptions, Compiler, CompilerOutput, Diagnostic, ExecutionRequest, TestEngine,
        assemble::SourceMap,
    },
    types::{BuildResult, CompileError, TestResult},
};

fn scratch(tag: &str) -> PathBuf {
    std::env::temp_dir().join(format!("umm-{tag}-{}", uuid::Uuid::new_v4()))
}

/// A library directory holding one (empty) jar.
fn lib_dir() -> PathBuf {
    let dir = scratch("lib");
    fs::create_dir_all(&dir).unwrap();
    fs::write(dir.join("junit-platform-console-standalone.jar"), b"").unwrap();
    dir
}

fn config(lib: &Path) -> GraderConfig {
    GraderConfig::new(lib, scratch("work"))
}

/// What the fake compiler should report for each phase.
#[derive(Clone, Copy)]
enum Outcome {
    Clean,
    /// An error on this 0-indexed line of the first file.
    ErrorOnLine(u32),
    /// Non-zero exit without any diagnostics.
    SilentFailure,
}

struct FakeCompiler {
    analysis: Outcome,
    emission: Outcome,
    emits:    Arc<AtomicUsize>,
}

impl FakeCompiler {
    fn new(analysis: Outcome, emission: Outcome) -> Self {
        Self {
            analysis,
            emission,
            emits: Arc::new(AtomicUsize::new(0)),
        }
    }
}

fn report(outcome: Outcome, sources: &SourceMap) -> CompilerOutput {
    match outcome {
        Outcome::Clean => CompilerOutput {
            success: true,
            ..CompilerOutput::default()
        },
        Outcome::ErrorOnLine(line) => {
            let path = sources.paths().next().unwrap().to_path_buf();
            CompilerOutput {
                success:     false,
                diagnostics: vec![Diagnostic::at(path, line, 4, "';' expected")],
                raw:         "1 error".into(),
            }
        }
        Outcome::SilentFailure => CompilerOutput {
            success:     false,
            diagnostics: vec![],
            raw:         "javac crashed\n".into(),
        },
    }
}

impl Compiler for FakeCompiler {
    fn analyze<'a>(
        &'a self,
        sources: &'a SourceMap,
        _options: &'a CompileOptions,
    ) -> BoxFuture<'a, Result<CompilerOutput, GraderError>> {
        Box::pin(async move { Ok(report(self.analysis, sources)) })
    }

    fn emit<'a>(
        &'a self,
        sources: &'a SourceMap,
        _options: &'a CompileOptions,
        _out_dir: &'a Path,
    ) -> BoxFuture<'a, Result<CompilerOutput, GraderError>> {
        self.emits.fetch_add(1, Ordering::SeqCst);
        Box::pin(async move { Ok(report(self.emission, sources)) })
    }
}

/// Reports `<class> > works()` as passing for every class named `*Test`,
/// the way the launcher finds nothing to run in the others.
struct PassingEngine;

impl TestEngine for PassingEngine {
    fn execute(&self, request: ExecutionRequest) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async move {
            for class in request.test_classes.iter().filter(|c| c.ends_with("Test")) {
                request.listener.on_test_passed(&format!("{class} > works()"));
            }
            request.listener.on_execution_complete();
            Ok(())
        })
    }
}

struct FailingEngine;

impl TestEngine for FailingEngine {
    fn execute(&self, _request: ExecutionRequest) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(async { Err::<(), _>(anyhow::anyhow!("could not start the JVM")) })
    }
}

/// Never signals completion.
struct StuckEngine;

impl TestEngine for StuckEngine {
    fn execute(&self, _request: ExecutionRequest) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(futures::future::pending())
    }
}

fn clean_grader(lib: &Path) -> Grader<FakeCompiler, PassingEngine> {
    Grader::with_parts(
        config(lib),
        FakeCompiler::new(Outcome::Clean, Outcome::Clean),
        PassingEngine,
    )
    .with_base_dir(scratch("base"))
}

const CALC_TEST: &str = "import org.junit.jupiter.api.Test;\nimport static \
                         org.junit.jupiter.api.Assertions.assertEquals;\n\nclass CalcTest {\n    \
                         @Test\n    void works() {\n        assertEquals(2, 1 + 1);\n    }\n}\n";

const CALC: &str = "class Calc {\n    int add(int a, int b) {\n        return a + b;\n    }\n}\n";

fn request(tests: &str, sources: &str) -> String {
    serde_json::json!({
        "src_test": [{"filename": "CalcTest.java", "src": tests}],
        "src": [{"filename": "Calc.java", "src": sources}],
    })
    .to_string()
}

#[tokio::test]
async fn empty_input_is_an_internal_error() {
    let grader = clean_grader(&lib_dir());
    let result = grader.grade_line("").await;
    assert_eq!(result.build.status, Status::InternalError);
    assert_eq!(result.build.message, "empty input");
    assert!(result.tests.is_none());

    let json = serde_json::to_value(&result).unwrap();
    assert!(json.get("tests").is_none());
    assert_eq!(json["build"]["status"], "INTERNAL_ERROR");
}

#[tokio::test]
async fn garbage_input_is_an_internal_error() {
    let grader = clean_grader(&lib_dir());
    let result = grader.grade_line("{not json").await;
    assert_eq!(result.build.status, Status::InternalError);
    assert!(result.build.message.starts_with("serialization failed: "));
}

#[tokio::test]
async fn empty_submission_is_ok_without_references() {
    let grader = clean_grader(&scratch("missing-lib"));
    let result = grader
        .grade_line(r#"{"src_test":[],"src":[{"filename":"A.java","src":"  \n"}]}"#)
        .await;
    assert_eq!(result.build, BuildResult::ok());
    assert_eq!(result.tests, Some(vec![]));
}

#[tokio::test]
async fn passing_submission_reports_its_tests() {
    let grader = clean_grader(&lib_dir());
    let result = grader.grade_line(&request(CALC_TEST, CALC)).await;
    assert_eq!(result.build.status, Status::Ok);
    assert!(result.build.compilation_errors.is_empty());
    assert_eq!(result.tests, Some(vec![TestResult::passed("CalcTest > works()")]));
}

#[tokio::test]
async fn analysis_errors_skip_emission() {
    let compiler = FakeCompiler::new(Outcome::ErrorOnLine(4), Outcome::Clean);
    let emits = Arc::clone(&compiler.emits);
    let grader = Grader::with_parts(config(&lib_dir()), compiler, PassingEngine);

    let result = grader.grade_line(&request(CALC_TEST, CALC)).await;
    assert_eq!(result.build.status, Status::Error);
    assert_eq!(result.build.compilation_errors, vec![CompileError {
        filename:  "CalcTest.java".into(),
        message:   "';' expected".into(),
        line:      5,
        character: 5,
    }]);
    assert!(result.tests.is_none());
    assert_eq!(emits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn emission_errors_are_translated() {
    let grader = Grader::with_parts(
        config(&lib_dir()),
        FakeCompiler::new(Outcome::Clean, Outcome::ErrorOnLine(1)),
        PassingEngine,
    );
    let result = grader.grade_line(&request(CALC_TEST, CALC)).await;
    assert_eq!(result.build.status, Status::Error);
    assert_eq!(result.build.compilation_errors.len(), 1);
    let error = &result.build.compilation_errors[0];
    assert_eq!(error.filename, "CalcTest.java");
    assert_eq!((error.line, error.character), (2, 5));
}

#[tokio::test]
async fn silent_emission_failure_carries_compiler_output() {
    let grader = Grader::with_parts(
        config(&lib_dir()),
        FakeCompiler::new(Outcome::Clean, Outcome::SilentFailure),
        PassingEngine,
    );
    let build = grader
        .build(&umm_grader::java::parse_request(&request(CALC_TEST, CALC)).unwrap())
        .await;
    assert_eq!(build.status, Status::Error);
    assert_eq!(build.message, "javac crashed");
    assert!(build.compilation_errors.is_empty());
}

#[tokio::test]
async fn missing_references_are_internal_errors() {
    let empty = scratch("empty-lib");
    fs::create_dir_all(&empty).unwrap();
    let grader = clean_grader(&empty);
    let result = grader.grade_line(&request(CALC_TEST, CALC)).await;
    assert_eq!(result.build.status, Status::InternalError);
    assert!(
        result
            .build
            .message
            .starts_with("no reference libraries found in")
    );
    assert!(result.tests.is_none());
}

#[tokio::test]
async fn harness_failures_hide_tests() {
    let grader = Grader::with_parts(
        config(&lib_dir()),
        FakeCompiler::new(Outcome::Clean, Outcome::Clean),
        FailingEngine,
    )
    .with_base_dir(scratch("base"));
    let result = grader.grade_line(&request(CALC_TEST, CALC)).await;
    assert_eq!(result.build.status, Status::InternalError);
    assert_eq!(
        result.build.message,
        "test execution failed: could not start the JVM"
    );
    assert!(result.tests.is_none());
}

#[tokio::test]
async fn slow_tests_hit_the_configured_deadline() {
    let grader = Grader::with_parts(
        config(&lib_dir()).with_java_timeout(std::time::Duration::from_millis(100)),
        FakeCompiler::new(Outcome::Clean, Outcome::Clean),
        StuckEngine,
    )
    .with_base_dir(scratch("base"));
    let result = grader.grade_line(&request(CALC_TEST, CALC)).await;
    assert_eq!(result.build.status, Status::InternalError);
    assert!(result.build.message.starts_with("test execution failed: "));
    assert!(result.build.message.contains("timed out"));
    assert!(result.tests.is_none());
}

#[tokio::test]
async fn artifacts_can_be_rerun() {
    let lib = lib_dir();
    let cfg = config(&lib);
    let work = cfg.work_dir().to_path_buf();
    let grader = Grader::with_parts(
        cfg,
        FakeCompiler::new(Outcome::Clean, Outcome::Clean),
        PassingEngine,
    )
    .with_base_dir(scratch("base"));

    let build = grader
        .build(&umm_grader::java::parse_request(&request(CALC_TEST, CALC)).unwrap())
        .await;
    assert!(build.is_ok());

    let tests = grader.run_artifact(&work.join("main")).await.unwrap();
    assert_eq!(tests, vec![TestResult::passed("CalcTest > works()")]);
}

#[test]
fn grade_results_round_trip() {
    let results = [
        GradeResult::with_tests(vec![
            TestResult::passed("CalcTest > works()"),
            TestResult::failed("CalcTest > breaks()", "java.lang.AssertionError\n\tat x"),
        ]),
        GradeResult::build_only(BuildResult::error(vec![CompileError {
            filename:  "Calc.java".into(),
            message:   "';' expected".into(),
            line:      5,
            character: 10,
        }])),
        GradeResult::build_only(BuildResult::internal("empty input")),
    ];

    for result in results {
        let json = serde_json::to_string(&result).unwrap();
        let back: GradeResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back, result);
        assert_eq!(json.contains("\"tests\""), result.build.status == Status::Ok);
    }
}
