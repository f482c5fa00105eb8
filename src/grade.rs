#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Sequences assembly, compilation and testing into one [`GradeResult`].

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tracing::{debug, info, instrument, warn};

use crate::{
    config::GraderConfig,
    error::GraderError,
    java::{
        Artifact, ClasspathResolver, CompileOptions, Compilation, Compiler, JUnitEngine, Javac,
        ReferenceLibraries, TestEngine, TestHarness, assemble, compile, parse_request, translate,
    },
    types::{BuildResult, GradeResult, Submission, TestResult},
};

/// Grades submissions with a compiler and a test engine.
pub struct Grader<C = Javac, E = JUnitEngine> {
    /// Settings for every run.
    config:   GraderConfig,
    /// Compiles assembled units.
    compiler: C,
    /// Runs compiled tests.
    engine:   Arc<E>,
    /// Directory searched for extra jars at run time; defaults to the
    /// executable's directory.
    base_dir: Option<PathBuf>,
}

impl Grader {
    /// A grader using javac and the JUnit console launcher.
    pub fn new(config: GraderConfig) -> Self {
        let workers = config.workers();
        Self::with_parts(config, Javac, JUnitEngine::new(workers))
    }
}

impl<C: Compiler, E: TestEngine + 'static> Grader<C, E> {
    /// A grader using the given compiler and engine.
    pub fn with_parts(config: GraderConfig, compiler: C, engine: E) -> Self {
        Self {
            config,
            compiler,
            engine: Arc::new(engine),
            base_dir: None,
        }
    }

    /// Looks for run time jars in `dir` instead of next to the executable.
    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    /// Settings in use.
    pub fn config(&self) -> &GraderConfig {
        &self.config
    }

    /// Grades one raw request line.
    ///
    /// Input that cannot be decoded is reported as an internal error.
    pub async fn grade_line(&self, line: &str) -> GradeResult {
        match parse_request(line) {
            Ok(submission) => self.grade(&submission).await,
            Err(e) => {
                warn!(error = %e, "rejected request");
                GradeResult::build_only(BuildResult::internal(e.to_string()))
            }
        }
    }

    /// Builds `submission` and, if that succeeds, runs its tests.
    #[instrument(skip_all)]
    pub async fn grade(&self, submission: &Submission) -> GradeResult {
        let (build, artifact) = self.build_artifact(submission).await;
        let artifact = match artifact {
            Some(artifact) if build.is_ok() => artifact,
            _ => return GradeResult::build_only(build),
        };

        match self.run_tests(&artifact).await {
            Ok(tests) => GradeResult::with_tests(tests),
            Err(e) => {
                warn!(error = %e, "test run failed");
                let message = if matches!(e, GraderError::Harness(_)) {
                    e.to_string()
                } else {
                    format!("test execution failed: {e}")
                };
                GradeResult::build_only(BuildResult::internal(message))
            }
        }
    }

    /// Assembles and compiles `submission` without running anything.
    pub async fn build(&self, submission: &Submission) -> BuildResult {
        self.build_artifact(submission).await.0
    }

    /// Runs the tests of an already compiled artifact.
    #[instrument(skip_all, fields(artifact = %artifact.dir().display()))]
    pub async fn run_tests(&self, artifact: &Artifact) -> Result<Vec<TestResult>, GraderError> {
        if artifact.test_classes().is_empty() {
            debug!("artifact has no test classes");
            return Ok(vec![]);
        }

        let references = ReferenceLibraries::discover(self.config.lib_dir())?;
        let resolver = match &self.base_dir {
            Some(dir) => ClasspathResolver::new(dir, references),
            None => ClasspathResolver::beside_executable(references),
        };
        let mut harness =
            TestHarness::new(Arc::clone(&self.engine), resolver, self.config.java_timeout());
        harness.run(artifact).await
    }

    /// Loads the artifact in `dir` and runs its tests.
    pub async fn run_artifact(&self, dir: &Path) -> Result<Vec<TestResult>, GraderError> {
        let artifact = Artifact::load(dir)?;
        self.run_tests(&artifact).await
    }

    /// Builds `submission`, classifying every failure into a [`BuildResult`].
    #[instrument(skip_all)]
    async fn build_artifact(&self, submission: &Submission) -> (BuildResult, Option<Artifact>) {
        let compilation = match self.compile(submission).await {
            Ok(compilation) => compilation,
            Err(e) => {
                warn!(error = %e, "build failed");
                return (BuildResult::internal(e.to_string()), None);
            }
        };

        let Compilation {
            artifact,
            diagnostics,
            source_map,
            message,
        } = compilation;

        match artifact {
            Some(artifact) => (BuildResult::ok(), Some(artifact)),
            None if diagnostics.is_empty() => {
                let message = message.unwrap_or_else(|| "compilation failed".into());
                (BuildResult::error_message(message), None)
            }
            None => {
                let errors = translate(&diagnostics, &source_map);
                info!(errors = errors.len(), "submission does not compile");
                (BuildResult::error(errors), None)
            }
        }
    }

    /// Assembles `submission` and hands it to the compiler.
    async fn compile(&self, submission: &Submission) -> Result<Compilation, GraderError> {
        let unit = assemble(submission, self.config.implicit_imports())?;

        // An empty unit never reaches the compiler, so it needs no references.
        let classpath = if unit.is_empty() {
            vec![]
        } else {
            ReferenceLibraries::discover(self.config.lib_dir())?
                .jars()
                .to_vec()
        };

        let options = CompileOptions::builder()
            .release(self.config.java_release())
            .timeout(self.config.javac_timeout())
            .classpath(classpath)
            .build();

        compile(&self.compiler, &unit, &options, self.config.work_dir()).await
    }
}
