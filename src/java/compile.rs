#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

//! Drives javac over an [`AssembledUnit`].

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use futures::future::BoxFuture;
use tracing::{debug, info, instrument, warn};
use typed_builder::TypedBuilder;

use super::{
    artifact::Artifact,
    assemble::{AssembledUnit, SourceMap},
    diagnostics::{Diagnostic, parse_javac_output},
};
use crate::{
    constants::{
        ARTIFACT_NAME, DEFAULT_JAVA_RELEASE, JUNIT_PLATFORM, MAX_ERRORS, SOURCES_DIR,
    },
    error::GraderError,
    process::{TimedOut, run_collect},
    util::{find_files, javac_path, join_classpath},
};

/// How much debug information goes into class files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Optimization {
    /// Full debug tables (`-g`).
    Debug,
    /// Only what stack traces need (`-g:source,lines`).
    #[default]
    Release,
}

/// Which warnings javac should print.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WarningLevel {
    /// No warnings at all.
    #[default]
    None,
    /// javac's default set.
    Default,
    /// Every lint.
    All,
}

/// Settings shared by both compilation phases.
#[derive(Debug, Clone, TypedBuilder)]
pub struct CompileOptions {
    /// `--release` target.
    #[builder(default = DEFAULT_JAVA_RELEASE)]
    pub release:      u32,
    /// Debug information level.
    #[builder(default)]
    pub optimization: Optimization,
    /// Warning threshold.
    #[builder(default)]
    pub warnings:     WarningLevel,
    /// Cap on reported errors.
    #[builder(default = MAX_ERRORS)]
    pub max_errors:   u32,
    /// Deadline for each javac run.
    #[builder(default = Duration::from_secs(30))]
    pub timeout:      Duration,
    /// Jars the unit compiles against.
    #[builder(default, setter(into))]
    pub classpath:    Vec<PathBuf>,
}

impl CompileOptions {
    /// Flags common to every javac invocation, without sources or output
    /// directory.
    pub fn javac_args(&self) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-encoding".into(),
            "UTF-8".into(),
            "-J-Duser.language=en".into(),
            "-J-Duser.country=US".into(),
            "-proc:none".into(),
            "--release".into(),
            self.release.to_string().into(),
            "-Xmaxerrs".into(),
            self.max_errors.to_string().into(),
        ];

        args.push(
            match self.optimization {
                Optimization::Debug => "-g",
                Optimization::Release => "-g:source,lines",
            }
            .into(),
        );

        match self.warnings {
            WarningLevel::None => {
                args.push("-nowarn".into());
                args.push("-Xlint:none".into());
            }
            WarningLevel::Default => {}
            WarningLevel::All => args.push("-Xlint:all".into()),
        }

        if !self.classpath.is_empty() {
            args.push("--class-path".into());
            args.push(join_classpath(&self.classpath).into());
        }
        args
    }
}

/// Jars every submission is compiled and run against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceLibraries {
    /// Directory the jars were found in.
    dir:  PathBuf,
    /// The jars, sorted.
    jars: Vec<PathBuf>,
}

impl ReferenceLibraries {
    /// Finds every jar below `lib_dir`.
    ///
    /// Having none is a misconfiguration of the grading environment, not a
    /// problem with the submission.
    pub fn discover(lib_dir: &Path) -> Result<Self, GraderError> {
        let mut jars = if lib_dir.is_dir() {
            find_files("jar", 2, lib_dir)?
        } else {
            Vec::new()
        };
        jars.sort();

        if jars.is_empty() {
            return Err(GraderError::NoReferences(format!(
                "{} (expected at least {JUNIT_PLATFORM})",
                lib_dir.display()
            )));
        }

        debug!(dir = %lib_dir.display(), jars = jars.len(), "found reference libraries");
        Ok(Self {
            dir: lib_dir.to_path_buf(),
            jars,
        })
    }

    /// Uses an explicit list of jars.
    pub fn from_jars(dir: impl Into<PathBuf>, jars: Vec<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            jars,
        }
    }

    /// Directory the jars live in.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// All jars.
    pub fn jars(&self) -> &[PathBuf] {
        &self.jars
    }
}

/// What one compiler run reported.
#[derive(Debug, Clone, Default)]
pub struct CompilerOutput {
    /// Whether the compiler exited successfully.
    pub success:     bool,
    /// Parsed diagnostics, errors and warnings.
    pub diagnostics: Vec<Diagnostic>,
    /// Everything the compiler printed.
    pub raw:         String,
}

impl CompilerOutput {
    /// Diagnostics with error severity.
    pub fn errors(&self) -> Vec<Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.severity.is_error())
            .cloned()
            .collect()
    }
}

/// Something that can check and emit a set of source files.
pub trait Compiler: Send + Sync {
    /// Runs semantic analysis only; nothing is written.
    fn analyze<'a>(
        &'a self,
        sources: &'a SourceMap,
        options: &'a CompileOptions,
    ) -> BoxFuture<'a, Result<CompilerOutput, GraderError>>;

    /// Writes class files for `sources` into `out_dir`.
    fn emit<'a>(
        &'a self,
        sources: &'a SourceMap,
        options: &'a CompileOptions,
        out_dir: &'a Path,
    ) -> BoxFuture<'a, Result<CompilerOutput, GraderError>>;
}

/// The JDK compiler found on `PATH`.
#[derive(Debug, Clone, Default)]
pub struct Javac;

impl Javac {
    /// Runs javac with `extra` flags on every file in `sources`.
    async fn invoke(
        &self,
        sources: &SourceMap,
        options: &CompileOptions,
        extra: Vec<OsString>,
    ) -> Result<CompilerOutput, GraderError> {
        let javac = javac_path()?;
        let mut args = options.javac_args();
        args.extend(extra);
        args.extend(sources.paths().map(|p| p.as_os_str().to_os_string()));

        let collected = run_collect(&javac, &args, None, Some(options.timeout))
            .await
            .map_err(|e| match e.downcast_ref::<TimedOut>() {
                Some(TimedOut(after)) => GraderError::Timeout {
                    what:  "javac",
                    after: *after,
                },
                None => GraderError::Other(e.context("Failed to spawn javac process.")),
            })?;

        let raw = collected.combined();
        Ok(CompilerOutput {
            success: collected.status.success(),
            diagnostics: parse_javac_output(&raw),
            raw,
        })
    }
}

impl Compiler for Javac {
    fn analyze<'a>(
        &'a self,
        sources: &'a SourceMap,
        options: &'a CompileOptions,
    ) -> BoxFuture<'a, Result<CompilerOutput, GraderError>> {
        Box::pin(async move {
            // Stop after flow analysis; nothing reaches the output directory,
            // but `-d` must still point somewhere writable.
            let scratch = std::env::temp_dir().join(format!("umm-analyze-{}", uuid::Uuid::new_v4()));
            let result = self
                .invoke(sources, options, vec![
                    "-XDshould-stop.ifNoError=FLOW".into(),
                    "-XDshould-stop.ifError=FLOW".into(),
                    "-d".into(),
                    scratch.clone().into_os_string(),
                ])
                .await;
            let _ = fs::remove_dir_all(&scratch);
            result
        })
    }

    fn emit<'a>(
        &'a self,
        sources: &'a SourceMap,
        options: &'a CompileOptions,
        out_dir: &'a Path,
    ) -> BoxFuture<'a, Result<CompilerOutput, GraderError>> {
        Box::pin(async move {
            self.invoke(sources, options, vec![
                "-d".into(),
                out_dir.as_os_str().to_os_string(),
            ])
            .await
        })
    }
}

/// Outcome of compiling an assembled unit.
#[derive(Debug, Clone)]
pub struct Compilation {
    /// The compiled artifact, when compilation succeeded.
    pub artifact:    Option<Artifact>,
    /// Error diagnostics, in compiler order.
    pub diagnostics: Vec<Diagnostic>,
    /// Path table for mapping diagnostics back to submitted files.
    pub source_map:  SourceMap,
    /// Raw compiler output when emission failed without diagnostics.
    pub message:     Option<String>,
}

impl Compilation {
    /// Whether an artifact was produced.
    pub fn succeeded(&self) -> bool {
        self.artifact.is_some()
    }

    /// A failed compilation with the given errors.
    fn failed(diagnostics: Vec<Diagnostic>, source_map: SourceMap, message: Option<String>) -> Self {
        Self {
            artifact: None,
            diagnostics,
            source_map,
            message,
        }
    }
}

/// Compiles `unit` below `work_dir` in two phases.
///
/// Sources are written to `<work_dir>/sources` and class files to
/// `<work_dir>/main`. Emission only happens when analysis reported no errors.
#[instrument(skip_all, fields(work = %work_dir.display(), files = unit.trees().len()))]
pub async fn compile<C: Compiler + ?Sized>(
    compiler: &C,
    unit: &AssembledUnit,
    options: &CompileOptions,
    work_dir: &Path,
) -> Result<Compilation, GraderError> {
    let out_dir = work_dir.join(ARTIFACT_NAME);
    if out_dir.exists() {
        fs::remove_dir_all(&out_dir)
            .with_context(|| format!("Could not clear {}", out_dir.display()))?;
    }
    fs::create_dir_all(&out_dir)
        .with_context(|| format!("Could not create {}", out_dir.display()))?;

    let test_classes = unit.test_classes()?;

    if unit.is_empty() {
        info!("nothing to compile");
        let artifact = Artifact::new(out_dir.clone(), test_classes);
        artifact.write_manifest()?;
        return Ok(Compilation {
            artifact:    Some(artifact),
            diagnostics: vec![],
            source_map:  SourceMap::default(),
            message:     None,
        });
    }

    let source_map = unit.materialize(&work_dir.join(SOURCES_DIR))?;

    let analysis = compiler.analyze(&source_map, options).await?;
    let errors = analysis.errors();
    if !errors.is_empty() {
        info!(errors = errors.len(), "analysis failed");
        return Ok(Compilation::failed(errors, source_map, None));
    }
    if !analysis.success {
        // Analysis that fails silently is retried by emission, which reports
        // the same way javac would for a normal build.
        warn!(output = %analysis.raw, "analysis exited unsuccessfully without errors");
    }

    let emission = compiler.emit(&source_map, options, &out_dir).await?;
    let errors = emission.errors();
    if !errors.is_empty() {
        info!(errors = errors.len(), "emission failed");
        return Ok(Compilation::failed(errors, source_map, None));
    }
    if !emission.success {
        let raw = emission.raw.trim().to_string();
        let message = if raw.is_empty() {
            "compiler exited unsuccessfully".to_string()
        } else {
            raw
        };
        return Ok(Compilation::failed(vec![], source_map, Some(message)));
    }

    let artifact = Artifact::new(out_dir, test_classes);
    artifact.write_manifest()?;
    info!(candidates = artifact.test_classes().len(), "compiled");
    Ok(Compilation {
        artifact: Some(artifact),
        diagnostics: vec![],
        source_map,
        message: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_silence_warnings() {
        let args = CompileOptions::builder().build().javac_args();
        let args: Vec<_> = args.iter().map(|a| a.to_string_lossy().into_owned()).collect();
        assert!(args.contains(&"-nowarn".to_string()));
        assert!(args.contains(&"-Xlint:none".to_string()));
        assert!(args.contains(&"-g:source,lines".to_string()));
        let release = args.iter().position(|a| a == "--release").unwrap();
        assert_eq!(args[release + 1], DEFAULT_JAVA_RELEASE.to_string());
        assert!(!args.contains(&"--class-path".to_string()));
    }

    #[test]
    fn classpath_is_joined() {
        let options = CompileOptions::builder()
            .classpath(vec![PathBuf::from("a.jar"), PathBuf::from("b.jar")])
            .warnings(WarningLevel::All)
            .build();
        let args: Vec<_> = options
            .javac_args()
            .iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        let cp = args.iter().position(|a| a == "--class-path").unwrap();
        assert_eq!(args[cp + 1], join_classpath(["a.jar", "b.jar"]));
        assert!(args.contains(&"-Xlint:all".to_string()));
    }
}
