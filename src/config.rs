#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex, OnceLock},
    time::Duration,
};

use crate::constants::{
    DEFAULT_IMPLICIT_IMPORTS, DEFAULT_JAVA_RELEASE, DEFAULT_LIB_DIR, DEFAULT_WORK_DIR,
};

/// Settings for one grading process, read from the environment.
#[derive(Debug, Clone)]
pub struct GraderConfig {
    /// Directory holding the reference jars (JUnit standalone and friends).
    lib_dir:          PathBuf,
    /// Scratch directory for materialized sources and the compiled artifact.
    work_dir:         PathBuf,
    /// Number of concurrent test launchers.
    workers:          usize,
    /// Value passed to `javac --release`.
    java_release:     u32,
    /// Maximum time allowed for each javac invocation.
    javac_timeout:    Duration,
    /// Maximum time allowed for a whole test run.
    java_timeout:     Duration,
    /// Packages imported on demand into every submitted file.
    implicit_imports: Vec<String>,
}

impl GraderConfig {
    /// Builds a configuration from `UMM_*` environment variables, falling back
    /// to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let lib_dir = std::env::var("UMM_GRADER_LIB_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_LIB_DIR));
        let work_dir = std::env::var("UMM_GRADER_WORK_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_WORK_DIR));
        let workers = std::env::var("UMM_GRADER_WORKERS")
            .ok()
            .and_then(|value| value.parse::<usize>().ok())
            .filter(|n| *n > 0)
            .unwrap_or_else(default_workers);
        let java_release = std::env::var("UMM_JAVA_RELEASE")
            .ok()
            .and_then(|value| value.parse::<u32>().ok())
            .unwrap_or(DEFAULT_JAVA_RELEASE);
        let implicit_imports = std::env::var("UMM_GRADER_IMPORTS")
            .map(|value| parse_imports(&value))
            .unwrap_or_else(|_| default_imports());

        Self {
            lib_dir,
            work_dir,
            workers,
            java_release,
            javac_timeout: read_timeout_secs("UMM_JAVAC_TIMEOUT_SECS", 30),
            java_timeout: read_timeout_secs("UMM_JAVA_TIMEOUT_SECS", 60),
            implicit_imports,
        }
    }

    /// Configuration rooted at explicit directories with default settings.
    pub fn new(lib_dir: impl Into<PathBuf>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            lib_dir:          lib_dir.into(),
            work_dir:         work_dir.into(),
            workers:          default_workers(),
            java_release:     DEFAULT_JAVA_RELEASE,
            javac_timeout:    Duration::from_secs(30),
            java_timeout:     Duration::from_secs(60),
            implicit_imports: default_imports(),
        }
    }

    /// Reference library directory.
    pub fn lib_dir(&self) -> &Path {
        self.lib_dir.as_path()
    }

    /// Scratch directory.
    pub fn work_dir(&self) -> &Path {
        self.work_dir.as_path()
    }

    /// Number of concurrent test launchers.
    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Target Java release.
    pub fn java_release(&self) -> u32 {
        self.java_release
    }

    /// Deadline for one javac run.
    pub fn javac_timeout(&self) -> Duration {
        self.javac_timeout
    }

    /// Deadline for a test run.
    pub fn java_timeout(&self) -> Duration {
        self.java_timeout
    }

    /// Implicit on-demand imports.
    pub fn implicit_imports(&self) -> &[String] {
        &self.implicit_imports
    }

    /// Returns a copy with a different worker count.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Returns a copy with a different test deadline.
    pub fn with_java_timeout(mut self, timeout: Duration) -> Self {
        self.java_timeout = timeout;
        self
    }

    /// Returns a copy with a different import prelude.
    pub fn with_implicit_imports(mut self, imports: Vec<String>) -> Self {
        self.implicit_imports = imports;
        self
    }
}

impl Default for GraderConfig {
    fn default() -> Self {
        Self::new(DEFAULT_LIB_DIR, DEFAULT_WORK_DIR)
    }
}

/// Splits a comma separated import list, dropping blanks.
fn parse_imports(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_owned)
        .collect()
}

/// The built-in import prelude.
fn default_imports() -> Vec<String> {
    DEFAULT_IMPLICIT_IMPORTS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// One launcher per available core.
fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Parses an environment variable into a `Duration`, falling back to
/// `default_secs` when parsing fails or the variable is missing.
fn read_timeout_secs(env: &str, default_secs: u64) -> Duration {
    std::env::var(env)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or_else(|| Duration::from_secs(default_secs))
}

/// Shared configuration handle used throughout the crate.
#[derive(Clone)]
pub struct ConfigHandle(Arc<GraderConfig>);

impl std::ops::Deref for ConfigHandle {
    type Target = GraderConfig;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Global storage for the lazily constructed configuration.
static CONFIG_SLOT: OnceLock<Mutex<Option<Arc<GraderConfig>>>> = OnceLock::new();

/// Returns the mutex guarding the global configuration slot.
fn slot() -> &'static Mutex<Option<Arc<GraderConfig>>> {
    CONFIG_SLOT.get_or_init(|| Mutex::new(None))
}

/// Returns the active configuration, reading the environment on first use.
pub fn get() -> ConfigHandle {
    let mut guard = slot()
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    if let Some(cfg) = guard.as_ref() {
        return ConfigHandle(Arc::clone(cfg));
    }

    let cfg = Arc::new(GraderConfig::from_env());
    *guard = Some(Arc::clone(&cfg));
    ConfigHandle(cfg)
}
