#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

/// Default directory holding reference jars.
pub const DEFAULT_LIB_DIR: &str = "lib";

/// Default scratch directory for builds.
pub const DEFAULT_WORK_DIR: &str = "target/umm-grader";

/// Name of the compiled artifact directory inside the work directory.
pub const ARTIFACT_NAME: &str = "main";

/// Name of the directory submitted sources are materialized into.
pub const SOURCES_DIR: &str = "sources";

/// Default `--release` passed to javac.
pub const DEFAULT_JAVA_RELEASE: u32 = 17;

/// Cap on the number of errors javac reports.
pub const MAX_ERRORS: u32 = 100;

/// Name of the method treated as a program entry point.
pub const ENTRY_POINT: &str = "main";

/// Filename attached to the implicit imports prelude.
pub const PRELUDE_FILENAME: &str = "GlobalImports.java";

/// Packages imported on demand into every submitted file, mirroring what a
/// typical course template pulls in.
pub const DEFAULT_IMPLICIT_IMPORTS: &[&str] = &[
    "java.util",
    "java.util.function",
    "java.util.stream",
    "java.io",
    "java.math",
];

/// Main class of the JUnit Platform console launcher.
pub const JUNIT_LAUNCHER: &str = "org.junit.platform.console.ConsoleLauncher";

/// file name for JUnit platform console standard jar
pub const JUNIT_PLATFORM: &str = "junit-platform-console-standalone-1.10.2.jar";

/// Name of the manifest listing test classes inside an artifact directory.
pub const MANIFEST_NAME: &str = ".umm-tests";
