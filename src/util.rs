#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    collections::HashSet,
    ffi::OsString,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use glob::glob;
use which::which;

use crate::error::GraderError;

/// Finds and returns the path to javac binary
pub fn javac_path() -> Result<OsString, GraderError> {
    which("javac")
        .map(PathBuf::into_os_string)
        .map_err(|_| GraderError::Toolchain("Cannot find a Java Compiler on path (javac)".into()))
}

/// Finds and returns the path to java binary
pub fn java_path() -> Result<OsString, GraderError> {
    which("java")
        .map(PathBuf::into_os_string)
        .map_err(|_| GraderError::Toolchain("Cannot find a Java runtime on path (java)".into()))
}

/// A glob utility function to find paths to files with certain extension
///
/// * `extension`: the file extension to find paths for
/// * `search_depth`: how many folders deep to search for
/// * `root_dir`: the root directory where search starts
pub fn find_files(extension: &str, search_depth: i8, root_dir: &Path) -> Result<Vec<PathBuf>> {
    let mut pattern = root_dir.to_path_buf();

    for _ in 0..search_depth {
        pattern.push("**");
    }

    pattern.push(format!("*.{extension}"));
    let pattern = pattern
        .to_str()
        .context("Could not convert root_dir to string")?
        .to_string();

    let mut found: Vec<PathBuf> = glob(&pattern)
        .context("Could not create glob")?
        .filter_map(Result::ok)
        .collect();
    // `**` patterns can match the same file through several prefixes.
    let mut seen = HashSet::new();
    found.retain(|p| seen.insert(p.clone()));
    Ok(found)
}

/// Returns the platform specific separator character for javac paths.
pub fn path_separator() -> &'static str {
    if cfg!(windows) { ";" } else { ":" }
}

/// Joins classpath entries, dropping duplicates without disturbing order.
pub fn join_classpath<I, P>(entries: I) -> String
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    let mut seen = HashSet::new();
    entries
        .into_iter()
        .map(|p| p.as_ref().display().to_string())
        .filter(|entry| seen.insert(entry.clone()))
        .collect::<Vec<_>>()
        .join(path_separator())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classpath_keeps_first_occurrence() {
        let joined = join_classpath(["a", "b", "a", "c"]);
        let sep = path_separator();
        assert_eq!(joined, ["a", "b", "c"].join(sep));
    }

    #[test]
    fn find_files_on_missing_dir_is_empty() {
        let dir = std::env::temp_dir().join(format!("umm-missing-{}", uuid::Uuid::new_v4()));
        assert!(find_files("jar", 2, &dir).unwrap().is_empty());
    }
}
