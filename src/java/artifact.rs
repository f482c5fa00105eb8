#![warn(missing_docs)]
#![warn(clippy::missing_docs_in_private_items)]

use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::compile::ReferenceLibraries;
use crate::{constants::MANIFEST_NAME, util::find_files};

/// A compiled submission: a class directory plus the test classes in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    /// Directory holding the class files.
    dir:          PathBuf,
    /// Binary names of the classes to hand to the test engine.
    test_classes: Vec<String>,
}

/// On-disk form of the test class list.
#[derive(Debug, Default, Serialize, Deserialize)]
struct Manifest {
    /// Fully qualified test class names.
    test_classes: Vec<String>,
}

impl Artifact {
    /// Creates an artifact description for `dir`.
    pub fn new(dir: impl Into<PathBuf>, test_classes: Vec<String>) -> Self {
        Self {
            dir: dir.into(),
            test_classes,
        }
    }

    /// Loads an artifact compiled earlier, reading its manifest.
    ///
    /// A directory without a manifest is treated as having no tests.
    pub fn load(dir: &Path) -> Result<Self> {
        if !dir.is_dir() {
            anyhow::bail!("Artifact directory {} does not exist", dir.display());
        }

        let manifest_path = dir.join(MANIFEST_NAME);
        let manifest = if manifest_path.exists() {
            let text = fs::read_to_string(&manifest_path)
                .with_context(|| format!("Could not read {}", manifest_path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("Could not decode {}", manifest_path.display()))?
        } else {
            debug!(dir = %dir.display(), "artifact has no manifest");
            Manifest::default()
        };

        Ok(Self::new(dir, manifest.test_classes))
    }

    /// Records the test classes next to the class files.
    pub fn write_manifest(&self) -> Result<()> {
        let path = self.dir.join(MANIFEST_NAME);
        let text = serde_json::to_string(&Manifest {
            test_classes: self.test_classes.clone(),
        })
        .context("Could not encode artifact manifest")?;
        fs::write(&path, text).with_context(|| format!("Could not write {}", path.display()))
    }

    /// Class directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Binary names of the classes to hand to the test engine.
    pub fn test_classes(&self) -> &[String] {
        &self.test_classes
    }
}

/// Decides where the runtime finds the classes an artifact depends on.
///
/// Lookups go to the artifact itself, then to jars sitting in `base_dir`,
/// then to the reference libraries.
#[derive(Debug, Clone)]
pub struct ClasspathResolver {
    /// Directory searched for jars before the reference libraries.
    base_dir:   PathBuf,
    /// Fallback jars.
    references: ReferenceLibraries,
}

impl ClasspathResolver {
    /// Resolver rooted at `base_dir`.
    pub fn new(base_dir: impl Into<PathBuf>, references: ReferenceLibraries) -> Self {
        Self {
            base_dir: base_dir.into(),
            references,
        }
    }

    /// Resolver rooted at the directory of the running executable.
    pub fn beside_executable(references: ReferenceLibraries) -> Self {
        let base_dir = std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."));
        Self::new(base_dir, references)
    }

    /// Base directory.
    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Classpath entries for running `artifact`, in lookup order and without
    /// duplicates.
    pub fn resolve(&self, artifact: &Artifact) -> Result<Vec<PathBuf>> {
        let mut entries = vec![artifact.dir().to_path_buf()];

        if self.base_dir.is_dir() {
            let mut local = find_files("jar", 0, &self.base_dir)?;
            local.sort();
            entries.extend(local);
        }
        entries.extend(self.references.jars().iter().cloned());

        let mut seen = std::collections::HashSet::new();
        entries.retain(|p| seen.insert(p.clone()));
        Ok(entries)
    }
}
