//! Read-only pattern lookup table built once at startup.

use std::path::{Path, PathBuf};

use regex::Regex;

use crate::error::{ConfigError, ConfigResult};
use crate::model::DeployTarget;

/// A compiled match pattern tied to its raw configuration string, which
/// doubles as the pattern's lookup key in watch results.
#[derive(Clone, Debug)]
pub struct FolderPattern {
    raw: String,
    matcher: Regex,
}

impl FolderPattern {
    /// Compile a raw pattern string.
    ///
    /// # Errors
    ///
    /// Returns the compilation error when `raw` is not a valid pattern.
    pub fn new(raw: impl Into<String>) -> Result<Self, regex::Error> {
        let raw = raw.into();
        let matcher = Regex::new(&raw)?;
        Ok(Self { raw, matcher })
    }

    /// The raw configuration string this pattern was compiled from.
    #[must_use]
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// Test an event path against the pattern.
    #[must_use]
    pub fn is_match(&self, path: &str) -> bool {
        self.matcher.is_match(path)
    }
}

/// Lookup table over the configured targets: folder to ordered patterns,
/// and (folder, pattern) back to the owning target.
///
/// Never mutated after construction, so it is freely shared across
/// concurrent readers.
#[derive(Debug)]
pub struct PatternRegistry {
    targets: Vec<DeployTarget>,
    folders: Vec<(PathBuf, Vec<FolderPattern>)>,
}

impl PatternRegistry {
    /// Build the registry, compiling every target's pattern. Folders keep
    /// their first-appearance order and each folder's patterns keep
    /// configuration order.
    ///
    /// # Errors
    ///
    /// Returns an error when a target's pattern does not compile
    /// (startup-fatal).
    pub fn new(targets: Vec<DeployTarget>) -> ConfigResult<Self> {
        let mut folders: Vec<(PathBuf, Vec<FolderPattern>)> = Vec::new();
        for (index, target) in targets.iter().enumerate() {
            let pattern =
                FolderPattern::new(&target.pattern).map_err(|source| ConfigError::InvalidPattern {
                    index,
                    pattern: target.pattern.clone(),
                    source,
                })?;
            match folders.iter_mut().find(|(folder, _)| folder == &target.folder) {
                Some((_, patterns)) => patterns.push(pattern),
                None => folders.push((target.folder.clone(), vec![pattern])),
            }
        }
        Ok(Self { targets, folders })
    }

    /// All patterns registered against `folder`, in configuration order.
    /// Empty when the folder is not configured.
    #[must_use]
    pub fn patterns_for_folder(&self, folder: &Path) -> &[FolderPattern] {
        self.folders
            .iter()
            .find(|(candidate, _)| candidate == folder)
            .map_or(&[], |(_, patterns)| patterns.as_slice())
    }

    /// Resolve a matched (folder, pattern) pair back to its target.
    ///
    /// `None` means the event matches nothing currently registered; the
    /// caller is expected to drop the event, not fail. Duplicate
    /// (folder, pattern) entries resolve to the first one configured.
    #[must_use]
    pub fn target_for(&self, folder: &Path, pattern: &str) -> Option<&DeployTarget> {
        self.targets
            .iter()
            .find(|target| target.folder == folder && target.pattern == pattern)
    }

    /// Distinct watch folders with their pattern sets, used once at
    /// startup to launch one watcher per folder.
    #[must_use]
    pub fn folders(&self) -> impl Iterator<Item = (&Path, &[FolderPattern])> {
        self.folders
            .iter()
            .map(|(folder, patterns)| (folder.as_path(), patterns.as_slice()))
    }

    /// The configured targets, in configuration order.
    #[must_use]
    pub fn targets(&self) -> &[DeployTarget] {
        &self.targets
    }
}
