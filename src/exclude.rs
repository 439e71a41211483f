//! Source-file exclusion for the interception hot path
//!
//! Calls originating from an excluded file are never recorded and never
//! reach the hook registry. The engine's own implementation files are always
//! excluded so tracer machinery cannot pollute the trace it produces.

use std::collections::HashSet;
use std::path::Path;

/// Engine implementation files, excluded in every configuration
const INTERNAL_FILES: &[&str] = &[
    file!(),
    crate::engine::SOURCE_FILE,
    crate::hooks::SOURCE_FILE,
    crate::recorder::SOURCE_FILE,
    crate::console::SOURCE_FILE,
    crate::instrument::SOURCE_FILE,
];

/// Set of file paths whose calls are filtered out before recording
#[derive(Debug, Clone)]
pub struct ExcludeSet {
    paths: HashSet<String>,
}

impl ExcludeSet {
    /// Create the default set containing only the engine's own files
    pub fn internal() -> Self {
        let paths = INTERNAL_FILES.iter().map(|p| canonical_key(p)).collect();
        Self { paths }
    }

    /// Add one file path to the set
    pub fn insert(&mut self, path: impl AsRef<Path>) {
        self.paths.insert(canonical_key(&path.as_ref().to_string_lossy()));
    }

    /// Add every path in the iterator
    pub fn extend<I, P>(&mut self, paths: I)
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        for path in paths {
            self.insert(path);
        }
    }

    /// Is this source file excluded from interception?
    pub fn is_excluded(&self, file: &str) -> bool {
        self.paths.contains(&canonical_key(file))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl Default for ExcludeSet {
    fn default() -> Self {
        Self::internal()
    }
}

/// Separator-insensitive comparison key; capture-time paths may be
/// host-native while configured paths are not
fn canonical_key(path: &str) -> String {
    path.replace('\\', "/")
}
