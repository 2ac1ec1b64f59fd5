//! Artifact categorization.
//!
//! The first segment of an artifact's relative path determines its category
//! and, with it, the commit rule that applies. Matching is first-segment
//! equality, not substring search, so a nested directory that happens to be
//! named `jars` never reclassifies an artifact.

use std::path::{Component, Path};

/// Reserved first path segments, the wire format for categorization.
pub const CACHE_PREFIX: &str = "cache";
pub const CLASSES_PREFIX: &str = "classes";
pub const JARS_PREFIX: &str = "jars";
pub const PYFILES_PREFIX: &str = "pyfiles";
pub const ARCHIVES_PREFIX: &str = "archives";
pub const FILES_PREFIX: &str = "files";
pub const FORWARD_PREFIX: &str = "forward_to_fs";

/// Logical category of a staged artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    /// Content stored in the engine's keyed block store, not on disk.
    CacheBlock,
    /// Class file moved into the session class directory, overwrite allowed.
    ClassFile,
    /// Jar appended to the session load path.
    Jar,
    /// Python include registered as a distributable file.
    PyInclude,
    /// Archive registered as a distributable archive.
    Archive,
    /// Plain file registered as a distributable file.
    PlainFile,
    /// No recognized prefix; stored for ad-hoc retrieval only.
    Generic,
    /// Copied out to an external filesystem, never stored locally.
    ForwardToFilesystem,
}

impl Category {
    /// Classify an artifact path by its first path segment.
    ///
    /// Pure and total: every path maps to exactly one category, and the
    /// result depends only on the first segment. A leading `.` is not a
    /// segment and is skipped; a leading root, prefix, or `..` component is
    /// not a reserved segment and classifies as [`Category::Generic`].
    pub fn classify(relative_path: &Path) -> Category {
        let first = relative_path
            .components()
            .find(|c| !matches!(c, Component::CurDir));
        match first {
            Some(Component::Normal(name)) => match name.to_str() {
                Some(CACHE_PREFIX) => Category::CacheBlock,
                Some(CLASSES_PREFIX) => Category::ClassFile,
                Some(JARS_PREFIX) => Category::Jar,
                Some(PYFILES_PREFIX) => Category::PyInclude,
                Some(ARCHIVES_PREFIX) => Category::Archive,
                Some(FILES_PREFIX) => Category::PlainFile,
                Some(FORWARD_PREFIX) => Category::ForwardToFilesystem,
                _ => Category::Generic,
            },
            _ => Category::Generic,
        }
    }
}
