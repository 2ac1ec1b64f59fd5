//! Error types for the artifact store.
//!
//! Duplicate artifacts and forbidden forwards are recoverable business
//! errors scoped to a single commit; path preconditions fail before any
//! filesystem access; engine and I/O failures propagate as-is.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by commit, view, and teardown operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An artifact path must be relative; an absolute path is a caller bug.
    #[error("artifact path must be relative, got absolute path: {0}")]
    AbsolutePath(PathBuf),

    /// A `..` component would resolve outside the session subtree.
    #[error("artifact path escapes the session directory: {0}")]
    PathEscapesSession(PathBuf),

    /// A non-class artifact already exists at the target path.
    #[error("artifact already committed at {0}")]
    DuplicateArtifact(PathBuf),

    /// Forwarding to the local filesystem is refused unless explicitly allowed.
    #[error("forwarding to local filesystem destination {0} is not allowed")]
    ForbiddenLocalForward(PathBuf),

    /// A call into the execution engine failed.
    #[error("execution engine error: {0}")]
    Engine(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result alias used throughout the store.
pub type StoreResult<T> = Result<T, StoreError>;
