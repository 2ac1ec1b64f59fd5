//! Execution engine collaborator interfaces.
//!
//! The store never talks to a scheduler or class loader directly; it calls
//! through these narrow traits so the engine can be faked in tests. The
//! engine owns the keyed block store, the distributable file/archive
//! registrations, the filesystem forwarding driver, and the file-serving
//! facility that makes the artifact root externally reachable.

use crate::error::StoreResult;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Externally reachable address of a served file or directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(address: impl Into<String>) -> Self {
        Address(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Append a relative suffix, normalizing the separator.
    pub fn join(&self, suffix: &str) -> Address {
        Address(format!(
            "{}/{}",
            self.0.trim_end_matches('/'),
            suffix.trim_start_matches('/')
        ))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Canonical locator for a distributable archive, with an optional fragment
/// carried through to the engine (e.g. an unpack directory name).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveLocator {
    pub path: PathBuf,
    pub fragment: Option<String>,
}

impl ArchiveLocator {
    pub fn new(path: PathBuf, fragment: Option<String>) -> Self {
        Self { path, fragment }
    }
}

impl fmt::Display for ArchiveLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.fragment {
            Some(fragment) => write!(f, "{}#{}", self.path.display(), fragment),
            None => write!(f, "{}", self.path.display()),
        }
    }
}

/// Synchronous calls into the execution engine made during commit and
/// teardown. Implementations may block on their own I/O; the store never
/// retries them.
pub trait ExecutionEngine: Send + Sync {
    /// Store staged content in the keyed block store under (user, session, key).
    /// The engine chooses replication and serialization policy.
    fn put_cache_block(
        &self,
        user_id: &str,
        session_id: &str,
        key: &str,
        staged_file: &Path,
    ) -> StoreResult<()>;

    /// Drop every block-store entry keyed by (user, session).
    fn remove_session_blocks(&self, user_id: &str, session_id: &str) -> StoreResult<()>;

    /// Register a committed file for distribution to workers.
    fn register_file(&self, path: &Path) -> StoreResult<()>;

    /// Register a committed archive for distribution to workers.
    fn register_archive(&self, locator: &ArchiveLocator) -> StoreResult<()>;

    /// Whether a forward destination resolves to the local filesystem driver.
    fn destination_is_local(&self, destination: &Path) -> bool;

    /// Copy a staged file to an external filesystem destination.
    fn forward_to_filesystem(&self, staged_file: &Path, destination: &Path) -> StoreResult<()>;
}

/// The hosting execution context. Its identity changes when the context is
/// torn down and recreated (restart and test scenarios); the root location
/// cache keys off that identity.
pub trait HostContext: Send + Sync {
    /// Identity of the currently active context, or `None` if no context is
    /// active.
    fn active_epoch(&self) -> Option<u64>;

    /// Register a directory with the context's file-serving facility and
    /// return its externally reachable address.
    fn serve_directory(&self, dir: &Path) -> StoreResult<Address>;
}
