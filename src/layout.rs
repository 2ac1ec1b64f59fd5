//! Session directory layout and the process-wide root location.
//!
//! Every session maps deterministically to `root/<uuid>` with a `classes`
//! subdirectory for redefinable class files; all other artifacts keep their
//! full relative path under the session directory, so the two subtrees stay
//! disjoint. The root is a single temporary directory created once per
//! process and never relocated; only its externally reachable address can go
//! stale, and only when the hosting execution context is replaced.

use crate::category::CLASSES_PREFIX;
use crate::engine::{Address, HostContext};
use crate::error::StoreResult;
use parking_lot::RwLock;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use uuid::Uuid;

/// Deterministic per-session paths under the shared root.
#[derive(Debug)]
pub struct SessionLayout {
    uuid: Uuid,
    session_dir: PathBuf,
    class_dir: PathBuf,
}

impl SessionLayout {
    pub fn new(root: &Path, uuid: Uuid) -> Self {
        let session_dir = root.join(uuid.to_string());
        let class_dir = session_dir.join(CLASSES_PREFIX);
        Self {
            uuid,
            session_dir,
            class_dir,
        }
    }

    /// Directory owning every on-disk artifact of this session.
    pub fn session_dir(&self) -> &Path {
        &self.session_dir
    }

    /// Class directory, the only subtree where overwrites are permitted.
    pub fn class_dir(&self) -> &Path {
        &self.class_dir
    }

    /// Create the session and class directories if missing.
    pub fn ensure_created(&self) -> io::Result<()> {
        fs::create_dir_all(&self.class_dir)
    }

    /// Externally reachable address of the session directory.
    pub fn session_address(&self, root_address: &Address) -> Address {
        root_address.join(&self.uuid.to_string())
    }

    /// Externally reachable address of the class directory.
    pub fn class_dir_address(&self, root_address: &Address) -> Address {
        self.session_address(root_address).join(CLASSES_PREFIX)
    }
}

#[derive(Debug, Clone)]
struct CachedAddress {
    epoch: u64,
    address: Address,
}

/// Process-wide registry for the shared artifact root.
///
/// Owns the physical root directory for all sessions and caches its
/// externally reachable address. The address is recomputed at most once per
/// distinct hosting-context epoch: a reader that observes a stale epoch
/// re-registers the directory under the write lock, and a competing reader
/// that loses the race observes the winner's value.
pub struct RootLocation {
    dir: TempDir,
    cached: RwLock<Option<CachedAddress>>,
}

impl RootLocation {
    /// Create the physical root directory. Called once per process lifetime;
    /// the directory is removed when the store is dropped.
    pub fn new() -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("depot-artifacts-").tempdir()?;
        tracing::debug!(root = %dir.path().display(), "created artifact root directory");
        Ok(Self {
            dir,
            cached: RwLock::new(None),
        })
    }

    /// Physical path of the root directory.
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Externally reachable address of the root directory for the currently
    /// active hosting context.
    ///
    /// # Panics
    ///
    /// Panics if no hosting context is active; there is nothing sensible to
    /// return in that state.
    pub fn current_address(&self, host: &dyn HostContext) -> StoreResult<Address> {
        let epoch = host
            .active_epoch()
            .expect("no active hosting context: cannot compute artifact root address");

        {
            let cached = self.cached.read();
            if let Some(c) = cached.as_ref() {
                if c.epoch == epoch {
                    return Ok(c.address.clone());
                }
            }
        }

        let mut cached = self.cached.write();
        // Double-check after acquiring the write lock (another thread might
        // have refreshed for the same epoch).
        if let Some(c) = cached.as_ref() {
            if c.epoch == epoch {
                return Ok(c.address.clone());
            }
        }

        let address = host.serve_directory(self.dir.path())?;
        tracing::info!(epoch, address = %address, "registered artifact root with hosting context");
        *cached = Some(CachedAddress {
            epoch,
            address: address.clone(),
        });
        Ok(address)
    }
}
