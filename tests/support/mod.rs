//! Shared test scaffolding: a recording fake of the execution engine and a
//! swappable hosting context.

use depot::{Address, ArchiveLocator, ExecutionEngine, HostContext, StoreError, StoreResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Recording fake of the execution engine. Cache puts read the staged bytes;
/// forwards perform a real local copy so byte-identity can be asserted.
#[derive(Default)]
pub struct FakeEngine {
    pub cache_blocks: Mutex<HashMap<(String, String, String), Vec<u8>>>,
    pub registered_files: Mutex<Vec<PathBuf>>,
    pub registered_archives: Mutex<Vec<String>>,
    pub removed_sessions: Mutex<Vec<(String, String)>>,
    pub fail_cache_puts: AtomicBool,
}

impl FakeEngine {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ExecutionEngine for FakeEngine {
    fn put_cache_block(
        &self,
        user_id: &str,
        session_id: &str,
        key: &str,
        staged_file: &Path,
    ) -> StoreResult<()> {
        if self.fail_cache_puts.load(Ordering::SeqCst) {
            return Err(StoreError::Engine("block store unavailable".to_string()));
        }
        let bytes = fs::read(staged_file)?;
        self.cache_blocks.lock().insert(
            (user_id.to_string(), session_id.to_string(), key.to_string()),
            bytes,
        );
        Ok(())
    }

    fn remove_session_blocks(&self, user_id: &str, session_id: &str) -> StoreResult<()> {
        self.cache_blocks
            .lock()
            .retain(|(u, s, _), _| !(u == user_id && s == session_id));
        self.removed_sessions
            .lock()
            .push((user_id.to_string(), session_id.to_string()));
        Ok(())
    }

    fn register_file(&self, path: &Path) -> StoreResult<()> {
        self.registered_files.lock().push(path.to_path_buf());
        Ok(())
    }

    fn register_archive(&self, locator: &ArchiveLocator) -> StoreResult<()> {
        self.registered_archives.lock().push(locator.to_string());
        Ok(())
    }

    fn destination_is_local(&self, _destination: &Path) -> bool {
        true
    }

    fn forward_to_filesystem(&self, staged_file: &Path, destination: &Path) -> StoreResult<()> {
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(staged_file, destination)?;
        Ok(())
    }
}

/// Hosting context whose identity can be advanced to simulate replacement.
pub struct FakeHost {
    epoch: AtomicU64,
}

impl FakeHost {
    pub fn new() -> Self {
        Self {
            epoch: AtomicU64::new(1),
        }
    }

    pub fn replace_context(&self) {
        self.epoch.fetch_add(1, Ordering::SeqCst);
    }
}

impl HostContext for FakeHost {
    fn active_epoch(&self) -> Option<u64> {
        Some(self.epoch.load(Ordering::SeqCst))
    }

    fn serve_directory(&self, dir: &Path) -> StoreResult<Address> {
        Ok(Address::new(format!(
            "ctx{}://{}",
            self.epoch.load(Ordering::SeqCst),
            dir.display()
        )))
    }
}

/// Write a staged file into `dir` and return its path.
pub fn stage(dir: &Path, name: &str, content: &[u8]) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}
