//! Process-wide artifact store facade.
//!
//! Owns the shared root location, the execution-engine handles, and the map
//! of live sessions. Sessions are created lazily on the first commit for a
//! UUID and destroyed explicitly by teardown.

use crate::engine::{ExecutionEngine, HostContext};
use crate::error::StoreResult;
use crate::layout::{RootLocation, SessionLayout};
use crate::session::{SessionKey, SessionStore};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

pub(crate) struct StoreShared {
    pub(crate) root: RootLocation,
    pub(crate) engine: Arc<dyn ExecutionEngine>,
    pub(crate) host: Arc<dyn HostContext>,
    /// Configuration surface: whether `forward_to_fs` may target the local
    /// filesystem. Default deny.
    pub(crate) allow_local_forward: bool,
}

/// Session-isolated artifact store shared by all request handlers in the
/// process.
pub struct ArtifactStore {
    shared: Arc<StoreShared>,
    sessions: RwLock<HashMap<Uuid, Arc<SessionStore>>>,
}

impl ArtifactStore {
    /// Create a store with local-filesystem forwarding denied.
    pub fn new(
        engine: Arc<dyn ExecutionEngine>,
        host: Arc<dyn HostContext>,
    ) -> io::Result<Self> {
        Self::with_options(engine, host, false)
    }

    /// Create a store, choosing whether `forward_to_fs` may target the local
    /// filesystem.
    pub fn with_options(
        engine: Arc<dyn ExecutionEngine>,
        host: Arc<dyn HostContext>,
        allow_local_forward: bool,
    ) -> io::Result<Self> {
        let root = RootLocation::new()?;
        Ok(Self {
            shared: Arc::new(StoreShared {
                root,
                engine,
                host,
                allow_local_forward,
            }),
            sessions: RwLock::new(HashMap::new()),
        })
    }

    /// Physical root directory shared by all sessions.
    pub fn root_path(&self) -> &Path {
        self.shared.root.path()
    }

    /// Get or create the session store for a key, creating its directory
    /// layout on first use.
    pub fn session(&self, key: &SessionKey) -> StoreResult<Arc<SessionStore>> {
        {
            let sessions = self.sessions.read();
            if let Some(session) = sessions.get(&key.uuid) {
                return Ok(session.clone());
            }
        }

        let mut sessions = self.sessions.write();
        // Double-check after acquiring the write lock (another thread might
        // have created it).
        if let Some(session) = sessions.get(&key.uuid) {
            return Ok(session.clone());
        }

        let layout = SessionLayout::new(self.shared.root.path(), key.uuid);
        layout.ensure_created()?;
        info!(session = %key.uuid, dir = %layout.session_dir().display(), "created session layout");
        let session = Arc::new(SessionStore::new(
            key.clone(),
            layout,
            self.shared.clone(),
        ));
        sessions.insert(key.uuid, session.clone());
        Ok(session)
    }

    /// Look up an already-created session.
    pub fn get_session(&self, uuid: Uuid) -> Option<Arc<SessionStore>> {
        self.sessions.read().get(&uuid).cloned()
    }

    /// Release all per-session state: drop the session's keyed blocks from
    /// the engine and delete its directory subtree.
    ///
    /// Not safe to call twice concurrently for the same session; the caller
    /// guarantees single-shot invocation.
    pub fn teardown(&self, uuid: Uuid) -> StoreResult<()> {
        let session = match self.sessions.write().remove(&uuid) {
            Some(session) => session,
            None => return Ok(()),
        };

        let key = session.key();
        info!(session = %uuid, "tearing down session");
        let blocks = self
            .shared
            .engine
            .remove_session_blocks(&key.user_id, &key.session_id);

        let removed = match fs::remove_dir_all(session.layout().session_dir()) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        };

        blocks.and(removed)
    }
}
