//! Depot: Session-Isolated Artifact Store
//!
//! Receives files staged locally by a transport layer, classifies each by the
//! first segment of its declared relative path, commits it into a
//! deterministic session-scoped directory layout, and exposes derived
//! resource views (a runtime load path, a job resource descriptor) to an
//! external execution engine.

pub mod category;
pub mod engine;
pub mod error;
pub mod layout;
pub mod registry;
pub mod session;
pub mod store;
pub mod views;

pub use category::Category;
pub use engine::{Address, ArchiveLocator, ExecutionEngine, HostContext};
pub use error::{StoreError, StoreResult};
pub use session::{CommittedArtifact, SessionKey, SessionStore};
pub use store::ArtifactStore;
pub use views::JobResourceDescriptor;
