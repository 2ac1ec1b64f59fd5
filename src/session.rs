//! Per-session artifact store and the commit pipeline.
//!
//! A commit classifies the declared relative path, applies the category's
//! side effect (keyed-block store, move with or without overwrite, forward
//! copy), and updates the session registries. Side effects are strictly a
//! function of category; no two categories share a side effect path.

use crate::category::{Category, CACHE_PREFIX, CLASSES_PREFIX, FORWARD_PREFIX};
use crate::engine::{Address, ArchiveLocator};
use crate::error::{StoreError, StoreResult};
use crate::layout::SessionLayout;
use crate::registry::SessionArtifactRegistry;
use crate::store::StoreShared;
use crate::views::{self, JobResourceDescriptor};
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Filename extensions the consuming interpreter can load directly from its
/// module path.
const PY_LOADABLE_EXTENSIONS: [&str; 3] = ["zip", "egg", "jar"];

/// Identity of one session: a stable opaque UUID plus the user and session
/// identifiers used to key the engine's block store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionKey {
    pub uuid: Uuid,
    pub user_id: String,
    pub session_id: String,
}

impl SessionKey {
    pub fn new(uuid: Uuid, user_id: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self {
            uuid,
            user_id: user_id.into(),
            session_id: session_id.into(),
        }
    }
}

/// Outcome of a successful commit.
#[derive(Debug, Clone)]
pub struct CommittedArtifact {
    pub category: Category,
    /// Absolute local location, for categories that land in the session tree.
    pub location: Option<PathBuf>,
    /// Derived externally reachable address, for jars.
    pub address: Option<Address>,
}

/// Artifact store scoped to one session.
///
/// Shared across all commit operations for that session, never across
/// sessions. The physical session directory is exclusively owned by this
/// store until teardown.
pub struct SessionStore {
    key: SessionKey,
    layout: SessionLayout,
    registry: SessionArtifactRegistry,
    shared: Arc<StoreShared>,
}

impl SessionStore {
    pub(crate) fn new(key: SessionKey, layout: SessionLayout, shared: Arc<StoreShared>) -> Self {
        Self {
            key,
            layout,
            registry: SessionArtifactRegistry::new(),
            shared,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn layout(&self) -> &SessionLayout {
        &self.layout
    }

    /// Snapshot of committed jar locations in append order.
    pub fn jar_list(&self) -> Vec<PathBuf> {
        self.registry.jar_locations()
    }

    /// Snapshot of registered loadable module names in append order.
    pub fn py_module_list(&self) -> Vec<String> {
        self.registry.py_modules()
    }

    /// Commit a staged file under its declared relative path.
    ///
    /// The relative path's first segment selects the category and its commit
    /// rule. Non-class targets are never overwritten; a repeat commit to an
    /// existing target fails with [`StoreError::DuplicateArtifact`] and
    /// leaves the staged file untouched. Class files may overwrite freely.
    pub fn commit(
        &self,
        relative_path: &Path,
        staged_file: &Path,
        fragment: Option<&str>,
    ) -> StoreResult<CommittedArtifact> {
        let relative_path = normalize_relative(relative_path)?;
        let category = Category::classify(&relative_path);
        debug!(
            session = %self.key.uuid,
            path = %relative_path.display(),
            ?category,
            "committing artifact"
        );

        match category {
            Category::CacheBlock => self.commit_cache_block(&relative_path, staged_file),
            Category::ClassFile => self.commit_class_file(&relative_path, staged_file),
            Category::ForwardToFilesystem => self.commit_forward(&relative_path, staged_file),
            Category::Jar
            | Category::PyInclude
            | Category::Archive
            | Category::PlainFile
            | Category::Generic => {
                self.commit_session_artifact(category, &relative_path, staged_file, fragment)
            }
        }
    }

    /// Loadable resource set: jar addresses in append order, de-duplicated,
    /// plus the class directory address. Recomputed from the registry
    /// snapshot on every call.
    pub fn loadable_resources(&self) -> StoreResult<Vec<Address>> {
        let class_dir = self.class_dir_address()?;
        Ok(views::loadable_resources(
            self.registry.jar_addresses(),
            class_dir,
        ))
    }

    /// Structured job resource descriptor for the execution engine.
    pub fn job_resource_descriptor(&self) -> StoreResult<JobResourceDescriptor> {
        let class_dir = self.class_dir_address()?;
        Ok(views::job_resource_descriptor(
            self.key.uuid,
            class_dir,
            self.registry.jar_addresses(),
        ))
    }

    fn class_dir_address(&self) -> StoreResult<Address> {
        let root = self
            .shared
            .root
            .current_address(self.shared.host.as_ref())?;
        Ok(self.layout.class_dir_address(&root))
    }

    fn commit_cache_block(&self, relative_path: &Path, staged_file: &Path) -> StoreResult<CommittedArtifact> {
        let key = rel_to_uri(suffix_after(relative_path, CACHE_PREFIX)?);
        let result = self.shared.engine.put_cache_block(
            &self.key.user_id,
            &self.key.session_id,
            &key,
            staged_file,
        );
        if result.is_err() {
            // Cleanup-on-failure, not retried: don't leak staging space.
            if let Err(e) = fs::remove_file(staged_file) {
                warn!(
                    staged = %staged_file.display(),
                    error = %e,
                    "failed to clean up staged file after block store failure"
                );
            }
        }
        result?;
        Ok(CommittedArtifact {
            category: Category::CacheBlock,
            location: None,
            address: None,
        })
    }

    fn commit_class_file(&self, relative_path: &Path, staged_file: &Path) -> StoreResult<CommittedArtifact> {
        let suffix = suffix_after(relative_path, CLASSES_PREFIX)?;
        let target = self.layout.class_dir().join(suffix);
        let parent = target.parent().unwrap_or_else(|| self.layout.class_dir());
        fs::create_dir_all(parent)?;
        move_replace(staged_file, &target, parent)?;
        Ok(CommittedArtifact {
            category: Category::ClassFile,
            location: Some(target),
            address: None,
        })
    }

    fn commit_session_artifact(
        &self,
        category: Category,
        relative_path: &Path,
        staged_file: &Path,
        fragment: Option<&str>,
    ) -> StoreResult<CommittedArtifact> {
        // The full relative path, category prefix included, is the on-disk
        // layout for everything outside the class directory.
        let target = self.layout.session_dir().join(relative_path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        move_exclusive(staged_file, &target)?;

        let mut address = None;
        match category {
            Category::Jar => {
                let root = self
                    .shared
                    .root
                    .current_address(self.shared.host.as_ref())?;
                let jar_address = self
                    .layout
                    .session_address(&root)
                    .join(&rel_to_uri(relative_path));
                self.registry.append_jar(target.clone(), jar_address.clone());
                address = Some(jar_address);
            }
            Category::PyInclude => {
                self.shared.engine.register_file(&target)?;
                if has_loadable_extension(&target) {
                    if let Some(name) = target.file_name().and_then(|n| n.to_str()) {
                        self.registry.append_py_module(name.to_string());
                    }
                }
            }
            Category::Archive => {
                let locator =
                    ArchiveLocator::new(target.clone(), fragment.map(|f| f.to_string()));
                self.shared.engine.register_archive(&locator)?;
            }
            Category::PlainFile => {
                self.shared.engine.register_file(&target)?;
            }
            // Generic artifacts exist on disk for ad-hoc retrieval only.
            Category::Generic => {}
            _ => unreachable!("category handled by a dedicated commit rule"),
        }

        Ok(CommittedArtifact {
            category,
            location: Some(target),
            address,
        })
    }

    fn commit_forward(&self, relative_path: &Path, staged_file: &Path) -> StoreResult<CommittedArtifact> {
        let destination = Path::new("/").join(suffix_after(relative_path, FORWARD_PREFIX)?);
        if self.shared.engine.destination_is_local(&destination)
            && !self.shared.allow_local_forward
        {
            // Security boundary: a remote client must not overwrite arbitrary
            // files reachable by the local filesystem driver.
            return Err(StoreError::ForbiddenLocalForward(destination));
        }
        self.shared
            .engine
            .forward_to_filesystem(staged_file, &destination)?;
        Ok(CommittedArtifact {
            category: Category::ForwardToFilesystem,
            location: None,
            address: None,
        })
    }
}

/// Reject absolute paths and `..` escapes, drop `.` components, and return
/// the normalized relative path. Runs before any filesystem access.
fn normalize_relative(path: &Path) -> StoreResult<PathBuf> {
    if path.is_absolute() {
        return Err(StoreError::AbsolutePath(path.to_path_buf()));
    }
    let mut normalized = PathBuf::new();
    let mut depth: usize = 0;
    for component in path.components() {
        match component {
            Component::Normal(segment) => {
                normalized.push(segment);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(StoreError::PathEscapesSession(path.to_path_buf()));
                }
                normalized.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(StoreError::AbsolutePath(path.to_path_buf()));
            }
        }
    }
    if depth == 0 {
        return Err(StoreError::PathEscapesSession(path.to_path_buf()));
    }
    Ok(normalized)
}

fn suffix_after<'a>(relative_path: &'a Path, prefix: &str) -> StoreResult<&'a Path> {
    relative_path.strip_prefix(prefix).map_err(|_| {
        StoreError::PathEscapesSession(relative_path.to_path_buf())
    })
}

/// Render a normalized relative path with `/` separators.
fn rel_to_uri(path: &Path) -> String {
    path.iter()
        .map(|segment| segment.to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn has_loadable_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| PY_LOADABLE_EXTENSIONS.contains(&e))
}

/// Best-effort removal of a staged file whose content already reached the
/// target. The commit succeeded; a leaked staging file is only worth a
/// warning.
fn cleanup_staged(staged: &Path) {
    if let Err(e) = fs::remove_file(staged) {
        warn!(staged = %staged.display(), error = %e, "failed to remove staged file after commit");
    }
}

/// Move a staged file to a target that must not already exist.
///
/// The duplicate check and the move are one atomic operation: a hard link
/// fails with `AlreadyExists` if the target is present, and the exclusive
/// create in the cross-device fallback gives the same guarantee. Exactly one
/// of two concurrent commits to the same target succeeds. A failed move
/// never leaves content at the target, so retransmitting the same relative
/// path is not misreported as a duplicate.
fn move_exclusive(staged: &Path, target: &Path) -> StoreResult<()> {
    match fs::hard_link(staged, target) {
        Ok(()) => {
            cleanup_staged(staged);
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            Err(StoreError::DuplicateArtifact(target.to_path_buf()))
        }
        // Staging area may sit on a different filesystem than the store root.
        Err(_) => {
            let mut out = match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(target)
            {
                Ok(file) => file,
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    return Err(StoreError::DuplicateArtifact(target.to_path_buf()));
                }
                Err(e) => return Err(e.into()),
            };
            let copied = fs::File::open(staged).and_then(|mut input| io::copy(&mut input, &mut out));
            if let Err(e) = copied {
                drop(out);
                // Remove the residue of the exclusive create so the path
                // stays committable.
                if let Err(cleanup) = fs::remove_file(target) {
                    warn!(target = %target.display(), error = %cleanup, "failed to remove partial target after copy failure");
                }
                return Err(e.into());
            }
            cleanup_staged(staged);
            Ok(())
        }
    }
}

/// Move a staged file to a target, replacing any existing file. Each
/// overwrite is atomic: readers observe either the old or the new content,
/// never a partial write.
fn move_replace(staged: &Path, target: &Path, parent: &Path) -> StoreResult<()> {
    if fs::rename(staged, target).is_ok() {
        return Ok(());
    }
    // Cross-device rename: copy next to the target, then rename over it.
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    let mut input = fs::File::open(staged)?;
    io::copy(&mut input, tmp.as_file_mut())?;
    tmp.persist(target).map_err(|e| StoreError::Io(e.error))?;
    cleanup_staged(staged);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_rejects_absolute() {
        assert!(matches!(
            normalize_relative(Path::new("/etc/passwd")),
            Err(StoreError::AbsolutePath(_))
        ));
    }

    #[test]
    fn test_normalize_rejects_escape() {
        assert!(matches!(
            normalize_relative(Path::new("../outside")),
            Err(StoreError::PathEscapesSession(_))
        ));
        assert!(matches!(
            normalize_relative(Path::new("jars/../../outside")),
            Err(StoreError::PathEscapesSession(_))
        ));
    }

    #[test]
    fn test_normalize_collapses_dot_and_dotdot() {
        assert_eq!(
            normalize_relative(Path::new("./jars/sub/../a.jar")).unwrap(),
            PathBuf::from("jars/a.jar")
        );
    }

    #[test]
    fn test_normalize_rejects_empty() {
        assert!(normalize_relative(Path::new("")).is_err());
        assert!(normalize_relative(Path::new(".")).is_err());
    }

    #[test]
    fn test_rel_to_uri_uses_forward_slashes() {
        assert_eq!(rel_to_uri(Path::new("jars/sub/a.jar")), "jars/sub/a.jar");
    }

    #[test]
    fn test_move_exclusive_failure_leaves_no_target_residue() {
        let dir = tempfile::TempDir::new().unwrap();
        let target = dir.path().join("shared.bin");
        let missing = dir.path().join("missing.bin");

        // Missing staged file: hard link fails, the fallback's exclusive
        // create succeeds, then the staged-side open fails.
        assert!(move_exclusive(&missing, &target).is_err());
        assert!(!target.exists());

        // The path stays committable; no duplicate against residue.
        let staged = dir.path().join("staged.bin");
        fs::write(&staged, b"content").unwrap();
        move_exclusive(&staged, &target).unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"content");
    }

    #[test]
    fn test_cleanup_staged_tolerates_missing_file() {
        // Staged cleanup is best-effort in every move branch; a vanished
        // staging file must not fail or panic.
        cleanup_staged(Path::new("/nonexistent/depot-staged.bin"));
    }

    #[test]
    fn test_loadable_extension_detection() {
        assert!(has_loadable_extension(Path::new("pyfiles/mod.zip")));
        assert!(has_loadable_extension(Path::new("pyfiles/dep.egg")));
        assert!(has_loadable_extension(Path::new("pyfiles/lib.jar")));
        assert!(!has_loadable_extension(Path::new("pyfiles/script.py")));
        assert!(!has_loadable_extension(Path::new("pyfiles/noext")));
    }
}
