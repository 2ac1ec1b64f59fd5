//! Per-session artifact registry.
//!
//! Three independent append-only sequences, safe for concurrent append from
//! parallel commits and concurrent full-snapshot reads. Jar locations and
//! jar addresses are always appended together by the same commit, so the two
//! sequences stay pairwise consistent by construction. Duplicate appends of
//! the same physical jar are tolerated by design: retransmission is made
//! idempotent at the commit level, not here.

use crate::engine::Address;
use parking_lot::Mutex;
use std::path::PathBuf;

/// Append-only accumulation of committed load-path entries and loadable
/// module names for one session.
#[derive(Default)]
pub struct SessionArtifactRegistry {
    jars: Mutex<Vec<JarEntry>>,
    py_modules: Mutex<Vec<String>>,
}

#[derive(Debug, Clone)]
struct JarEntry {
    location: PathBuf,
    address: Address,
}

impl SessionArtifactRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a committed jar and its derived address.
    pub fn append_jar(&self, location: PathBuf, address: Address) {
        self.jars.lock().push(JarEntry { location, address });
    }

    /// Record an interpreter-loadable module name.
    pub fn append_py_module(&self, name: String) {
        self.py_modules.lock().push(name);
    }

    /// Snapshot of jar locations in append order.
    pub fn jar_locations(&self) -> Vec<PathBuf> {
        self.jars.lock().iter().map(|e| e.location.clone()).collect()
    }

    /// Snapshot of jar addresses in append order.
    pub fn jar_addresses(&self) -> Vec<Address> {
        self.jars.lock().iter().map(|e| e.address.clone()).collect()
    }

    /// Snapshot of registered loadable module names in append order.
    pub fn py_modules(&self) -> Vec<String> {
        self.py_modules.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_jar_location_and_address_stay_paired() {
        let registry = SessionArtifactRegistry::new();
        registry.append_jar(PathBuf::from("/s/jars/a.jar"), Address::new("ctx://s/jars/a.jar"));
        registry.append_jar(PathBuf::from("/s/jars/b.jar"), Address::new("ctx://s/jars/b.jar"));

        assert_eq!(
            registry.jar_locations(),
            vec![PathBuf::from("/s/jars/a.jar"), PathBuf::from("/s/jars/b.jar")]
        );
        assert_eq!(
            registry.jar_addresses(),
            vec![
                Address::new("ctx://s/jars/a.jar"),
                Address::new("ctx://s/jars/b.jar")
            ]
        );
    }

    #[test]
    fn test_concurrent_appends_all_observed() {
        let registry = Arc::new(SessionArtifactRegistry::new());
        let mut handles = vec![];
        for i in 0..16 {
            let registry = registry.clone();
            handles.push(thread::spawn(move || {
                registry.append_jar(
                    PathBuf::from(format!("/s/jars/{i}.jar")),
                    Address::new(format!("ctx://s/jars/{i}.jar")),
                );
                registry.append_py_module(format!("m{i}.zip"));
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(registry.jar_locations().len(), 16);
        assert_eq!(registry.jar_addresses().len(), 16);
        assert_eq!(registry.py_modules().len(), 16);
    }
}
