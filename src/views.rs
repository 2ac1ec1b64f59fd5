//! Resource views derived from the session registry.
//!
//! Both views are recomputed from a registry snapshot on every call; nothing
//! here is cached.

use crate::engine::Address;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use uuid::Uuid;

/// Fixed version marker attached to every jar entry in the descriptor. The
/// engine only checks for presence when deciding cache reuse.
pub const JAR_VERSION_MARKER: &str = "*";

/// Job resource descriptor handed to the execution engine when scheduling
/// work for a session.
///
/// Plain-file and archive resources are tracked exclusively through the
/// engine's own distribution registrations made during commit, so their maps
/// stay empty here.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResourceDescriptor {
    pub session_uuid: Uuid,
    pub class_dir_address: Address,
    pub jars: BTreeMap<Address, String>,
    pub files: BTreeMap<Address, String>,
    pub archives: BTreeMap<Address, String>,
}

/// Ordered load-path entries for constructing a dynamic loader: jar
/// addresses first (append order, first occurrence wins), then the class
/// directory address.
pub fn loadable_resources(jar_addresses: Vec<Address>, class_dir_address: Address) -> Vec<Address> {
    let mut seen = HashSet::new();
    let mut entries: Vec<Address> = jar_addresses
        .into_iter()
        .filter(|a| seen.insert(a.clone()))
        .collect();
    if seen.insert(class_dir_address.clone()) {
        entries.push(class_dir_address);
    }
    entries
}

/// Build the descriptor from a jar-address snapshot.
pub fn job_resource_descriptor(
    session_uuid: Uuid,
    class_dir_address: Address,
    jar_addresses: Vec<Address>,
) -> JobResourceDescriptor {
    let jars = jar_addresses
        .into_iter()
        .map(|a| (a, JAR_VERSION_MARKER.to_string()))
        .collect();
    JobResourceDescriptor {
        session_uuid,
        class_dir_address,
        jars,
        files: BTreeMap::new(),
        archives: BTreeMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loadable_resources_order_and_dedup() {
        let jars = vec![
            Address::new("ctx://s/jars/a.jar"),
            Address::new("ctx://s/jars/b.jar"),
            Address::new("ctx://s/jars/a.jar"),
        ];
        let class_dir = Address::new("ctx://s/classes");
        let entries = loadable_resources(jars, class_dir.clone());
        assert_eq!(
            entries,
            vec![
                Address::new("ctx://s/jars/a.jar"),
                Address::new("ctx://s/jars/b.jar"),
                class_dir
            ]
        );
    }

    #[test]
    fn test_descriptor_marks_every_jar() {
        let descriptor = job_resource_descriptor(
            Uuid::new_v4(),
            Address::new("ctx://s/classes"),
            vec![Address::new("ctx://s/jars/a.jar")],
        );
        assert_eq!(
            descriptor.jars.get(&Address::new("ctx://s/jars/a.jar")),
            Some(&JAR_VERSION_MARKER.to_string())
        );
        assert!(descriptor.files.is_empty());
        assert!(descriptor.archives.is_empty());
    }

    #[test]
    fn test_descriptor_serializes_addresses_as_strings() {
        let descriptor = job_resource_descriptor(
            Uuid::new_v4(),
            Address::new("ctx://s/classes"),
            vec![Address::new("ctx://s/jars/a.jar")],
        );
        let json = serde_json::to_value(&descriptor).unwrap();
        assert_eq!(
            json["class_dir_address"],
            serde_json::json!("ctx://s/classes")
        );
        assert_eq!(json["jars"]["ctx://s/jars/a.jar"], serde_json::json!("*"));
    }
}
