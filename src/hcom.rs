//! `HcomClusterDesc` — a process-wide registry of cluster topology
//! descriptors (rank tables, communication-domain layouts) shared across
//! models that participate in the same collective-communication group.
//!
//! Descriptors are merged by name: a name seen for the first time is
//! inserted as-is; a name seen again must carry byte-identical content, or
//! the merge is rejected — two models disagreeing about a cluster's shape
//! is a configuration bug, not something to silently paper over.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{Error, Result};

/// One named cluster descriptor blob, opaque to this registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterDesc {
    pub name: String,
    pub bytes: Vec<u8>,
}

/// Process-wide registry of [`ClusterDesc`]s, keyed by name.
pub struct HcomClusterDesc {
    entries: Mutex<HashMap<String, Vec<u8>>>,
}

impl HcomClusterDesc {
    pub fn new() -> HcomClusterDesc {
        HcomClusterDesc { entries: Mutex::new(HashMap::new()) }
    }

    /// Inserts `desc`, or confirms an existing entry under the same name is
    /// byte-identical. Returns [`Error::ClusterDescConflict`] otherwise.
    pub fn merge(&self, desc: ClusterDesc) -> Result<()> {
        let mut entries = self.entries.lock()?;
        match entries.get(&desc.name) {
            Some(existing) if existing == &desc.bytes => Ok(()),
            Some(_) => Err(Error::ClusterDescConflict { name: desc.name }),
            None => {
                entries.insert(desc.name, desc.bytes);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.lock()?.get(name).cloned())
    }

    pub fn remove(&self, name: &str) -> Result<()> {
        self.entries.lock()?.remove(name);
        Ok(())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.entries.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }
}

impl Default for HcomClusterDesc {
    fn default() -> HcomClusterDesc {
        HcomClusterDesc::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_redefinition_is_accepted() {
        let registry = HcomClusterDesc::new();
        let desc = ClusterDesc { name: "ring0".into(), bytes: vec![1, 2, 3] };
        registry.merge(desc.clone()).unwrap();
        registry.merge(desc).unwrap();
        assert_eq!(registry.len().unwrap(), 1);
    }

    #[test]
    fn conflicting_redefinition_is_rejected() {
        let registry = HcomClusterDesc::new();
        registry.merge(ClusterDesc { name: "ring0".into(), bytes: vec![1, 2, 3] }).unwrap();
        let err = registry.merge(ClusterDesc { name: "ring0".into(), bytes: vec![4, 5, 6] }).unwrap_err();
        assert!(matches!(err, Error::ClusterDescConflict { .. }));
    }
}
