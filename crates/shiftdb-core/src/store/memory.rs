//! In-memory changelog store.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use super::{sort_by_order, ChangeLogStore};
use crate::changelog::ChangeLog;
use crate::changeset::Version;
use crate::error::StoreError;

/// Changelog store kept in process memory.
///
/// Used for dry runs and tests; records are lost when the store is dropped.
#[derive(Default)]
pub struct MemoryChangeLogStore {
    logs: RwLock<BTreeMap<Version, ChangeLog>>,
}

impl MemoryChangeLogStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store seeded with existing records.
    pub fn with_logs(logs: impl IntoIterator<Item = ChangeLog>) -> Self {
        let logs = logs
            .into_iter()
            .map(|log| (log.version.clone(), log))
            .collect();
        Self {
            logs: RwLock::new(logs),
        }
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.logs.read().len()
    }

    /// Whether the store holds no records.
    pub fn is_empty(&self) -> bool {
        self.logs.read().is_empty()
    }
}

impl ChangeLogStore for MemoryChangeLogStore {
    fn get(&self, version: &Version) -> Result<Option<ChangeLog>, StoreError> {
        Ok(self.logs.read().get(version).cloned())
    }

    fn save(&self, log: &ChangeLog) -> Result<(), StoreError> {
        self.logs.write().insert(log.version.clone(), log.clone());
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<ChangeLog>, StoreError> {
        let mut logs: Vec<ChangeLog> = self.logs.read().values().cloned().collect();
        sort_by_order(&mut logs);
        Ok(logs)
    }
}
