//! sled-backed changelog store.

use tracing::trace;

use super::{sort_by_order, ChangeLogStore};
use crate::changelog::{self, ChangeLog, KEY_PREFIX};
use crate::changeset::Version;
use crate::error::StoreError;

/// Changelog store persisting JSON records in a dedicated sled tree.
pub struct SledChangeLogStore {
    tree: sled::Tree,
}

impl SledChangeLogStore {
    /// Tree name for changelog records.
    pub const TREE_NAME: &'static str = "shiftdb:changelog";

    /// Open or create the changelog store.
    pub fn open(db: &sled::Db) -> Result<Self, StoreError> {
        let tree = db.open_tree(Self::TREE_NAME)?;
        Ok(Self { tree })
    }
}

impl ChangeLogStore for SledChangeLogStore {
    fn get(&self, version: &Version) -> Result<Option<ChangeLog>, StoreError> {
        match self.tree.get(changelog::key_for(version))? {
            Some(bytes) => Ok(Some(ChangeLog::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn save(&self, log: &ChangeLog) -> Result<(), StoreError> {
        let value = log.to_bytes()?;
        trace!(key = %log.key(), status = %log.status, "saving changelog");
        self.tree.insert(log.key(), value)?;
        self.tree.flush()?;
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<ChangeLog>, StoreError> {
        let mut logs = Vec::new();
        for result in self.tree.scan_prefix(KEY_PREFIX) {
            let (_, value) = result?;
            logs.push(ChangeLog::from_bytes(&value)?);
        }
        sort_by_order(&mut logs);
        Ok(logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::changelog::Status;
    use crate::changeset::{ChangeSet, ChangeSetKind};
    use chrono::Utc;
    use std::time::Duration;

    fn changeset(version: &str, order: u32) -> ChangeSet {
        ChangeSet::new(
            Version::parse(version).unwrap(),
            order,
            "create index",
            ChangeSetKind::QueryScript,
            format!("V{version}__create_index.query"),
            "69eb",
        )
    }

    #[test]
    fn test_save_and_get() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = SledChangeLogStore::open(&db).unwrap();

        let log = ChangeLog::executed(
            &changeset("1", 1),
            1,
            "toto",
            Utc::now(),
            Duration::from_millis(400),
        );
        store.save(&log).unwrap();

        let loaded = store.get(&log.version).unwrap().unwrap();
        assert_eq!(loaded, log);
        assert!(store
            .get(&Version::parse("2").unwrap())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_save_upserts_by_version() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = SledChangeLogStore::open(&db).unwrap();

        let mut log = ChangeLog::skipped(&changeset("1.2", 1));
        store.save(&log).unwrap();
        log.description = "type".to_string();
        store.save(&log).unwrap();

        let all = store.list_all().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].description, "type");
        assert_eq!(all[0].status, Status::Skipped);
    }

    #[test]
    fn test_list_all_sorted_by_order() {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = SledChangeLogStore::open(&db).unwrap();

        let now = Utc::now();
        // Keys sort lexically as "10" < "2"; records must come back by order.
        store
            .save(&ChangeLog::executed(&changeset("10", 2), 2, "a", now, Duration::ZERO))
            .unwrap();
        store
            .save(&ChangeLog::executed(&changeset("2", 1), 1, "a", now, Duration::ZERO))
            .unwrap();
        store.save(&ChangeLog::skipped(&changeset("1.5", 3))).unwrap();

        let versions: Vec<String> = store
            .list_all()
            .unwrap()
            .into_iter()
            .map(|log| log.version.to_string())
            .collect();
        assert_eq!(versions, vec!["2", "10", "1.5"]);
    }

    #[test]
    fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let log = ChangeLog::skipped(&changeset("3", 1));

        {
            let db = sled::open(dir.path()).unwrap();
            let store = SledChangeLogStore::open(&db).unwrap();
            store.save(&log).unwrap();
        }

        let db = sled::open(dir.path()).unwrap();
        let store = SledChangeLogStore::open(&db).unwrap();
        assert_eq!(store.get(&log.version).unwrap(), Some(log));
    }
}
