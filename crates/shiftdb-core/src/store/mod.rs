//! Changelog persistence.
//!
//! The engine reads and writes history exclusively through [`ChangeLogStore`].
//! Implementations must make `save` atomic per version, durable by the time
//! it returns, and give read-after-write consistency for the same version.

mod memory;
mod sled_store;

pub use memory::MemoryChangeLogStore;
pub use sled_store::SledChangeLogStore;

use crate::changelog::ChangeLog;
use crate::changeset::Version;
use crate::error::StoreError;

/// Persistent execution history keyed by version.
pub trait ChangeLogStore {
    /// Look up the record for a version.
    fn get(&self, version: &Version) -> Result<Option<ChangeLog>, StoreError>;

    /// Insert or replace the record for `log.version`.
    ///
    /// The record must survive a crash once this returns.
    fn save(&self, log: &ChangeLog) -> Result<(), StoreError>;

    /// All records, sorted by recorded order.
    ///
    /// Records without an order (skipped or failed) follow, sorted by version.
    fn list_all(&self) -> Result<Vec<ChangeLog>, StoreError>;
}

impl<S: ChangeLogStore + ?Sized> ChangeLogStore for &S {
    fn get(&self, version: &Version) -> Result<Option<ChangeLog>, StoreError> {
        (**self).get(version)
    }

    fn save(&self, log: &ChangeLog) -> Result<(), StoreError> {
        (**self).save(log)
    }

    fn list_all(&self) -> Result<Vec<ChangeLog>, StoreError> {
        (**self).list_all()
    }
}

/// Sort records the way [`ChangeLogStore::list_all`] returns them.
pub(crate) fn sort_by_order(logs: &mut [ChangeLog]) {
    logs.sort_by(|a, b| match (a.order, b.order) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.version.cmp(&b.version)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.version.cmp(&b.version),
    });
}
