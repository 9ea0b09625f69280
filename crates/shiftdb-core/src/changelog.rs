//! Persisted execution history records.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::changeset::{ChangeSet, ChangeSetKind, Version};

/// Key prefix of persisted changelog records.
pub const KEY_PREFIX: &str = "changelog::";

/// Outcome recorded for a changeset version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// The changeset was applied.
    Executed,
    /// The executor failed while applying the changeset.
    Failed,
    /// The changeset predates the watermark and was never applied.
    Skipped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Executed => write!(f, "EXECUTED"),
            Status::Failed => write!(f, "FAILED"),
            Status::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Persisted record of how a changeset version was processed.
///
/// Serializes to the store-facing document shape with the fields `version`,
/// `order`, `description`, `type`, `script`, `checksum`, `runner`,
/// `timestamp`, `duration` (milliseconds), and `status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLog {
    pub version: Version,
    /// Execution order. Only executed records carry one.
    pub order: Option<u32>,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: ChangeSetKind,
    #[serde(rename = "script")]
    pub script_id: String,
    pub checksum: String,
    pub runner: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    /// Duration in milliseconds.
    pub duration: Option<u64>,
    pub status: Status,
}

impl ChangeLog {
    /// Record a changeset that was applied.
    pub fn executed(
        changeset: &ChangeSet,
        order: u32,
        runner: &str,
        timestamp: DateTime<Utc>,
        duration: Duration,
    ) -> Self {
        let mut log = Self::from_changeset(changeset, Status::Executed);
        log.order = Some(order);
        log.runner = Some(runner.to_string());
        log.timestamp = Some(timestamp);
        log.duration = Some(duration_millis(duration));
        log
    }

    /// Record a changeset whose execution failed.
    pub fn failed(
        changeset: &ChangeSet,
        runner: &str,
        timestamp: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        let mut log = Self::from_changeset(changeset, Status::Failed);
        log.runner = Some(runner.to_string());
        log.timestamp = Some(timestamp);
        log.duration = Some(duration_millis(elapsed));
        log
    }

    /// Record a changeset skipped because it predates the watermark.
    pub fn skipped(changeset: &ChangeSet) -> Self {
        Self::from_changeset(changeset, Status::Skipped)
    }

    fn from_changeset(changeset: &ChangeSet, status: Status) -> Self {
        Self {
            version: changeset.version.clone(),
            order: None,
            description: changeset.description.clone(),
            kind: changeset.kind,
            script_id: changeset.script_id.clone(),
            checksum: changeset.checksum.clone(),
            runner: None,
            timestamp: None,
            duration: None,
            status,
        }
    }

    /// Store key of this record.
    pub fn key(&self) -> String {
        key_for(&self.version)
    }

    /// Whether description or script id differ from the given changeset.
    pub fn metadata_differs(&self, changeset: &ChangeSet) -> bool {
        self.description != changeset.description || self.script_id != changeset.script_id
    }

    /// Copy description and script id from the given changeset.
    pub fn apply_metadata(&mut self, changeset: &ChangeSet) {
        self.description = changeset.description.clone();
        self.script_id = changeset.script_id.clone();
    }

    /// Serialize the record to its JSON document.
    pub fn to_bytes(&self) -> Result<Vec<u8>, crate::error::StoreError> {
        serde_json::to_vec(self).map_err(|e| crate::error::StoreError::Serialization(e.to_string()))
    }

    /// Deserialize a record from its JSON document.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, crate::error::StoreError> {
        serde_json::from_slice(bytes)
            .map_err(|e| crate::error::StoreError::Deserialization(e.to_string()))
    }
}

/// Store key for a version.
pub fn key_for(version: &Version) -> String {
    format!("{KEY_PREFIX}{version}")
}

/// Whole milliseconds of a duration, saturating at `u64::MAX`.
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn changeset() -> ChangeSet {
        ChangeSet::new(
            Version::parse("1.1").unwrap(),
            2,
            "insert users",
            ChangeSetKind::BulkDocuments,
            "V1.1__insert_users",
            "99a4",
        )
    }

    #[test]
    fn test_duration_millis_saturates() {
        assert_eq!(duration_millis(Duration::from_millis(400)), 400);
        assert_eq!(duration_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_executed_record() {
        let now = Utc::now();
        let log = ChangeLog::executed(&changeset(), 2, "toto", now, Duration::from_millis(400));

        assert_eq!(log.status, Status::Executed);
        assert_eq!(log.order, Some(2));
        assert_eq!(log.runner.as_deref(), Some("toto"));
        assert_eq!(log.timestamp, Some(now));
        assert_eq!(log.duration, Some(400));
        assert_eq!(log.key(), "changelog::1.1");
    }

    #[test]
    fn test_skipped_record_has_no_execution_fields() {
        let log = ChangeLog::skipped(&changeset());

        assert_eq!(log.status, Status::Skipped);
        assert!(log.order.is_none());
        assert!(log.runner.is_none());
        assert!(log.timestamp.is_none());
        assert!(log.duration.is_none());
    }

    #[test]
    fn test_document_shape() {
        let log = ChangeLog::executed(
            &changeset(),
            2,
            "toto",
            Utc::now(),
            Duration::from_millis(12),
        );
        let value: serde_json::Value = serde_json::from_slice(&log.to_bytes().unwrap()).unwrap();
        let object = value.as_object().unwrap();

        let mut fields: Vec<&str> = object.keys().map(String::as_str).collect();
        fields.sort_unstable();
        assert_eq!(
            fields,
            vec![
                "checksum",
                "description",
                "duration",
                "order",
                "runner",
                "script",
                "status",
                "timestamp",
                "type",
                "version"
            ]
        );
        assert_eq!(object["type"], "BULK_DOCUMENTS");
        assert_eq!(object["status"], "EXECUTED");
        assert_eq!(object["version"], "1.1");

        let restored = ChangeLog::from_bytes(&log.to_bytes().unwrap()).unwrap();
        assert_eq!(restored, log);
    }

    #[test]
    fn test_metadata_reconciliation() {
        let mut log = ChangeLog::skipped(&changeset());
        let mut renamed = changeset();
        renamed.description = "create index".to_string();

        assert!(log.metadata_differs(&renamed));
        log.apply_metadata(&renamed);
        assert!(!log.metadata_differs(&renamed));
        assert_eq!(log.description, "create index");
    }
}
