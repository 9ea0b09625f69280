//! Error types for discovery, persistence, execution, and reconciliation.

use std::path::PathBuf;

use thiserror::Error;

use crate::changeset::Version;

/// Errors raised by a [`ChangeLogStore`](crate::store::ChangeLogStore).
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying sled error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),
}

/// Errors raised by a [`ScriptExecutor`](crate::executor::ScriptExecutor).
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The payload could not be read from its source.
    #[error("cannot read {path}: {reason}")]
    Read {
        /// Path of the payload.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// A query statement could not be parsed.
    #[error("invalid statement at line {line}: {message}")]
    InvalidStatement {
        /// 1-based line on which the statement starts.
        line: usize,
        /// Description of the problem.
        message: String,
    },

    /// A document or definition is not valid JSON of the expected shape.
    #[error("invalid document '{name}': {message}")]
    InvalidDocument {
        /// Document or definition name.
        name: String,
        /// Description of the problem.
        message: String,
    },

    /// Target store error.
    #[error("target error: {0}")]
    Target(#[from] sled::Error),
}

/// Errors that abort a migration run.
///
/// Every variant is fatal to the current run. Only [`MigrationError::Execution`]
/// leaves a persisted trace (a `FAILED` changelog).
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The changeset source is missing, unreadable, or malformed.
    #[error("discovery failed for {path}: {reason}")]
    Discovery {
        /// Offending path.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// Content could not be read while fingerprinting.
    #[error("cannot compute checksum of {path}: {reason}")]
    Checksum {
        /// Offending path.
        path: PathBuf,
        /// Description of the problem.
        reason: String,
    },

    /// The executor failed to apply a changeset.
    #[error("changeset {version} failed: {source}")]
    Execution {
        /// Version of the failed changeset.
        version: Version,
        /// Underlying executor error.
        source: ExecutionError,
    },

    /// An executed changeset was modified after it was applied.
    #[error("checksum mismatch for executed changeset {version}: stored {stored}, discovered {discovered}")]
    Integrity {
        /// Version of the modified changeset.
        version: Version,
        /// Checksum recorded when the changeset was executed.
        stored: String,
        /// Checksum of the rediscovered content.
        discovered: String,
    },

    /// The discovered sequence is not strictly ascending by version.
    #[error("changesets out of order: {next} follows {previous}")]
    Ordering {
        /// Version processed before.
        previous: Version,
        /// Version that is not greater than `previous`.
        next: Version,
    },

    /// The changelog store failed.
    #[error("changelog store error: {0}")]
    Store(#[from] StoreError),
}

impl MigrationError {
    /// Version of the changeset that caused the error, if any.
    pub fn version(&self) -> Option<&Version> {
        match self {
            MigrationError::Execution { version, .. }
            | MigrationError::Integrity { version, .. } => Some(version),
            MigrationError::Ordering { next, .. } => Some(next),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MigrationError::Integrity {
            version: Version::parse("1.1").unwrap(),
            stored: "aa".to_string(),
            discovered: "bb".to_string(),
        };
        let message = err.to_string();
        assert!(message.contains("1.1"));
        assert!(message.contains("stored aa"));
    }

    #[test]
    fn test_error_version() {
        let err = MigrationError::Execution {
            version: Version::parse("2").unwrap(),
            source: ExecutionError::InvalidStatement {
                line: 3,
                message: "unknown command".to_string(),
            },
        };
        assert_eq!(err.version().map(|v| v.to_string()), Some("2".to_string()));
        assert!(err.to_string().contains("line 3"));

        let err = MigrationError::Discovery {
            path: PathBuf::from("missing"),
            reason: "not found".to_string(),
        };
        assert!(err.version().is_none());
    }
}
