//! Discovered changesets and their versions.

use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Dotted numeric version (`1`, `1.1`, `2`).
///
/// Versions compare component-wise as integer sequences, so `1.2 < 1.10`
/// and `1 < 1.0 < 1.1`. Leading zeros are normalized away (`01.2` is `1.2`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    components: Vec<u64>,
}

impl Version {
    /// Parse a dotted numeric version.
    pub fn parse(s: &str) -> Result<Self, String> {
        if s.is_empty() {
            return Err("empty version".to_string());
        }

        let components = s
            .split('.')
            .map(|part| {
                if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(format!("invalid version component '{part}' in '{s}'"));
                }
                part.parse::<u64>()
                    .map_err(|e| format!("invalid version component '{part}' in '{s}': {e}"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { components })
    }

    /// Numeric components of this version.
    pub fn components(&self) -> &[u64] {
        &self.components
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.components.cmp(&other.components)
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, component) in self.components.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{component}")?;
        }
        Ok(())
    }
}

impl FromStr for Version {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Version {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Version> for String {
    fn from(version: Version) -> Self {
        version.to_string()
    }
}

/// Kind of change a changeset carries.
///
/// Each kind maps to exactly one capability of the
/// [`ScriptExecutor`](crate::executor::ScriptExecutor).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeSetKind {
    /// A script of query statements.
    QueryScript,
    /// A directory of JSON documents to upsert.
    BulkDocuments,
    /// An index definition to deploy.
    IndexDefinition,
}

impl ChangeSetKind {
    /// File extensions whose content contributes to the checksum.
    ///
    /// Only bulk document sets are directories; single-file kinds hash the file
    /// itself regardless of extension.
    pub fn member_extensions(&self) -> &'static [&'static str] {
        match self {
            ChangeSetKind::BulkDocuments => &["json"],
            ChangeSetKind::QueryScript | ChangeSetKind::IndexDefinition => &[],
        }
    }
}

impl fmt::Display for ChangeSetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeSetKind::QueryScript => write!(f, "QUERY_SCRIPT"),
            ChangeSetKind::BulkDocuments => write!(f, "BULK_DOCUMENTS"),
            ChangeSetKind::IndexDefinition => write!(f, "INDEX_DEFINITION"),
        }
    }
}

/// A discovered, not yet applied unit of change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSet {
    /// Version of the change.
    pub version: Version,
    /// Position in the discovery sequence, starting at 1.
    pub order: u32,
    /// Human readable description.
    pub description: String,
    /// Kind of change.
    pub kind: ChangeSetKind,
    /// File or directory name the changeset was discovered from.
    pub script_id: String,
    /// Content fingerprint.
    pub checksum: String,
    /// Location executors read the payload from.
    pub source: PathBuf,
}

impl ChangeSet {
    /// Create a new changeset.
    pub fn new(
        version: Version,
        order: u32,
        description: impl Into<String>,
        kind: ChangeSetKind,
        script_id: impl Into<String>,
        checksum: impl Into<String>,
    ) -> Self {
        Self {
            version,
            order,
            description: description.into(),
            kind,
            script_id: script_id.into(),
            checksum: checksum.into(),
            source: PathBuf::new(),
        }
    }

    /// Set the payload location.
    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = source.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_version_ordering() {
        assert!(v("1") < v("1.1"));
        assert!(v("1.1") < v("2"));
        assert!(v("1.2") < v("1.10"));
        assert!(v("1") < v("1.0"));
        assert!(v("1.0") < v("1.1"));
        assert_eq!(v("01.2"), v("1.2"));
    }

    #[test]
    fn test_version_display_normalizes() {
        assert_eq!(v("1.1").to_string(), "1.1");
        assert_eq!(v("002").to_string(), "2");
    }

    #[test]
    fn test_version_rejects_malformed() {
        assert!(Version::parse("").is_err());
        assert!(Version::parse("1..2").is_err());
        assert!(Version::parse("1.a").is_err());
        assert!(Version::parse("v1").is_err());
        assert!(Version::parse("1.").is_err());
    }

    #[test]
    fn test_version_serde_as_string() {
        let json = serde_json::to_string(&v("1.1")).unwrap();
        assert_eq!(json, "\"1.1\"");
        let parsed: Version = serde_json::from_str("\"3.2\"").unwrap();
        assert_eq!(parsed, v("3.2"));
        assert!(serde_json::from_str::<Version>("\"x\"").is_err());
    }

    #[test]
    fn test_kind_serde_names() {
        let json = serde_json::to_string(&ChangeSetKind::BulkDocuments).unwrap();
        assert_eq!(json, "\"BULK_DOCUMENTS\"");
        assert_eq!(ChangeSetKind::QueryScript.to_string(), "QUERY_SCRIPT");
    }
}
