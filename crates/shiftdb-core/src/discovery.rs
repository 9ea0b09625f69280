//! Changeset discovery from a migration folder.
//!
//! Each entry named `V<version>__<description>[.<ext>]` is one changeset:
//!
//! | Entry | Kind |
//! |-------|------|
//! | directory | [`ChangeSetKind::BulkDocuments`] (member `*.json` files) |
//! | `*.query` file | [`ChangeSetKind::QueryScript`] |
//! | `*.json` file | [`ChangeSetKind::IndexDefinition`] |
//!
//! Underscores in the description read as spaces. Entries that do not follow
//! the naming scheme are ignored.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::changeset::{ChangeSet, ChangeSetKind, Version};
use crate::checksum::{checksum_file, checksum_path};
use crate::error::MigrationError;

/// Extension of query script files.
pub const QUERY_EXTENSION: &str = "query";

/// Extension of index definition files.
pub const INDEX_EXTENSION: &str = "json";

/// Discover all changesets in `folder`, sorted by version.
///
/// Discovery order is assigned after sorting, starting at 1.
pub fn discover(folder: &Path) -> Result<Vec<ChangeSet>, MigrationError> {
    let entries = fs::read_dir(folder).map_err(|e| discovery_error(folder, e.to_string()))?;

    let mut changesets = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| discovery_error(folder, e.to_string()))?;
        let path = entry.path();
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            debug!(path = %path.display(), "ignoring entry with non UTF-8 name");
            continue;
        };
        let Some((version, rest)) = split_name(&name) else {
            debug!(entry = %name, "ignoring entry outside the naming scheme");
            continue;
        };

        let version = Version::parse(version).map_err(|reason| discovery_error(&path, reason))?;
        let is_dir = entry
            .file_type()
            .map_err(|e| discovery_error(&path, e.to_string()))?
            .is_dir();

        changesets.push(load_entry(path, &name, version, rest, is_dir)?);
    }

    changesets.sort_by(|a, b| a.version.cmp(&b.version));

    let mut seen = HashSet::new();
    for changeset in &changesets {
        if !seen.insert(&changeset.version) {
            return Err(discovery_error(
                folder,
                format!("duplicate changeset version {}", changeset.version),
            ));
        }
    }

    for (index, changeset) in changesets.iter_mut().enumerate() {
        changeset.order = u32::try_from(index + 1).map_err(|_| {
            discovery_error(folder, "too many changesets".to_string())
        })?;
    }

    info!(
        folder = %folder.display(),
        changesets = changesets.len(),
        "changesets discovered"
    );
    Ok(changesets)
}

/// Split `V<version>__<rest>` into its version and rest.
fn split_name(name: &str) -> Option<(&str, &str)> {
    let (version, rest) = name.strip_prefix('V')?.split_once("__")?;
    if rest.is_empty() {
        return None;
    }
    Some((version, rest))
}

fn load_entry(
    path: PathBuf,
    name: &str,
    version: Version,
    rest: &str,
    is_dir: bool,
) -> Result<ChangeSet, MigrationError> {
    let (kind, description, checksum) = if is_dir {
        let kind = ChangeSetKind::BulkDocuments;
        let checksum = checksum_path(&path, kind.member_extensions())?;
        (kind, rest, checksum)
    } else {
        let (stem, ext) = rest.rsplit_once('.').ok_or_else(|| {
            discovery_error(&path, "changeset file has no extension".to_string())
        })?;
        let kind = if ext.eq_ignore_ascii_case(QUERY_EXTENSION) {
            ChangeSetKind::QueryScript
        } else if ext.eq_ignore_ascii_case(INDEX_EXTENSION) {
            ChangeSetKind::IndexDefinition
        } else {
            return Err(discovery_error(
                &path,
                format!("unsupported changeset extension '{ext}'"),
            ));
        };
        (kind, stem, checksum_file(&path)?)
    };

    debug!(version = %version, kind = %kind, script = name, "changeset found");
    let description = description.replace('_', " ");
    Ok(ChangeSet::new(version, 0, description, kind, name, checksum).with_source(path))
}

fn discovery_error(path: &Path, reason: String) -> MigrationError {
    MigrationError::Discovery {
        path: path.to_path_buf(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("V1__create_index.query"), Some(("1", "create_index.query")));
        assert_eq!(split_name("V1.1__insert_users"), Some(("1.1", "insert_users")));
        assert_eq!(split_name("README.md"), None);
        assert_eq!(split_name("V1_missing_separator.query"), None);
        assert_eq!(split_name("V2__"), None);
    }

    #[test]
    fn test_discover_kinds_and_order() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("V2__user.json"), "{}").unwrap();
        fs::write(dir.path().join("V1__create_index.query"), "DROP x;").unwrap();
        fs::create_dir(dir.path().join("V1.1__insert_users")).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let changesets = discover(dir.path()).unwrap();
        let summary: Vec<(String, u32, &str, ChangeSetKind)> = changesets
            .iter()
            .map(|c| (c.version.to_string(), c.order, c.description.as_str(), c.kind))
            .collect();

        assert_eq!(
            summary,
            vec![
                ("1".to_string(), 1, "create index", ChangeSetKind::QueryScript),
                ("1.1".to_string(), 2, "insert users", ChangeSetKind::BulkDocuments),
                ("2".to_string(), 3, "user", ChangeSetKind::IndexDefinition),
            ]
        );
        assert_eq!(changesets[0].script_id, "V1__create_index.query");
        assert_eq!(changesets[1].source, dir.path().join("V1.1__insert_users"));
    }

    #[test]
    fn test_numeric_version_sorting() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("V10__ten.query"), "").unwrap();
        fs::write(dir.path().join("V9__nine.query"), "").unwrap();

        let versions: Vec<String> = discover(dir.path())
            .unwrap()
            .iter()
            .map(|c| c.version.to_string())
            .collect();
        assert_eq!(versions, vec!["9", "10"]);
    }

    #[test]
    fn test_missing_folder() {
        let dir = tempfile::tempdir().unwrap();
        let err = discover(&dir.path().join("missing")).unwrap_err();
        assert!(matches!(err, MigrationError::Discovery { .. }));
    }

    #[test]
    fn test_duplicate_versions() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("V1__a.query"), "").unwrap();
        fs::write(dir.path().join("V01__b.query"), "").unwrap();

        let err = discover(dir.path()).unwrap_err();
        assert!(err.to_string().contains("duplicate changeset version 1"));
    }

    #[test]
    fn test_invalid_version_and_extension() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Vx__bad.query"), "").unwrap();
        assert!(matches!(
            discover(dir.path()).unwrap_err(),
            MigrationError::Discovery { .. }
        ));

        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("V1__script.sql"), "").unwrap();
        assert!(discover(dir.path())
            .unwrap_err()
            .to_string()
            .contains("unsupported changeset extension 'sql'"));
    }
}
