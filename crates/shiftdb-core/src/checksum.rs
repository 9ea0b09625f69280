//! Deterministic content fingerprints.
//!
//! A single file hashes to the lowercase hex SHA-256 of its bytes. A directory
//! hashes its matching member files one level deep: members are sorted by
//! file name, each is hashed on its own, the hex digests are concatenated in
//! that order, and the concatenation is hashed again.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

use crate::error::MigrationError;

/// Lowercase hex SHA-256 of a byte slice.
pub fn sha256_hex(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Checksum of a file, or of a directory's members with the given extensions.
///
/// Extensions are matched case-insensitively and without the leading dot.
pub fn checksum_path(path: &Path, extensions: &[&str]) -> Result<String, MigrationError> {
    let metadata = fs::metadata(path).map_err(|e| checksum_error(path, e))?;

    if metadata.is_dir() {
        let mut combined = String::new();
        for member in matching_members(path, extensions)? {
            combined.push_str(&checksum_file(&member)?);
        }
        Ok(sha256_hex(combined.as_bytes()))
    } else {
        checksum_file(path)
    }
}

/// Checksum of a single file.
pub fn checksum_file(path: &Path) -> Result<String, MigrationError> {
    let bytes = fs::read(path).map_err(|e| checksum_error(path, e))?;
    Ok(sha256_hex(&bytes))
}

/// Regular files directly under `dir` whose extension matches, sorted by name.
pub fn matching_members(dir: &Path, extensions: &[&str]) -> Result<Vec<PathBuf>, MigrationError> {
    let entries = fs::read_dir(dir).map_err(|e| checksum_error(dir, e))?;

    let mut members = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| checksum_error(dir, e))?;
        let file_type = entry.file_type().map_err(|e| checksum_error(&entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }
        let path = entry.path();
        if has_extension(&path, extensions) {
            members.push(path);
        }
    }

    members.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(members)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    extensions.iter().any(|allowed| allowed.eq_ignore_ascii_case(ext))
}

fn checksum_error(path: &Path, e: std::io::Error) -> MigrationError {
    MigrationError::Checksum {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
