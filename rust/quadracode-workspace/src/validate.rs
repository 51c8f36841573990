//! C8 validate: recompute the live workspace manifest and compare it
//! against a reference snapshot, reporting drifted paths (spec §4.8).

use std::path::{Path, PathBuf};

use quadracode_types::SnapshotRecord;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::snapshot::aggregate_checksum;

/// Result of [`validate`] (spec §4.8: `validate(...) → {ok, drift_paths[]}`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub ok: bool,
    pub drift_paths: Vec<String>,
}

/// Blocking comparison of the live workspace against `reference`. A path is
/// drifted if it is missing, added, or its checksum/size changed.
pub fn validate_blocking(workspace_root: &Path, reference: &SnapshotRecord) -> Result<ValidationReport> {
    let live = crate::snapshot::build_manifest(workspace_root)?;
    if aggregate_checksum(&live) == reference.aggregate_checksum {
        return Ok(ValidationReport { ok: true, drift_paths: Vec::new() });
    }

    let mut drift = Vec::new();
    let reference_by_path: std::collections::BTreeMap<_, _> = reference.manifest.iter().map(|e| (e.path.as_str(), e)).collect();
    let live_by_path: std::collections::BTreeMap<_, _> = live.iter().map(|e| (e.path.as_str(), e)).collect();

    for (path, entry) in &live_by_path {
        match reference_by_path.get(path) {
            Some(ref_entry) if ref_entry.checksum == entry.checksum && ref_entry.size == entry.size => {}
            _ => drift.push(path.to_string()),
        }
    }
    for path in reference_by_path.keys() {
        if !live_by_path.contains_key(path) {
            drift.push(path.to_string());
        }
    }
    drift.sort();
    drift.dedup();

    Ok(ValidationReport { ok: drift.is_empty(), drift_paths: drift })
}

/// Async wrapper dispatching the walk off the cooperative loop.
pub async fn validate(workspace_root: PathBuf, reference: SnapshotRecord) -> Result<ValidationReport> {
    tokio::task::spawn_blocking(move || validate_blocking(&workspace_root, &reference)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::snapshot_blocking;
    use std::fs;
    use std::io::Write;

    fn write_file(dir: &Path, name: &str, contents: &str) {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        let mut f = fs::File::create(path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn no_drift_when_unchanged() {
        let workspace = tempfile::tempdir().unwrap();
        let archives = tempfile::tempdir().unwrap();
        write_file(workspace.path(), "a.txt", "hello");
        let record = snapshot_blocking(workspace.path(), archives.path(), "test").unwrap();

        let report = validate_blocking(workspace.path(), &record).unwrap();
        assert!(report.ok);
        assert!(report.drift_paths.is_empty());
    }

    #[test]
    fn detects_modified_and_added_files() {
        let workspace = tempfile::tempdir().unwrap();
        let archives = tempfile::tempdir().unwrap();
        write_file(workspace.path(), "a.txt", "hello");
        let record = snapshot_blocking(workspace.path(), archives.path(), "test").unwrap();

        write_file(workspace.path(), "a.txt", "modified");
        write_file(workspace.path(), "b.txt", "new");

        let report = validate_blocking(workspace.path(), &record).unwrap();
        assert!(!report.ok);
        assert_eq!(report.drift_paths, vec!["a.txt".to_string(), "b.txt".to_string()]);
    }

    #[test]
    fn detects_removed_file() {
        let workspace = tempfile::tempdir().unwrap();
        let archives = tempfile::tempdir().unwrap();
        write_file(workspace.path(), "a.txt", "hello");
        write_file(workspace.path(), "b.txt", "bye");
        let record = snapshot_blocking(workspace.path(), archives.path(), "test").unwrap();

        fs::remove_file(workspace.path().join("b.txt")).unwrap();

        let report = validate_blocking(workspace.path(), &record).unwrap();
        assert!(!report.ok);
        assert_eq!(report.drift_paths, vec!["b.txt".to_string()]);
    }
}
