//! C8 diff: compute the manifest patch between two snapshots (spec §4.8:
//! `diff(snapshot_a, snapshot_b) → manifest_patch`).

use quadracode_types::{ManifestEntry, SnapshotRecord};
use serde::{Deserialize, Serialize};

/// Added/removed/changed paths between two snapshot manifests.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestPatch {
    pub added: Vec<ManifestEntry>,
    pub removed: Vec<ManifestEntry>,
    pub changed: Vec<(ManifestEntry, ManifestEntry)>,
}

/// Diff `a` against `b`: entries only in `b` are `added`, entries only in
/// `a` are `removed`, entries present in both with a different checksum
/// or size are `changed` as `(from_a, from_b)` pairs.
pub fn diff(a: &SnapshotRecord, b: &SnapshotRecord) -> ManifestPatch {
    let mut patch = ManifestPatch::default();
    let a_by_path: std::collections::BTreeMap<_, _> = a.manifest.iter().map(|e| (e.path.as_str(), e)).collect();
    let b_by_path: std::collections::BTreeMap<_, _> = b.manifest.iter().map(|e| (e.path.as_str(), e)).collect();

    for (path, entry_b) in &b_by_path {
        match a_by_path.get(path) {
            None => patch.added.push((*entry_b).clone()),
            Some(entry_a) if entry_a.checksum != entry_b.checksum || entry_a.size != entry_b.size => {
                patch.changed.push(((*entry_a).clone(), (*entry_b).clone()));
            }
            Some(_) => {}
        }
    }
    for (path, entry_a) in &a_by_path {
        if !b_by_path.contains_key(path) {
            patch.removed.push((*entry_a).clone());
        }
    }

    patch.added.sort();
    patch.removed.sort();
    patch.changed.sort_by(|x, y| x.0.path.cmp(&y.0.path));
    patch
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snapshot(entries: Vec<(&str, &str)>) -> SnapshotRecord {
        let manifest = entries
            .into_iter()
            .map(|(path, checksum)| ManifestEntry { path: path.to_string(), size: checksum.len() as u64, checksum: checksum.to_string() })
            .collect();
        SnapshotRecord { id: "s".into(), timestamp: Utc::now(), archive_ref: "a".into(), manifest, aggregate_checksum: "x".into(), reason: "test".into() }
    }

    #[test]
    fn reports_added_removed_and_changed() {
        let a = snapshot(vec![("a.txt", "h1"), ("b.txt", "h2")]);
        let b = snapshot(vec![("a.txt", "h1-changed"), ("c.txt", "h3")]);

        let patch = diff(&a, &b);
        assert_eq!(patch.added.len(), 1);
        assert_eq!(patch.added[0].path, "c.txt");
        assert_eq!(patch.removed.len(), 1);
        assert_eq!(patch.removed[0].path, "b.txt");
        assert_eq!(patch.changed.len(), 1);
        assert_eq!(patch.changed[0].0.path, "a.txt");
    }

    #[test]
    fn identical_snapshots_diff_to_empty_patch() {
        let a = snapshot(vec![("a.txt", "h1")]);
        let patch = diff(&a, &a.clone());
        assert_eq!(patch, ManifestPatch::default());
    }
}
