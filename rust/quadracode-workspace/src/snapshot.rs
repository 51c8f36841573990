//! C8 snapshot: walk a workspace directory, build a path-sorted manifest
//! with per-file blake3 checksums (grounded on `knhk-lockchain::merkle`'s
//! use of `blake3::Hasher` for content hashing, simplified here to a flat
//! sorted manifest plus one aggregate digest rather than a full Merkle
//! tree — C8 only needs equality/drift checks, not inclusion proofs), then
//! tar+zstd the tree into a single archive (spec §4.8).

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use quadracode_types::{ManifestEntry, SnapshotRecord};

use crate::error::{Result, WorkspaceError};

fn walk_files(root: &Path) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let path = entry.path();
            let file_type = entry.file_type()?;
            if file_type.is_dir() {
                stack.push(path);
            } else if file_type.is_file() {
                out.push(path);
            }
        }
    }
    out.sort();
    Ok(out)
}

fn checksum_file(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(blake3::hash(&bytes).to_hex().to_string())
}

pub(crate) fn build_manifest(root: &Path) -> Result<Vec<ManifestEntry>> {
    let files = walk_files(root)?;
    let mut manifest = Vec::with_capacity(files.len());
    for path in files {
        let relative = path.strip_prefix(root).unwrap_or(&path).to_string_lossy().replace('\\', "/");
        let metadata = fs::metadata(&path)?;
        manifest.push(ManifestEntry {
            path: relative,
            size: metadata.len(),
            checksum: checksum_file(&path)?,
        });
    }
    manifest.sort();
    Ok(manifest)
}

/// Aggregate digest over the manifest (spec §4.8 "an aggregate checksum
/// over the manifest"): hash each entry's path/size/checksum in manifest
/// order, which is already sorted by path.
pub fn aggregate_checksum(manifest: &[ManifestEntry]) -> String {
    let mut hasher = blake3::Hasher::new();
    for entry in manifest {
        hasher.update(entry.path.as_bytes());
        hasher.update(&entry.size.to_le_bytes());
        hasher.update(entry.checksum.as_bytes());
    }
    hasher.finalize().to_hex().to_string()
}

fn write_archive(root: &Path, archive_path: &Path) -> Result<()> {
    let file = fs::File::create(archive_path)?;
    let encoder = zstd::stream::Encoder::new(file, 0).map_err(|e| WorkspaceError::Archive(e.to_string()))?;
    let mut builder = tar::Builder::new(encoder);
    builder.append_dir_all(".", root)?;
    let encoder = builder.into_inner()?;
    encoder.finish().map_err(|e| WorkspaceError::Archive(e.to_string()))?;
    Ok(())
}

/// Produce a [`SnapshotRecord`] for `workspace_root`, writing its archive
/// under `archive_dir/<id>.tar.zst` (spec §4.8). Blocking; callers on the
/// cooperative loop must run this via `tokio::task::spawn_blocking`.
pub fn snapshot_blocking(workspace_root: &Path, archive_dir: &Path, reason: &str) -> Result<SnapshotRecord> {
    fs::create_dir_all(archive_dir)?;
    let manifest = build_manifest(workspace_root)?;
    let digest = aggregate_checksum(&manifest);
    let id = format!("{}-{}", Utc::now().format("%Y%m%dT%H%M%S%.f"), &digest[..12]);
    let archive_path = archive_dir.join(format!("{id}.tar.zst"));
    write_archive(workspace_root, &archive_path)?;

    Ok(SnapshotRecord {
        id,
        timestamp: Utc::now(),
        archive_ref: archive_path.to_string_lossy().to_string(),
        manifest,
        aggregate_checksum: digest,
        reason: reason.to_string(),
    })
}

/// Async wrapper dispatching the filesystem-heavy work off the cooperative
/// loop (spec §4.8 "Non-blocking contract").
pub async fn snapshot(workspace_root: PathBuf, archive_dir: PathBuf, reason: String) -> Result<SnapshotRecord> {
    tokio::task::spawn_blocking(move || snapshot_blocking(&workspace_root, &archive_dir, &reason)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
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
    fn manifest_is_sorted_by_path_and_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        write_file(dir.path(), "b.txt", "bbb");
        write_file(dir.path(), "a/a.txt", "aaa");
        let manifest = build_manifest(dir.path()).unwrap();
        let paths: Vec<_> = manifest.iter().map(|e| e.path.clone()).collect();
        assert_eq!(paths, vec!["a/a.txt".to_string(), "b.txt".to_string()]);

        let again = build_manifest(dir.path()).unwrap();
        assert_eq!(aggregate_checksum(&manifest), aggregate_checksum(&again));
    }

    #[test]
    fn snapshot_blocking_produces_archive_and_manifest() {
        let workspace = tempfile::tempdir().unwrap();
        let archives = tempfile::tempdir().unwrap();
        write_file(workspace.path(), "src/lib.rs", "fn main() {}");

        let record = snapshot_blocking(workspace.path(), archives.path(), "skeptic_rejection").unwrap();
        assert_eq!(record.manifest.len(), 1);
        assert_eq!(record.reason, "skeptic_rejection");
        assert!(Path::new(&record.archive_ref).exists());
    }
}
