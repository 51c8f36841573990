//! C8 restore: atomic replace of a workspace's contents from a snapshot
//! archive (spec §4.8: "must leave workspace in the state captured by the
//! snapshot, bit-for-bit"). Restores into a sibling staging directory and
//! renames it over the live workspace so a crash mid-extract never leaves
//! a half-restored tree, the same atomic-swap idiom `knhk-lockchain`
//! applies to its sled database file replacement.

use std::fs;
use std::path::{Path, PathBuf};

use quadracode_types::SnapshotRecord;

use crate::error::{Result, WorkspaceError};
use crate::snapshot::aggregate_checksum;

fn extract_archive(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = fs::File::open(archive_path)?;
    let decoder = zstd::stream::Decoder::new(file).map_err(|e| WorkspaceError::Archive(e.to_string()))?;
    let mut archive = tar::Archive::new(decoder);
    archive.unpack(dest)?;
    Ok(())
}

/// Restore `workspace_root` from `snapshot` by extracting its archive into
/// a staging directory and atomically swapping it in. Blocking; run via
/// `tokio::task::spawn_blocking`.
pub fn restore_blocking(workspace_root: &Path, snapshot: &SnapshotRecord) -> Result<()> {
    let archive_path = Path::new(&snapshot.archive_ref);
    if !archive_path.exists() {
        return Err(WorkspaceError::SnapshotNotFound(snapshot.id.clone()));
    }

    let parent = workspace_root.parent().unwrap_or_else(|| Path::new("."));
    let staging = parent.join(format!(".{}-restore-{}", workspace_root.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default(), snapshot.id));
    if staging.exists() {
        fs::remove_dir_all(&staging)?;
    }
    fs::create_dir_all(&staging)?;
    extract_archive(archive_path, &staging)?;

    let restored_manifest = crate::snapshot::build_manifest(&staging)?;
    if aggregate_checksum(&restored_manifest) != snapshot.aggregate_checksum {
        fs::remove_dir_all(&staging)?;
        return Err(WorkspaceError::Archive(format!("restored tree for snapshot {} does not match manifest checksum", snapshot.id)));
    }

    if workspace_root.exists() {
        fs::remove_dir_all(workspace_root)?;
    }
    fs::rename(&staging, workspace_root)?;
    Ok(())
}

/// Async wrapper dispatching the extract/verify/swap off the cooperative
/// loop (spec §4.8 "Non-blocking contract").
pub async fn restore(workspace_root: PathBuf, snapshot: SnapshotRecord) -> Result<()> {
    tokio::task::spawn_blocking(move || restore_blocking(&workspace_root, &snapshot)).await?
}
