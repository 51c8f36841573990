//! Workspace Integrity (C8): snapshot, checksum manifest, drift detection,
//! and restore for the filesystem a session's agent works in. Grounded on
//! `knhk-lockchain`'s blake3-based content hashing, simplified from a full
//! Merkle tree to a flat sorted manifest plus one aggregate digest, since
//! C8 only needs whole-tree equality and per-path drift, not inclusion
//! proofs.

pub mod diff;
pub mod error;
pub mod manager;
pub mod restore;
pub mod snapshot;
pub mod validate;

pub use diff::{diff, ManifestPatch};
pub use error::{Result, WorkspaceError};
pub use manager::WorkspaceManager;
pub use restore::restore;
pub use snapshot::{aggregate_checksum, snapshot};
pub use validate::{validate, ValidationReport};
