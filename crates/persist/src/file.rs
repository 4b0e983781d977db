//! Plain JSON files holding one world tree each.

use crate::codec::CodecError;
use crate::node::DataNodeGroup;
use std::path::Path;

/// Errors from file-backed persistence operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityMismatch { expected: String, actual: String },
    #[error("schema version mismatch: file has v{file_version}, expected v{expected_version}")]
    SchemaMismatch {
        file_version: u32,
        expected_version: u32,
    },
    #[error("no snapshots found")]
    NoSnapshots,
}

/// Write a tree as UTF-8 JSON, creating parent directories as needed.
pub fn save_json_file(path: impl AsRef<Path>, tree: &DataNodeGroup) -> Result<(), StoreError> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, tree.to_json()?)?;
    Ok(())
}

/// Read a tree written by [`save_json_file`].
pub fn load_json_file(path: impl AsRef<Path>) -> Result<DataNodeGroup, StoreError> {
    let json = std::fs::read_to_string(path)?;
    Ok(DataNodeGroup::from_json(&json)?)
}
