//! Persistence: the node tree, its binary/JSON codec and JSON world files.
//! The hashed snapshot store is behind the `snapshots` feature.
//!
//! # Invariants
//! - Every leaf value survives an encode/decode round-trip unchanged.
//! - Group keys are unique and keep insertion order in every encoding.
//! - Snapshots are content-addressed and verified on load.

pub mod codec;
pub mod file;
mod float;
pub mod node;
#[cfg(feature = "snapshots")]
pub mod snapshot;
#[cfg(feature = "snapshots")]
pub mod store;

pub use codec::{CodecError, bytes_to_json, json_to_bytes};
pub use file::{StoreError, load_json_file, save_json_file};
pub use node::{DataNode, DataNodeGroup, DataNodeList, LeafType, LeafValue};
#[cfg(feature = "snapshots")]
pub use snapshot::Snapshot;
#[cfg(feature = "snapshots")]
pub use store::WorldStore;

pub fn crate_info() -> &'static str {
    "worldsync-persist v0.1.0"
}
