//! Developer tooling: read-only inspectors over node trees and live worlds.
//!
//! # Invariants
//! - Inspectors never mutate what they look at.

mod inspector;

pub use inspector::{EntityInfo, NodeInspector, NodeSummary, WorldInspector, WorldStatus, WorldSummary};

pub fn crate_info() -> &'static str {
    "worldsync-tools v0.1.0"
}
