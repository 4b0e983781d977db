//! Shared types used by every worldsync crate.

mod types;

pub use types::{NetPointer, PointerAllocator, Transform};
