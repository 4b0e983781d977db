//! Structural serialization of syncable object graphs into node trees.
//!
//! One serializer instance runs in exactly one mode, persist or replicate,
//! fixed at construction. Worker types describe their syncable fields with a
//! `const FIELDS` table; the structural walk filters those fields by their
//! tags and recurses into each.
//!
//! # Invariants
//! - Every group produced carries the subject's pointer under `pointer`.
//! - Objects marked removed are never emitted as list entries and are never
//!   recursed into.
//! - A failure in any field fails the whole serialize call.

mod deserializer;
mod elements;
mod error;
mod object;
mod registry;
mod serializer;
mod value;

pub use deserializer::{PointerMap, SyncDeserializer};
pub use elements::{Construct, SyncAbstractList, SyncList, SyncRef, Synced};
pub use error::SyncError;
pub use object::{FieldDescriptor, FieldTags, HookError, SyncObject, SyncWorker, relink_fields};
pub use registry::{Constructor, TypeRegistry};
pub use serializer::{
    LIST_KEY, POINTER_KEY, SerializeMode, SyncSerializer, TARGET_KEY, TYPE_KEY, VALUE_KEY,
};
pub use value::{SyncEnum, SyncValue};

pub use worldsync_common::{NetPointer, PointerAllocator};
pub use worldsync_persist::{DataNode, DataNodeGroup, DataNodeList, LeafValue};
