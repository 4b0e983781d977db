use crate::deserializer::{PointerMap, SyncDeserializer};
use crate::error::SyncError;
use crate::serializer::{SerializeMode, SyncSerializer};
use worldsync_common::NetPointer;
use worldsync_persist::DataNode;

/// Error type returned by best-effort extension hooks.
pub type HookError = Box<dyn std::error::Error + Send + Sync>;

/// An object that takes part in structural serialization.
pub trait SyncObject: Send {
    /// Stable, world-scoped identity of this object.
    fn pointer(&self) -> NetPointer;

    fn is_removed(&self) -> bool {
        false
    }

    /// Whether the object survives across sessions. Non-persistent objects
    /// are still replicated.
    fn is_persistent(&self) -> bool {
        true
    }

    /// Type tag written into saved data to rebuild entries of polymorphic
    /// lists. It must stay the same across builds, so every type names its own.
    fn type_name(&self) -> &'static str;

    /// Called before a persist pass serializes this object.
    fn on_save(&self) -> Result<(), HookError> {
        Ok(())
    }

    /// Serialize into a node, or `None` when the object should be omitted.
    fn serialize(&self, serializer: &SyncSerializer) -> Result<Option<DataNode>, SyncError>;

    fn deserialize(
        &mut self,
        node: &DataNode,
        deserializer: &mut SyncDeserializer<'_>,
    ) -> Result<(), SyncError>;

    /// Rewrite references after a load that assigned fresh pointers.
    fn relink(&mut self, _pointers: &PointerMap) {}
}

/// Tags controlling in which passes a field is emitted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FieldTags {
    /// Excluded from persist passes.
    pub no_save: bool,
    /// Excluded from replicate passes.
    pub no_sync: bool,
}

impl FieldTags {
    pub const NONE: FieldTags = FieldTags {
        no_save: false,
        no_sync: false,
    };
    pub const NO_SAVE: FieldTags = FieldTags {
        no_save: true,
        no_sync: false,
    };
    pub const NO_SYNC: FieldTags = FieldTags {
        no_save: false,
        no_sync: true,
    };
    pub const LOCAL: FieldTags = FieldTags {
        no_save: true,
        no_sync: true,
    };

    pub fn includes(self, mode: SerializeMode) -> bool {
        match mode {
            SerializeMode::Persist => !self.no_save,
            SerializeMode::Replicate => !self.no_sync,
        }
    }
}

/// One syncable field of a worker type.
pub struct FieldDescriptor<T> {
    pub name: &'static str,
    pub tags: FieldTags,
    pub get: fn(&T) -> &dyn SyncObject,
    pub get_mut: fn(&mut T) -> &mut dyn SyncObject,
}

/// A syncable object whose state is a fixed, ordered set of syncable fields.
///
/// No field may be named `pointer`; that key holds the worker's own pointer.
pub trait SyncWorker: SyncObject + Sized + 'static {
    const FIELDS: &'static [FieldDescriptor<Self>];

    /// The worker's own pointer, rebound by the deserializer when adopting
    /// pointers from a remote peer.
    fn pointer_mut(&mut self) -> &mut NetPointer;
}

/// Build a [`FieldDescriptor`] for a named field of `Self`.
///
/// ```ignore
/// const FIELDS: &'static [FieldDescriptor<Self>] = &[
///     sync_field!(name),
///     sync_field!(session_id, FieldTags::NO_SAVE),
/// ];
/// ```
#[macro_export]
macro_rules! sync_field {
    ($field:ident) => {
        $crate::sync_field!($field, $crate::FieldTags::NONE)
    };
    ($field:ident, $tags:expr) => {
        $crate::FieldDescriptor {
            name: stringify!($field),
            tags: $tags,
            get: |object| &object.$field,
            get_mut: |object| &mut object.$field,
        }
    };
}

/// Relink every registered field of a worker.
pub fn relink_fields<T: SyncWorker>(object: &mut T, pointers: &PointerMap) {
    for field in T::FIELDS {
        (field.get_mut)(object).relink(pointers);
    }
}
