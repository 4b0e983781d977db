use crate::error::SyncError;
use crate::object::{SyncObject, SyncWorker};
use crate::value::SyncValue;
use worldsync_common::NetPointer;
use worldsync_persist::{DataNodeGroup, DataNodeList, LeafValue};

/// Key holding the subject's own pointer in every group.
pub const POINTER_KEY: &str = "pointer";
/// Key holding a scalar value, or the value of a polymorphic list entry.
pub const VALUE_KEY: &str = "value";
/// Key holding a reference's target pointer.
pub const TARGET_KEY: &str = "target";
/// Key holding the entries of a list.
pub const LIST_KEY: &str = "list";
/// Key holding the type tag of a polymorphic list entry.
pub const TYPE_KEY: &str = "type";

/// Which semantics a serializer runs with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializeMode {
    /// Save to disk: skips `no_save` fields and runs pre-save hooks.
    Persist,
    /// Network replication: skips `no_sync` fields, includes non-persistent objects.
    Replicate,
}

/// Builds node trees from syncable objects. The mode is fixed for the
/// serializer's lifetime.
#[derive(Debug, Clone)]
pub struct SyncSerializer {
    mode: SerializeMode,
}

impl SyncSerializer {
    pub fn new(mode: SerializeMode) -> Self {
        Self { mode }
    }

    pub fn persist() -> Self {
        Self::new(SerializeMode::Persist)
    }

    pub fn replicate() -> Self {
        Self::new(SerializeMode::Replicate)
    }

    pub fn mode(&self) -> SerializeMode {
        self.mode
    }

    pub fn is_replicate(&self) -> bool {
        self.mode == SerializeMode::Replicate
    }

    /// Identity-only envelope: just the pointer.
    pub fn common_serialize<O: SyncObject + ?Sized>(object: &O) -> DataNodeGroup {
        let mut group = DataNodeGroup::new();
        group.set(POINTER_KEY, LeafValue::Pointer(object.pointer()));
        group
    }

    /// Pointer plus one value. Enums store their ordinal.
    pub fn value_serialize<O: SyncObject + ?Sized, T: SyncValue>(
        object: &O,
        value: &T,
    ) -> DataNodeGroup {
        let mut group = Self::common_serialize(object);
        group.set(VALUE_KEY, value.to_leaf());
        group
    }

    /// Pointer plus the pointer of the referenced object.
    pub fn ref_serialize<O: SyncObject + ?Sized>(object: &O, target: NetPointer) -> DataNodeGroup {
        let mut group = Self::common_serialize(object);
        group.set(TARGET_KEY, LeafValue::Pointer(target));
        group
    }

    /// Pointer plus the serialized children, skipping removed or empty ones.
    pub fn list_serialize<'a, O, T, I>(&self, object: &O, items: I) -> Result<DataNodeGroup, SyncError>
    where
        O: SyncObject + ?Sized,
        T: SyncObject + ?Sized + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut list = DataNodeList::new();
        for item in items {
            if item.is_removed() {
                continue;
            }
            if let Some(node) = item.serialize(self)? {
                list.push(node);
            }
        }
        let mut group = Self::common_serialize(object);
        group.set(LIST_KEY, list);
        Ok(group)
    }

    /// Like [`Self::list_serialize`], but every entry also carries its type tag.
    pub fn abstract_list_serialize<'a, O, T, I>(
        &self,
        object: &O,
        items: I,
    ) -> Result<DataNodeGroup, SyncError>
    where
        O: SyncObject + ?Sized,
        T: SyncObject + ?Sized + 'a,
        I: IntoIterator<Item = &'a T>,
    {
        let mut list = DataNodeList::new();
        for item in items {
            if item.is_removed() {
                continue;
            }
            let mut entry = DataNodeGroup::new();
            if let Some(node) = item.serialize(self)? {
                entry.set(VALUE_KEY, node);
            }
            entry.set(TYPE_KEY, LeafValue::String(item.type_name().to_owned()));
            list.push(entry);
        }
        let mut group = Self::common_serialize(object);
        group.set(LIST_KEY, list);
        Ok(group)
    }

    /// The structural walk over a worker's registered fields.
    ///
    /// Returns `None` for a non-persistent object in a persist pass; callers
    /// omit the field in that case.
    pub fn worker_serialize<T: SyncWorker>(
        &self,
        object: &T,
    ) -> Result<Option<DataNodeGroup>, SyncError> {
        if !(object.is_persistent() || self.is_replicate()) {
            return Ok(None);
        }
        if self.mode == SerializeMode::Persist {
            if let Err(e) = object.on_save() {
                tracing::warn!(
                    pointer = %object.pointer(),
                    "failed to save {}: {e}",
                    object.type_name()
                );
            }
        }

        let mut group = DataNodeGroup::new();
        if !object.is_removed() {
            for field in T::FIELDS {
                if !field.tags.includes(self.mode) {
                    continue;
                }
                let value = (field.get)(object);
                let node = value.serialize(self).map_err(|source| SyncError::Field {
                    owner: object.type_name(),
                    field: field.name,
                    field_type: value.type_name(),
                    source: Box::new(source),
                })?;
                if let Some(node) = node {
                    group.set(field.name, node);
                }
            }
        }
        group.set(POINTER_KEY, LeafValue::Pointer(object.pointer()));
        Ok(Some(group))
    }
}
