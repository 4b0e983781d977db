use crate::error::SyncError;
use crate::object::SyncWorker;
use crate::registry::TypeRegistry;
use crate::serializer::POINTER_KEY;
use std::any::Any;
use std::collections::HashMap;
use worldsync_common::{NetPointer, PointerAllocator};
use worldsync_persist::{DataNode, DataNodeGroup, LeafValue};

/// Pointers seen in loaded data, mapped to the pointers the objects now hold.
#[derive(Debug, Clone, Default)]
pub struct PointerMap(HashMap<NetPointer, NetPointer>);

impl PointerMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, old: NetPointer, new: NetPointer) {
        self.0.insert(old, new);
    }

    /// The current pointer for `old`, or `old` itself when it was not remapped.
    pub fn resolve(&self, old: NetPointer) -> NetPointer {
        self.0.get(&old).copied().unwrap_or(old)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Applies a node tree to existing syncable objects.
///
/// With `new_pointers` set, objects keep the pointers they were constructed
/// with and the loaded pointers are recorded in a [`PointerMap`] so references
/// can be relinked afterwards. Otherwise the loaded pointers are adopted and
/// reserved in the allocator.
pub struct SyncDeserializer<'a> {
    allocator: &'a mut PointerAllocator,
    new_pointers: bool,
    pointers: PointerMap,
    registries: Vec<&'a dyn Any>,
}

impl<'a> SyncDeserializer<'a> {
    pub fn new(allocator: &'a mut PointerAllocator, new_pointers: bool) -> Self {
        Self {
            allocator,
            new_pointers,
            pointers: PointerMap::new(),
            registries: Vec::new(),
        }
    }

    /// Make a registry available to polymorphic lists of `T`.
    pub fn with_registry<T: ?Sized + 'static>(mut self, registry: &'a TypeRegistry<T>) -> Self {
        self.registries.push(registry);
        self
    }

    pub fn registry<T: ?Sized + 'static>(&self) -> Option<&'a TypeRegistry<T>> {
        self.registries
            .iter()
            .find_map(|r| r.downcast_ref::<TypeRegistry<T>>())
    }

    pub fn allocator(&mut self) -> &mut PointerAllocator {
        self.allocator
    }

    pub fn new_pointers(&self) -> bool {
        self.new_pointers
    }

    pub fn expect_group(node: &DataNode) -> Result<&DataNodeGroup, SyncError> {
        node.as_group().ok_or(SyncError::UnexpectedNode {
            expected: "group",
            actual: node.kind(),
        })
    }

    /// Read the `pointer` key of `group` into `pointer`.
    pub fn load_pointer(
        &mut self,
        pointer: &mut NetPointer,
        group: &DataNodeGroup,
    ) -> Result<(), SyncError> {
        let loaded = match group.leaf(POINTER_KEY) {
            Some(LeafValue::Pointer(p)) => *p,
            Some(other) => {
                return Err(SyncError::ValueType {
                    type_name: "NetPointer",
                    actual: other.kind(),
                });
            }
            None => return Err(SyncError::MissingKey(POINTER_KEY)),
        };
        if loaded.is_null() {
            return Ok(());
        }
        if self.new_pointers {
            self.pointers.insert(loaded, *pointer);
        } else {
            *pointer = loaded;
            self.allocator.reserve(loaded);
        }
        Ok(())
    }

    /// Apply each registered field present in the group. Missing keys are
    /// skipped and leave the field at its current value.
    pub fn worker_deserialize<T: SyncWorker>(
        &mut self,
        object: &mut T,
        node: &DataNode,
    ) -> Result<(), SyncError> {
        self.worker_deserialize_group(object, Self::expect_group(node)?)
    }

    /// [`Self::worker_deserialize`] for a group already unwrapped.
    pub fn worker_deserialize_group<T: SyncWorker>(
        &mut self,
        object: &mut T,
        group: &DataNodeGroup,
    ) -> Result<(), SyncError> {
        self.load_pointer(object.pointer_mut(), group)?;
        for field in T::FIELDS {
            let Some(child) = group.get(field.name) else {
                continue;
            };
            let owner = object.type_name();
            let value = (field.get_mut)(object);
            let field_type = value.type_name();
            value
                .deserialize(child, self)
                .map_err(|source| SyncError::Field {
                    owner,
                    field: field.name,
                    field_type,
                    source: Box::new(source),
                })?;
        }
        Ok(())
    }

    pub fn into_pointer_map(self) -> PointerMap {
        self.pointers
    }
}
