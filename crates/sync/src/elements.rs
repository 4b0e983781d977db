use crate::deserializer::{PointerMap, SyncDeserializer};
use crate::error::SyncError;
use crate::object::SyncObject;
use crate::serializer::{LIST_KEY, SyncSerializer, TARGET_KEY, TYPE_KEY, VALUE_KEY};
use crate::value::SyncValue;
use worldsync_common::{NetPointer, PointerAllocator};
use worldsync_persist::{DataNode, LeafValue};

/// Objects a list can build on its own while loading.
pub trait Construct: Sized {
    fn construct(allocator: &mut PointerAllocator) -> Self;
}

/// A syncable scalar.
#[derive(Debug, Clone, PartialEq)]
pub struct Synced<T> {
    pointer: NetPointer,
    value: T,
}

impl<T: SyncValue> Synced<T> {
    pub fn new(allocator: &mut PointerAllocator, value: T) -> Self {
        Self {
            pointer: allocator.allocate(),
            value,
        }
    }

    pub fn value(&self) -> &T {
        &self.value
    }

    pub fn set(&mut self, value: T) {
        self.value = value;
    }
}

impl<T: SyncValue> Construct for Synced<T> {
    fn construct(allocator: &mut PointerAllocator) -> Self {
        Self::new(allocator, T::default())
    }
}

impl<T: SyncValue> SyncObject for Synced<T> {
    fn pointer(&self) -> NetPointer {
        self.pointer
    }

    fn type_name(&self) -> &'static str {
        "Synced"
    }

    fn serialize(&self, _serializer: &SyncSerializer) -> Result<Option<DataNode>, SyncError> {
        Ok(Some(SyncSerializer::value_serialize(self, &self.value).into()))
    }

    fn deserialize(
        &mut self,
        node: &DataNode,
        deserializer: &mut SyncDeserializer<'_>,
    ) -> Result<(), SyncError> {
        let group = SyncDeserializer::expect_group(node)?;
        deserializer.load_pointer(&mut self.pointer, group)?;
        if let Some(leaf) = group.leaf(VALUE_KEY) {
            self.value = T::from_leaf(leaf)?;
        }
        Ok(())
    }
}

/// A syncable reference to another object, by pointer.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncRef {
    pointer: NetPointer,
    target: NetPointer,
}

impl SyncRef {
    pub fn new(allocator: &mut PointerAllocator) -> Self {
        Self {
            pointer: allocator.allocate(),
            target: NetPointer::NULL,
        }
    }

    pub fn target(&self) -> Option<NetPointer> {
        (!self.target.is_null()).then_some(self.target)
    }

    pub fn set_target(&mut self, target: Option<NetPointer>) {
        self.target = target.unwrap_or(NetPointer::NULL);
    }
}

impl Construct for SyncRef {
    fn construct(allocator: &mut PointerAllocator) -> Self {
        Self::new(allocator)
    }
}

impl SyncObject for SyncRef {
    fn pointer(&self) -> NetPointer {
        self.pointer
    }

    fn type_name(&self) -> &'static str {
        "SyncRef"
    }

    fn serialize(&self, _serializer: &SyncSerializer) -> Result<Option<DataNode>, SyncError> {
        Ok(Some(SyncSerializer::ref_serialize(self, self.target).into()))
    }

    fn deserialize(
        &mut self,
        node: &DataNode,
        deserializer: &mut SyncDeserializer<'_>,
    ) -> Result<(), SyncError> {
        let group = SyncDeserializer::expect_group(node)?;
        deserializer.load_pointer(&mut self.pointer, group)?;
        self.target = match group.leaf(TARGET_KEY) {
            Some(LeafValue::Pointer(p)) => *p,
            Some(other) => {
                return Err(SyncError::ValueType {
                    type_name: "NetPointer",
                    actual: other.kind(),
                });
            }
            None => NetPointer::NULL,
        };
        Ok(())
    }

    fn relink(&mut self, pointers: &PointerMap) {
        self.target = pointers.resolve(self.target);
    }
}

/// An ordered, homogeneous list of syncable children.
pub struct SyncList<T> {
    pointer: NetPointer,
    items: Vec<T>,
}

impl<T: SyncObject + Construct> SyncList<T> {
    pub fn new(allocator: &mut PointerAllocator) -> Self {
        Self {
            pointer: allocator.allocate(),
            items: Vec::new(),
        }
    }

    /// Construct a new child at the end of the list.
    pub fn add(&mut self, allocator: &mut PointerAllocator) -> &mut T {
        let index = self.items.len();
        self.items.push(T::construct(allocator));
        &mut self.items[index]
    }

    pub fn push(&mut self, item: T) {
        self.items.push(item);
    }

    /// Drop children flagged as removed.
    pub fn prune_removed(&mut self) {
        self.items.retain(|item| !item.is_removed());
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, T> {
        self.items.iter_mut()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: SyncObject + Construct> Construct for SyncList<T> {
    fn construct(allocator: &mut PointerAllocator) -> Self {
        Self::new(allocator)
    }
}

impl<T: SyncObject + Construct> SyncObject for SyncList<T> {
    fn pointer(&self) -> NetPointer {
        self.pointer
    }

    fn type_name(&self) -> &'static str {
        "SyncList"
    }

    fn serialize(&self, serializer: &SyncSerializer) -> Result<Option<DataNode>, SyncError> {
        Ok(Some(serializer.list_serialize(self, self.items.iter())?.into()))
    }

    fn deserialize(
        &mut self,
        node: &DataNode,
        deserializer: &mut SyncDeserializer<'_>,
    ) -> Result<(), SyncError> {
        let group = SyncDeserializer::expect_group(node)?;
        deserializer.load_pointer(&mut self.pointer, group)?;
        let Some(entries) = group.list(LIST_KEY) else {
            return Ok(());
        };
        self.items.clear();
        for entry in entries {
            let mut item = T::construct(deserializer.allocator());
            item.deserialize(entry, deserializer)?;
            self.items.push(item);
        }
        Ok(())
    }

    fn relink(&mut self, pointers: &PointerMap) {
        for item in &mut self.items {
            item.relink(pointers);
        }
    }
}

/// An ordered list of polymorphic children, rebuilt from type tags through
/// the [`crate::TypeRegistry`] attached to the deserializer.
pub struct SyncAbstractList<T: ?Sized> {
    pointer: NetPointer,
    items: Vec<Box<T>>,
}

impl<T: ?Sized + SyncObject + 'static> SyncAbstractList<T> {
    pub fn new(allocator: &mut PointerAllocator) -> Self {
        Self {
            pointer: allocator.allocate(),
            items: Vec::new(),
        }
    }

    pub fn push(&mut self, item: Box<T>) {
        self.items.push(item);
    }

    pub fn prune_removed(&mut self) {
        self.items.retain(|item| !item.is_removed());
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.items.iter().map(|b| b.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items.iter_mut().map(|b| b.as_mut())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<T: ?Sized + SyncObject + 'static> SyncObject for SyncAbstractList<T> {
    fn pointer(&self) -> NetPointer {
        self.pointer
    }

    fn type_name(&self) -> &'static str {
        "SyncAbstractList"
    }

    fn serialize(&self, serializer: &SyncSerializer) -> Result<Option<DataNode>, SyncError> {
        Ok(Some(
            serializer
                .abstract_list_serialize(self, self.items.iter().map(|b| b.as_ref()))?
                .into(),
        ))
    }

    fn deserialize(
        &mut self,
        node: &DataNode,
        deserializer: &mut SyncDeserializer<'_>,
    ) -> Result<(), SyncError> {
        let group = SyncDeserializer::expect_group(node)?;
        deserializer.load_pointer(&mut self.pointer, group)?;
        let Some(entries) = group.list(LIST_KEY) else {
            return Ok(());
        };
        let registry = deserializer
            .registry::<T>()
            .ok_or(SyncError::MissingRegistry(std::any::type_name::<T>()))?;

        self.items.clear();
        for entry in entries {
            let entry = SyncDeserializer::expect_group(entry)?;
            let tag = match entry.leaf(TYPE_KEY) {
                Some(LeafValue::String(tag)) => tag,
                Some(other) => {
                    return Err(SyncError::ValueType {
                        type_name: "type tag",
                        actual: other.kind(),
                    });
                }
                None => return Err(SyncError::MissingKey(TYPE_KEY)),
            };
            let mut item = registry
                .create(tag, deserializer.allocator())
                .ok_or_else(|| SyncError::UnknownType(tag.clone()))?;
            if let Some(value) = entry.get(VALUE_KEY) {
                item.deserialize(value, deserializer)?;
            }
            self.items.push(item);
        }
        Ok(())
    }

    fn relink(&mut self, pointers: &PointerMap) {
        for item in &mut self.items {
            item.relink(pointers);
        }
    }
}
