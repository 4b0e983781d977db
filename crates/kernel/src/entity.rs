use crate::error::WorldError;
use crate::runtime::{LoadContext, StepContext};
use glam::{Quat, Vec3};
use std::any::Any;
use worldsync_common::Transform;
use worldsync_persist::DataNode;
use worldsync_sync::{
    Construct, FieldDescriptor, HookError, NetPointer, PointerAllocator, PointerMap,
    SyncAbstractList, SyncDeserializer, SyncError, SyncList, SyncObject, SyncSerializer,
    SyncWorker, Synced, TypeRegistry, relink_fields, sync_field,
};

/// Behaviour attached to an entity. Components are syncable workers rebuilt
/// from their type tag through a [`ComponentRegistry`].
pub trait Component: SyncObject + 'static {
    /// Called once the owning world finished building or loading its scene.
    fn on_loaded(&mut self, _ctx: &LoadContext<'_>) -> Result<(), HookError> {
        Ok(())
    }

    fn step(&mut self, _ctx: &mut StepContext<'_>) -> Result<(), HookError> {
        Ok(())
    }

    /// Release anything the component holds outside the object graph.
    fn on_dispose(&mut self, _ctx: &LoadContext<'_>) -> Result<(), HookError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

pub type ComponentRegistry = TypeRegistry<dyn Component>;

/// A node of the scene tree: a transform, child entities and components.
pub struct Entity {
    pointer: NetPointer,
    removed: bool,
    pub name: Synced<String>,
    pub enabled: Synced<bool>,
    pub persistent: Synced<bool>,
    pub position: Synced<Vec3>,
    pub rotation: Synced<Quat>,
    pub scale: Synced<Vec3>,
    pub children: SyncList<Entity>,
    pub components: SyncAbstractList<dyn Component>,
}

impl Entity {
    pub fn new(allocator: &mut PointerAllocator, name: &str) -> Self {
        Self {
            pointer: allocator.allocate(),
            removed: false,
            name: Synced::new(allocator, name.to_owned()),
            enabled: Synced::new(allocator, true),
            persistent: Synced::new(allocator, true),
            position: Synced::new(allocator, Vec3::ZERO),
            rotation: Synced::new(allocator, Quat::IDENTITY),
            scale: Synced::new(allocator, Vec3::ONE),
            children: SyncList::new(allocator),
            components: SyncAbstractList::new(allocator),
        }
    }

    pub fn add_child(&mut self, allocator: &mut PointerAllocator, name: &str) -> &mut Entity {
        let child = self.children.add(allocator);
        child.name.set(name.to_owned());
        child
    }

    /// Attach a component; returns its pointer.
    pub fn attach(&mut self, component: Box<dyn Component>) -> NetPointer {
        let pointer = component.pointer();
        self.components.push(component);
        pointer
    }

    /// Mark this entity removed. It disappears from every later serialization
    /// and is no longer stepped.
    pub fn destroy(&mut self) {
        self.removed = true;
    }

    pub fn transform(&self) -> Transform {
        Transform {
            position: *self.position.value(),
            rotation: *self.rotation.value(),
            scale: *self.scale.value(),
        }
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.position.set(transform.position);
        self.rotation.set(transform.rotation);
        self.scale.set(transform.scale);
    }

    pub fn find_component<C: Component>(&self) -> Option<&C> {
        self.components
            .iter()
            .find_map(|c| c.as_any().downcast_ref::<C>())
    }

    pub fn find_component_mut<C: Component>(&mut self) -> Option<&mut C> {
        self.components
            .iter_mut()
            .find_map(|c| c.as_any_mut().downcast_mut::<C>())
    }

    /// Depth-first search by name, including this entity.
    pub fn find_child(&self, name: &str) -> Option<&Entity> {
        if self.name.value() == name {
            return Some(self);
        }
        self.children.iter().find_map(|child| child.find_child(name))
    }

    /// Number of live entities in this subtree, including this one.
    pub fn entity_count(&self) -> usize {
        if self.removed {
            return 0;
        }
        1 + self.children.iter().map(Entity::entity_count).sum::<usize>()
    }

    pub fn component_count(&self) -> usize {
        if self.removed {
            return 0;
        }
        self.components.iter().filter(|c| !c.is_removed()).count()
            + self
                .children
                .iter()
                .map(Entity::component_count)
                .sum::<usize>()
    }

    pub(crate) fn loaded_tree(&mut self, ctx: &LoadContext<'_>, first_error: &mut Option<WorldError>) {
        if self.removed {
            return;
        }
        for component in self.components.iter_mut() {
            if let Err(source) = component.on_loaded(ctx) {
                record(first_error, component, source);
            }
        }
        for child in self.children.iter_mut() {
            child.loaded_tree(ctx, first_error);
        }
    }

    /// Step every component of enabled, live entities. Every component is
    /// stepped even after a failure; the first failure is kept.
    pub(crate) fn step_tree(&mut self, ctx: &mut StepContext<'_>, first_error: &mut Option<WorldError>) {
        if self.removed || !*self.enabled.value() {
            return;
        }
        for component in self.components.iter_mut() {
            if component.is_removed() {
                continue;
            }
            if let Err(source) = component.step(ctx) {
                record(first_error, component, source);
            }
        }
        for child in self.children.iter_mut() {
            child.step_tree(ctx, first_error);
        }
    }

    pub(crate) fn dispose_tree(&mut self, ctx: &LoadContext<'_>, first_error: &mut Option<WorldError>) {
        for component in self.components.iter_mut() {
            if let Err(source) = component.on_dispose(ctx) {
                record(first_error, component, source);
            }
        }
        for child in self.children.iter_mut() {
            child.dispose_tree(ctx, first_error);
        }
    }
}

fn record(first_error: &mut Option<WorldError>, component: &dyn Component, source: HookError) {
    tracing::debug!(
        pointer = %component.pointer(),
        "component {} failed: {source}",
        component.type_name()
    );
    if first_error.is_none() {
        *first_error = Some(WorldError::Component {
            pointer: component.pointer(),
            type_name: component.type_name(),
            source,
        });
    }
}

impl Construct for Entity {
    fn construct(allocator: &mut PointerAllocator) -> Self {
        Self::new(allocator, "Entity")
    }
}

impl SyncObject for Entity {
    fn pointer(&self) -> NetPointer {
        self.pointer
    }

    fn is_removed(&self) -> bool {
        self.removed
    }

    fn is_persistent(&self) -> bool {
        *self.persistent.value()
    }

    fn type_name(&self) -> &'static str {
        "Entity"
    }

    fn serialize(&self, serializer: &SyncSerializer) -> Result<Option<DataNode>, SyncError> {
        Ok(serializer.worker_serialize(self)?.map(DataNode::Group))
    }

    fn deserialize(
        &mut self,
        node: &DataNode,
        deserializer: &mut SyncDeserializer<'_>,
    ) -> Result<(), SyncError> {
        deserializer.worker_deserialize(self, node)
    }

    fn relink(&mut self, pointers: &PointerMap) {
        relink_fields(self, pointers);
    }
}

impl SyncWorker for Entity {
    const FIELDS: &'static [FieldDescriptor<Self>] = &[
        sync_field!(name),
        sync_field!(enabled),
        sync_field!(persistent),
        sync_field!(position),
        sync_field!(rotation),
        sync_field!(scale),
        sync_field!(children),
        sync_field!(components),
    ];

    fn pointer_mut(&mut self) -> &mut NetPointer {
        &mut self.pointer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use worldsync_sync::SerializeMode;

    #[test]
    fn children_and_counts() {
        let mut alloc = PointerAllocator::new(1);
        let mut root = Entity::new(&mut alloc, "Root");
        let floor = root.add_child(&mut alloc, "Floor");
        floor.add_child(&mut alloc, "Tile");
        root.add_child(&mut alloc, "Sky");
        assert_eq!(root.entity_count(), 4);
        assert!(root.find_child("Tile").is_some());
        assert!(root.find_child("Nope").is_none());
    }

    #[test]
    fn destroyed_child_is_not_serialized() {
        let mut alloc = PointerAllocator::new(1);
        let mut root = Entity::new(&mut alloc, "Root");
        root.add_child(&mut alloc, "Keep");
        root.add_child(&mut alloc, "Drop").destroy();

        let node = root
            .serialize(&SyncSerializer::new(SerializeMode::Persist))
            .unwrap()
            .unwrap();
        let children = node
            .as_group()
            .and_then(|g| g.group("children"))
            .and_then(|g| g.list(worldsync_sync::LIST_KEY))
            .unwrap();
        assert_eq!(children.len(), 1);
        assert_eq!(root.entity_count(), 2);
    }

    #[test]
    fn non_persistent_child_only_replicates() {
        let mut alloc = PointerAllocator::new(1);
        let mut root = Entity::new(&mut alloc, "Root");
        root.add_child(&mut alloc, "Temp").persistent.set(false);

        let count = |mode| {
            let node = root.serialize(&SyncSerializer::new(mode)).unwrap().unwrap();
            node.as_group()
                .and_then(|g| g.group("children"))
                .and_then(|g| g.list(worldsync_sync::LIST_KEY))
                .map(|l| l.len())
                .unwrap()
        };
        assert_eq!(count(SerializeMode::Persist), 0);
        assert_eq!(count(SerializeMode::Replicate), 1);
    }

    #[test]
    fn transform_roundtrip() {
        let mut alloc = PointerAllocator::new(1);
        let mut e = Entity::new(&mut alloc, "E");
        let t = Transform {
            position: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_y(0.5),
            scale: Vec3::splat(2.0),
        };
        e.set_transform(t);
        assert_eq!(e.transform(), t);
    }
}
