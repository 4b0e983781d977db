use glam::{Quat, Vec3};
use std::time::Duration;
use worldsync_common::Transform;
use worldsync_kernel::{Entity, FocusLevel, World, WorldHandle, WorldPhase};
use worldsync_persist::{DataNode, DataNodeGroup, LeafValue};
use worldsync_sync::{NetPointer, SyncObject};

/// Shape statistics of a node tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeSummary {
    pub groups: usize,
    pub lists: usize,
    pub leaves: usize,
    /// Depth of the deepest node; the root group is depth 1.
    pub max_depth: usize,
    /// Non-null pointer leaves.
    pub pointers: usize,
    /// Total length of byte leaves.
    pub payload_bytes: usize,
}

impl std::fmt::Display for NodeSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Nodes: groups={} lists={} leaves={} depth={} pointers={} bytes={}",
            self.groups, self.lists, self.leaves, self.max_depth, self.pointers, self.payload_bytes
        )
    }
}

/// Read-only queries over serialized node trees.
pub struct NodeInspector;

impl NodeInspector {
    pub fn summary(root: &DataNodeGroup) -> NodeSummary {
        let mut summary = NodeSummary::default();
        Self::visit_group(root, 1, &mut summary);
        summary
    }

    /// Every distinct non-null pointer in the tree, in first-seen order.
    pub fn pointers(root: &DataNodeGroup) -> Vec<NetPointer> {
        let mut found = Vec::new();
        let mut stack: Vec<&DataNode> = root.iter().map(|(_, n)| n).collect::<Vec<_>>().into_iter().rev().collect();
        while let Some(node) = stack.pop() {
            match node {
                DataNode::Leaf(LeafValue::Pointer(p)) if !p.is_null() && !found.contains(p) => {
                    found.push(*p);
                }
                DataNode::Leaf(_) => {}
                DataNode::Group(group) => stack.extend(group.iter().map(|(_, n)| n).collect::<Vec<_>>().into_iter().rev()),
                DataNode::List(list) => stack.extend(list.iter().rev()),
            }
        }
        found
    }

    fn visit_group(group: &DataNodeGroup, depth: usize, summary: &mut NodeSummary) {
        summary.groups += 1;
        summary.max_depth = summary.max_depth.max(depth);
        for (_, child) in group.iter() {
            Self::visit(child, depth + 1, summary);
        }
    }

    fn visit(node: &DataNode, depth: usize, summary: &mut NodeSummary) {
        match node {
            DataNode::Leaf(leaf) => {
                summary.leaves += 1;
                summary.max_depth = summary.max_depth.max(depth);
                match leaf {
                    LeafValue::Pointer(p) if !p.is_null() => summary.pointers += 1,
                    LeafValue::Bytes(b) => summary.payload_bytes += b.len(),
                    _ => {}
                }
            }
            DataNode::Group(group) => Self::visit_group(group, depth, summary),
            DataNode::List(list) => {
                summary.lists += 1;
                summary.max_depth = summary.max_depth.max(depth);
                for child in list.iter() {
                    Self::visit(child, depth + 1, summary);
                }
            }
        }
    }
}

/// World inspector for developer tooling.
///
/// Provides read-only queries against live world state for debugging and
/// profiling.
pub struct WorldInspector;

impl WorldInspector {
    pub fn summary(world: &World) -> WorldSummary {
        WorldSummary {
            name: world.display_name().to_string(),
            session_id: world.session_id.value().clone(),
            tick: world.tick(),
            entity_count: world.root.entity_count(),
            component_count: world.root.component_count(),
        }
    }

    /// Lifecycle view of a managed world.
    pub fn status(handle: &WorldHandle) -> WorldStatus {
        WorldStatus {
            name: handle.name(),
            phase: handle.phase(),
            focus: handle.focus(),
            session_id: handle.session_id(),
            step_time: handle.shared().step_time(),
        }
    }

    /// Find an entity by name, depth first from the root.
    pub fn inspect_entity(world: &World, name: &str) -> Option<EntityInfo> {
        let entity = if world.root.name.value().as_str() == name {
            &world.root
        } else {
            world.root.find_child(name)?
        };
        Some(EntityInfo::from_entity(entity))
    }

    /// Every live entity, depth first.
    pub fn list_entities(world: &World) -> Vec<EntityInfo> {
        let mut out = Vec::new();
        let mut stack = vec![&world.root];
        while let Some(entity) = stack.pop() {
            if entity.is_removed() {
                continue;
            }
            out.push(EntityInfo::from_entity(entity));
            stack.extend(entity.children.iter().rev());
        }
        out
    }
}

/// Summary of world state for the inspector.
#[derive(Debug, Clone)]
pub struct WorldSummary {
    pub name: String,
    pub session_id: String,
    pub tick: u64,
    pub entity_count: usize,
    pub component_count: usize,
}

impl std::fmt::Display for WorldSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "World '{}': tick={} entities={} components={}",
            self.name, self.tick, self.entity_count, self.component_count
        )?;
        if !self.session_id.is_empty() {
            write!(f, " session={}", self.session_id)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct WorldStatus {
    pub name: String,
    pub phase: WorldPhase,
    pub focus: FocusLevel,
    pub session_id: String,
    pub step_time: Duration,
}

impl std::fmt::Display for WorldStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:<20} {:?} focus={:?} step={:.3}ms",
            self.name,
            self.phase,
            self.focus,
            self.step_time.as_secs_f64() * 1000.0
        )
    }
}

/// Detailed info about a single entity.
#[derive(Debug, Clone)]
pub struct EntityInfo {
    pub pointer: NetPointer,
    pub name: String,
    pub enabled: bool,
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
    pub components: Vec<&'static str>,
}

impl EntityInfo {
    fn from_entity(entity: &Entity) -> Self {
        let Transform {
            position,
            rotation,
            scale,
        } = entity.transform();
        Self {
            pointer: entity.pointer(),
            name: entity.name.value().clone(),
            enabled: *entity.enabled.value(),
            position,
            rotation,
            scale,
            components: entity
                .components
                .iter()
                .filter(|c| !c.is_removed())
                .map(|c| c.type_name())
                .collect(),
        }
    }
}

impl std::fmt::Display for EntityInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Entity [{}] {} pos=({:.2}, {:.2}, {:.2}) scale=({:.2}, {:.2}, {:.2})",
            self.pointer,
            self.name,
            self.position.x,
            self.position.y,
            self.position.z,
            self.scale.x,
            self.scale.y,
            self.scale.z,
        )?;
        if !self.enabled {
            write!(f, " (disabled)")?;
        }
        if !self.components.is_empty() {
            write!(f, " [{}]", self.components.join(", "))?;
        }
        Ok(())
    }
}
