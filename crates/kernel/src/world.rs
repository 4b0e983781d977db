use crate::entity::{ComponentRegistry, Entity};
use crate::error::WorldError;
use crate::lifecycle::{FocusLevel, WorldInit, WorldPhase, WorldShared};
use crate::net::{RequestType, SessionRequest, Transport};
use crate::runtime::{AudioRuntime, LoadContext, StepContext};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use worldsync_persist::{DataNode, DataNodeGroup};
use worldsync_sync::{
    FieldDescriptor, FieldTags, NetPointer, PointerAllocator, PointerMap, SerializeMode,
    SyncDeserializer, SyncError, SyncObject, SyncSerializer, SyncWorker, Synced, relink_fields,
    sync_field,
};

/// The object graph of one world: its session identity and the scene tree.
pub struct World {
    pointer: NetPointer,
    pub session_id: Synced<String>,
    pub session_name: Synced<String>,
    pub world_name: Synced<String>,
    pub root: Entity,
    allocator: PointerAllocator,
    tick: u64,
}

impl World {
    /// An empty world whose pointers are allocated for peer `user`.
    pub fn new(user: u16) -> Self {
        let mut allocator = PointerAllocator::new(user);
        Self {
            pointer: allocator.allocate(),
            session_id: Synced::new(&mut allocator, String::new()),
            session_name: Synced::new(&mut allocator, String::new()),
            world_name: Synced::new(&mut allocator, String::new()),
            root: Entity::new(&mut allocator, "Root"),
            allocator,
            tick: 0,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn allocator(&mut self) -> &mut PointerAllocator {
        &mut self.allocator
    }

    /// The root entity and the allocator, borrowed together for scene building.
    pub fn scene_mut(&mut self) -> (&mut Entity, &mut PointerAllocator) {
        (&mut self.root, &mut self.allocator)
    }

    /// Serialize the whole world as a group.
    pub fn to_group(&self, mode: SerializeMode) -> Result<DataNodeGroup, SyncError> {
        Ok(SyncSerializer::new(mode)
            .worker_serialize(self)?
            .unwrap_or_default())
    }

    /// Apply a serialized world. With `new_pointers`, every object keeps a
    /// freshly allocated pointer and references are relinked to match;
    /// otherwise the pointers in `group` are adopted.
    pub fn load_group(
        &mut self,
        group: &DataNodeGroup,
        new_pointers: bool,
        registry: &ComponentRegistry,
    ) -> Result<PointerMap, SyncError> {
        let mut allocator = std::mem::take(&mut self.allocator);
        let mut deserializer =
            SyncDeserializer::new(&mut allocator, new_pointers).with_registry(registry);
        let result = deserializer.worker_deserialize_group(self, group);
        let pointers = deserializer.into_pointer_map();
        self.allocator = allocator;
        result?;
        if new_pointers {
            self.relink(&pointers);
        }
        Ok(pointers)
    }

    fn step(
        &mut self,
        world: &Arc<WorldShared>,
        delta: f32,
        transport: Option<&dyn Transport>,
    ) -> Result<(), WorldError> {
        self.tick += 1;
        let mut ctx = StepContext {
            world,
            session_id: self.session_id.value(),
            tick: self.tick,
            delta,
            transport,
        };
        let mut first_error = None;
        self.root.step_tree(&mut ctx, &mut first_error);
        first_error.map_or(Ok(()), Err)
    }

    /// Display name: the world name, else the session name.
    pub fn display_name(&self) -> &str {
        if self.world_name.value().is_empty() {
            self.session_name.value()
        } else {
            self.world_name.value()
        }
    }
}

impl SyncObject for World {
    fn pointer(&self) -> NetPointer {
        self.pointer
    }

    fn type_name(&self) -> &'static str {
        "World"
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

impl SyncWorker for World {
    const FIELDS: &'static [FieldDescriptor<Self>] = &[
        // a session id is only meaningful for the running session
        sync_field!(session_id, FieldTags::NO_SAVE),
        sync_field!(session_name),
        sync_field!(world_name),
        sync_field!(root),
    ];

    fn pointer_mut(&mut self) -> &mut NetPointer {
        &mut self.pointer
    }
}

/// A world as held by the manager: the shared lifecycle state plus the
/// object graph behind its own lock.
#[derive(Clone)]
pub struct WorldHandle {
    shared: Arc<WorldShared>,
    world: Arc<Mutex<World>>,
}

impl WorldHandle {
    pub fn new(init: WorldInit, user: u16) -> Self {
        let shared = Arc::new(WorldShared::new(init));
        shared.set_focus(FocusLevel::Background);
        Self {
            shared,
            world: Arc::new(Mutex::new(World::new(user))),
        }
    }

    pub fn shared(&self) -> &Arc<WorldShared> {
        &self.shared
    }

    /// Lock the object graph. A poisoned lock is recovered.
    pub fn lock(&self) -> MutexGuard<'_, World> {
        self.world.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn same_world(&self, other: &WorldHandle) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    pub fn phase(&self) -> WorldPhase {
        self.shared.phase()
    }

    pub fn is_loading(&self) -> bool {
        self.shared.is_loading()
    }

    pub fn is_disposed(&self) -> bool {
        self.shared.is_disposed()
    }

    pub fn focus(&self) -> FocusLevel {
        self.shared.focus()
    }

    pub fn name(&self) -> String {
        self.shared.name()
    }

    pub fn session_id(&self) -> String {
        self.shared.session_id()
    }

    /// Synchronous initialization; leaves the world loading.
    pub fn initialize(&self) {
        if !self.shared.advance(WorldPhase::Initializing) {
            return;
        }
        let init = self.shared.init();
        tracing::debug!(world = %self.shared.id(), ?init, "initializing world");
        self.shared.set_load_message("Initializing");
        self.shared.advance(WorldPhase::Loading);
        if !init.networked {
            self.shared.mark_network_ready();
        }
    }

    pub fn set_session_name(&self, name: &str) {
        let mut world = self.lock();
        world.session_name.set(name.to_owned());
        self.shared.set_name(world.display_name());
    }

    pub fn set_world_name(&self, name: &str) {
        let mut world = self.lock();
        world.world_name.set(name.to_owned());
        self.shared.set_name(world.display_name());
    }

    pub fn set_session_id(&self, id: &str) {
        self.lock().session_id.set(id.to_owned());
        self.shared.set_session_id(id);
    }

    pub fn serialize(&self, mode: SerializeMode) -> Result<DataNodeGroup, WorldError> {
        Ok(self.lock().to_group(mode)?)
    }

    /// Load serialized state into this world and refresh the mirrored names.
    pub fn load(
        &self,
        group: &DataNodeGroup,
        new_pointers: bool,
        registry: &ComponentRegistry,
    ) -> Result<(), WorldError> {
        let mut world = self.lock();
        world.load_group(group, new_pointers, registry)?;
        self.shared.set_name(world.display_name());
        if !new_pointers {
            self.shared.set_session_id(world.session_id.value());
        }
        Ok(())
    }

    /// Run the components' load hooks and mark the scene built. Hook failures
    /// are logged; the world still finishes loading.
    pub fn finish_scene(&self, audio: Option<&Arc<dyn AudioRuntime>>) {
        let ctx = LoadContext {
            world: &self.shared,
            audio,
        };
        let mut first_error = None;
        self.lock().root.loaded_tree(&ctx, &mut first_error);
        if let Some(e) = first_error {
            tracing::warn!(world = %self.name(), "load hook failed: {e}");
        }
        self.shared.mark_scene_ready();
    }

    /// Advance the world by one step. A disposed world does nothing.
    pub fn step(&self, delta: f32, transport: Option<&dyn Transport>) -> Result<(), WorldError> {
        if self.is_disposed() {
            return Ok(());
        }
        self.lock().step(&self.shared, delta, transport)
    }

    /// Dispose the world. Safe to call more than once; only the first call
    /// does anything. The world ends disposed even when a hook fails, and the
    /// first failure is returned.
    pub fn dispose(&self) -> Result<(), WorldError> {
        if !self.shared.advance(WorldPhase::Disposing) {
            return Ok(());
        }
        tracing::info!(world = %self.name(), "disposing world");
        let ctx = LoadContext {
            world: &self.shared,
            audio: None,
        };
        let mut first_error = None;
        self.lock().root.dispose_tree(&ctx, &mut first_error);
        self.shared.clear_receivers();
        self.shared.advance(WorldPhase::Disposed);
        first_error.map_or(Ok(()), Err)
    }

    /// Run the session handshake. Blocking; call it from a worker thread.
    /// Any failure disposes the world.
    pub fn start_networking(
        &self,
        host: bool,
        transport: Option<&dyn Transport>,
        registry: &ComponentRegistry,
        audio: Option<&Arc<dyn AudioRuntime>>,
    ) {
        if let Err(e) = self.handshake(host, transport, registry, audio) {
            tracing::error!(world = %self.name(), "failed to start networking: {e}");
            self.shared.set_load_message(format!("Failed: {e}"));
            if let Err(e) = self.dispose() {
                tracing::error!(world = %self.name(), "failed to dispose world: {e}");
            }
        }
    }

    fn handshake(
        &self,
        host: bool,
        transport: Option<&dyn Transport>,
        registry: &ComponentRegistry,
        audio: Option<&Arc<dyn AudioRuntime>>,
    ) -> Result<(), WorldError> {
        let transport = transport.ok_or(WorldError::NoTransport)?;
        if host {
            self.shared.set_load_message("Creating session");
            let name = self.lock().session_name.value().clone();
            let response = transport.request_session(SessionRequest::create(name))?;
            let (id, _) = session_response(response)?;
            self.set_session_id(&id);
            tracing::info!(world = %self.name(), session = %id, "hosting session");
        } else {
            self.shared.set_load_message("Joining session");
            let response = transport.request_session(SessionRequest::join(self.session_id()))?;
            let (id, state) = session_response(response)?;
            if self.is_disposed() {
                return Err(WorldError::Disposed);
            }
            if let Some(json) = state {
                self.shared.set_load_message("Loading world state");
                let group = DataNodeGroup::from_json(&json)?;
                self.load(&group, false, registry)?;
            }
            self.set_session_id(&id);
            self.finish_scene(audio);
            tracing::info!(world = %self.name(), session = %id, "joined session");
        }
        self.shared.mark_network_ready();
        Ok(())
    }
}

impl PartialEq for WorldHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same_world(other)
    }
}

impl std::fmt::Debug for WorldHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldHandle")
            .field("id", &self.shared.id())
            .field("name", &self.name())
            .field("phase", &self.phase())
            .finish()
    }
}

/// Pull the session id and optional world state out of a handshake response.
fn session_response(response: SessionRequest) -> Result<(String, Option<String>), WorldError> {
    match response.request_type {
        RequestType::SessionID | RequestType::CreateSession | RequestType::JoinSession => {
            let id = response
                .id
                .ok_or_else(|| WorldError::Session("response carried no session id".into()))?;
            Ok((id, response.request_data))
        }
        RequestType::SessionError => Err(WorldError::Session(
            response.request_data.unwrap_or_default(),
        )),
        other => Err(WorldError::UnexpectedResponse(other)),
    }
}
