use crate::config::WorldManagerConfig;
use crate::entity::ComponentRegistry;
use crate::error::WorldError;
use crate::lifecycle::{FocusLevel, FocusObserver, WorldInit, WorldShared};
use crate::net::Transport;
use crate::runtime::{AudioRuntime, LoadingDisplay};
use crate::timing::FrameTimer;
use crate::world::WorldHandle;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::{Duration, Instant};
use tokio::runtime::Handle;
use worldsync_persist::{DataNodeGroup, load_json_file, save_json_file};
use worldsync_sync::SerializeMode;

const FAILED_TEXT: &str = "Failed to load world";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

/// Run one world operation, logging an error or a panic instead of
/// propagating it. Returns false when the operation panicked.
fn guarded(world: &WorldHandle, action: &str, op: impl FnOnce() -> Result<(), WorldError>) -> bool {
    match panic::catch_unwind(AssertUnwindSafe(op)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::error!(world = %world.name(), "failed to {action} world: {e}");
            true
        }
        Err(payload) => {
            tracing::error!(
                world = %world.name(),
                "world panicked during {action}: {}",
                panic_message(&*payload)
            );
            false
        }
    }
}

/// Tracks the single focused world and notifies the observer on change.
struct FocusTracker {
    focused: Mutex<Option<Arc<WorldShared>>>,
    observer: Arc<dyn FocusObserver>,
}

impl FocusTracker {
    fn new(observer: Arc<dyn FocusObserver>) -> Self {
        Self {
            focused: Mutex::new(None),
            observer,
        }
    }

    fn apply(&self, world: &Arc<WorldShared>, level: FocusLevel) {
        if !world.set_focus(level) {
            return;
        }
        let mut focused = lock(&self.focused);
        if level != FocusLevel::Focused {
            if focused.as_ref().is_some_and(|f| Arc::ptr_eq(f, world)) {
                *focused = None;
            }
            return;
        }
        if focused.as_ref().is_some_and(|f| Arc::ptr_eq(f, world)) {
            return;
        }
        let previous = focused.replace(world.clone());
        drop(focused);
        if let Some(previous) = &previous {
            previous.set_focus(FocusLevel::Background);
        }
        tracing::debug!(world = %world.name(), "focused world changed");
        self.observer.focus_changed(previous.as_ref(), world);
    }

    fn is_focused(&self, world: &Arc<WorldShared>) -> bool {
        lock(&self.focused)
            .as_ref()
            .is_some_and(|f| Arc::ptr_eq(f, world))
    }

    fn focused(&self) -> Option<Arc<WorldShared>> {
        lock(&self.focused).clone()
    }
}

/// Owns every world: creation, per-frame stepping, load feedback, focus
/// and teardown.
pub struct WorldManager {
    config: WorldManagerConfig,
    runtime: Handle,
    transport: Option<Arc<dyn Transport>>,
    audio: Option<Arc<dyn AudioRuntime>>,
    display: Option<Arc<dyn LoadingDisplay>>,
    registry: Arc<ComponentRegistry>,
    focus: Arc<FocusTracker>,
    worlds: RwLock<Vec<WorldHandle>>,
    local_world: RwLock<Option<WorldHandle>>,
    private_overlay: RwLock<Option<WorldHandle>>,
    /// Worlds awaiting load, most recently started last.
    loading: Arc<Mutex<Vec<Arc<WorldShared>>>>,
    loading_text: Mutex<Option<String>>,
    timer: Mutex<FrameTimer>,
    total_step: Mutex<Duration>,
    last_step: Mutex<Option<Instant>>,
}

impl WorldManager {
    /// Background work (handshakes, load feedback, offline disposal) is
    /// spawned on `runtime`.
    pub fn new(config: WorldManagerConfig, runtime: Handle, registry: ComponentRegistry) -> Self {
        let timer = FrameTimer::new(config.step_history);
        Self {
            config,
            runtime,
            transport: None,
            audio: None,
            display: None,
            registry: Arc::new(registry),
            focus: Arc::new(FocusTracker::new(Arc::new(()))),
            worlds: RwLock::new(Vec::new()),
            local_world: RwLock::new(None),
            private_overlay: RwLock::new(None),
            loading: Arc::new(Mutex::new(Vec::new())),
            loading_text: Mutex::new(None),
            timer: Mutex::new(timer),
            total_step: Mutex::new(Duration::ZERO),
            last_step: Mutex::new(None),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn with_audio(mut self, audio: Arc<dyn AudioRuntime>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn with_loading_display(mut self, display: Arc<dyn LoadingDisplay>) -> Self {
        self.display = Some(display);
        self
    }

    pub fn with_focus_observer(mut self, observer: Arc<dyn FocusObserver>) -> Self {
        self.focus = Arc::new(FocusTracker::new(observer));
        self
    }

    pub fn config(&self) -> &WorldManagerConfig {
        &self.config
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    fn user(&self) -> u16 {
        self.transport.as_ref().map_or(0, |t| t.local_user())
    }

    /// Create the private overlay and the local world, then focus the local world.
    pub fn init(&self) {
        let overlay = self.create_world(FocusLevel::PrivateOverlay, false, None);
        overlay.set_world_name("Private Overlay");
        *self
            .private_overlay
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(overlay);

        let local = match self.restore_local_world() {
            Some(local) => local,
            None => {
                let local = self.create_world(FocusLevel::Focused, true, Some("Local World"));
                local.set_world_name("Local World");
                local
            }
        };
        local.set_session_name("LocalWorld");
        self.focus.apply(local.shared(), FocusLevel::Focused);
        *self
            .local_world
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(local);
    }

    fn restore_local_world(&self) -> Option<WorldHandle> {
        if !self.config.restore_local_world {
            return None;
        }
        let path = self.config.local_world_path();
        if !path.exists() {
            return None;
        }
        let restored = load_json_file(&path)
            .map_err(WorldError::from)
            .and_then(|group| self.load_world_from_group(FocusLevel::Focused, &group, true));
        match restored {
            Ok(world) => {
                tracing::info!(path = %path.display(), "restored local world");
                Some(world)
            }
            Err(e) => {
                tracing::warn!(path = %path.display(), "failed to restore local world: {e}");
                None
            }
        }
    }

    /// Create a fresh world. Non-local, non-private worlds host a new session.
    pub fn create_world(
        &self,
        focus: FocusLevel,
        local: bool,
        session_name: Option<&str>,
    ) -> WorldHandle {
        let private = focus == FocusLevel::PrivateOverlay;
        let networked = !local && !private;
        let handle = WorldHandle::new(
            WorldInit {
                networked,
                remote_join: false,
                from_data: false,
                private,
            },
            self.user(),
        );
        handle.initialize();
        if let Some(name) = session_name {
            handle.set_session_name(name);
        }
        handle.finish_scene(self.audio.as_ref());
        if networked {
            self.spawn_networking(&handle, true);
        }
        self.register(&handle, focus);
        handle
    }

    /// Join an existing session by id. The scene arrives with the handshake.
    pub fn join_world(
        &self,
        session_id: &str,
        focus: FocusLevel,
        session_name: Option<&str>,
    ) -> WorldHandle {
        let handle = WorldHandle::new(
            WorldInit {
                networked: true,
                remote_join: true,
                from_data: true,
                private: false,
            },
            self.user(),
        );
        handle.initialize();
        handle.set_session_id(session_id);
        if let Some(name) = session_name {
            handle.set_session_name(name);
        }
        self.spawn_networking(&handle, false);
        self.register(&handle, focus);
        handle
    }

    /// Build a world from serialized state, with freshly allocated pointers.
    /// A world that fails to deserialize is disposed and never registered.
    pub fn load_world_from_group(
        &self,
        focus: FocusLevel,
        group: &DataNodeGroup,
        local: bool,
    ) -> Result<WorldHandle, WorldError> {
        let private = focus == FocusLevel::PrivateOverlay;
        let networked = !local && !private;
        let handle = WorldHandle::new(
            WorldInit {
                networked,
                remote_join: false,
                from_data: true,
                private,
            },
            self.user(),
        );
        handle.initialize();
        handle.shared().set_load_message("Loading world data");
        if let Err(e) = handle.load(group, true, &self.registry) {
            if let Err(dispose) = handle.dispose() {
                tracing::error!("failed to dispose unloaded world: {dispose}");
            }
            return Err(e);
        }
        handle.finish_scene(self.audio.as_ref());
        if networked {
            self.spawn_networking(&handle, true);
        }
        self.register(&handle, focus);
        Ok(handle)
    }

    pub fn load_world_from_json(
        &self,
        focus: FocusLevel,
        json: &str,
        local: bool,
    ) -> Result<WorldHandle, WorldError> {
        self.load_world_from_group(focus, &DataNodeGroup::from_json(json)?, local)
    }

    pub fn load_world_from_bytes(
        &self,
        focus: FocusLevel,
        bytes: &[u8],
        local: bool,
    ) -> Result<WorldHandle, WorldError> {
        self.load_world_from_group(focus, &DataNodeGroup::from_bytes(bytes)?, local)
    }

    fn spawn_networking(&self, handle: &WorldHandle, host: bool) {
        let handle = handle.clone();
        let transport = self.transport.clone();
        let registry = self.registry.clone();
        let audio = self.audio.clone();
        self.runtime.spawn_blocking(move || {
            handle.start_networking(host, transport.as_deref(), &registry, audio.as_ref());
        });
    }

    fn register(&self, handle: &WorldHandle, focus: FocusLevel) {
        self.worlds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handle.clone());
        self.show_loading_feedback(handle, focus);
    }

    /// Push the world on the loading stack and wait, in the background, for it
    /// to settle. Success applies `focus`; failure keeps the entry shown for
    /// the configured linger. Either way the entry is then removed.
    fn show_loading_feedback(&self, handle: &WorldHandle, focus: FocusLevel) {
        let shared = handle.shared().clone();
        lock(&self.loading).push(shared.clone());
        let loading = self.loading.clone();
        let tracker = self.focus.clone();
        let linger = self.config.failure_linger();
        self.runtime.spawn(async move {
            let phase = shared.settled().await;
            if phase.is_disposed() {
                tracing::error!(world = %shared.name(), "failed to start world");
                tokio::time::sleep(linger).await;
            } else {
                tracing::info!(world = %shared.name(), "done loading world");
                tracker.apply(&shared, focus);
            }
            lock(&loading).retain(|w| !Arc::ptr_eq(w, &shared));
        });
    }

    /// Step every world once, newest first. A failing world is logged and the
    /// pass continues; a world that panics is disposed.
    pub fn step(&self) {
        let _span = tracing::info_span!("world_manager_step").entered();
        let delta = {
            let now = Instant::now();
            let mut last = lock(&self.last_step);
            let delta = last.map_or(Duration::ZERO, |t| now.duration_since(t));
            *last = Some(now);
            delta.as_secs_f32()
        };
        let worlds = self.worlds();
        let transport = self.transport.as_deref();
        let mut total = Duration::ZERO;
        for world in worlds.iter().rev() {
            let started = Instant::now();
            if !guarded(world, "step", || world.step(delta, transport)) {
                guarded(world, "dispose", || world.dispose());
            }
            let elapsed = started.elapsed();
            world.shared().set_step_time(elapsed);
            total += elapsed;
        }
        tracing::trace!(worlds = worlds.len(), ?total, "step pass complete");

        self.prune_disposed();
        *lock(&self.total_step) = total;
        lock(&self.timer).record(total);
        self.update_loading_text();
    }

    fn prune_disposed(&self) {
        let mut lost_focus = false;
        self.worlds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|world| {
                if !world.is_disposed() {
                    return true;
                }
                tracing::debug!(world = %world.name(), "pruning disposed world");
                lost_focus |= self.focus.is_focused(world.shared());
                false
            });
        if lost_focus {
            self.focus_local_world();
        }
    }

    fn focus_local_world(&self) {
        if let Some(local) = self.local_world() {
            self.focus.apply(local.shared(), FocusLevel::Focused);
        }
    }

    fn update_loading_text(&self) {
        let top = lock(&self.loading).last().cloned();
        let text = top.and_then(|world| {
            if world.is_disposed() {
                Some(FAILED_TEXT.to_owned())
            } else if world.is_loading() {
                Some(format!("Loading World: \n{}", world.load_message()))
            } else {
                None
            }
        });
        let mut current = lock(&self.loading_text);
        if *current == text {
            return;
        }
        if let Some(display) = &self.display {
            match &text {
                Some(text) => display.show_text(text),
                None => display.clear(),
            }
        }
        *current = text;
    }

    /// The network went away: focus the local world and dispose every world
    /// except the local world and the private overlay.
    pub fn gone_offline(&self) {
        tracing::info!("gone offline, closing session worlds");
        let local = self.local_world();
        self.focus_local_world();
        for world in self.worlds() {
            let is_local = local.as_ref().is_some_and(|l| l.same_world(&world));
            if is_local || world.shared().init().private {
                continue;
            }
            self.runtime.spawn_blocking(move || {
                guarded(&world, "dispose", || world.dispose());
            });
        }
    }

    /// Unregister and dispose a world, refocusing the local world first when
    /// the removed world had focus.
    pub fn remove_world(&self, world: &WorldHandle) -> Result<(), WorldError> {
        if self.focus.is_focused(world.shared()) {
            self.focus_local_world();
        }
        self.worlds
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|w| !w.same_world(world));
        world.dispose()
    }

    pub fn set_focus(&self, world: &WorldHandle, level: FocusLevel) {
        self.focus.apply(world.shared(), level);
    }

    /// Persist the local world if enabled, then dispose every world newest
    /// first. Failures are logged, never returned.
    pub fn shutdown(&self) {
        if self.config.save_local_world {
            if let Some(local) = self.local_world() {
                let path = self.config.local_world_path();
                let saved = local
                    .serialize(SerializeMode::Persist)
                    .and_then(|group| save_json_file(&path, &group).map_err(WorldError::from));
                match saved {
                    Ok(()) => tracing::info!(path = %path.display(), "saved local world"),
                    Err(e) => tracing::error!(path = %path.display(), "failed to save local world: {e}"),
                }
            }
        }
        let worlds =
            std::mem::take(&mut *self.worlds.write().unwrap_or_else(PoisonError::into_inner));
        for world in worlds.iter().rev() {
            guarded(world, "dispose", || world.dispose());
        }
    }

    /// Snapshot of the registered worlds, in registration order.
    pub fn worlds(&self) -> Vec<WorldHandle> {
        self.worlds
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn world_by_session_id(&self, session_id: &str) -> Option<WorldHandle> {
        self.worlds()
            .into_iter()
            .find(|w| w.session_id() == session_id)
    }

    pub fn focused_world(&self) -> Option<WorldHandle> {
        let focused = self.focus.focused()?;
        self.worlds()
            .into_iter()
            .find(|w| Arc::ptr_eq(w.shared(), &focused))
    }

    pub fn local_world(&self) -> Option<WorldHandle> {
        self.local_world
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn private_overlay(&self) -> Option<WorldHandle> {
        self.private_overlay
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Duration of the last step pass over all worlds.
    pub fn total_step_time(&self) -> Duration {
        *lock(&self.total_step)
    }

    pub fn frame_timer(&self) -> FrameTimer {
        lock(&self.timer).clone()
    }

    /// Text shown for the most recently started load, if any.
    pub fn loading_text(&self) -> Option<String> {
        lock(&self.loading_text).clone()
    }

    /// Worlds still on the loading stack.
    pub fn loading_count(&self) -> usize {
        lock(&self.loading).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::Component;
    use crate::lifecycle::WorldPhase;
    use crate::net::{DeliveryMethod, SessionRequest, TransportError};
    use crate::runtime::StepContext;
    use std::any::Any;
    use std::path::Path;
    use worldsync_persist::DataNode;
    use worldsync_sync::{
        FieldDescriptor, HookError, NetPointer, PointerAllocator, SyncDeserializer, SyncError,
        SyncObject, SyncSerializer, SyncWorker, Synced, sync_field,
    };

    struct Ticker {
        pointer: NetPointer,
        count: Synced<u32>,
        fail: Synced<bool>,
        panics: bool,
    }

    impl Ticker {
        fn boxed(alloc: &mut PointerAllocator) -> Box<dyn Component> {
            Box::new(Ticker {
                pointer: alloc.allocate(),
                count: Synced::new(alloc, 0),
                fail: Synced::new(alloc, false),
                panics: false,
            })
        }
    }

    impl SyncObject for Ticker {
        fn pointer(&self) -> NetPointer {
            self.pointer
        }

        fn type_name(&self) -> &'static str {
            "Ticker"
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
    }

    impl SyncWorker for Ticker {
        const FIELDS: &'static [FieldDescriptor<Self>] = &[sync_field!(count), sync_field!(fail)];

        fn pointer_mut(&mut self) -> &mut NetPointer {
            &mut self.pointer
        }
    }

    impl Component for Ticker {
        fn step(&mut self, _ctx: &mut StepContext<'_>) -> Result<(), HookError> {
            self.count.set(self.count.value() + 1);
            if self.panics {
                let empty: Vec<u32> = Vec::new();
                let _ = empty[*self.count.value() as usize];
            }
            if *self.fail.value() {
                return Err("ticker failed".into());
            }
            Ok(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct Offline;

    impl Transport for Offline {
        fn local_user(&self) -> u16 {
            1
        }

        fn request_session(&self, _request: SessionRequest) -> Result<SessionRequest, TransportError> {
            Err(TransportError::Offline)
        }

        fn broadcast(
            &self,
            _session: &str,
            _stream: NetPointer,
            _payload: DataNode,
            _delivery: DeliveryMethod,
        ) -> Result<(), TransportError> {
            Err(TransportError::Offline)
        }
    }

    struct Host;

    impl Transport for Host {
        fn local_user(&self) -> u16 {
            1
        }

        fn request_session(&self, request: SessionRequest) -> Result<SessionRequest, TransportError> {
            let id = format!("session-{}", request.request_data.unwrap_or_default());
            Ok(SessionRequest::session_id(id, None))
        }

        fn broadcast(
            &self,
            _session: &str,
            _stream: NetPointer,
            _payload: DataNode,
            _delivery: DeliveryMethod,
        ) -> Result<(), TransportError> {
            Ok(())
        }
    }

    /// Holds the handshake until the test releases it.
    struct Gate(Mutex<std::sync::mpsc::Receiver<()>>);

    impl Transport for Gate {
        fn local_user(&self) -> u16 {
            1
        }

        fn request_session(&self, _request: SessionRequest) -> Result<SessionRequest, TransportError> {
            lock(&self.0)
                .recv_timeout(Duration::from_secs(5))
                .map_err(|e| TransportError::Request(e.to_string()))?;
            Ok(SessionRequest::session_id("gated", None))
        }

        fn broadcast(
            &self,
            _session: &str,
            _stream: NetPointer,
            _payload: DataNode,
            _delivery: DeliveryMethod,
        ) -> Result<(), TransportError> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct Texts(Mutex<Vec<String>>);

    impl LoadingDisplay for Texts {
        fn show_text(&self, text: &str) {
            lock(&self.0).push(text.to_owned());
        }
    }

    fn registry() -> ComponentRegistry {
        let mut registry = ComponentRegistry::new();
        registry.register("Ticker", Ticker::boxed);
        registry
    }

    fn manager(base_dir: &Path) -> WorldManager {
        let config = WorldManagerConfig {
            base_dir: base_dir.to_path_buf(),
            failure_linger_ms: 0,
            ..WorldManagerConfig::default()
        };
        WorldManager::new(config, Handle::current(), registry())
    }

    async fn settle(manager: &WorldManager) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while manager.loading_count() > 0 {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
    }

    async fn wait_settled(world: &WorldHandle) -> WorldPhase {
        tokio::time::timeout(Duration::from_secs(5), world.shared().settled())
            .await
            .unwrap()
    }

    fn attach_ticker(world: &WorldHandle, fail: bool) {
        attach_configured(world, |t| t.fail.set(fail));
    }

    fn attach_configured(world: &WorldHandle, configure: impl FnOnce(&mut Ticker)) {
        let mut world = world.lock();
        let (root, alloc) = world.scene_mut();
        let mut ticker = Ticker::boxed(alloc);
        if let Some(t) = ticker.as_any_mut().downcast_mut::<Ticker>() {
            configure(t);
        }
        root.attach(ticker);
    }

    fn ticks(world: &WorldHandle) -> u32 {
        *world
            .lock()
            .root
            .find_component::<Ticker>()
            .unwrap()
            .count
            .value()
    }

    #[tokio::test]
    async fn init_then_step_keeps_local_world_alive() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.init();
        manager.step();

        let local = manager.local_world().unwrap();
        assert!(!local.is_disposed());
        assert_eq!(manager.worlds().len(), 2);
        assert!(manager.total_step_time() >= Duration::ZERO);
        assert_eq!(manager.frame_timer().count(), 1);
        assert!(manager.focused_world().unwrap().same_world(&local));
        assert_eq!(local.lock().tick(), 1);
    }

    #[tokio::test]
    async fn failing_world_does_not_stop_the_pass() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let healthy = manager.create_world(FocusLevel::Background, true, None);
        let broken = manager.create_world(FocusLevel::Background, true, None);
        attach_ticker(&healthy, false);
        attach_ticker(&broken, true);

        manager.step();
        manager.step();

        assert_eq!(ticks(&healthy), 2);
        assert_eq!(ticks(&broken), 2);
        assert!(!broken.is_disposed());
    }

    #[tokio::test]
    async fn panicking_world_is_disposed_and_the_pass_continues() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let healthy = manager.create_world(FocusLevel::Background, true, None);
        let broken = manager.create_world(FocusLevel::Background, true, None);
        attach_ticker(&healthy, false);
        attach_configured(&broken, |t| t.panics = true);

        manager.step();
        manager.step();

        assert_eq!(ticks(&healthy), 2);
        assert_eq!(ticks(&broken), 1);
        assert!(broken.is_disposed());
        assert!(manager.worlds().iter().all(|w| !w.same_world(&broken)));
        manager.shutdown();
    }

    #[tokio::test]
    async fn successful_load_applies_requested_focus() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let first = manager.create_world(FocusLevel::Focused, true, None);
        settle(&manager).await;
        assert_eq!(first.focus(), FocusLevel::Focused);

        let second = manager.create_world(FocusLevel::Focused, true, None);
        settle(&manager).await;
        assert_eq!(second.focus(), FocusLevel::Focused);
        assert_eq!(first.focus(), FocusLevel::Background);
        assert!(manager.focused_world().unwrap().same_world(&second));
    }

    #[tokio::test]
    async fn hosted_world_gets_session_id() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path()).with_transport(Arc::new(Host));
        let world = manager.create_world(FocusLevel::Focused, false, Some("party"));
        assert_eq!(wait_settled(&world).await, WorldPhase::Active);
        assert_eq!(world.session_id(), "session-party");
        assert!(manager
            .world_by_session_id("session-party")
            .unwrap()
            .same_world(&world));
    }

    #[tokio::test]
    async fn failed_handshake_shows_failure_then_prunes() {
        let dir = tempfile::tempdir().unwrap();
        let texts = Arc::new(Texts::default());
        let config = WorldManagerConfig {
            base_dir: dir.path().to_path_buf(),
            failure_linger_ms: 60_000,
            ..WorldManagerConfig::default()
        };
        let manager = WorldManager::new(config, Handle::current(), registry())
            .with_transport(Arc::new(Offline))
            .with_loading_display(texts.clone());
        let world = manager.join_world("nowhere", FocusLevel::Focused, None);

        assert_eq!(wait_settled(&world).await, WorldPhase::Disposed);
        manager.step();
        assert!(manager.worlds().is_empty());
        // the failure lingers on the stack
        assert_eq!(manager.loading_count(), 1);
        assert_eq!(manager.loading_text().as_deref(), Some(FAILED_TEXT));
        assert_eq!(lock(&texts.0).last().map(String::as_str), Some(FAILED_TEXT));
        assert_eq!(world.focus(), FocusLevel::Background);
    }

    #[tokio::test]
    async fn loading_text_follows_stack_top() {
        let dir = tempfile::tempdir().unwrap();
        let (release, gate) = std::sync::mpsc::channel();
        let manager = manager(dir.path()).with_transport(Arc::new(Gate(Mutex::new(gate))));
        let world = manager.join_world("s-1", FocusLevel::Background, None);

        manager.step();
        let text = manager.loading_text().unwrap();
        assert!(text.starts_with("Loading World: \n"));

        release.send(()).unwrap();
        assert_eq!(wait_settled(&world).await, WorldPhase::Active);
        settle(&manager).await;
        manager.step();
        assert_eq!(manager.loading_text(), None);
        assert_eq!(world.session_id(), "gated");
    }

    #[tokio::test]
    async fn teardown_persists_and_init_restores_local_world() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.init();
        let local = manager.local_world().unwrap();
        attach_ticker(&local, false);
        manager.step();
        manager.shutdown();

        assert!(local.is_disposed());
        assert!(manager.worlds().is_empty());
        let path = dir.path().join("LocalWorld.json");
        assert!(path.exists());

        let config = WorldManagerConfig {
            base_dir: dir.path().to_path_buf(),
            restore_local_world: true,
            ..WorldManagerConfig::default()
        };
        let restored = WorldManager::new(config, Handle::current(), registry());
        restored.init();
        let local = restored.local_world().unwrap();
        assert_eq!(local.name(), "Local World");
        assert_eq!(ticks(&local), 1);
    }

    #[tokio::test]
    async fn teardown_skips_saving_when_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let config = WorldManagerConfig {
            base_dir: dir.path().to_path_buf(),
            save_local_world: false,
            ..WorldManagerConfig::default()
        };
        let manager = WorldManager::new(config, Handle::current(), registry());
        manager.init();
        manager.shutdown();
        assert!(!dir.path().join("LocalWorld.json").exists());
    }

    #[tokio::test]
    async fn gone_offline_keeps_local_and_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path()).with_transport(Arc::new(Host));
        manager.init();
        let session = manager.create_world(FocusLevel::Focused, false, Some("s"));
        wait_settled(&session).await;
        settle(&manager).await;

        manager.gone_offline();
        tokio::time::timeout(Duration::from_secs(5), async {
            while !session.is_disposed() {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();
        manager.step();

        assert_eq!(manager.worlds().len(), 2);
        let local = manager.local_world().unwrap();
        assert_eq!(local.focus(), FocusLevel::Focused);
        assert!(!manager.private_overlay().unwrap().is_disposed());
    }

    #[tokio::test]
    async fn removing_focused_world_refocuses_local() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        manager.init();
        let other = manager.create_world(FocusLevel::Focused, true, None);
        settle(&manager).await;
        assert!(manager.focused_world().unwrap().same_world(&other));

        manager.remove_world(&other).unwrap();
        assert!(other.is_disposed());
        let local = manager.local_world().unwrap();
        assert!(manager.focused_world().unwrap().same_world(&local));
        assert_eq!(manager.worlds().len(), 2);
    }

    #[tokio::test]
    async fn corrupt_data_is_not_registered() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path());
        let err = manager
            .load_world_from_json(FocusLevel::Focused, "{\"group\": {\"root\": 5}}", true)
            .unwrap_err();
        assert!(matches!(err, WorldError::Codec(_) | WorldError::Sync(_)));
        assert!(manager.worlds().is_empty());
    }
}
