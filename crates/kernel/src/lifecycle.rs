use crate::net::{Peer, StreamReceiver};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::watch;
use uuid::Uuid;
use worldsync_persist::DataNode;
use worldsync_sync::NetPointer;

/// Lifecycle phase of a world. Phases only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum WorldPhase {
    Constructed,
    Initializing,
    Loading,
    Active,
    Disposing,
    Disposed,
}

impl WorldPhase {
    pub fn is_loading(self) -> bool {
        self < WorldPhase::Active
    }

    pub fn is_disposed(self) -> bool {
        self >= WorldPhase::Disposing
    }

    /// Loading finished, one way or the other.
    pub fn is_settled(self) -> bool {
        self >= WorldPhase::Active
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub enum FocusLevel {
    #[default]
    Background,
    Focused,
    PrivateOverlay,
}

impl FocusLevel {
    fn to_u8(self) -> u8 {
        match self {
            FocusLevel::Background => 0,
            FocusLevel::Focused => 1,
            FocusLevel::PrivateOverlay => 2,
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            1 => FocusLevel::Focused,
            2 => FocusLevel::PrivateOverlay,
            _ => FocusLevel::Background,
        }
    }
}

/// Parameters of a world's synchronous initialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WorldInit {
    /// The world takes part in a network session.
    pub networked: bool,
    /// The world joins an existing session instead of hosting one.
    pub remote_join: bool,
    /// The scene comes from loaded data rather than being built fresh.
    pub from_data: bool,
    /// The world is the user's private overlay.
    pub private: bool,
}

/// Notified whenever the focused world changes.
pub trait FocusObserver: Send + Sync {
    fn focus_changed(&self, _previous: Option<&Arc<WorldShared>>, _current: &Arc<WorldShared>) {}
}

impl FocusObserver for () {}

/// The part of a world visible to background tasks without locking its
/// object graph.
pub struct WorldShared {
    id: Uuid,
    init: WorldInit,
    phase: watch::Sender<WorldPhase>,
    focus: AtomicU8,
    name: RwLock<String>,
    session_id: RwLock<String>,
    load_message: Mutex<String>,
    scene_ready: AtomicBool,
    network_ready: AtomicBool,
    step_nanos: AtomicU64,
    receivers: RwLock<HashMap<NetPointer, Arc<dyn StreamReceiver>>>,
}

impl WorldShared {
    pub fn new(init: WorldInit) -> Self {
        let (phase, _) = watch::channel(WorldPhase::Constructed);
        Self {
            id: Uuid::new_v4(),
            init,
            phase,
            focus: AtomicU8::new(FocusLevel::Background.to_u8()),
            name: RwLock::new(String::new()),
            session_id: RwLock::new(String::new()),
            load_message: Mutex::new(String::new()),
            scene_ready: AtomicBool::new(false),
            network_ready: AtomicBool::new(false),
            step_nanos: AtomicU64::new(0),
            receivers: RwLock::new(HashMap::new()),
        }
    }

    /// Process-unique identity, for logs and lookups.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn init(&self) -> WorldInit {
        self.init
    }

    pub fn phase(&self) -> WorldPhase {
        *self.phase.borrow()
    }

    pub fn is_loading(&self) -> bool {
        self.phase().is_loading()
    }

    pub fn is_disposed(&self) -> bool {
        self.phase().is_disposed()
    }

    pub fn is_settled(&self) -> bool {
        self.phase().is_settled()
    }

    /// Move to a later phase. Returns false, changing nothing, when the world
    /// is already at or past `to`.
    pub fn advance(&self, to: WorldPhase) -> bool {
        let moved = self.phase.send_if_modified(|phase| {
            if *phase >= to {
                return false;
            }
            *phase = to;
            true
        });
        if moved {
            tracing::debug!(world = %self.id, phase = ?to, "world phase changed");
        }
        moved
    }

    pub fn subscribe(&self) -> watch::Receiver<WorldPhase> {
        self.phase.subscribe()
    }

    /// Wait until the world is active or disposed.
    pub async fn settled(&self) -> WorldPhase {
        let mut rx = self.subscribe();
        match rx.wait_for(|phase| phase.is_settled()).await {
            Ok(phase) => *phase,
            Err(_) => self.phase(),
        }
    }

    pub fn mark_scene_ready(&self) {
        self.scene_ready.store(true, Ordering::Release);
        self.try_activate();
    }

    pub fn mark_network_ready(&self) {
        self.network_ready.store(true, Ordering::Release);
        self.try_activate();
    }

    /// Clear the loading flag once the scene and, for networked worlds, the
    /// handshake are both done.
    pub(crate) fn try_activate(&self) {
        if self.phase() != WorldPhase::Loading {
            return;
        }
        let scene = self.scene_ready.load(Ordering::Acquire);
        let network = !self.init.networked || self.network_ready.load(Ordering::Acquire);
        if scene && network && self.advance(WorldPhase::Active) {
            tracing::info!(world = %self.name(), "world loaded");
        }
    }

    pub fn focus(&self) -> FocusLevel {
        FocusLevel::from_u8(self.focus.load(Ordering::Acquire))
    }

    /// Returns false when the world is disposed and the focus was left alone.
    pub fn set_focus(&self, level: FocusLevel) -> bool {
        if self.is_disposed() {
            return false;
        }
        self.focus.store(level.to_u8(), Ordering::Release);
        true
    }

    pub fn name(&self) -> String {
        self.name.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn set_name(&self, name: &str) {
        *self.name.write().unwrap_or_else(PoisonError::into_inner) = name.to_owned();
    }

    pub fn session_id(&self) -> String {
        self.session_id
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn set_session_id(&self, id: &str) {
        *self.session_id.write().unwrap_or_else(PoisonError::into_inner) = id.to_owned();
    }

    pub fn load_message(&self) -> String {
        self.load_message
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_load_message(&self, message: impl Into<String>) {
        *self.load_message.lock().unwrap_or_else(PoisonError::into_inner) = message.into();
    }

    /// Duration of the world's last step.
    pub fn step_time(&self) -> Duration {
        Duration::from_nanos(self.step_nanos.load(Ordering::Relaxed))
    }

    pub(crate) fn set_step_time(&self, elapsed: Duration) {
        let nanos = u64::try_from(elapsed.as_nanos()).unwrap_or(u64::MAX);
        self.step_nanos.store(nanos, Ordering::Relaxed);
    }

    pub fn register_receiver(&self, pointer: NetPointer, receiver: Arc<dyn StreamReceiver>) {
        self.receivers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pointer, receiver);
    }

    pub fn unregister_receiver(&self, pointer: NetPointer) {
        self.receivers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&pointer);
    }

    pub(crate) fn clear_receivers(&self) {
        self.receivers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// Route a network payload to the stream registered under `pointer`.
    /// Returns false when nothing received it.
    pub fn deliver(&self, sender: &Peer, pointer: NetPointer, payload: DataNode) -> bool {
        if self.is_disposed() {
            return false;
        }
        let receiver = self
            .receivers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&pointer)
            .cloned();
        match receiver {
            Some(receiver) => {
                receiver.receive(sender, payload);
                true
            }
            None => {
                tracing::trace!(world = %self.id, %pointer, "no stream receiver for payload");
                false
            }
        }
    }
}
