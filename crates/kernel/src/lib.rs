//! World kernel: the entity graph, per-world lifecycle and the manager owning all worlds.
//!
//! # Invariants
//! - A world's phase only moves forward; `Disposed` is terminal and gates stepping.
//! - The loading flag clears exactly once, when the scene and (for networked
//!   worlds) the session handshake are both complete.
//! - One failing world never stops the manager's step pass.

pub mod config;
pub mod entity;
pub mod error;
pub mod lifecycle;
pub mod manager;
pub mod net;
pub mod runtime;
pub mod timing;
pub mod world;

pub use config::WorldManagerConfig;
pub use entity::{Component, ComponentRegistry, Entity};
pub use error::{ConfigError, WorldError};
pub use lifecycle::{FocusLevel, FocusObserver, WorldInit, WorldPhase, WorldShared};
pub use manager::WorldManager;
pub use net::{
    DeliveryMethod, Peer, RequestType, SessionRequest, StreamReceiver, Transport, TransportError,
};
pub use runtime::{AudioInput, AudioOutput, AudioRuntime, LoadContext, LoadingDisplay, StepContext};
pub use timing::FrameTimer;
pub use world::{World, WorldHandle};

pub fn crate_info() -> &'static str {
    "worldsync-kernel v0.1.0"
}
