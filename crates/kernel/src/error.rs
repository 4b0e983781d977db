use crate::net::TransportError;
use worldsync_persist::{CodecError, StoreError};
use worldsync_sync::{HookError, NetPointer, SyncError};

/// Errors from world lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum WorldError {
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("component {type_name} ({pointer}) failed: {source}")]
    Component {
        pointer: NetPointer,
        type_name: &'static str,
        source: HookError,
    },
    #[error("session error: {0}")]
    Session(String),
    #[error("unexpected session response {0:?}")]
    UnexpectedResponse(crate::net::RequestType),
    #[error("no transport available for a networked world")]
    NoTransport,
    #[error("world is disposed")]
    Disposed,
}

/// Errors loading a [`crate::WorldManagerConfig`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),
}
