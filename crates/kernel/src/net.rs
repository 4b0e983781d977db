use serde::{Deserialize, Serialize};
use worldsync_persist::DataNode;
use worldsync_sync::NetPointer;

/// Delivery guarantees a transport may offer for one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryMethod {
    Unreliable,
    ReliableUnordered,
    Sequenced,
    ReliableOrdered,
    ReliableSequenced,
}

/// A remote participant in a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Peer {
    /// Peer index; also the high bits of every pointer the peer allocates.
    pub user: u16,
    pub name: String,
}

impl Peer {
    pub fn new(user: u16, name: impl Into<String>) -> Self {
        Self {
            user,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestType {
    StatusUpdate,
    CreateSession,
    JoinSession,
    UpdateSession,
    LeaveSession,
    SessionError,
    ConnectToUser,
    SessionID,
}

/// Session handshake message exchanged with the session service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SessionRequest {
    pub request_type: RequestType,
    #[serde(default)]
    pub request_data: Option<String>,
    #[serde(default, rename = "ID")]
    pub id: Option<String>,
}

impl SessionRequest {
    pub fn new(request_type: RequestType) -> Self {
        Self {
            request_type,
            request_data: None,
            id: None,
        }
    }

    /// Ask the service to host a new session under `name`.
    pub fn create(name: impl Into<String>) -> Self {
        Self {
            request_data: Some(name.into()),
            ..Self::new(RequestType::CreateSession)
        }
    }

    pub fn join(session_id: impl Into<String>) -> Self {
        Self {
            id: Some(session_id.into()),
            ..Self::new(RequestType::JoinSession)
        }
    }

    /// Response carrying the assigned session id and, for joins, the world state JSON.
    pub fn session_id(id: impl Into<String>, world_state: Option<String>) -> Self {
        Self {
            id: Some(id.into()),
            request_data: world_state,
            ..Self::new(RequestType::SessionID)
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            request_data: Some(message.into()),
            ..Self::new(RequestType::SessionError)
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("transport is offline")]
    Offline,
    #[error("session request failed: {0}")]
    Request(String),
    #[error("broadcast failed: {0}")]
    Broadcast(String),
}

/// The low-level network transport. Implementations live outside this crate.
pub trait Transport: Send + Sync {
    /// Peer index of the local user.
    fn local_user(&self) -> u16;

    /// Perform one blocking request/response exchange with the session service.
    fn request_session(&self, request: SessionRequest) -> Result<SessionRequest, TransportError>;

    /// Send a stream payload to every peer of `session`.
    fn broadcast(
        &self,
        session: &str,
        stream: NetPointer,
        payload: DataNode,
        delivery: DeliveryMethod,
    ) -> Result<(), TransportError>;
}

/// Receives stream payloads routed to one pointer of a world.
pub trait StreamReceiver: Send + Sync {
    fn receive(&self, sender: &Peer, payload: DataNode);
}
