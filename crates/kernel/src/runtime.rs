use crate::lifecycle::WorldShared;
use crate::net::{DeliveryMethod, Transport, TransportError};
use std::sync::Arc;
use worldsync_persist::DataNode;
use worldsync_sync::{HookError, NetPointer};

/// A captured audio source, e.g. a microphone.
pub trait AudioInput: Send {
    /// Samples captured but not yet read.
    fn unread_samples(&self) -> usize;
    /// Fill `buffer` with the oldest unread samples. Returns how many were read.
    fn read_samples(&mut self, buffer: &mut [f32]) -> usize;
}

/// A streamed audio sink with a play cursor.
pub trait AudioOutput: Send {
    /// Total samples ever written.
    fn total_samples(&self) -> u64;
    /// Samples already played.
    fn cursor_samples(&self) -> u64;
    /// Append samples after everything written so far.
    fn write_samples(&mut self, samples: &[f32]);
}

/// Platform audio collaborator.
pub trait AudioRuntime: Send + Sync {
    /// Create a streamed output holding up to `seconds` of audio.
    fn create_output(&self, seconds: f32) -> Result<Box<dyn AudioOutput>, HookError>;
    /// Open an input device, or the default one.
    fn open_input(&self, device: Option<&str>) -> Result<Box<dyn AudioInput>, HookError>;
}

/// Shows the manager's loading status to the user.
pub trait LoadingDisplay: Send + Sync {
    fn show_text(&self, text: &str);
    fn clear(&self) {}
}

/// Collaborators available to components when their world finishes loading.
pub struct LoadContext<'a> {
    pub world: &'a Arc<WorldShared>,
    pub audio: Option<&'a Arc<dyn AudioRuntime>>,
}

/// Per-step state handed to every component.
pub struct StepContext<'a> {
    pub world: &'a Arc<WorldShared>,
    pub session_id: &'a str,
    pub tick: u64,
    /// Seconds since the previous step.
    pub delta: f32,
    pub transport: Option<&'a dyn Transport>,
}

impl StepContext<'_> {
    /// Send a stream payload to the other peers of this world's session.
    ///
    /// A world without a transport or a session id has no peers; the payload
    /// is dropped.
    pub fn broadcast(
        &self,
        stream: NetPointer,
        payload: DataNode,
        delivery: DeliveryMethod,
    ) -> Result<(), TransportError> {
        match self.transport {
            Some(transport) if !self.session_id.is_empty() => {
                transport.broadcast(self.session_id, stream, payload, delivery)
            }
            _ => {
                tracing::trace!(%stream, "no session, dropping stream payload");
                Ok(())
            }
        }
    }
}
