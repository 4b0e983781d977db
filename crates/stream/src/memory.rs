//! In-memory audio devices for headless runs and tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};
use worldsync_kernel::{AudioInput, AudioOutput, AudioRuntime};
use worldsync_sync::HookError;

#[derive(Default)]
struct OutputState {
    written: Vec<f32>,
    cursor: u64,
}

/// An output that records everything written to it. Clones share the same
/// buffer, so a test can keep one while the stream owns another.
#[derive(Clone, Default)]
pub struct MemoryOutput {
    state: Arc<Mutex<OutputState>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> Vec<f32> {
        self.lock().written.clone()
    }

    /// Move the play cursor forward, as a device consuming `samples` would.
    /// The cursor never passes the written total.
    pub fn advance(&self, samples: u64) {
        let mut state = self.lock();
        let total = state.written.len() as u64;
        state.cursor = (state.cursor + samples).min(total);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OutputState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AudioOutput for MemoryOutput {
    fn total_samples(&self) -> u64 {
        self.lock().written.len() as u64
    }

    fn cursor_samples(&self) -> u64 {
        self.lock().cursor
    }

    fn write_samples(&mut self, samples: &[f32]) {
        self.lock().written.extend_from_slice(samples);
    }
}

/// An input fed by hand.
#[derive(Clone, Default)]
pub struct MemoryInput {
    pending: Arc<Mutex<VecDeque<f32>>>,
}

impl MemoryInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, samples: &[f32]) {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(samples.iter().copied());
    }
}

impl AudioInput for MemoryInput {
    fn unread_samples(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn read_samples(&mut self, buffer: &mut [f32]) -> usize {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let count = buffer.len().min(pending.len());
        for (slot, sample) in buffer.iter_mut().zip(pending.drain(..count)) {
            *slot = sample;
        }
        count
    }
}

/// Hands out clones of one shared input and one shared output.
#[derive(Clone, Default)]
pub struct MemoryRuntime {
    pub input: MemoryInput,
    pub output: MemoryOutput,
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AudioRuntime for MemoryRuntime {
    fn create_output(&self, seconds: f32) -> Result<Box<dyn AudioOutput>, HookError> {
        tracing::debug!(seconds, "opening memory audio output");
        Ok(Box::new(self.output.clone()))
    }

    fn open_input(&self, device: Option<&str>) -> Result<Box<dyn AudioInput>, HookError> {
        match device {
            None | Some("memory") => Ok(Box::new(self.input.clone())),
            Some(other) => Err(format!("unknown input device `{other}`").into()),
        }
    }
}
