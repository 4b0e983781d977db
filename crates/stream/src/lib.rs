//! Replicated audio streams.
//!
//! A stream either captures from an input device and broadcasts encoded
//! frames, or buffers frames received from peers and plays them through an
//! output device, keeping a fixed amount of audio queued ahead of the play
//! cursor.
//!
//! # Invariants
//! - A stream's mode is set once; loading a second mode is an error.
//! - Receiving never blocks. When the frame queue is full, the new frame is dropped.
//! - A playback step always writes to the output, falling back to concealed
//!   silence when no frame is queued.

mod audio;
mod codec;
mod frame;
pub mod memory;

pub use audio::{
    AudioStream, OUTPUT_SECONDS, PLAYBACK_AHEAD_SAMPLES, QUEUE_CAPACITY, StreamMode,
    register_audio_streams,
};
pub use codec::{AudioCodec, AudioError, Pcm16Codec};
pub use frame::{AudioFrameTime, SAMPLE_RATE};

pub fn crate_info() -> &'static str {
    "worldsync-stream v0.1.0"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crate_loads() {
        assert!(crate_info().contains("stream"));
    }
}
