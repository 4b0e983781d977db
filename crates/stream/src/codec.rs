use crate::audio::StreamMode;
use worldsync_kernel::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("codec does not support {0}")]
    NotSupported(&'static str),
    #[error("malformed audio frame: {0}")]
    Malformed(String),
    #[error("stream already loaded for {0:?}")]
    ModeAlreadySet(StreamMode),
    #[error("audio device error: {0}")]
    Device(String),
    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Turns raw samples into wire frames and back.
///
/// Codecs only need to implement the direction they are used for; the
/// defaults fail with [`AudioError::NotSupported`].
pub trait AudioCodec: Default + Send + 'static {
    /// Tag under which streams using this codec are registered.
    const TYPE_TAG: &'static str;

    fn encode(&mut self, _samples: &[f32]) -> Result<Vec<u8>, AudioError> {
        Err(AudioError::NotSupported("encode"))
    }

    /// Decode one frame of `sample_count` samples. `None` asks the codec to
    /// conceal a missing frame.
    fn decode(&mut self, _frame: Option<&[u8]>, _sample_count: usize) -> Result<Vec<f32>, AudioError> {
        Err(AudioError::NotSupported("decode"))
    }

    /// Whether a freshly captured frame is worth sending.
    fn should_send(&mut self, _samples: &[f32]) -> Result<bool, AudioError> {
        Ok(true)
    }
}

/// Uncompressed little-endian 16-bit PCM.
#[derive(Debug, Default, Clone, Copy)]
pub struct Pcm16Codec;

impl AudioCodec for Pcm16Codec {
    const TYPE_TAG: &'static str = "AudioStream<Pcm16>";

    fn encode(&mut self, samples: &[f32]) -> Result<Vec<u8>, AudioError> {
        let mut out = Vec::with_capacity(samples.len() * 2);
        for sample in samples {
            let value = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            out.extend_from_slice(&value.to_le_bytes());
        }
        Ok(out)
    }

    fn decode(&mut self, frame: Option<&[u8]>, sample_count: usize) -> Result<Vec<f32>, AudioError> {
        let Some(bytes) = frame else {
            return Ok(vec![0.0; sample_count]);
        };
        if bytes.len() % 2 != 0 {
            return Err(AudioError::Malformed(format!(
                "odd PCM16 frame length {}",
                bytes.len()
            )));
        }
        Ok(bytes
            .chunks_exact(2)
            .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
            .collect())
    }
}
