use worldsync_sync::impl_sync_enum;

/// Output sample rate of every audio stream.
pub const SAMPLE_RATE: usize = 48_000;

/// Duration of one encoded audio frame. Synced as its ordinal; never
/// renumber the variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioFrameTime {
    Ms2_5,
    Ms5,
    Ms10,
    Ms20,
    Ms40,
    #[default]
    Ms60,
}

impl_sync_enum!(AudioFrameTime {
    Ms2_5,
    Ms5,
    Ms10,
    Ms20,
    Ms40,
    Ms60,
});

impl AudioFrameTime {
    pub fn millis(self) -> f32 {
        match self {
            AudioFrameTime::Ms2_5 => 2.5,
            AudioFrameTime::Ms5 => 5.0,
            AudioFrameTime::Ms10 => 10.0,
            AudioFrameTime::Ms20 => 20.0,
            AudioFrameTime::Ms40 => 40.0,
            AudioFrameTime::Ms60 => 60.0,
        }
    }

    /// Samples in one frame at [`SAMPLE_RATE`].
    pub fn sample_count(self) -> usize {
        match self {
            AudioFrameTime::Ms2_5 => 120,
            AudioFrameTime::Ms5 => 240,
            AudioFrameTime::Ms10 => 480,
            AudioFrameTime::Ms20 => 960,
            AudioFrameTime::Ms40 => 1920,
            AudioFrameTime::Ms60 => 2880,
        }
    }
}
