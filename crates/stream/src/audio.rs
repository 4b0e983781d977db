use crate::codec::{AudioCodec, AudioError, Pcm16Codec};
use crate::frame::AudioFrameTime;
use std::any::Any;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use worldsync_kernel::{
    AudioInput, AudioOutput, AudioRuntime, Component, ComponentRegistry, DeliveryMethod,
    LoadContext, Peer, StepContext, StreamReceiver,
};
use worldsync_persist::{DataNode, LeafValue};
use worldsync_sync::{
    FieldDescriptor, HookError, NetPointer, PointerAllocator, PointerMap, SyncDeserializer,
    SyncError, SyncObject, SyncSerializer, SyncWorker, Synced, relink_fields, sync_field,
};

/// Samples kept buffered ahead of the play cursor (100 ms).
pub const PLAYBACK_AHEAD_SAMPLES: u64 = 4800;
/// Length of the output buffer opened for playback.
pub const OUTPUT_SECONDS: f32 = 5.0;
/// Received frames held before new arrivals are dropped.
pub const QUEUE_CAPACITY: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Unloaded,
    Capture,
    Playback,
}

enum Device {
    Unloaded,
    Capture(Box<dyn AudioInput>),
    Playback(Box<dyn AudioOutput>),
}

/// Receiving half registered with the world; never blocks the network side.
struct FrameInbox {
    frames: mpsc::Sender<Vec<u8>>,
}

impl StreamReceiver for FrameInbox {
    fn receive(&self, sender: &Peer, payload: DataNode) {
        let DataNode::Leaf(LeafValue::Bytes(frame)) = payload else {
            tracing::trace!(user = sender.user, "ignoring non-audio payload");
            return;
        };
        if let Err(TrySendError::Full(_)) = self.frames.try_send(frame) {
            tracing::debug!(user = sender.user, "audio queue full, dropping frame");
        }
    }
}

/// A replicated audio component. It either captures from an input device and
/// broadcasts encoded frames, or plays received frames through an output
/// buffer. The mode is chosen once, when the stream is loaded.
pub struct AudioStream<C: AudioCodec> {
    pointer: NetPointer,
    pub frame_time: Synced<AudioFrameTime>,
    codec: C,
    device: Device,
    inbox: Arc<FrameInbox>,
    queue: mpsc::Receiver<Vec<u8>>,
    current: Vec<f32>,
    position: usize,
    scratch: Vec<f32>,
}

impl<C: AudioCodec> AudioStream<C> {
    pub fn new(allocator: &mut PointerAllocator) -> Self {
        let (frames, queue) = mpsc::channel(QUEUE_CAPACITY);
        Self {
            pointer: allocator.allocate(),
            frame_time: Synced::new(allocator, AudioFrameTime::default()),
            codec: C::default(),
            device: Device::Unloaded,
            inbox: Arc::new(FrameInbox { frames }),
            queue,
            current: Vec::new(),
            position: 0,
            scratch: Vec::new(),
        }
    }

    pub fn boxed(allocator: &mut PointerAllocator) -> Box<dyn Component> {
        Box::new(Self::new(allocator))
    }

    pub fn mode(&self) -> StreamMode {
        match self.device {
            Device::Unloaded => StreamMode::Unloaded,
            Device::Capture(_) => StreamMode::Capture,
            Device::Playback(_) => StreamMode::Playback,
        }
    }

    pub fn codec(&self) -> &C {
        &self.codec
    }

    /// The handle that accepts frames from remote peers.
    pub fn receiver(&self) -> Arc<dyn StreamReceiver> {
        self.inbox.clone()
    }

    pub fn load_capture(&mut self, input: Box<dyn AudioInput>) -> Result<(), AudioError> {
        self.ensure_unloaded()?;
        self.device = Device::Capture(input);
        Ok(())
    }

    pub fn load_playback(&mut self, output: Box<dyn AudioOutput>) -> Result<(), AudioError> {
        self.ensure_unloaded()?;
        self.device = Device::Playback(output);
        Ok(())
    }

    /// Open an input device through `runtime` and capture from it.
    pub fn open_capture(
        &mut self,
        runtime: &dyn AudioRuntime,
        device: Option<&str>,
    ) -> Result<(), AudioError> {
        self.ensure_unloaded()?;
        let input = runtime
            .open_input(device)
            .map_err(|e| AudioError::Device(e.to_string()))?;
        self.load_capture(input)
    }

    pub fn unload(&mut self) {
        self.device = Device::Unloaded;
        self.current.clear();
        self.position = 0;
    }

    fn ensure_unloaded(&self) -> Result<(), AudioError> {
        match self.mode() {
            StreamMode::Unloaded => Ok(()),
            mode => Err(AudioError::ModeAlreadySet(mode)),
        }
    }

    /// Advance the stream by one world step.
    pub fn update(&mut self, ctx: &StepContext<'_>) -> Result<(), AudioError> {
        let sample_count = self.frame_time.value().sample_count();
        match &mut self.device {
            Device::Unloaded => Ok(()),
            Device::Capture(input) => {
                if input.unread_samples() < sample_count {
                    return Ok(());
                }
                self.scratch.resize(sample_count, 0.0);
                let read = input.read_samples(&mut self.scratch);
                let frame = &self.scratch[..read];
                let send = self.codec.should_send(frame).unwrap_or_else(|err| {
                    tracing::warn!(stream = %self.pointer, "should-send check failed: {err}");
                    true
                });
                if !send {
                    return Ok(());
                }
                let payload = self.codec.encode(frame)?;
                ctx.broadcast(
                    self.pointer,
                    DataNode::Leaf(LeafValue::Bytes(payload)),
                    DeliveryMethod::ReliableUnordered,
                )?;
                Ok(())
            }
            Device::Playback(output) => {
                let buffered = output
                    .total_samples()
                    .saturating_sub(output.cursor_samples());
                let wanted = PLAYBACK_AHEAD_SAMPLES.saturating_sub(buffered) as usize;
                self.scratch.clear();
                while self.scratch.len() < wanted {
                    if self.position >= self.current.len() {
                        let frame = self.queue.try_recv().ok();
                        self.current = match self.codec.decode(frame.as_deref(), sample_count) {
                            Ok(samples) if !samples.is_empty() => samples,
                            Ok(_) => vec![0.0; sample_count],
                            Err(AudioError::NotSupported(op)) => {
                                return Err(AudioError::NotSupported(op));
                            }
                            Err(err) => {
                                tracing::warn!(stream = %self.pointer, "dropping undecodable frame: {err}");
                                vec![0.0; sample_count]
                            }
                        };
                        self.position = 0;
                    }
                    let take = (wanted - self.scratch.len()).min(self.current.len() - self.position);
                    self.scratch
                        .extend_from_slice(&self.current[self.position..self.position + take]);
                    self.position += take;
                }
                output.write_samples(&self.scratch);
                Ok(())
            }
        }
    }
}

impl<C: AudioCodec> SyncObject for AudioStream<C> {
    fn pointer(&self) -> NetPointer {
        self.pointer
    }

    fn type_name(&self) -> &'static str {
        C::TYPE_TAG
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

    fn relink(&mut self, pointers: &PointerMap) {
        relink_fields(self, pointers);
    }
}

impl<C: AudioCodec> SyncWorker for AudioStream<C> {
    const FIELDS: &'static [FieldDescriptor<Self>] = &[sync_field!(frame_time)];

    fn pointer_mut(&mut self) -> &mut NetPointer {
        &mut self.pointer
    }
}

impl<C: AudioCodec> Component for AudioStream<C> {
    fn on_loaded(&mut self, ctx: &LoadContext<'_>) -> Result<(), HookError> {
        ctx.world.register_receiver(self.pointer, self.receiver());
        if let (StreamMode::Unloaded, Some(runtime)) = (self.mode(), ctx.audio) {
            let output = runtime.create_output(OUTPUT_SECONDS)?;
            self.load_playback(output)?;
        }
        Ok(())
    }

    fn step(&mut self, ctx: &mut StepContext<'_>) -> Result<(), HookError> {
        Ok(self.update(ctx)?)
    }

    fn on_dispose(&mut self, ctx: &LoadContext<'_>) -> Result<(), HookError> {
        ctx.world.unregister_receiver(self.pointer);
        self.unload();
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Register the built-in stream types so loaded worlds can rebuild them.
pub fn register_audio_streams(registry: &mut ComponentRegistry) {
    registry.register(Pcm16Codec::TYPE_TAG, AudioStream::<Pcm16Codec>::boxed);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{MemoryInput, MemoryOutput, MemoryRuntime};
    use std::sync::Mutex;
    use worldsync_kernel::{SessionRequest, Transport, TransportError, WorldInit, WorldShared};
    use worldsync_sync::{SerializeMode, VALUE_KEY};

    #[derive(Default)]
    struct Recorder {
        sent: Mutex<Vec<(NetPointer, DataNode, DeliveryMethod)>>,
    }

    impl Transport for Recorder {
        fn local_user(&self) -> u16 {
            1
        }

        fn request_session(&self, _request: SessionRequest) -> Result<SessionRequest, TransportError> {
            Err(TransportError::Offline)
        }

        fn broadcast(
            &self,
            _session: &str,
            stream: NetPointer,
            payload: DataNode,
            delivery: DeliveryMethod,
        ) -> Result<(), TransportError> {
            self.sent.lock().unwrap().push((stream, payload, delivery));
            Ok(())
        }
    }

    fn step(stream: &mut dyn Component, world: &Arc<WorldShared>, transport: &Recorder) -> Result<(), HookError> {
        let mut ctx = StepContext {
            world,
            session_id: "session",
            tick: 0,
            delta: 1.0 / 60.0,
            transport: Some(transport),
        };
        stream.step(&mut ctx)
    }

    fn world() -> Arc<WorldShared> {
        Arc::new(WorldShared::new(WorldInit::default()))
    }

    #[derive(Default)]
    struct Gate {
        fail: bool,
        encoded: usize,
    }

    impl AudioCodec for Gate {
        const TYPE_TAG: &'static str = "Gate";

        fn encode(&mut self, samples: &[f32]) -> Result<Vec<u8>, AudioError> {
            self.encoded += 1;
            Pcm16Codec.encode(samples)
        }

        fn should_send(&mut self, samples: &[f32]) -> Result<bool, AudioError> {
            if self.fail {
                return Err(AudioError::Malformed("gate".into()));
            }
            Ok(samples.iter().any(|s| *s != 0.0))
        }
    }

    #[derive(Default)]
    struct Mute;

    impl AudioCodec for Mute {
        const TYPE_TAG: &'static str = "Mute";
    }

    #[test]
    fn capture_waits_for_a_full_frame() {
        let mut alloc = PointerAllocator::new(1);
        let mut stream = AudioStream::<Pcm16Codec>::new(&mut alloc);
        stream.frame_time.set(AudioFrameTime::Ms10);
        let input = MemoryInput::new();
        stream.load_capture(Box::new(input.clone())).unwrap();
        let (world, transport) = (world(), Recorder::default());

        input.push(&[0.25; 479]);
        step(&mut stream, &world, &transport).unwrap();
        assert!(transport.sent.lock().unwrap().is_empty());

        input.push(&[0.25; 10]);
        step(&mut stream, &world, &transport).unwrap();
        let sent = transport.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        let (pointer, payload, delivery) = &sent[0];
        assert_eq!(*pointer, stream.pointer());
        assert_eq!(*delivery, DeliveryMethod::ReliableUnordered);
        assert!(matches!(payload, DataNode::Leaf(LeafValue::Bytes(b)) if b.len() == 960));
        assert_eq!(input.unread_samples(), 9);
    }

    #[test]
    fn should_send_gates_and_failures_send() {
        let mut alloc = PointerAllocator::new(1);
        let input = MemoryInput::new();
        let (world, transport) = (world(), Recorder::default());

        let mut quiet = AudioStream::<Gate>::new(&mut alloc);
        quiet.frame_time.set(AudioFrameTime::Ms2_5);
        quiet.load_capture(Box::new(input.clone())).unwrap();
        input.push(&[0.0; 120]);
        step(&mut quiet, &world, &transport).unwrap();
        assert!(transport.sent.lock().unwrap().is_empty());
        assert_eq!(quiet.codec().encoded, 0);

        let mut failing = AudioStream::<Gate>::new(&mut alloc);
        failing.codec.fail = true;
        failing.frame_time.set(AudioFrameTime::Ms2_5);
        failing.load_capture(Box::new(input.clone())).unwrap();
        input.push(&[0.0; 120]);
        step(&mut failing, &world, &transport).unwrap();
        assert_eq!(transport.sent.lock().unwrap().len(), 1);
        assert_eq!(failing.codec().encoded, 1);
    }

    #[test]
    fn starved_playback_writes_silence() {
        let mut alloc = PointerAllocator::new(1);
        let mut stream = AudioStream::<Pcm16Codec>::new(&mut alloc);
        let output = MemoryOutput::new();
        stream.load_playback(Box::new(output.clone())).unwrap();
        let (world, transport) = (world(), Recorder::default());

        step(&mut stream, &world, &transport).unwrap();
        let written = output.written();
        assert_eq!(written.len() as u64, PLAYBACK_AHEAD_SAMPLES);
        assert!(written.iter().all(|s| *s == 0.0));

        // Nothing consumed, so the next step tops up nothing.
        step(&mut stream, &world, &transport).unwrap();
        assert_eq!(output.written().len() as u64, PLAYBACK_AHEAD_SAMPLES);

        output.advance(1000);
        step(&mut stream, &world, &transport).unwrap();
        assert_eq!(output.written().len() as u64, PLAYBACK_AHEAD_SAMPLES + 1000);
    }

    #[test]
    fn received_frames_play_in_order() {
        let mut alloc = PointerAllocator::new(1);
        let mut stream = AudioStream::<Pcm16Codec>::new(&mut alloc);
        stream.frame_time.set(AudioFrameTime::Ms2_5);
        let output = MemoryOutput::new();
        stream.load_playback(Box::new(output.clone())).unwrap();
        let peer = Peer::new(2, "remote");
        let frame = Pcm16Codec.encode(&[0.5; 120]).unwrap();
        stream
            .receiver()
            .receive(&peer, DataNode::Leaf(LeafValue::Bytes(frame)));

        let (world, transport) = (world(), Recorder::default());
        step(&mut stream, &world, &transport).unwrap();
        let written = output.written();
        assert_eq!(written.len(), 4800);
        assert!(written[..120].iter().all(|s| (*s - 0.5).abs() < 1e-3));
        assert!(written[120..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn full_queue_drops_new_frames() {
        let mut alloc = PointerAllocator::new(1);
        let mut stream = AudioStream::<Pcm16Codec>::new(&mut alloc);
        stream.frame_time.set(AudioFrameTime::Ms2_5);
        let output = MemoryOutput::new();
        stream.load_playback(Box::new(output.clone())).unwrap();
        let peer = Peer::new(2, "remote");
        let receiver = stream.receiver();
        for level in [0.1, 0.2, 0.3, 0.4] {
            let frame = Pcm16Codec.encode(&[level; 120]).unwrap();
            receiver.receive(&peer, DataNode::Leaf(LeafValue::Bytes(frame)));
        }

        let (world, transport) = (world(), Recorder::default());
        step(&mut stream, &world, &transport).unwrap();
        let written = output.written();
        for (i, level) in [0.1f32, 0.2, 0.3].iter().enumerate() {
            let chunk = &written[i * 120..(i + 1) * 120];
            assert!(chunk.iter().all(|s| (*s - level).abs() < 1e-3));
        }
        assert!(written[360..].iter().all(|s| *s == 0.0));
    }

    #[test]
    fn mode_is_fixed_once_loaded() {
        let mut alloc = PointerAllocator::new(1);
        let mut stream = AudioStream::<Pcm16Codec>::new(&mut alloc);
        stream.load_playback(Box::new(MemoryOutput::new())).unwrap();
        let err = stream
            .load_capture(Box::new(MemoryInput::new()))
            .unwrap_err();
        assert!(matches!(err, AudioError::ModeAlreadySet(StreamMode::Playback)));
        let err = stream
            .open_capture(&MemoryRuntime::new(), None)
            .unwrap_err();
        assert!(matches!(err, AudioError::ModeAlreadySet(StreamMode::Playback)));
        assert_eq!(stream.mode(), StreamMode::Playback);
    }

    #[test]
    fn missing_codec_direction_fails_the_step() {
        let mut alloc = PointerAllocator::new(1);
        let mut stream = AudioStream::<Mute>::new(&mut alloc);
        let output = MemoryOutput::new();
        stream.load_playback(Box::new(output.clone())).unwrap();
        let (world, transport) = (world(), Recorder::default());

        let err = step(&mut stream, &world, &transport).unwrap_err();
        let err = err.downcast::<AudioError>().unwrap();
        assert!(matches!(*err, AudioError::NotSupported("decode")));
        assert!(output.written().is_empty());
    }

    #[test]
    fn loading_opens_playback_and_registers_receiver() {
        let mut alloc = PointerAllocator::new(1);
        let mut stream = AudioStream::<Pcm16Codec>::new(&mut alloc);
        let world = world();
        let runtime: Arc<dyn AudioRuntime> = Arc::new(MemoryRuntime::new());
        let ctx = LoadContext {
            world: &world,
            audio: Some(&runtime),
        };
        stream.on_loaded(&ctx).unwrap();
        assert_eq!(stream.mode(), StreamMode::Playback);

        let frame = DataNode::Leaf(LeafValue::Bytes(vec![0, 0]));
        assert!(world.deliver(&Peer::new(2, "remote"), stream.pointer(), frame.clone()));

        stream.on_dispose(&ctx).unwrap();
        assert_eq!(stream.mode(), StreamMode::Unloaded);
        assert!(!world.deliver(&Peer::new(2, "remote"), stream.pointer(), frame));
    }

    #[test]
    fn frame_time_syncs_as_ordinal() {
        let mut alloc = PointerAllocator::new(1);
        let mut stream = AudioStream::<Pcm16Codec>::new(&mut alloc);
        stream.frame_time.set(AudioFrameTime::Ms20);
        let node = stream
            .serialize(&SyncSerializer::new(SerializeMode::Replicate))
            .unwrap()
            .unwrap();
        let value = node
            .as_group()
            .and_then(|g| g.group("frame_time"))
            .and_then(|g| g.leaf(VALUE_KEY));
        assert_eq!(value, Some(&LeafValue::I32(3)));

        let mut registry = ComponentRegistry::new();
        register_audio_streams(&mut registry);
        let mut rebuilt = registry.create(Pcm16Codec::TYPE_TAG, &mut alloc).unwrap();
        let mut de = SyncDeserializer::new(&mut alloc, true);
        rebuilt.deserialize(&node, &mut de).unwrap();
        let rebuilt = rebuilt
            .as_any()
            .downcast_ref::<AudioStream<Pcm16Codec>>()
            .unwrap();
        assert_eq!(*rebuilt.frame_time.value(), AudioFrameTime::Ms20);
    }
}
