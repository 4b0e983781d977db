use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use worldsync_kernel::{
    ComponentRegistry, FocusLevel, LoadingDisplay, Peer, World, WorldManager, WorldManagerConfig,
};
use worldsync_persist::{DataNode, DataNodeGroup, LeafValue, WorldStore};
use worldsync_stream::memory::MemoryRuntime;
use worldsync_stream::{
    AudioCodec, AudioFrameTime, AudioStream, Pcm16Codec, SAMPLE_RATE, register_audio_streams,
};
use worldsync_sync::{SerializeMode, SyncObject};
use worldsync_tools::{NodeInspector, WorldInspector};

#[derive(Parser)]
#[command(name = "worldsync-cli", about = "CLI tool for worldsync operations")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and crate info
    Info,
    /// Summarize a saved world (JSON or binary)
    Inspect {
        path: PathBuf,
        /// List every entity
        #[arg(short, long)]
        entities: bool,
    },
    /// Convert a saved world between JSON and binary, by output extension
    Convert { input: PathBuf, output: PathBuf },
    /// Run a headless world manager with a looped-back audio stream
    Simulate {
        /// Number of manager steps
        #[arg(short, long, default_value = "60")]
        ticks: u64,
        /// Audio frame duration in milliseconds (2.5, 5, 10, 20, 40 or 60)
        #[arg(short, long, default_value = "20")]
        frame_ms: f32,
        /// Manager settings (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Skip persisting the local world on exit
        #[arg(long)]
        no_save: bool,
    },
    /// Write snapshots of a generated world to a store and verify them
    Snapshot {
        /// Store directory
        #[arg(short, long, default_value = "worldsync-store")]
        dir: PathBuf,
        /// Number of entities to spawn
        #[arg(short, long, default_value = "5")]
        entities: usize,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match cli.command {
        Commands::Info => {
            println!("worldsync-cli v{}", env!("CARGO_PKG_VERSION"));
            println!("kernel: {}", worldsync_kernel::crate_info());
            println!("persist: {}", worldsync_persist::crate_info());
            println!("stream: {}", worldsync_stream::crate_info());
            println!("tools: {}", worldsync_tools::crate_info());
        }
        Commands::Inspect { path, entities } => inspect(&path, entities)?,
        Commands::Convert { input, output } => {
            let tree = read_tree(&input)?;
            write_tree(&output, &tree)?;
            println!("Converted {} -> {}", input.display(), output.display());
        }
        Commands::Simulate {
            ticks,
            frame_ms,
            config,
            no_save,
        } => {
            let mut config = match config {
                Some(path) => WorldManagerConfig::load(&path)
                    .with_context(|| format!("reading {}", path.display()))?,
                None => WorldManagerConfig::default(),
            };
            if no_save {
                config.save_local_world = false;
            }
            simulate(config, ticks, parse_frame_time(frame_ms)?)?;
        }
        Commands::Snapshot { dir, entities } => snapshot(&dir, entities)?,
    }

    Ok(())
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

fn read_tree(path: &Path) -> anyhow::Result<DataNodeGroup> {
    let tree = if is_json(path) {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        DataNodeGroup::from_json(&text)?
    } else {
        let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
        DataNodeGroup::from_bytes(&bytes)?
    };
    Ok(tree)
}

fn write_tree(path: &Path, tree: &DataNodeGroup) -> anyhow::Result<()> {
    if is_json(path) {
        std::fs::write(path, tree.to_json()?)?;
    } else {
        std::fs::write(path, tree.to_bytes()?)?;
    }
    Ok(())
}

fn registry() -> ComponentRegistry {
    let mut registry = ComponentRegistry::new();
    register_audio_streams(&mut registry);
    registry
}

fn inspect(path: &Path, entities: bool) -> anyhow::Result<()> {
    let tree = read_tree(path)?;
    println!("{}", NodeInspector::summary(&tree));

    let mut world = World::new(0);
    world
        .load_group(&tree, true, &registry())
        .context("tree is not a world")?;
    println!("{}", WorldInspector::summary(&world));
    if entities {
        for info in WorldInspector::list_entities(&world) {
            println!("  {info}");
        }
    }
    Ok(())
}

fn parse_frame_time(ms: f32) -> anyhow::Result<AudioFrameTime> {
    [
        AudioFrameTime::Ms2_5,
        AudioFrameTime::Ms5,
        AudioFrameTime::Ms10,
        AudioFrameTime::Ms20,
        AudioFrameTime::Ms40,
        AudioFrameTime::Ms60,
    ]
    .into_iter()
    .find(|t| t.millis() == ms)
    .with_context(|| format!("unsupported frame duration {ms}ms"))
}

struct ConsoleDisplay;

impl LoadingDisplay for ConsoleDisplay {
    fn show_text(&self, text: &str) {
        tracing::info!(target: "loading", "{}", text.replace('\n', " "));
    }

    fn clear(&self) {
        tracing::info!(target: "loading", "done");
    }
}

/// A world holding one speaker entity with a playback stream, as saved data.
fn speaker_world(frame_time: AudioFrameTime) -> anyhow::Result<DataNodeGroup> {
    let mut world = World::new(0);
    world.world_name.set("Speaker Room".to_owned());
    {
        let (root, alloc) = world.scene_mut();
        let mut stream = AudioStream::<Pcm16Codec>::new(alloc);
        stream.frame_time.set(frame_time);
        let speaker = root.add_child(alloc, "Speaker");
        speaker.position.set(glam::Vec3::new(0.0, 1.5, 0.0));
        speaker.attach(Box::new(stream));
    }
    Ok(world.to_group(SerializeMode::Persist)?)
}

fn simulate(config: WorldManagerConfig, ticks: u64, frame_time: AudioFrameTime) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    let audio = MemoryRuntime::new();
    let manager = WorldManager::new(config, runtime.handle().clone(), registry())
        .with_audio(Arc::new(audio.clone()))
        .with_loading_display(Arc::new(ConsoleDisplay));
    manager.init();

    let room = manager.load_world_from_group(FocusLevel::Focused, &speaker_world(frame_time)?, true)?;
    let stream = room
        .lock()
        .root
        .find_child("Speaker")
        .and_then(|speaker| speaker.find_component::<AudioStream<Pcm16Codec>>())
        .map(|stream| stream.pointer())
        .context("speaker stream missing after load")?;

    let peer = Peer::new(1, "loopback");
    let mut codec = Pcm16Codec;
    let frame_len = frame_time.sample_count();
    let step = Duration::from_millis(16);
    let consumed_per_step = (SAMPLE_RATE as u64 * step.as_millis() as u64) / 1000;
    let mut phase = 0.0f32;
    for _ in 0..ticks {
        let samples: Vec<f32> = (0..frame_len)
            .map(|_| {
                phase += 440.0 / SAMPLE_RATE as f32;
                (phase * std::f32::consts::TAU).sin() * 0.25
            })
            .collect();
        let payload = DataNode::Leaf(LeafValue::Bytes(codec.encode(&samples)?));
        room.shared().deliver(&peer, stream, payload);

        manager.step();
        audio.output.advance(consumed_per_step);
        std::thread::sleep(step);
    }

    println!("Worlds after {ticks} steps:");
    for world in manager.worlds() {
        println!("  {}", WorldInspector::status(&world));
    }
    let timer = manager.frame_timer();
    println!(
        "Step time: avg={:?} max={:?} over {} passes",
        timer.average(),
        timer.max(),
        timer.count()
    );
    let written = audio.output.written();
    let audible = written.iter().filter(|s| s.abs() > f32::EPSILON).count();
    println!(
        "Audio: {} samples written, {} audible",
        written.len(),
        audible
    );

    manager.shutdown();
    Ok(())
}

fn snapshot(dir: &Path, entities: usize) -> anyhow::Result<()> {
    println!("Snapshot demo: spawning {entities} entities");

    let mut world = World::new(0);
    world.world_name.set("Snapshot Demo".to_owned());
    {
        let (root, alloc) = world.scene_mut();
        for i in 0..entities {
            let child = root.add_child(alloc, &format!("Entity {i}"));
            child.position.set(glam::Vec3::new(i as f32 * 2.0, 0.0, 0.0));
        }
    }

    let mut store = WorldStore::open(dir)?;
    let tree = world.to_group(SerializeMode::Persist)?;
    let first = store.take_snapshot(world.display_name(), world.tick(), &tree)?;

    {
        let (root, alloc) = world.scene_mut();
        root.add_child(alloc, "Late Arrival");
    }
    let tree = world.to_group(SerializeMode::Persist)?;
    let second = store.take_snapshot(world.display_name(), world.tick(), &tree)?;
    store.verify_integrity()?;
    println!("Wrote snapshots {first} and {second} to {}", dir.display());

    let snap = store.load_snapshot(first)?;
    println!(
        "Snapshot {first}: label={} hash={} valid={}",
        snap.label,
        &snap.hash[..12],
        snap.verify()
    );

    let mut restored = World::new(0);
    restored.load_group(&snap.restore()?, true, &registry())?;
    println!("Rolled back: {}", WorldInspector::summary(&restored));

    let mut latest = World::new(0);
    latest.load_group(&store.load_latest()?, true, &registry())?;
    println!("Latest:      {}", WorldInspector::summary(&latest));
    Ok(())
}
