use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        mpsc, Arc,
    },
    thread,
    time::Duration,
};

use voxel_engine_core::{
    core::{EngineContext, EventCode, EventContext, ListenerId},
    engine_state::{
        config::EngineConfig,
        rendering::{
            command::{ClearColorCommand, DrawCommand},
            Command, CommandHeader, CommandKind, CommandPlayback, RenderMode, RingError,
        },
        resources::{Resource, ResourceBackend, ResourceBackends, ResourceKind, ResourceState},
        EngineState,
    },
};

const BLOCKED: Duration = Duration::from_millis(100);
const UNBLOCKED: Duration = Duration::from_secs(5);

/// Sends every played command to the test thread.
struct ChannelPlayback {
    played: mpsc::Sender<(RenderMode, Command)>,
    frames: usize,
}

impl CommandPlayback for ChannelPlayback {
    fn play_back(&mut self, header: &CommandHeader, command: &Command) {
        let mode = header.render_mode().unwrap();
        let _ = self.played.send((mode, *command));
    }

    fn end_frame(&mut self, _slot: usize) {
        self.frames += 1;
    }
}

/// Blocks every frame until the test thread releases it.
struct GatedPlayback {
    gate: mpsc::Receiver<()>,
}

impl CommandPlayback for GatedPlayback {
    fn begin_frame(&mut self, _slot: usize) {
        let _ = self.gate.recv();
    }

    fn play_back(&mut self, _: &CommandHeader, _: &Command) {}
}

#[derive(Default)]
struct CountingBackend {
    created: AtomicUsize,
    destroyed: AtomicUsize,
}

impl ResourceBackend for CountingBackend {
    fn create_local(&self, resource: &Resource) -> bool {
        self.created.fetch_add(1, Ordering::SeqCst);
        resource.kind() == ResourceKind::Graphics
    }

    fn destroy_local(&self, _: &Resource) {
        self.destroyed.fetch_add(1, Ordering::SeqCst);
    }
}

fn backends() -> (ResourceBackends, Arc<CountingBackend>) {
    let backend = Arc::new(CountingBackend::default());
    (ResourceBackends::shared(backend.clone()), backend)
}

#[test]
fn a_single_clear_colour_frame_reaches_the_backend() {
    let config = EngineConfig {
        swapchain_frame_count: 2,
        ..EngineConfig::default()
    };
    let (played, plays) = mpsc::channel();
    let (resource_backends, _) = backends();
    let engine = EngineState::start(
        &config,
        &EngineContext::new(),
        ChannelPlayback { played, frames: 0 },
        resource_backends,
    )
    .unwrap();
    assert_eq!(engine.ring().len(), 3);

    assert!(plays.recv_timeout(BLOCKED).is_err());

    let mut frame = engine.next_command_buffer().unwrap();
    frame.clear_color(1.0, 0.0, 0.0, 1.0).unwrap();
    frame.finish().unwrap();
    engine.submit(frame).unwrap();

    let (mode, command) = plays.recv_timeout(UNBLOCKED).unwrap();
    assert_eq!(mode, RenderMode::Graphics);
    assert_eq!(command.kind(), CommandKind::ClearColor);
    assert_eq!(
        command,
        Command::ClearColor(ClearColorCommand { color: 0xFF0000FF })
    );
    assert!(plays.recv_timeout(BLOCKED).is_err());

    let summary = engine.shutdown().unwrap();
    assert_eq!(summary.frames_submitted, 1);
    assert_eq!(summary.frames_played, 1);
    assert_eq!(summary.backend.frames, 1);
}

#[test]
fn a_slow_render_thread_holds_the_producer_back() {
    let (open_gate, gate) = mpsc::channel();
    let (resource_backends, _) = backends();
    let engine = EngineState::start(
        &EngineConfig::default(),
        &EngineContext::new(),
        GatedPlayback { gate },
        resource_backends,
    )
    .unwrap();
    let ring = Arc::clone(engine.ring());

    let (returned, submits) = mpsc::channel();
    let producer = {
        let ring = Arc::clone(&ring);
        thread::spawn(move || {
            for frame_number in 0..6u32 {
                let mut frame = ring.next_command_buffer().unwrap();
                frame.clear_color_packed(frame_number).unwrap();
                ring.submit(frame).unwrap();
                returned.send(frame_number).unwrap();
            }
        })
    };

    // The render thread holds frame 0 at the gate; frames 1 and 2 fill the other slots.
    assert_eq!(submits.recv_timeout(UNBLOCKED), Ok(0));
    assert_eq!(submits.recv_timeout(UNBLOCKED), Ok(1));
    assert!(submits.recv_timeout(BLOCKED).is_err());

    for expected in 2..6 {
        open_gate.send(()).unwrap();
        assert_eq!(submits.recv_timeout(UNBLOCKED), Ok(expected));
    }
    producer.join().unwrap();

    // Frames 4 and 5 are still waiting at the gate.
    for _ in 0..2 {
        open_gate.send(()).unwrap();
    }
    let summary = engine.shutdown().unwrap();
    assert_eq!(summary.frames_submitted, 6);
    assert_eq!(summary.frames_played, 6);
}

#[test]
fn quit_event_from_any_thread_shuts_everything_down() {
    let context = EngineContext::new();
    let (played, plays) = mpsc::channel();
    let (resource_backends, counts) = backends();
    let mut engine = EngineState::start(
        &EngineConfig::default(),
        &context,
        ChannelPlayback { played, frames: 0 },
        resource_backends,
    )
    .unwrap();

    let graphics = engine
        .resources_mut()
        .allocate_resource(ResourceKind::Graphics, 64)
        .unwrap();
    let compute = engine
        .resources_mut()
        .allocate_resource(ResourceKind::Compute, 64)
        .unwrap();
    engine.resources().signal_upload(&graphics).unwrap();
    engine.resources().signal_upload(&compute).unwrap();

    let ring = Arc::clone(engine.ring());
    let mut frame = ring.next_command_buffer().unwrap();
    frame.begin_stage(RenderMode::Graphics, 0, 0).unwrap();
    frame
        .draw(DrawCommand {
            vertex_count: 6,
            instance_count: 1,
            ..Default::default()
        })
        .unwrap();
    frame.end_stage().unwrap();
    ring.submit(frame).unwrap();

    let quitter = {
        let context = context.clone();
        thread::spawn(move || {
            context.fire(
                EventCode::ApplicationQuit,
                ListenerId(u64::MAX),
                &EventContext::Empty,
            )
        })
    };
    assert!(!quitter.join().unwrap());
    assert!(!engine.is_running());
    assert!(matches!(
        ring.next_command_buffer(),
        Err(RingError::ShuttingDown)
    ));

    let summary = engine.shutdown().unwrap();
    assert_eq!(summary.frames_played, 1);
    assert_eq!(plays.try_iter().count(), 3);
    assert_eq!(summary.resources.ready, 1);
    assert_eq!(summary.resources.failed, 1);
    assert_eq!(graphics.state(), ResourceState::Ready);
    assert_eq!(compute.state(), ResourceState::Failed);
    assert_eq!(counts.created.load(Ordering::SeqCst), 2);
    assert_eq!(counts.destroyed.load(Ordering::SeqCst), 2);
    assert!(!graphics.is_valid());
}

#[test]
fn engine_starts_from_a_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");
    std::fs::write(
        &path,
        r#"{ "swapchain_frame_count": 3, "render_thread_name": "render-from-file" }"#,
    )
    .unwrap();

    let config = EngineConfig::from_path(&path).unwrap();
    let (played, _plays) = mpsc::channel();
    let (resource_backends, _) = backends();
    let engine = EngineState::start(
        &config,
        &EngineContext::new(),
        ChannelPlayback { played, frames: 0 },
        resource_backends,
    )
    .unwrap();
    assert_eq!(engine.ring().len(), 4);

    for _ in 0..10 {
        let mut frame = engine.next_command_buffer().unwrap();
        frame.clear_color_packed(0).unwrap();
        engine.submit(frame).unwrap();
    }
    let summary = engine.shutdown().unwrap();
    assert_eq!(summary.frames_played, 10);
    assert_eq!(summary.backend.frames, 10);
}
