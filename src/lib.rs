#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(rustdoc::invalid_rust_codeblocks)]

//! # Voxel Engine Core
//!
//! The cross-thread execution core of the voxel engine: how the simulation thread hands
//! rendering work to the render thread, and how GPU resource uploads are serialized onto
//! a dedicated worker without blocking the simulation.
//!
//! ## Key Modules
//!
//! * `core` - Arena and burst allocators, the event dispatcher and the engine context
//! * `engine_state` - The worker, the resource lifecycle manager, command recording, the
//!   frame ring and the engine that ties them together
//!
//! ## Usage
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use voxel_engine_core::core::EngineContext;
//! use voxel_engine_core::engine_state::{
//!     config::EngineConfig,
//!     rendering::{LoggingPlayback, LoggingResourceBackend},
//!     resources::ResourceBackends,
//!     EngineState,
//! };
//!
//! let context = EngineContext::new();
//! let engine = EngineState::start(
//!     &EngineConfig::default(),
//!     &context,
//!     LoggingPlayback::default(),
//!     ResourceBackends::shared(Arc::new(LoggingResourceBackend::default())),
//! )
//! .unwrap();
//!
//! let mut frame = engine.next_command_buffer().unwrap();
//! frame.clear_color(1.0, 0.0, 0.0, 1.0).unwrap();
//! engine.submit(frame).unwrap();
//!
//! engine.request_quit();
//! let summary = engine.shutdown().unwrap();
//! assert_eq!(summary.backend.clear_color, Some(0xFF0000FF));
//! ```

use std::sync::Arc;

use log::{error, info};

use crate::{
    core::{EngineContext, EventCode, EventContext, ListenerId, MemoryTag},
    engine_state::{
        config::EngineConfig,
        rendering::{
            command::{DrawCommand, DrawIndexedCommand},
            LoggingPlayback, LoggingResourceBackend, RenderMode,
        },
        resources::{ResourceBackends, ResourceKind},
        EngineError, EngineState,
    },
};

pub mod core;
pub mod engine_state;

/// Environment variable naming an optional JSON config file for [`run`].
pub const CONFIG_ENV_VAR: &str = "VOXEL_ENGINE_CONFIG";

const DEMO_FRAMES: u32 = 8;

/// Initializes logging, loads the optional config file named by [`CONFIG_ENV_VAR`] and
/// runs [`run_headless`]. Errors are logged rather than returned.
pub fn run() {
    let mut log_builder = env_logger::Builder::new();
    log_builder
        .target(env_logger::Target::Stdout)
        .parse_env("RUST_LOG")
        .init();

    info!("Logger initialized");

    let config = match std::env::var(CONFIG_ENV_VAR) {
        Ok(path) => match EngineConfig::from_path(&path) {
            Ok(config) => config,
            Err(err) => {
                error!("Could not load config from {path}: {err}");
                return;
            }
        },
        Err(_) => EngineConfig::default(),
    };

    if let Err(err) = run_headless(&config) {
        error!("Engine failed: {err}");
    }
}

/// Runs the engine against logging backends: uploads a few resources, records frames
/// with graphics and compute stages, then quits through the event system.
pub fn run_headless(config: &EngineConfig) -> Result<(), EngineError> {
    let context = EngineContext::new();
    let resource_backend = Arc::new(LoggingResourceBackend::default());
    let mut engine = EngineState::start(
        config,
        &context,
        LoggingPlayback::default(),
        ResourceBackends::shared(resource_backend.clone()),
    )?;

    let mesh = engine.resources_mut().allocate_resource_with_layout(
        ResourceKind::Graphics,
        &[(16, MemoryTag::Resource), (64, MemoryTag::Resource)],
    )?;
    mesh.write_field(0, &[36u32, 24, 0, 0]);
    let particles = engine
        .resources_mut()
        .allocate_resource(ResourceKind::Compute, 4)?;
    particles.write_field(0, &1024u32);
    for resource in [&mesh, &particles] {
        engine.resources().signal_upload(resource)?;
    }
    engine.resources().flush_uploads()?;

    for frame_number in 0..DEMO_FRAMES {
        let shade = frame_number as f32 / DEMO_FRAMES as f32;
        let mut frame = engine.next_command_buffer()?;
        frame.clear_color(shade, shade, shade, 1.0)?;

        frame.begin_stage(RenderMode::Compute, particles.id().0, 0)?;
        frame.dispatch(1024 / 64, 1, 1)?;
        frame.end_stage()?;

        frame.begin_stage(RenderMode::Graphics, mesh.id().0, 0)?;
        frame.draw_indexed(DrawIndexedCommand {
            index_count: 36,
            instance_count: 1,
            ..Default::default()
        })?;
        frame.draw(DrawCommand {
            vertex_count: 3,
            instance_count: fastrand::u32(1..=4),
            ..Default::default()
        })?;
        frame.end_stage()?;

        engine.submit(frame)?;
    }

    context.fire(
        EventCode::ApplicationQuit,
        ListenerId(0),
        &EventContext::Empty,
    );
    let summary = engine.shutdown()?;
    info!(
        "Demo finished in {:?}: {} frames played, {} commands, {} resources created, {} destroyed",
        summary.uptime,
        summary.frames_played,
        summary.backend.commands,
        resource_backend.created(),
        resource_backend.destroyed()
    );
    Ok(())
}
