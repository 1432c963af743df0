//! # Engine State Module
//!
//! The cross-thread core of the engine: the producer-facing [`EngineState`] that owns the
//! frame ring, the render thread and the resource manager.
//!
//! ## Key Components
//!
//! * `config` - Engine settings loaded from JSON
//! * `rendering` - Command recording, the frame ring and the render thread
//! * `resources` - GPU resource lifecycle on an upload worker
//! * `task_management` - The blocking single-thread worker
//!
//! ## Threads
//!
//! The thread that calls [`EngineState::start`] is the producer. It records frames and
//! allocates resources. The render thread plays frames back and the upload worker creates
//! resources; neither touches producer state directly.
//!
//! ## Teardown
//!
//! Firing [`EventCode::ApplicationQuit`] through the context shuts the ring down and starts
//! draining the upload worker. [`EngineState::shutdown`] then joins the render thread
//! before the ring is released, and stops the worker before resources are freed.

use std::{io, sync::Arc, thread::JoinHandle, time::Duration};

use log::{error, info};
use thiserror::Error;
use web_time::Instant;

use crate::core::{EngineContext, EventCode, EventContext, ListenerId};

pub mod config;
pub mod rendering;
pub mod resources;
pub mod task_management;

use config::{ConfigError, EngineConfig};
use rendering::{CommandError, CommandPlayback, FrameRing, FrameSlot, RingError, RingState};
use resources::{ResourceBackends, ResourceError, ResourceManager, ShutdownSummary};

/// Errors reported while starting or stopping the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The configuration failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// The frame ring refused an operation.
    #[error(transparent)]
    Ring(#[from] RingError),
    /// A command could not be recorded.
    #[error(transparent)]
    Command(#[from] CommandError),
    /// The resource manager refused an operation.
    #[error(transparent)]
    Resource(#[from] ResourceError),
    /// The render thread could not be spawned.
    #[error("failed to spawn render thread: {0}")]
    Spawn(#[source] io::Error),
    /// The playback backend panicked on the render thread.
    #[error("render thread panicked")]
    RenderThreadPanicked,
}

/// What the engine reports once it has shut down.
#[derive(Debug)]
pub struct EngineShutdown<B> {
    /// The playback backend, returned by the render thread
    pub backend: B,
    /// Frames the producer submitted
    pub frames_submitted: u64,
    /// Frames the render thread played back
    pub frames_played: u64,
    /// Outcome of the resource manager's shutdown
    pub resources: ShutdownSummary,
    /// Time since `start`
    pub uptime: Duration,
}

/// The producer-side handle to a running engine.
pub struct EngineState<B: CommandPlayback> {
    context: EngineContext,
    ring: Arc<FrameRing>,
    render_thread: Option<JoinHandle<B>>,
    resources: ResourceManager,
    quit_listener: ListenerId,
    started_at: Instant,
}

impl<B: CommandPlayback> EngineState<B> {
    /// Starts the render thread and the resource upload worker.
    ///
    /// # Arguments
    /// * `config` - Validated before anything is started
    /// * `context` - Context whose `ApplicationQuit` event shuts the engine down
    /// * `playback` - Backend the render thread plays frames into
    /// * `backends` - Resource create/destroy callbacks per kind
    pub fn start(
        config: &EngineConfig,
        context: &EngineContext,
        playback: B,
        backends: ResourceBackends,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let started_at = Instant::now();

        let ring = Arc::new(FrameRing::new(
            config.ring_length(),
            config.command_arena_capacity,
        )?);
        let resources = ResourceManager::new(&config.resource_worker_name, context, backends)?;
        let render_thread =
            rendering::spawn_render_thread(&config.render_thread_name, Arc::clone(&ring), playback)
                .map_err(EngineError::Spawn)?;

        let quit_ring = Arc::clone(&ring);
        let quit_listener = context.subscribe(
            EventCode::ApplicationQuit,
            Box::new(move |_, _, _| {
                quit_ring.shutdown();
                false
            }),
        );

        info!(
            "Engine started: {} frame slots, render thread '{}', upload worker '{}'",
            ring.len(),
            config.render_thread_name,
            config.resource_worker_name
        );

        Ok(Self {
            context: context.clone(),
            ring,
            render_thread: Some(render_thread),
            resources,
            quit_listener,
            started_at,
        })
    }

    /// The frame ring. Clone the `Arc` to record frames while also holding
    /// `&mut` access to the resource manager.
    pub fn ring(&self) -> &Arc<FrameRing> {
        &self.ring
    }

    /// Resets and hands out the next writable frame.
    pub fn next_command_buffer(&self) -> Result<FrameSlot<'_>, RingError> {
        self.ring.next_command_buffer()
    }

    /// Queues a recorded frame for the render thread.
    pub fn submit(&self, frame: FrameSlot<'_>) -> Result<(), RingError> {
        self.ring.submit(frame)
    }

    /// The resource manager.
    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    /// Mutable access to the resource manager, needed to allocate.
    pub fn resources_mut(&mut self) -> &mut ResourceManager {
        &mut self.resources
    }

    /// The context this engine listens on.
    pub fn context(&self) -> &EngineContext {
        &self.context
    }

    /// Whether the ring still accepts frames.
    pub fn is_running(&self) -> bool {
        self.ring.state() == RingState::Running
    }

    /// Fires `ApplicationQuit` through the context.
    pub fn request_quit(&self) {
        info!("Engine quit requested");
        self.context.fire(
            EventCode::ApplicationQuit,
            self.quit_listener,
            &EventContext::Empty,
        );
    }

    /// Stops the engine and returns what it did.
    ///
    /// The render thread plays every frame that was already submitted before it exits.
    pub fn shutdown(mut self) -> Result<EngineShutdown<B>, EngineError> {
        let backend = self.stop_render_thread();
        let resources = self.resources.shutdown();
        self.context
            .unregister(EventCode::ApplicationQuit, self.quit_listener);

        let summary = EngineShutdown {
            backend: backend?,
            frames_submitted: self.ring.frames_submitted(),
            frames_played: self.ring.frames_played(),
            resources,
            uptime: self.started_at.elapsed(),
        };
        info!(
            "Engine shut down after {:?}: {} frames submitted, {} played",
            summary.uptime, summary.frames_submitted, summary.frames_played
        );
        Ok(summary)
    }

    fn stop_render_thread(&mut self) -> Result<B, EngineError> {
        self.ring.shutdown();
        let handle = self
            .render_thread
            .take()
            .ok_or(EngineError::RenderThreadPanicked)?;
        handle.join().map_err(|_| {
            error!("Render thread panicked");
            EngineError::RenderThreadPanicked
        })
    }
}

impl<B: CommandPlayback> Drop for EngineState<B> {
    fn drop(&mut self) {
        if self.render_thread.is_some() {
            let _ = self.stop_render_thread();
            self.resources.shutdown();
            self.context
                .unregister(EventCode::ApplicationQuit, self.quit_listener);
        }
    }
}
