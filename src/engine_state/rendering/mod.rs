//! Rendering side of the engine.
//!
//! Frames are recorded into [`FrameCommandBuffer`]s on the producer thread, exchanged
//! through a [`FrameRing`], and played back on a dedicated render thread that hands each
//! command to a [`CommandPlayback`] backend.

pub mod backend;
pub mod command;
pub mod command_buffer;
pub mod frame_ring;

use std::{io, sync::Arc, thread::JoinHandle};

use log::{debug, error, info};
use web_time::Instant;

pub use backend::{CommandPlayback, LoggingPlayback, LoggingResourceBackend};
pub use command::{Command, CommandError, CommandHeader, CommandKind, RenderMode};
pub use command_buffer::FrameCommandBuffer;
pub use frame_ring::{FrameRing, FrameSlot, RingError, RingState};

/// Spawns the render thread. It plays frames until the ring shuts down and every
/// submitted frame has been played, then hands the backend back through the join handle.
pub fn spawn_render_thread<B: CommandPlayback>(
    name: &str,
    ring: Arc<FrameRing>,
    backend: B,
) -> io::Result<JoinHandle<B>> {
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || render_loop(&ring, backend))
}

fn render_loop<B: CommandPlayback>(ring: &FrameRing, mut backend: B) -> B {
    debug!("Render thread waiting for the first frame");
    if !ring.wait_for_first_frame() {
        info!("Render thread exiting before any frame was submitted");
        return backend;
    }

    while ring.consume_next(|slot, buffer| {
        play_frame(&mut backend, slot, buffer);
    }) {}

    info!(
        "Render thread exiting after {} frames",
        ring.frames_played()
    );
    backend
}

/// Plays back one frame's commands in append order. Returns the number of commands played.
///
/// A record that fails to decode ends the frame early.
pub fn play_frame<B: CommandPlayback + ?Sized>(
    backend: &mut B,
    slot: usize,
    buffer: &FrameCommandBuffer,
) -> usize {
    let started = Instant::now();
    backend.begin_frame(slot);

    let mut played = 0;
    for entry in buffer.commands() {
        match entry {
            Ok((header, command)) => {
                backend.play_back(&header, &command);
                played += 1;
            }
            Err(err) => {
                error!("Frame in slot {slot} is corrupt after {played} commands: {err}");
                break;
            }
        }
    }

    backend.end_frame(slot);
    debug!(
        "Played {played} commands from slot {slot} in {:?}",
        started.elapsed()
    );
    played
}
