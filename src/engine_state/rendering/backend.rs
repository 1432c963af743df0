//! Backend callbacks the render thread and the resource worker call into, plus headless
//! implementations that only log.

use std::sync::atomic::{AtomicUsize, Ordering};

use log::{debug, info, trace};

use crate::engine_state::resources::{Resource, ResourceBackend};

use super::command::{Command, CommandHeader};

/// Plays back recorded commands on the render thread.
pub trait CommandPlayback: Send + 'static {
    /// Called before the first command of a frame.
    fn begin_frame(&mut self, _slot: usize) {}

    /// Called once per recorded command, in append order.
    fn play_back(&mut self, header: &CommandHeader, command: &Command);

    /// Called after the last command of a frame.
    fn end_frame(&mut self, _slot: usize) {}
}

/// Playback that logs every command and keeps counts.
#[derive(Debug, Default)]
pub struct LoggingPlayback {
    /// Frames played back
    pub frames: u64,
    /// Commands played back
    pub commands: u64,
    /// Last clear colour seen, packed as `0xRRGGBBAA`
    pub clear_color: Option<u32>,
}

impl CommandPlayback for LoggingPlayback {
    fn play_back(&mut self, header: &CommandHeader, command: &Command) {
        trace!("mode {} {command:?}", header.mode);
        if let Command::ClearColor(clear) = command {
            self.clear_color = Some(clear.color);
        }
        self.commands += 1;
    }

    fn end_frame(&mut self, slot: usize) {
        self.frames += 1;
        debug!("Frame {} played from slot {slot}", self.frames);
    }
}

/// Resource backend that accepts every resource and logs each call.
#[derive(Debug, Default)]
pub struct LoggingResourceBackend {
    created: AtomicUsize,
    destroyed: AtomicUsize,
}

impl LoggingResourceBackend {
    /// Resources passed to `create_local` so far.
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    /// Resources passed to `destroy_local` so far.
    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::Acquire)
    }
}

impl ResourceBackend for LoggingResourceBackend {
    fn create_local(&self, resource: &Resource) -> bool {
        self.created.fetch_add(1, Ordering::AcqRel);
        info!(
            "Created {:?} resource {:?} with {} fields",
            resource.kind(),
            resource.id(),
            resource.field_count()
        );
        true
    }

    fn destroy_local(&self, resource: &Resource) {
        self.destroyed.fetch_add(1, Ordering::AcqRel);
        debug!("Destroyed resource {:?}", resource.id());
    }
}
