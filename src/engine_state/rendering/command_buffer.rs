//! # Frame Command Buffer
//!
//! One frame's worth of recorded commands, stored back to back in an [`Arena`].
//!
//! Commands are grouped into stages. Draws need an open graphics stage and dispatches
//! an open compute stage; a clear colour may be recorded anywhere. `finish` seals the
//! buffer with a terminal marker, after which every append is rejected until `reset`.
//!
//! ```
//! use voxel_engine_core::engine_state::rendering::{
//!     command::{DrawCommand, RenderMode},
//!     command_buffer::FrameCommandBuffer,
//! };
//!
//! let mut buffer = FrameCommandBuffer::new(256);
//! buffer.clear_color(0.0, 0.0, 0.0, 1.0).unwrap();
//! buffer.begin_stage(RenderMode::Graphics, 0, 0).unwrap();
//! buffer.draw(DrawCommand { vertex_count: 3, instance_count: 1, ..Default::default() }).unwrap();
//! buffer.end_stage().unwrap();
//! buffer.finish().unwrap();
//!
//! let kinds: Vec<_> = buffer.commands().map(|c| c.unwrap().1.kind()).collect();
//! assert_eq!(kinds.len(), 4);
//! assert!(buffer.draw(DrawCommand::default()).is_err());
//! ```

use log::warn;

use crate::core::{Arena, MemoryTag};

use super::command::{
    BeginStageCommand, ClearColorCommand, Command, CommandError, CommandHeader, CommandKind,
    DispatchCommand, DrawCommand, DrawIndexedCommand, RenderMode, pack_rgba,
};

/// Records one frame's commands into an arena.
#[derive(Debug)]
pub struct FrameCommandBuffer {
    arena: Arena,
    finished: bool,
    open_stage: Option<RenderMode>,
    command_count: usize,
}

impl FrameCommandBuffer {
    /// Creates an empty buffer whose arena reserves `initial_capacity` bytes on first use.
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            arena: Arena::with_initial_capacity(MemoryTag::CommandBuffer, initial_capacity),
            finished: false,
            open_stage: None,
            command_count: 0,
        }
    }

    /// Whether `finish` has sealed the buffer.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// The stage commands are currently recorded into.
    pub fn open_stage(&self) -> Option<RenderMode> {
        self.open_stage
    }

    /// Number of recorded commands, excluding the terminal marker.
    pub fn command_count(&self) -> usize {
        self.command_count
    }

    /// Returns `true` if nothing has been recorded since the last reset.
    pub fn is_empty(&self) -> bool {
        self.command_count == 0
    }

    /// The arena holding the records.
    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    /// Records a clear colour from normalized channels.
    pub fn clear_color(&mut self, r: f32, g: f32, b: f32, a: f32) -> Result<(), CommandError> {
        self.clear_color_packed(pack_rgba(r, g, b, a))
    }

    /// Records a clear colour already packed as `0xRRGGBBAA`.
    pub fn clear_color_packed(&mut self, color: u32) -> Result<(), CommandError> {
        self.ensure_writable(CommandKind::ClearColor)?;
        let mode = self.open_stage.unwrap_or(RenderMode::Graphics);
        self.record(mode, Command::ClearColor(ClearColorCommand { color }))
    }

    /// Opens a stage. Stages do not nest.
    pub fn begin_stage(
        &mut self,
        mode: RenderMode,
        pipeline: u32,
        target: u32,
    ) -> Result<(), CommandError> {
        self.ensure_writable(CommandKind::BeginStage)?;
        if let Some(open) = self.open_stage {
            return Err(reject(CommandError::StageAlreadyOpen { open }));
        }
        self.record(
            mode,
            Command::BeginStage(BeginStageCommand { pipeline, target }),
        )?;
        self.open_stage = Some(mode);
        Ok(())
    }

    /// Records a draw. Needs an open graphics stage.
    pub fn draw(&mut self, draw: DrawCommand) -> Result<(), CommandError> {
        self.ensure_stage(CommandKind::Draw, RenderMode::Graphics)?;
        self.record(RenderMode::Graphics, Command::Draw(draw))
    }

    /// Records an indexed draw. Needs an open graphics stage.
    pub fn draw_indexed(&mut self, draw: DrawIndexedCommand) -> Result<(), CommandError> {
        self.ensure_stage(CommandKind::DrawIndexed, RenderMode::Graphics)?;
        self.record(RenderMode::Graphics, Command::DrawIndexed(draw))
    }

    /// Records a compute dispatch. Needs an open compute stage.
    pub fn dispatch(&mut self, x: u32, y: u32, z: u32) -> Result<(), CommandError> {
        self.ensure_stage(CommandKind::Dispatch, RenderMode::Compute)?;
        self.record(
            RenderMode::Compute,
            Command::Dispatch(DispatchCommand { x, y, z }),
        )
    }

    /// Closes the open stage.
    pub fn end_stage(&mut self) -> Result<(), CommandError> {
        self.ensure_writable(CommandKind::EndStage)?;
        let Some(mode) = self.open_stage else {
            return Err(reject(CommandError::NoOpenStage));
        };
        self.record(mode, Command::EndStage)?;
        self.open_stage = None;
        Ok(())
    }

    /// Writes the terminal marker and seals the buffer.
    pub fn finish(&mut self) -> Result<(), CommandError> {
        self.ensure_writable(CommandKind::End)?;
        if let Some(mode) = self.open_stage {
            return Err(reject(CommandError::UnfinishedStage(mode)));
        }
        self.append(RenderMode::Graphics, Command::End)?;
        self.finished = true;
        Ok(())
    }

    /// Empties the buffer for reuse. The arena keeps its memory.
    pub fn reset(&mut self) {
        self.arena.reset(false, false);
        self.finished = false;
        self.open_stage = None;
        self.command_count = 0;
    }

    /// Decodes the recorded commands in append order. The terminal marker is not
    /// yielded.
    pub fn commands(
        &self,
    ) -> impl Iterator<Item = Result<(CommandHeader, Command), CommandError>> + '_ {
        self.arena
            .iter()
            .map(Command::decode)
            .filter(|decoded| !matches!(decoded, Ok((_, Command::End))))
    }

    fn ensure_writable(&self, kind: CommandKind) -> Result<(), CommandError> {
        if self.finished {
            warn!("Rejected {kind:?}: command buffer is already finished");
            return Err(CommandError::Finished);
        }
        Ok(())
    }

    fn ensure_stage(&self, kind: CommandKind, required: RenderMode) -> Result<(), CommandError> {
        self.ensure_writable(kind)?;
        if self.open_stage != Some(required) {
            return Err(reject(CommandError::WrongStage {
                kind,
                required,
                open: self.open_stage,
            }));
        }
        Ok(())
    }

    fn record(&mut self, mode: RenderMode, command: Command) -> Result<(), CommandError> {
        self.append(mode, command)?;
        self.command_count += 1;
        Ok(())
    }

    fn append(&mut self, mode: RenderMode, command: Command) -> Result<(), CommandError> {
        let record = self.arena.push(command.encoded_size(), None)?;
        command.encode_into(mode, record);
        Ok(())
    }
}

fn reject(err: CommandError) -> CommandError {
    warn!("Rejected command: {err}");
    err
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decoded(buffer: &FrameCommandBuffer) -> Vec<(RenderMode, Command)> {
        buffer
            .commands()
            .map(|entry| {
                let (header, command) = entry.unwrap();
                (header.render_mode().unwrap(), command)
            })
            .collect()
    }

    #[test]
    fn replays_in_append_order() {
        let mut buffer = FrameCommandBuffer::new(64);
        buffer.clear_color(1.0, 0.0, 0.0, 1.0).unwrap();
        buffer.begin_stage(RenderMode::Compute, 7, 0).unwrap();
        buffer.dispatch(8, 8, 1).unwrap();
        buffer.end_stage().unwrap();
        buffer.begin_stage(RenderMode::Graphics, 1, 2).unwrap();
        let draw = DrawIndexedCommand {
            index_count: 6,
            instance_count: 1,
            ..Default::default()
        };
        buffer.draw_indexed(draw).unwrap();
        buffer.end_stage().unwrap();
        buffer.finish().unwrap();

        assert_eq!(buffer.command_count(), 7);
        assert_eq!(
            decoded(&buffer),
            vec![
                (RenderMode::Graphics, Command::ClearColor(ClearColorCommand { color: 0xFF0000FF })),
                (
                    RenderMode::Compute,
                    Command::BeginStage(BeginStageCommand { pipeline: 7, target: 0 })
                ),
                (RenderMode::Compute, Command::Dispatch(DispatchCommand { x: 8, y: 8, z: 1 })),
                (RenderMode::Compute, Command::EndStage),
                (
                    RenderMode::Graphics,
                    Command::BeginStage(BeginStageCommand { pipeline: 1, target: 2 })
                ),
                (RenderMode::Graphics, Command::DrawIndexed(draw)),
                (RenderMode::Graphics, Command::EndStage),
            ]
        );
    }

    #[test]
    fn finished_buffers_reject_appends_without_changing() {
        let mut buffer = FrameCommandBuffer::new(64);
        buffer.clear_color_packed(0x11223344).unwrap();
        buffer.finish().unwrap();
        let used = buffer.arena().used_size();

        assert_eq!(buffer.clear_color_packed(1), Err(CommandError::Finished));
        assert_eq!(
            buffer.begin_stage(RenderMode::Graphics, 0, 0),
            Err(CommandError::Finished)
        );
        assert_eq!(buffer.finish(), Err(CommandError::Finished));
        assert_eq!(buffer.arena().used_size(), used);
        assert_eq!(buffer.command_count(), 1);
    }

    #[test]
    fn stage_rules_are_enforced() {
        let mut buffer = FrameCommandBuffer::new(64);
        assert!(matches!(
            buffer.draw(DrawCommand::default()),
            Err(CommandError::WrongStage { open: None, .. })
        ));
        assert_eq!(buffer.end_stage(), Err(CommandError::NoOpenStage));

        buffer.begin_stage(RenderMode::Graphics, 0, 0).unwrap();
        assert_eq!(
            buffer.begin_stage(RenderMode::Compute, 0, 0),
            Err(CommandError::StageAlreadyOpen {
                open: RenderMode::Graphics
            })
        );
        assert!(matches!(
            buffer.dispatch(1, 1, 1),
            Err(CommandError::WrongStage {
                required: RenderMode::Compute,
                ..
            })
        ));
        assert_eq!(
            buffer.finish(),
            Err(CommandError::UnfinishedStage(RenderMode::Graphics))
        );
        assert!(!buffer.is_finished());
        assert_eq!(buffer.command_count(), 1);
    }

    #[test]
    fn reset_clears_contents_and_finished_flag() {
        let mut buffer = FrameCommandBuffer::new(64);
        buffer.begin_stage(RenderMode::Graphics, 0, 0).unwrap();
        for _ in 0..16 {
            buffer.draw(DrawCommand::default()).unwrap();
        }
        buffer.end_stage().unwrap();
        buffer.finish().unwrap();
        let capacity = buffer.arena().capacity();

        buffer.reset();
        assert!(!buffer.is_finished());
        assert!(buffer.is_empty());
        assert_eq!(buffer.open_stage(), None);
        assert_eq!(buffer.commands().count(), 0);
        assert_eq!(buffer.arena().capacity(), capacity);

        buffer.clear_color_packed(5).unwrap();
        assert_eq!(buffer.commands().count(), 1);
    }

    #[test]
    fn clear_colour_inside_a_stage_takes_its_mode() {
        let mut buffer = FrameCommandBuffer::new(64);
        buffer.begin_stage(RenderMode::Compute, 0, 0).unwrap();
        buffer.clear_color_packed(9).unwrap();
        assert_eq!(decoded(&buffer)[1].0, RenderMode::Compute);
    }
}
