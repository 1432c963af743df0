//! # Recorded Commands
//!
//! Binary layout of the commands a frame command buffer stores in its arena. Every
//! command is one arena record: a [`CommandHeader`] followed by the variant's payload.
//!
//! ```text
//! ┌──────────── record ────────────┐
//! │ kind: u32 │ mode: u32 │ payload │
//! └───────────┴───────────┴─────────┘
//! ```

use std::mem::size_of;

use bytemuck::{Pod, Zeroable};
use thiserror::Error;

use crate::core::ArenaError;

/// Errors raised while recording or decoding commands.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    /// The buffer was finished; it accepts nothing until reset.
    #[error("command buffer is finished")]
    Finished,
    /// `begin_stage` was called while a stage was open.
    #[error("a {open:?} stage is already open")]
    StageAlreadyOpen {
        /// The stage that is open
        open: RenderMode,
    },
    /// `end_stage` was called with no open stage.
    #[error("no stage is open")]
    NoOpenStage,
    /// The command needs a stage of another mode.
    #[error("{kind:?} requires an open {required:?} stage, found {open:?}")]
    WrongStage {
        /// The rejected command
        kind: CommandKind,
        /// Mode the command needs
        required: RenderMode,
        /// Stage open at the time, if any
        open: Option<RenderMode>,
    },
    /// `finish` was called before the open stage was ended.
    #[error("cannot finish with an open {0:?} stage")]
    UnfinishedStage(RenderMode),
    /// The arena could not hold the command.
    #[error(transparent)]
    Arena(#[from] ArenaError),
    /// A record holds an unknown command kind.
    #[error("unknown command kind {0}")]
    UnknownKind(u32),
    /// A record holds an unknown rendering mode.
    #[error("unknown render mode {0}")]
    UnknownMode(u32),
    /// A record is shorter than its kind requires.
    #[error("{kind:?} record holds {actual} bytes, expected {expected}")]
    Truncated {
        /// Kind read from the header
        kind: CommandKind,
        /// Header plus payload size
        expected: usize,
        /// Record size
        actual: usize,
    },
}

/// Which kind of stage a command belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RenderMode {
    /// Rasterization
    Graphics = 0,
    /// Compute dispatches
    Compute = 1,
}

impl RenderMode {
    fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(RenderMode::Graphics),
            1 => Some(RenderMode::Compute),
            _ => None,
        }
    }
}

/// Discriminant written into every [`CommandHeader`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum CommandKind {
    /// Set the frame's clear colour
    ClearColor = 0,
    /// Open a graphics or compute stage
    BeginStage,
    /// Non-indexed draw
    Draw,
    /// Indexed draw
    DrawIndexed,
    /// Compute dispatch
    Dispatch,
    /// Close the open stage
    EndStage,
    /// Terminal marker written by `finish`
    End,
}

impl CommandKind {
    fn from_u32(value: u32) -> Option<Self> {
        Some(match value {
            0 => CommandKind::ClearColor,
            1 => CommandKind::BeginStage,
            2 => CommandKind::Draw,
            3 => CommandKind::DrawIndexed,
            4 => CommandKind::Dispatch,
            5 => CommandKind::EndStage,
            6 => CommandKind::End,
            _ => return None,
        })
    }

    /// Size in bytes of this kind's payload.
    pub const fn payload_size(self) -> usize {
        match self {
            CommandKind::ClearColor => size_of::<ClearColorCommand>(),
            CommandKind::BeginStage => size_of::<BeginStageCommand>(),
            CommandKind::Draw => size_of::<DrawCommand>(),
            CommandKind::DrawIndexed => size_of::<DrawIndexedCommand>(),
            CommandKind::Dispatch => size_of::<DispatchCommand>(),
            CommandKind::EndStage | CommandKind::End => 0,
        }
    }
}

/// Fixed header in front of every recorded command.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
pub struct CommandHeader {
    /// A [`CommandKind`] discriminant
    pub kind: u32,
    /// A [`RenderMode`] discriminant
    pub mode: u32,
}

impl CommandHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = size_of::<CommandHeader>();

    /// Builds a header for `kind` recorded in `mode`.
    pub fn new(kind: CommandKind, mode: RenderMode) -> Self {
        Self {
            kind: kind as u32,
            mode: mode as u32,
        }
    }

    /// Decoded command kind.
    pub fn command_kind(&self) -> Result<CommandKind, CommandError> {
        CommandKind::from_u32(self.kind).ok_or(CommandError::UnknownKind(self.kind))
    }

    /// Decoded rendering mode.
    pub fn render_mode(&self) -> Result<RenderMode, CommandError> {
        RenderMode::from_u32(self.mode).ok_or(CommandError::UnknownMode(self.mode))
    }
}

/// Clear colour packed as `0xRRGGBBAA`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct ClearColorCommand {
    /// Packed colour
    pub color: u32,
}

/// Opens a graphics or compute stage.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct BeginStageCommand {
    /// Backend pipeline to bind for the stage
    pub pipeline: u32,
    /// Backend render target, ignored by compute stages
    pub target: u32,
}

/// Non-indexed draw.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawCommand {
    /// Vertices per instance
    pub vertex_count: u32,
    /// Instances to draw
    pub instance_count: u32,
    /// First vertex to read
    pub first_vertex: u32,
    /// First instance id
    pub first_instance: u32,
}

/// Indexed draw.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedCommand {
    /// Indices per instance
    pub index_count: u32,
    /// Instances to draw
    pub instance_count: u32,
    /// First index to read
    pub first_index: u32,
    /// Added to every index before the vertex fetch
    pub base_vertex: i32,
    /// First instance id
    pub first_instance: u32,
}

/// Compute dispatch, in workgroups.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct DispatchCommand {
    /// Workgroups along x
    pub x: u32,
    /// Workgroups along y
    pub y: u32,
    /// Workgroups along z
    pub z: u32,
}

/// A decoded command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Clears the current target
    ClearColor(ClearColorCommand),
    /// Opens a stage
    BeginStage(BeginStageCommand),
    /// Non-indexed draw
    Draw(DrawCommand),
    /// Indexed draw
    DrawIndexed(DrawIndexedCommand),
    /// Compute dispatch
    Dispatch(DispatchCommand),
    /// Closes the open stage
    EndStage,
    /// Terminal marker written by `finish`
    End,
}

impl Command {
    /// Kind written into the record header.
    pub fn kind(&self) -> CommandKind {
        match self {
            Command::ClearColor(_) => CommandKind::ClearColor,
            Command::BeginStage(_) => CommandKind::BeginStage,
            Command::Draw(_) => CommandKind::Draw,
            Command::DrawIndexed(_) => CommandKind::DrawIndexed,
            Command::Dispatch(_) => CommandKind::Dispatch,
            Command::EndStage => CommandKind::EndStage,
            Command::End => CommandKind::End,
        }
    }

    /// Header plus payload size.
    pub fn encoded_size(&self) -> usize {
        CommandHeader::SIZE + self.kind().payload_size()
    }

    fn payload(&self) -> &[u8] {
        match self {
            Command::ClearColor(payload) => bytemuck::bytes_of(payload),
            Command::BeginStage(payload) => bytemuck::bytes_of(payload),
            Command::Draw(payload) => bytemuck::bytes_of(payload),
            Command::DrawIndexed(payload) => bytemuck::bytes_of(payload),
            Command::Dispatch(payload) => bytemuck::bytes_of(payload),
            Command::EndStage | Command::End => &[],
        }
    }

    /// Writes header and payload into `record`, which must be `encoded_size()` bytes.
    pub fn encode_into(&self, mode: RenderMode, record: &mut [u8]) {
        debug_assert_eq!(record.len(), self.encoded_size());
        let header = CommandHeader::new(self.kind(), mode);
        let (head, payload) = record.split_at_mut(CommandHeader::SIZE);
        head.copy_from_slice(bytemuck::bytes_of(&header));
        payload.copy_from_slice(self.payload());
    }

    /// Decodes one arena record.
    pub fn decode(record: &[u8]) -> Result<(CommandHeader, Command), CommandError> {
        if record.len() < CommandHeader::SIZE {
            return Err(CommandError::Truncated {
                kind: CommandKind::End,
                expected: CommandHeader::SIZE,
                actual: record.len(),
            });
        }
        let header: CommandHeader = bytemuck::pod_read_unaligned(&record[..CommandHeader::SIZE]);
        let kind = header.command_kind()?;
        header.render_mode()?;

        let expected = CommandHeader::SIZE + kind.payload_size();
        if record.len() < expected {
            return Err(CommandError::Truncated {
                kind,
                expected,
                actual: record.len(),
            });
        }
        let payload = &record[CommandHeader::SIZE..expected];

        let command = match kind {
            CommandKind::ClearColor => Command::ClearColor(bytemuck::pod_read_unaligned(payload)),
            CommandKind::BeginStage => Command::BeginStage(bytemuck::pod_read_unaligned(payload)),
            CommandKind::Draw => Command::Draw(bytemuck::pod_read_unaligned(payload)),
            CommandKind::DrawIndexed => {
                Command::DrawIndexed(bytemuck::pod_read_unaligned(payload))
            }
            CommandKind::Dispatch => Command::Dispatch(bytemuck::pod_read_unaligned(payload)),
            CommandKind::EndStage => Command::EndStage,
            CommandKind::End => Command::End,
        };
        Ok((header, command))
    }
}

/// Packs normalized RGBA channels into `0xRRGGBBAA`. Channels are clamped to `0.0..=1.0`.
///
/// ```
/// use voxel_engine_core::engine_state::rendering::command::pack_rgba;
///
/// assert_eq!(pack_rgba(1.0, 0.0, 0.0, 1.0), 0xFF00_00FF);
/// ```
pub fn pack_rgba(r: f32, g: f32, b: f32, a: f32) -> u32 {
    fn channel(value: f32) -> u32 {
        (value.clamp(0.0, 1.0) * 255.0).round() as u32
    }
    channel(r) << 24 | channel(g) << 16 | channel(b) << 8 | channel(a)
}
