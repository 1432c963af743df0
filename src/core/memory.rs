//! # Memory Tags
//!
//! Every block of memory owned by the core carries a `MemoryTag` describing which
//! subsystem requested it. Tags are used in log output and in the burst allocator's
//! entry list so that large or unexpected allocations can be traced back to their owner.

use std::fmt;

/// The subsystem an allocation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryTag {
    /// Allocation with no particular owner
    #[default]
    Unknown,
    /// Generic arena storage
    Arena,
    /// Per-frame command recording
    CommandBuffer,
    /// Resource headers and their trailing fields
    Resource,
    /// Worker task queues
    Worker,
    /// Event listener tables
    Events,
    /// Engine-wide bookkeeping
    Engine,
}

impl MemoryTag {
    /// Human readable name used in log messages.
    pub const fn name(self) -> &'static str {
        match self {
            MemoryTag::Unknown => "unknown",
            MemoryTag::Arena => "arena",
            MemoryTag::CommandBuffer => "command_buffer",
            MemoryTag::Resource => "resource",
            MemoryTag::Worker => "worker",
            MemoryTag::Events => "events",
            MemoryTag::Engine => "engine",
        }
    }
}

impl fmt::Display for MemoryTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Rounds `value` up to the next multiple of `align`. `align` must be a power of two.
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// [`align_up`] that returns `None` instead of overflowing.
#[inline]
pub const fn checked_align_up(value: usize, align: usize) -> Option<usize> {
    match value.checked_add(align - 1) {
        Some(padded) => Some(padded & !(align - 1)),
        None => None,
    }
}
