//! # Frame Ring
//!
//! Fixed ring of [`FrameCommandBuffer`]s exchanged between one producer (the thread that
//! records frames) and one consumer (the render thread).
//!
//! ## Protocol
//! - The producer takes the slot at the write index with `next_command_buffer()`, records
//!   into it, and hands it back with `submit()`. `submit` blocks while every slot is
//!   still waiting to be played, so the producer never overwrites an unplayed frame.
//! - The consumer takes frames with `consume_next()` in submission order, plays them back,
//!   and resets the slot. It blocks while nothing is ready.
//! - `shutdown()` wakes both sides. Frames already submitted are still handed to the
//!   consumer; new frames are refused.
//!
//! Each slot sits behind its own mutex, so only the side that owns a slot can touch its
//! buffer. The shared indices are only changed under the ring lock.

use std::{
    ops::{Deref, DerefMut},
    sync::{Condvar, Mutex, MutexGuard, PoisonError, TryLockError},
};

use log::{debug, info, warn};
use thiserror::Error;

use super::{command::CommandError, command_buffer::FrameCommandBuffer};

/// Errors reported by the [`FrameRing`].
#[derive(Debug, Error)]
pub enum RingError {
    /// The ring has been shut down.
    #[error("frame ring is shutting down")]
    ShuttingDown,
    /// A ring needs at least two slots.
    #[error("frame ring needs at least 2 slots, got {0}")]
    InvalidLength(usize),
    /// The frame does not belong to this ring's current write slot.
    #[error("frame for slot {slot} is stale; the write slot is {expected}")]
    StaleFrame {
        /// Slot the frame was taken from
        slot: usize,
        /// Current write slot
        expected: usize,
    },
    /// The write slot is already handed out.
    #[error("slot {0} is already being recorded")]
    SlotBusy(usize),
    /// The frame could not be finished.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Lifecycle of the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RingState {
    /// Frames flow between producer and consumer
    Running,
    /// Waits are released; no new frames are accepted
    ShuttingDown,
}

#[derive(Debug)]
struct RingIndices {
    write: usize,
    read: usize,
    submitted: u64,
    consumed: u64,
    played: u64,
    first_frame_submitted: bool,
    state: RingState,
}

impl RingIndices {
    fn is_running(&self) -> bool {
        self.state == RingState::Running
    }

    /// Frames submitted and not yet played back.
    fn occupied(&self) -> u64 {
        self.submitted - self.played
    }

    fn has_ready_frame(&self) -> bool {
        self.consumed < self.submitted
    }
}

/// Ring of frame command buffers shared by one producer and one consumer.
#[derive(Debug)]
pub struct FrameRing {
    slots: Box<[Mutex<FrameCommandBuffer>]>,
    indices: Mutex<RingIndices>,
    condvar: Condvar,
}

/// Exclusive access to the slot at the write index, handed out by
/// [`FrameRing::next_command_buffer`].
pub struct FrameSlot<'a> {
    ring: &'a FrameRing,
    index: usize,
    buffer: MutexGuard<'a, FrameCommandBuffer>,
}

impl FrameSlot<'_> {
    /// Position of the slot in the ring.
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Deref for FrameSlot<'_> {
    type Target = FrameCommandBuffer;

    fn deref(&self) -> &Self::Target {
        &self.buffer
    }
}

impl DerefMut for FrameSlot<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.buffer
    }
}

impl FrameRing {
    /// Creates a ring of `length` slots, each with an arena reserving
    /// `arena_capacity` bytes on first use.
    pub fn new(length: usize, arena_capacity: usize) -> Result<Self, RingError> {
        if length < 2 {
            return Err(RingError::InvalidLength(length));
        }
        let slots = (0..length)
            .map(|_| Mutex::new(FrameCommandBuffer::new(arena_capacity)))
            .collect();

        Ok(Self {
            slots,
            indices: Mutex::new(RingIndices {
                write: 0,
                read: length - 1,
                submitted: 0,
                consumed: 0,
                played: 0,
                first_frame_submitted: false,
                state: RingState::Running,
            }),
            condvar: Condvar::new(),
        })
    }

    /// Number of slots.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Always `false`; a ring has at least two slots.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Whether the ring still accepts frames.
    pub fn state(&self) -> RingState {
        self.lock_indices().state
    }

    /// Slot the producer records into next.
    pub fn write_index(&self) -> usize {
        self.lock_indices().write
    }

    /// Slot the consumer took last.
    pub fn read_index(&self) -> usize {
        self.lock_indices().read
    }

    /// Frames the producer has submitted.
    pub fn frames_submitted(&self) -> u64 {
        self.lock_indices().submitted
    }

    /// Frames the consumer has finished playing back.
    pub fn frames_played(&self) -> u64 {
        self.lock_indices().played
    }

    /// Resets and hands out the buffer at the write index.
    ///
    /// # Errors
    /// - [`RingError::ShuttingDown`] after `shutdown`
    /// - [`RingError::SlotBusy`] if the previous frame for this slot is still held
    pub fn next_command_buffer(&self) -> Result<FrameSlot<'_>, RingError> {
        let index = {
            let indices = self.lock_indices();
            if !indices.is_running() {
                return Err(RingError::ShuttingDown);
            }
            indices.write
        };

        let mut buffer = match self.slots[index].try_lock() {
            Ok(buffer) => buffer,
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
            Err(TryLockError::WouldBlock) => {
                warn!("Frame slot {index} requested while it is still being recorded");
                return Err(RingError::SlotBusy(index));
            }
        };
        buffer.reset();

        Ok(FrameSlot {
            ring: self,
            index,
            buffer,
        })
    }

    /// Finishes the frame if needed and queues it for the consumer, then blocks until the
    /// next write slot is free or the ring shuts down.
    ///
    /// # Errors
    /// - [`RingError::ShuttingDown`] if the ring no longer accepts frames
    /// - [`RingError::StaleFrame`] if `frame` is not this ring's write slot
    /// - [`RingError::Command`] if the frame still has an open stage
    pub fn submit(&self, mut frame: FrameSlot<'_>) -> Result<(), RingError> {
        let mut indices = self.lock_indices();
        if !indices.is_running() {
            warn!("Frame for slot {} submitted after shutdown", frame.index);
            return Err(RingError::ShuttingDown);
        }
        if !std::ptr::eq(frame.ring, self) || frame.index != indices.write {
            warn!(
                "Rejected stale frame for slot {} (write slot is {})",
                frame.index, indices.write
            );
            return Err(RingError::StaleFrame {
                slot: frame.index,
                expected: indices.write,
            });
        }

        if !frame.is_finished() {
            frame.finish()?;
        }
        drop(frame);

        indices.submitted += 1;
        if !indices.first_frame_submitted {
            indices.first_frame_submitted = true;
            info!("First frame submitted");
        }
        indices.write = (indices.write + 1) % self.slots.len();
        self.condvar.notify_all();

        let length = self.slots.len() as u64;
        while indices.occupied() >= length && indices.is_running() {
            indices = self
                .condvar
                .wait(indices)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }

    /// Blocks until the first frame has been submitted. Returns `false` if the ring shut
    /// down before that happened.
    pub fn wait_for_first_frame(&self) -> bool {
        let mut indices = self.lock_indices();
        while !indices.first_frame_submitted && indices.is_running() {
            indices = self
                .condvar
                .wait(indices)
                .unwrap_or_else(PoisonError::into_inner);
        }
        indices.first_frame_submitted
    }

    /// Blocks until a frame is ready, passes it to `play` with its slot index, then resets
    /// the slot. Returns `false` once the ring is shut down and every submitted frame has
    /// been played.
    pub fn consume_next<F>(&self, play: F) -> bool
    where
        F: FnOnce(usize, &FrameCommandBuffer),
    {
        let index = {
            let mut indices = self.lock_indices();
            while !indices.has_ready_frame() && indices.is_running() {
                indices = self
                    .condvar
                    .wait(indices)
                    .unwrap_or_else(PoisonError::into_inner);
            }
            if !indices.has_ready_frame() {
                return false;
            }
            indices.read = (indices.read + 1) % self.slots.len();
            indices.consumed += 1;
            indices.read
        };

        {
            let mut buffer = self.slots[index]
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            play(index, &buffer);
            buffer.reset();
        }

        let mut indices = self.lock_indices();
        indices.played += 1;
        self.condvar.notify_all();
        true
    }

    /// Stops accepting frames and wakes every waiter. Idempotent.
    pub fn shutdown(&self) {
        let mut indices = self.lock_indices();
        if indices.state == RingState::ShuttingDown {
            return;
        }
        indices.state = RingState::ShuttingDown;
        debug!(
            "Frame ring shutting down ({} submitted, {} played)",
            indices.submitted, indices.played
        );
        self.condvar.notify_all();
    }

    fn lock_indices(&self) -> MutexGuard<'_, RingIndices> {
        self.indices.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
