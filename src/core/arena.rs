//! # Record Arena
//!
//! A growable bump buffer holding variable-sized, size-prefixed records. It backs the
//! per-frame command buffers: the producer pushes one record per command, the render
//! thread walks the records in push order, and the arena is reset (not freed) between
//! frames so steady-state recording performs no allocation.
//!
//! ## Record Layout
//!
//! ```text
//! offset 0            8                8 + size      align8(8 + size)
//!        | size: u64  | payload bytes  | padding    |
//! ```
//!
//! Every record starts on an 8-byte boundary. Padding is counted in `used_size()`
//! and skipped during iteration.
//!
//! ## Growth
//!
//! The backing buffer is created lazily on the first push. When a push does not fit,
//! the capacity doubles until it does. Growth may move the buffer, which is why
//! `push` hands out a borrow of the arena rather than a raw pointer.

use log::{debug, error, warn};
use thiserror::Error;

use super::memory::{align_up, checked_align_up, MemoryTag};

/// Alignment of every record in the arena, in bytes.
pub const RECORD_ALIGN: usize = 8;

/// Size of the payload-size prefix written before each record.
pub const RECORD_HEADER_SIZE: usize = std::mem::size_of::<u64>();

/// Capacity used for the first allocation when none was requested.
pub const DEFAULT_ARENA_CAPACITY: usize = 1024;

/// Errors reported by [`Arena::push`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArenaError {
    /// A zero-sized record was requested.
    #[error("cannot push a zero-sized record")]
    ZeroSized,
    /// The source slice does not match the requested payload size.
    #[error("source holds {source_len} bytes but {size} were requested")]
    SourceSizeMismatch {
        /// Requested payload size
        size: usize,
        /// Length of the provided source
        source_len: usize,
    },
    /// The system allocator could not provide the backing memory.
    #[error("out of memory growing {tag} arena to {requested} bytes")]
    OutOfMemory {
        /// Owner of the arena
        tag: MemoryTag,
        /// Capacity that was being reserved
        requested: usize,
    },
}

/// Growable bump allocator for size-prefixed records.
///
/// # Examples
///
/// ```
/// use voxel_engine_core::core::{Arena, MemoryTag};
///
/// let mut arena = Arena::new(MemoryTag::Arena);
/// arena.push(3, Some(&[1, 2, 3][..])).unwrap();
/// arena.push(4, None).unwrap().copy_from_slice(&[4, 5, 6, 7]);
///
/// let records: Vec<&[u8]> = arena.iter().collect();
/// assert_eq!(records, vec![&[1u8, 2, 3][..], &[4u8, 5, 6, 7][..]]);
///
/// arena.reset(false, false);
/// assert_eq!(arena.iter().count(), 0);
/// ```
#[derive(Debug)]
pub struct Arena {
    /// Backing storage; `u64` words keep every record 8-byte aligned
    words: Vec<u64>,
    /// Bytes consumed by records, including headers and padding
    used: usize,
    /// Capacity reserved on the first push
    initial_capacity: usize,
    /// Owner of this arena
    tag: MemoryTag,
}

impl Arena {
    /// Creates an empty arena. No memory is allocated until the first push.
    pub fn new(tag: MemoryTag) -> Self {
        Self::with_initial_capacity(tag, DEFAULT_ARENA_CAPACITY)
    }

    /// Creates an empty arena whose first allocation will be at least `capacity` bytes.
    pub fn with_initial_capacity(tag: MemoryTag, capacity: usize) -> Self {
        Self {
            words: Vec::new(),
            used: 0,
            initial_capacity: checked_align_up(capacity.max(RECORD_ALIGN), RECORD_ALIGN)
                .unwrap_or(usize::MAX & !(RECORD_ALIGN - 1)),
            tag,
        }
    }

    /// Total bytes occupied by records, including headers and alignment padding.
    pub fn used_size(&self) -> usize {
        self.used
    }

    /// Bytes currently reserved by the backing buffer.
    pub fn capacity(&self) -> usize {
        self.words.len() * RECORD_ALIGN
    }

    /// Owner of this arena.
    pub fn tag(&self) -> MemoryTag {
        self.tag
    }

    /// Returns `true` if no records have been pushed since the last reset.
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Space one record with a `size`-byte payload occupies in the arena.
    pub const fn record_size(size: usize) -> usize {
        RECORD_HEADER_SIZE + align_up(size, RECORD_ALIGN)
    }

    /// [`Arena::record_size`], or `None` if the record could not be addressed.
    pub const fn checked_record_size(size: usize) -> Option<usize> {
        match checked_align_up(size, RECORD_ALIGN) {
            Some(padded) => padded.checked_add(RECORD_HEADER_SIZE),
            None => None,
        }
    }

    /// Reserves a record with a `size`-byte payload and returns the payload region.
    ///
    /// When `source` is given its bytes are copied into the payload; otherwise the payload
    /// contents are unspecified and the caller is expected to fill them.
    ///
    /// # Errors
    /// - [`ArenaError::ZeroSized`] if `size` is zero
    /// - [`ArenaError::SourceSizeMismatch`] if `source` is not exactly `size` bytes
    /// - [`ArenaError::OutOfMemory`] if the backing buffer could not grow
    pub fn push(&mut self, size: usize, source: Option<&[u8]>) -> Result<&mut [u8], ArenaError> {
        if size == 0 {
            warn!("Rejected zero-sized push into {} arena", self.tag);
            return Err(ArenaError::ZeroSized);
        }
        if let Some(source) = source {
            if source.len() != size {
                warn!(
                    "Rejected push into {} arena: source has {} bytes, expected {}",
                    self.tag,
                    source.len(),
                    size
                );
                return Err(ArenaError::SourceSizeMismatch {
                    size,
                    source_len: source.len(),
                });
            }
        }

        let record_start = self.used;
        let record_end = match Self::checked_record_size(size)
            .and_then(|record| record_start.checked_add(record))
        {
            Some(end) => end,
            None => {
                error!(
                    "Cannot address a {} byte record in {} arena holding {} bytes",
                    size, self.tag, record_start
                );
                return Err(ArenaError::OutOfMemory {
                    tag: self.tag,
                    requested: usize::MAX,
                });
            }
        };
        self.grow_to(record_end)?;

        self.words[record_start / RECORD_ALIGN] = size as u64;
        self.used = record_end;

        let payload_start = record_start + RECORD_HEADER_SIZE;
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(self.words.as_mut_slice());
        let payload = &mut bytes[payload_start..payload_start + size];
        if let Some(source) = source {
            payload.copy_from_slice(source);
        }
        Ok(payload)
    }

    /// Forgets every record.
    ///
    /// * `zero` - also overwrite the backing memory with zeroes
    /// * `release` - also free the backing buffer; the next push allocates again
    pub fn reset(&mut self, zero: bool, release: bool) {
        self.used = 0;
        if release {
            self.words = Vec::new();
        } else if zero {
            self.words.fill(0);
        }
    }

    /// Releases the backing buffer. The arena stays usable and will reallocate lazily.
    pub fn destroy(&mut self) {
        debug!("Destroying {} arena ({} bytes)", self.tag, self.capacity());
        self.reset(false, true);
    }

    /// Walks the payloads of every record, in push order.
    ///
    /// The walk is restartable: each call starts again from the first record.
    pub fn iter(&self) -> ArenaIter<'_> {
        ArenaIter {
            bytes: bytemuck::cast_slice(self.words.as_slice()),
            offset: 0,
            used: self.used,
            tag: self.tag,
        }
    }

    /// Grows the backing buffer (doubling) until it holds at least `required` bytes.
    fn grow_to(&mut self, required: usize) -> Result<(), ArenaError> {
        let capacity = self.capacity();
        if required <= capacity {
            return Ok(());
        }

        // Past the last doubling, ask for exactly what is needed and let the allocator refuse.
        let mut new_capacity = capacity.max(self.initial_capacity);
        while new_capacity < required {
            new_capacity = new_capacity.checked_mul(2).unwrap_or(required);
        }

        let new_words = new_capacity / RECORD_ALIGN;
        if let Err(err) = self.words.try_reserve_exact(new_words - self.words.len()) {
            error!(
                "Failed to grow {} arena to {} bytes: {}",
                self.tag, new_capacity, err
            );
            return Err(ArenaError::OutOfMemory {
                tag: self.tag,
                requested: new_capacity,
            });
        }
        self.words.resize(new_words, 0);
        debug!(
            "Grew {} arena from {} to {} bytes",
            self.tag, capacity, new_capacity
        );
        Ok(())
    }
}

impl<'a> IntoIterator for &'a Arena {
    type Item = &'a [u8];
    type IntoIter = ArenaIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the record payloads of an [`Arena`].
///
/// Each record header is checked against the remaining space; a header pointing past
/// the end of the buffer ends the walk and is logged as corruption.
pub struct ArenaIter<'a> {
    bytes: &'a [u8],
    offset: usize,
    used: usize,
    tag: MemoryTag,
}

impl<'a> Iterator for ArenaIter<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.offset >= self.used {
            return None;
        }

        let header_end = self.offset + RECORD_HEADER_SIZE;
        if header_end > self.bytes.len() {
            error!(
                "Corrupt {} arena: record header at {} runs past capacity {}",
                self.tag,
                self.offset,
                self.bytes.len()
            );
            self.offset = self.used;
            return None;
        }

        let size: u64 = bytemuck::pod_read_unaligned(&self.bytes[self.offset..header_end]);
        let size = size as usize;
        let remaining = self.bytes.len() - header_end;
        let padded = match checked_align_up(size, RECORD_ALIGN) {
            Some(padded) if size != 0 && padded <= remaining => padded,
            _ => {
                error!(
                    "Corrupt {} arena: record at {} claims {} bytes with {} remaining",
                    self.tag, self.offset, size, remaining
                );
                self.offset = self.used;
                return None;
            }
        };

        let payload = &self.bytes[header_end..header_end + size];
        self.offset = header_end + padded;
        Some(payload)
    }
}
