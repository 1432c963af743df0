//! # Burst Allocator
//!
//! Collects many differently-sized, differently-tagged requests and satisfies all of them
//! with a single zeroed allocation. Callers receive a [`BurstIndex`] when they add a request
//! and resolve it to a byte range once the burst has been allocated.
//!
//! Layout is insertion order with no reordering and no per-entry alignment: entry `n`
//! starts at the sum of the sizes of entries `0..n`. Callers that need alignment pad
//! their own sizes.
//!
//! ## Lifecycle
//! 1. `add()` any number of requests
//! 2. `allocate_all()` exactly once
//! 3. access entries through `get()` / `get_mut()`
//! 4. `free_all()` releases the block and clears the entries so the burst can be reused

use log::{debug, warn};
use thiserror::Error;

use super::memory::MemoryTag;

/// Errors reported by [`BurstAllocator`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BurstError {
    /// A zero-sized request was added.
    #[error("burst entries must have a non-zero size")]
    ZeroSized,
    /// `allocate_all` was called with no requests.
    #[error("cannot allocate an empty burst")]
    Empty,
    /// The burst has already been allocated; entries are frozen until `free_all`.
    #[error("burst is already allocated")]
    AlreadyAllocated,
}

/// Stable handle for one request in a [`BurstAllocator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BurstIndex(usize);

impl BurstIndex {
    /// Position of the request in insertion order.
    pub fn position(self) -> usize {
        self.0
    }
}

/// One request in the burst.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BurstEntry {
    /// Requested size in bytes
    pub size: usize,
    /// Owner of the request
    pub tag: MemoryTag,
    /// Byte offset inside the block, known once the burst is allocated
    pub offset: Option<usize>,
}

/// Two-phase allocator that resolves many requests with one allocation.
///
/// # Examples
///
/// ```
/// use voxel_engine_core::core::{BurstAllocator, MemoryTag};
///
/// let mut burst = BurstAllocator::new();
/// let header = burst.add(4, MemoryTag::Resource).unwrap();
/// let body = burst.add(8, MemoryTag::Resource).unwrap();
/// burst.allocate_all().unwrap();
///
/// assert_eq!(burst.offset(header), Some(0));
/// assert_eq!(burst.offset(body), Some(4));
/// assert_eq!(burst.total_size(), 12);
/// ```
#[derive(Debug, Default)]
pub struct BurstAllocator {
    entries: Vec<BurstEntry>,
    block: Option<Box<[u8]>>,
}

impl BurstAllocator {
    /// Creates an empty burst.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a request and returns its handle.
    ///
    /// # Errors
    /// - [`BurstError::ZeroSized`] if `size` is zero
    /// - [`BurstError::AlreadyAllocated`] if `allocate_all` already ran
    pub fn add(&mut self, size: usize, tag: MemoryTag) -> Result<BurstIndex, BurstError> {
        if self.block.is_some() {
            warn!("Rejected burst request for {size} bytes ({tag}): burst already allocated");
            return Err(BurstError::AlreadyAllocated);
        }
        if size == 0 {
            warn!("Rejected zero-sized burst request ({tag})");
            return Err(BurstError::ZeroSized);
        }

        self.entries.push(BurstEntry {
            size,
            tag,
            offset: None,
        });
        Ok(BurstIndex(self.entries.len() - 1))
    }

    /// Performs the single zeroed allocation and assigns every entry its offset.
    ///
    /// # Errors
    /// - [`BurstError::Empty`] if no requests were added
    /// - [`BurstError::AlreadyAllocated`] if called twice without `free_all`
    pub fn allocate_all(&mut self) -> Result<(), BurstError> {
        if self.block.is_some() {
            warn!("Burst allocated twice without free_all");
            return Err(BurstError::AlreadyAllocated);
        }
        if self.entries.is_empty() {
            warn!("Rejected allocation of an empty burst");
            return Err(BurstError::Empty);
        }

        let mut offset = 0;
        for entry in &mut self.entries {
            entry.offset = Some(offset);
            offset += entry.size;
        }

        self.block = Some(vec![0u8; offset].into_boxed_slice());
        debug!(
            "Allocated burst of {} bytes for {} entries",
            offset,
            self.entries.len()
        );
        Ok(())
    }

    /// Releases the block and forgets every entry. Outstanding indices become invalid.
    pub fn free_all(&mut self) {
        self.block = None;
        self.entries.clear();
    }

    /// Returns `true` once `allocate_all` has succeeded.
    pub fn is_allocated(&self) -> bool {
        self.block.is_some()
    }

    /// Number of requests added so far.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if no requests were added.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Size of the allocated block, or zero before `allocate_all`.
    pub fn total_size(&self) -> usize {
        self.block.as_ref().map_or(0, |block| block.len())
    }

    /// Requests in insertion order.
    pub fn entries(&self) -> &[BurstEntry] {
        &self.entries
    }

    /// Byte offset of an entry inside the block, once allocated.
    pub fn offset(&self, index: BurstIndex) -> Option<usize> {
        self.entries.get(index.0).and_then(|entry| entry.offset)
    }

    /// The bytes belonging to one entry.
    pub fn get(&self, index: BurstIndex) -> Option<&[u8]> {
        let (start, end) = self.range(index)?;
        self.block.as_ref().map(|block| &block[start..end])
    }

    /// Mutable access to the bytes belonging to one entry.
    pub fn get_mut(&mut self, index: BurstIndex) -> Option<&mut [u8]> {
        let (start, end) = self.range(index)?;
        self.block.as_mut().map(|block| &mut block[start..end])
    }

    /// The whole allocated block.
    pub fn block(&self) -> Option<&[u8]> {
        self.block.as_deref()
    }

    fn range(&self, index: BurstIndex) -> Option<(usize, usize)> {
        let entry = self.entries.get(index.0)?;
        let start = entry.offset?;
        Some((start, start + entry.size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_follow_insertion_order() {
        let mut burst = BurstAllocator::new();
        let a = burst.add(4, MemoryTag::Engine).unwrap();
        let b = burst.add(8, MemoryTag::Resource).unwrap();
        burst.allocate_all().unwrap();

        assert_eq!(burst.offset(a), Some(0));
        assert_eq!(burst.offset(b), Some(4));
        assert_eq!(burst.total_size(), 12);
    }

    #[test]
    fn entries_are_contiguous_and_disjoint() {
        let mut rng = fastrand::Rng::with_seed(7);
        let mut burst = BurstAllocator::new();
        let sizes: Vec<usize> = (0..50).map(|_| rng.usize(1..100)).collect();
        let indices: Vec<BurstIndex> = sizes
            .iter()
            .map(|&size| burst.add(size, MemoryTag::Unknown).unwrap())
            .collect();
        burst.allocate_all().unwrap();

        assert_eq!(burst.total_size(), sizes.iter().sum::<usize>());
        let mut expected_offset = 0;
        for (index, &size) in indices.iter().zip(&sizes) {
            assert_eq!(burst.offset(*index), Some(expected_offset));
            assert_eq!(burst.get(*index).map(<[u8]>::len), Some(size));
            expected_offset += size;
        }
    }

    #[test]
    fn block_is_zeroed_and_entries_are_writable() {
        let mut burst = BurstAllocator::new();
        let first = burst.add(3, MemoryTag::Unknown).unwrap();
        let second = burst.add(2, MemoryTag::Unknown).unwrap();
        burst.allocate_all().unwrap();
        assert!(burst.block().unwrap().iter().all(|&byte| byte == 0));

        burst.get_mut(first).unwrap().copy_from_slice(&[1, 2, 3]);
        burst.get_mut(second).unwrap().copy_from_slice(&[4, 5]);
        assert_eq!(burst.block().unwrap(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn entries_are_frozen_once_allocated() {
        let mut burst = BurstAllocator::new();
        burst.add(16, MemoryTag::Unknown).unwrap();
        burst.allocate_all().unwrap();

        assert_eq!(burst.add(4, MemoryTag::Unknown), Err(BurstError::AlreadyAllocated));
        assert_eq!(burst.allocate_all(), Err(BurstError::AlreadyAllocated));
        assert_eq!(burst.len(), 1);
    }

    #[test]
    fn free_all_allows_reuse() {
        let mut burst = BurstAllocator::new();
        burst.add(16, MemoryTag::Unknown).unwrap();
        burst.allocate_all().unwrap();
        burst.free_all();

        assert!(!burst.is_allocated());
        assert!(burst.is_empty());
        assert_eq!(burst.total_size(), 0);

        let index = burst.add(5, MemoryTag::Unknown).unwrap();
        burst.allocate_all().unwrap();
        assert_eq!(burst.offset(index), Some(0));
        assert_eq!(burst.total_size(), 5);
    }

    #[test]
    fn rejects_zero_sizes_and_empty_bursts() {
        let mut burst = BurstAllocator::new();
        assert_eq!(burst.add(0, MemoryTag::Unknown), Err(BurstError::ZeroSized));
        assert_eq!(burst.allocate_all(), Err(BurstError::Empty));
        assert!(!burst.is_allocated());
    }

    #[test]
    fn unallocated_entries_have_no_storage() {
        let mut burst = BurstAllocator::new();
        let index = burst.add(8, MemoryTag::Unknown).unwrap();
        assert_eq!(burst.offset(index), None);
        assert!(burst.get(index).is_none());
    }
}
