//! # Resource Headers
//!
//! A [`Resource`] tracks one GPU-backed object (buffer, texture, pipeline) through its
//! upload lifecycle. Its trailing type-specific fields live in one zeroed block laid out
//! by a [`BurstAllocator`]; backends read and write them as plain-old-data values.
//!
//! ## States
//! ```text
//! Uninitialized ─signal_upload─▶ NeedsUpload ─worker─▶ Uploading ─create_local─▶ Ready | Failed
//! ```
//! `PendingDelete` is reserved for deferred destruction.

use std::sync::{
    atomic::{AtomicU32, AtomicU8, Ordering},
    Arc, Mutex, MutexGuard, PoisonError,
};

use bytemuck::Pod;

use crate::core::{BurstAllocator, BurstIndex};

/// Tag written into every live resource header.
pub const RESOURCE_MAGIC: u32 = 0x5245_5343;

/// Upload lifecycle of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ResourceState {
    /// Allocated, not yet handed to the worker
    Uninitialized = 0,
    /// Queued on the worker
    NeedsUpload,
    /// The worker is running the backend's create callback
    Uploading,
    /// Created on the device
    Ready,
    /// The backend's create callback failed
    Failed,
    /// Reserved for deferred destruction
    PendingDelete,
}

impl ResourceState {
    fn from_u8(value: u8) -> ResourceState {
        match value {
            0 => ResourceState::Uninitialized,
            1 => ResourceState::NeedsUpload,
            2 => ResourceState::Uploading,
            3 => ResourceState::Ready,
            4 => ResourceState::Failed,
            _ => ResourceState::PendingDelete,
        }
    }

    /// Whether the backend has seen the resource and its destroy callback must run.
    pub fn is_terminal(self) -> bool {
        matches!(self, ResourceState::Ready | ResourceState::Failed)
    }
}

/// Which backend capability creates and destroys the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Vertex/index buffers, textures, graphics pipelines
    Graphics,
    /// Storage buffers and compute pipelines
    Compute,
}

/// Identifier the manager assigns to each resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u32);

/// Device-side creation and destruction of resources.
///
/// Called on the resource worker thread (`create_local`) and on the thread that shuts
/// the manager down (`destroy_local`).
pub trait ResourceBackend: Send + Sync {
    /// Creates the device object for `resource`. Returns `false` on failure.
    fn create_local(&self, resource: &Resource) -> bool;

    /// Destroys the device object for `resource`. Called once, for Ready and Failed
    /// resources only.
    fn destroy_local(&self, resource: &Resource);
}

/// The backends the manager dispatches to, one per [`ResourceKind`].
#[derive(Clone)]
pub struct ResourceBackends {
    /// Creates and destroys [`ResourceKind::Graphics`] resources
    pub graphics: Arc<dyn ResourceBackend>,
    /// Creates and destroys [`ResourceKind::Compute`] resources
    pub compute: Arc<dyn ResourceBackend>,
}

impl ResourceBackends {
    /// Uses the same backend for every kind.
    pub fn shared(backend: Arc<dyn ResourceBackend>) -> Self {
        Self {
            graphics: Arc::clone(&backend),
            compute: backend,
        }
    }

    /// The backend responsible for `kind`.
    pub fn for_kind(&self, kind: ResourceKind) -> &dyn ResourceBackend {
        match kind {
            ResourceKind::Graphics => self.graphics.as_ref(),
            ResourceKind::Compute => self.compute.as_ref(),
        }
    }
}

/// Shared handle to a resource. The manager keeps one in its owned list.
pub type ResourceHandle = Arc<Resource>;

/// Header of one GPU-backed resource plus its trailing fields.
pub struct Resource {
    magic: AtomicU32,
    id: ResourceId,
    kind: ResourceKind,
    state: AtomicU8,
    fields: Mutex<BurstAllocator>,
    field_indices: Vec<BurstIndex>,
}

impl Resource {
    pub(super) fn new(
        id: ResourceId,
        kind: ResourceKind,
        fields: BurstAllocator,
        field_indices: Vec<BurstIndex>,
    ) -> Self {
        Self {
            magic: AtomicU32::new(RESOURCE_MAGIC),
            id,
            kind,
            state: AtomicU8::new(ResourceState::Uninitialized as u8),
            fields: Mutex::new(fields),
            field_indices,
        }
    }

    /// Identifier assigned by the manager.
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// Backend capability this resource uses.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ResourceState {
        ResourceState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Whether the header still belongs to a live manager.
    pub fn is_valid(&self) -> bool {
        self.magic.load(Ordering::Acquire) == RESOURCE_MAGIC
    }

    /// Number of trailing fields.
    pub fn field_count(&self) -> usize {
        self.field_indices.len()
    }

    /// Size in bytes of one trailing field.
    pub fn field_size(&self, field: usize) -> Option<usize> {
        let index = *self.field_indices.get(field)?;
        self.lock_fields().get(index).map(<[u8]>::len)
    }

    /// Runs `f` with read access to a field's bytes.
    pub fn with_field<R>(&self, field: usize, f: impl FnOnce(&[u8]) -> R) -> Option<R> {
        let index = *self.field_indices.get(field)?;
        let fields = self.lock_fields();
        fields.get(index).map(f)
    }

    /// Runs `f` with write access to a field's bytes.
    pub fn with_field_mut<R>(&self, field: usize, f: impl FnOnce(&mut [u8]) -> R) -> Option<R> {
        let index = *self.field_indices.get(field)?;
        let mut fields = self.lock_fields();
        fields.get_mut(index).map(f)
    }

    /// Reads a field as a plain-old-data value. `None` if the field does not exist or
    /// its size differs from `T`.
    pub fn read_field<T: Pod>(&self, field: usize) -> Option<T> {
        self.with_field(field, |bytes| bytemuck::try_pod_read_unaligned(bytes).ok())
            .flatten()
    }

    /// Writes a plain-old-data value into a field. Returns `false` if the field does not
    /// exist or its size differs from `T`.
    pub fn write_field<T: Pod>(&self, field: usize, value: &T) -> bool {
        self.with_field_mut(field, |bytes| {
            let source = bytemuck::bytes_of(value);
            if source.len() != bytes.len() {
                return false;
            }
            bytes.copy_from_slice(source);
            true
        })
        .unwrap_or(false)
    }

    pub(super) fn set_state(&self, state: ResourceState) {
        self.state.store(state as u8, Ordering::Release);
    }

    pub(super) fn transition(&self, from: ResourceState, to: ResourceState) -> Result<(), ResourceState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(ResourceState::from_u8)
    }

    /// Clears the magic tag and frees the trailing fields.
    pub(super) fn release(&self) {
        self.magic.store(0, Ordering::Release);
        self.lock_fields().free_all();
    }

    fn lock_fields(&self) -> MutexGuard<'_, BurstAllocator> {
        self.fields.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resource")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("state", &self.state())
            .field("valid", &self.is_valid())
            .field("fields", &self.field_indices.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::MemoryTag;

    fn resource_with_fields(sizes: &[usize]) -> Resource {
        let mut burst = BurstAllocator::new();
        let indices = sizes
            .iter()
            .map(|&size| burst.add(size, MemoryTag::Resource).unwrap())
            .collect();
        burst.allocate_all().unwrap();
        Resource::new(ResourceId(1), ResourceKind::Graphics, burst, indices)
    }

    #[test]
    fn fields_read_back_what_was_written() {
        let resource = resource_with_fields(&[4, 16]);
        assert_eq!(resource.field_count(), 2);
        assert_eq!(resource.read_field::<u32>(0), Some(0));

        assert!(resource.write_field(0, &0xDEAD_BEEFu32));
        assert!(resource.write_field(1, &[1.0f32, 2.0, 3.0, 4.0]));
        assert_eq!(resource.read_field::<u32>(0), Some(0xDEAD_BEEF));
        assert_eq!(resource.read_field::<[f32; 4]>(1), Some([1.0, 2.0, 3.0, 4.0]));
    }

    #[test]
    fn mismatched_field_sizes_are_rejected() {
        let resource = resource_with_fields(&[4]);
        assert!(!resource.write_field(0, &1u64));
        assert_eq!(resource.read_field::<u64>(0), None);
        assert_eq!(resource.read_field::<u32>(3), None);
        assert_eq!(resource.field_size(0), Some(4));
    }

    #[test]
    fn transitions_only_from_the_expected_state() {
        let resource = resource_with_fields(&[4]);
        assert_eq!(resource.state(), ResourceState::Uninitialized);
        resource
            .transition(ResourceState::Uninitialized, ResourceState::NeedsUpload)
            .unwrap();
        assert_eq!(
            resource.transition(ResourceState::Uninitialized, ResourceState::NeedsUpload),
            Err(ResourceState::NeedsUpload)
        );
    }

    #[test]
    fn release_invalidates_the_header() {
        let resource = resource_with_fields(&[8]);
        assert!(resource.is_valid());
        resource.release();
        assert!(!resource.is_valid());
        assert_eq!(resource.field_size(0), None);
    }

    #[test]
    fn only_ready_and_failed_are_terminal() {
        assert!(ResourceState::Ready.is_terminal());
        assert!(ResourceState::Failed.is_terminal());
        assert!(!ResourceState::Uninitialized.is_terminal());
        assert!(!ResourceState::Uploading.is_terminal());
    }
}
