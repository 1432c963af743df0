//! # Resource Lifecycle Manager
//!
//! Owns every [`Resource`] the engine allocates and drives each one through its upload
//! lifecycle on a dedicated [`Worker`], so device creation never runs on the thread that
//! records frames.
//!
//! ## Resource Lifecycle
//! 1. `allocate_resource()` creates a zeroed header and trailing fields (`Uninitialized`)
//! 2. the caller fills the fields, then calls `signal_upload()` (`NeedsUpload`)
//! 3. the worker runs the kind's `create_local` callback (`Uploading` → `Ready` | `Failed`)
//! 4. `flush_uploads()` blocks until every signaled upload has finished
//! 5. `shutdown()` stops the worker, runs `destroy_local` for Ready and Failed resources,
//!    and frees every header
//!
//! A resource is uploaded at most once. Failed uploads are not retried; the resource
//! stays inert until shutdown destroys it.

pub mod resource;

use std::sync::Arc;

use log::{debug, error, info, trace, warn};
use thiserror::Error;

use crate::core::{BurstAllocator, BurstError, EngineContext, MemoryTag};

use super::task_management::{Worker, WorkerError, WorkerHandle};

pub use resource::{
    Resource, ResourceBackend, ResourceBackends, ResourceHandle, ResourceId, ResourceKind,
    ResourceState, RESOURCE_MAGIC,
};

/// Errors reported by the [`ResourceManager`].
#[derive(Debug, Error)]
pub enum ResourceError {
    /// A resource with no trailing fields, or a zero-sized field, was requested.
    #[error("resource layout is empty or contains a zero-sized field")]
    EmptyLayout,
    /// The header's magic tag does not match; it was freed or never belonged to a manager.
    #[error("resource {0:?} is not a live resource header")]
    InvalidResource(ResourceId),
    /// `signal_upload` was called on a resource that is not `Uninitialized`.
    #[error("resource {id:?} cannot be uploaded from state {state:?}")]
    AlreadySignaled {
        /// The resource
        id: ResourceId,
        /// Its state at the time of the call
        state: ResourceState,
    },
    /// The manager has been shut down.
    #[error("resource manager is shut down")]
    ShutDown,
    /// Laying out the trailing fields failed.
    #[error(transparent)]
    Layout(#[from] BurstError),
    /// The upload worker refused the request or could not start.
    #[error(transparent)]
    Worker(#[from] WorkerError),
}

/// Counts reported by [`ResourceManager::shutdown`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ShutdownSummary {
    /// Resources whose destroy callback ran
    pub destroyed: usize,
    /// Of those, how many were Ready
    pub ready: usize,
    /// Of those, how many were Failed
    pub failed: usize,
    /// Resources that never reached Ready or Failed
    pub unfinished: usize,
}

/// Allocates resources and performs their uploads on a dedicated worker.
pub struct ResourceManager {
    worker: Worker<ResourceHandle>,
    backends: ResourceBackends,
    resources: Vec<ResourceHandle>,
    next_id: u32,
    is_shut_down: bool,
}

impl ResourceManager {
    /// Starts the upload worker.
    ///
    /// # Arguments
    /// * `worker_name` - Name of the upload thread
    /// * `context` - Context whose quit event drains the upload worker
    /// * `backends` - Create/destroy callbacks per resource kind
    pub fn new(
        worker_name: &str,
        context: &EngineContext,
        backends: ResourceBackends,
    ) -> Result<Self, ResourceError> {
        let upload_backends = backends.clone();
        let worker = Worker::start(
            worker_name,
            context,
            move |_: &WorkerHandle<ResourceHandle>, resource: ResourceHandle| {
                upload_resource(&upload_backends, &resource);
            },
        )?;

        Ok(Self {
            worker,
            backends,
            resources: Vec::new(),
            next_id: 1,
            is_shut_down: false,
        })
    }

    /// Allocates a resource with one zeroed trailing field of `size` bytes.
    pub fn allocate_resource(
        &mut self,
        kind: ResourceKind,
        size: usize,
    ) -> Result<ResourceHandle, ResourceError> {
        self.allocate_resource_with_layout(kind, &[(size, MemoryTag::Resource)])
    }

    /// Allocates a resource whose trailing fields are laid out, in order, in one
    /// zeroed block. Field `n` is addressed by index `n`.
    pub fn allocate_resource_with_layout(
        &mut self,
        kind: ResourceKind,
        layout: &[(usize, MemoryTag)],
    ) -> Result<ResourceHandle, ResourceError> {
        if self.is_shut_down {
            warn!("Rejected resource allocation after shutdown");
            return Err(ResourceError::ShutDown);
        }
        if layout.is_empty() || layout.iter().any(|&(size, _)| size == 0) {
            warn!("Rejected resource allocation with layout {layout:?}");
            return Err(ResourceError::EmptyLayout);
        }

        let mut fields = BurstAllocator::new();
        let indices = layout
            .iter()
            .map(|&(size, tag)| fields.add(size, tag))
            .collect::<Result<Vec<_>, _>>()?;
        fields.allocate_all()?;

        let id = ResourceId(self.next_id);
        self.next_id += 1;
        let resource = Arc::new(Resource::new(id, kind, fields, indices));
        self.resources.push(Arc::clone(&resource));
        trace!("Allocated {kind:?} resource {id:?} ({} fields)", layout.len());
        Ok(resource)
    }

    /// Queues a resource for upload on the worker.
    ///
    /// # Errors
    /// - [`ResourceError::InvalidResource`] if the header is not live
    /// - [`ResourceError::AlreadySignaled`] if the resource is not `Uninitialized`
    /// - [`ResourceError::Worker`] if the worker no longer accepts work
    pub fn signal_upload(&self, resource: &ResourceHandle) -> Result<(), ResourceError> {
        if !resource.is_valid() {
            warn!("Upload signaled for invalid resource {:?}", resource.id());
            return Err(ResourceError::InvalidResource(resource.id()));
        }
        if let Err(state) =
            resource.transition(ResourceState::Uninitialized, ResourceState::NeedsUpload)
        {
            warn!(
                "Upload signaled twice for resource {:?} (state {state:?})",
                resource.id()
            );
            return Err(ResourceError::AlreadySignaled {
                id: resource.id(),
                state,
            });
        }

        if let Err(err) = self.worker.push(Arc::clone(resource)) {
            resource.set_state(ResourceState::Uninitialized);
            return Err(err.into());
        }
        Ok(())
    }

    /// Blocks until every signaled upload has finished.
    pub fn flush_uploads(&self) -> Result<(), ResourceError> {
        self.worker.wait_until_idle()?;
        Ok(())
    }

    /// Stops the worker, destroys every Ready or Failed resource, and frees all headers.
    ///
    /// Calling it a second time returns an empty summary.
    pub fn shutdown(&mut self) -> ShutdownSummary {
        if self.is_shut_down {
            return ShutdownSummary::default();
        }
        self.is_shut_down = true;

        if let Err(err) = self.worker.wait_until_idle() {
            error!("Could not wait for pending uploads: {err}");
        }
        self.worker.stop();
        debug_assert!(self.worker.is_stopped());

        let mut summary = ShutdownSummary::default();
        for resource in self.resources.drain(..) {
            let state = resource.state();
            match state {
                ResourceState::Ready | ResourceState::Failed => {
                    self.backends
                        .for_kind(resource.kind())
                        .destroy_local(&resource);
                    summary.destroyed += 1;
                    if state == ResourceState::Ready {
                        summary.ready += 1;
                    } else {
                        summary.failed += 1;
                    }
                }
                _ => {
                    error!(
                        "Resource {:?} is {state:?} at shutdown; it was never uploaded",
                        resource.id()
                    );
                    summary.unfinished += 1;
                }
            }
            resource.release();
        }

        info!(
            "Resource manager shut down: {} destroyed ({} ready, {} failed), {} unfinished",
            summary.destroyed, summary.ready, summary.failed, summary.unfinished
        );
        debug_assert_eq!(
            summary.unfinished, 0,
            "resources must be signaled and flushed before shutdown"
        );
        summary
    }

    /// Resources currently owned by the manager.
    pub fn resources(&self) -> &[ResourceHandle] {
        &self.resources
    }

    /// Number of resources currently owned by the manager.
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` if the manager owns no resources.
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Returns `true` once `shutdown` has run.
    pub fn is_shut_down(&self) -> bool {
        self.is_shut_down
    }
}

impl Drop for ResourceManager {
    fn drop(&mut self) {
        if !self.is_shut_down {
            self.shutdown();
        }
    }
}

/// Runs on the upload worker for every signaled resource.
fn upload_resource(backends: &ResourceBackends, resource: &Resource) {
    if !resource.is_valid() {
        error!("Upload worker received invalid resource {:?}", resource.id());
        return;
    }
    if let Err(state) = resource.transition(ResourceState::NeedsUpload, ResourceState::Uploading) {
        error!(
            "Upload worker received resource {:?} in state {state:?}",
            resource.id()
        );
        return;
    }

    let created = backends.for_kind(resource.kind()).create_local(resource);
    let state = if created {
        ResourceState::Ready
    } else {
        ResourceState::Failed
    };
    resource.set_state(state);

    if created {
        debug!("Resource {:?} uploaded", resource.id());
    } else {
        warn!("Resource {:?} failed to upload", resource.id());
    }
}
