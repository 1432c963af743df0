//! # Core Module
//!
//! Memory and coordination primitives shared by every engine subsystem.
//!
//! ## Key Components
//! - `Arena`: growable bump buffer of size-prefixed records, reset between frames
//! - `BurstAllocator`: resolves many sized requests with one allocation
//! - `MemoryTag`: names the subsystem that owns an allocation
//! - `MtResource`: thread-safe, reference-counted value with read-write locking
//! - `EventDispatcher`: synchronous publish/subscribe table
//! - `EngineContext`: explicitly owned context handing the dispatcher to subsystems
//!
//! ## Usage
//! ```rust
//! use voxel_engine_core::core::{Arena, BurstAllocator, MemoryTag};
//!
//! let mut arena = Arena::new(MemoryTag::CommandBuffer);
//! arena.push(16, None).unwrap();
//! assert_eq!(arena.used_size(), Arena::record_size(16));
//!
//! let mut burst = BurstAllocator::new();
//! let index = burst.add(32, MemoryTag::Resource).unwrap();
//! burst.allocate_all().unwrap();
//! assert_eq!(burst.get(index).unwrap().len(), 32);
//! ```

pub mod arena;
pub mod burst;
pub mod context;
pub mod events;
pub mod memory;
pub mod mt_resource;

// Re-export types for easier access
pub use arena::{Arena, ArenaError};
pub use burst::{BurstAllocator, BurstError, BurstIndex};
pub use context::EngineContext;
pub use events::{EventCode, EventContext, EventDispatcher, ListenerId};
pub use memory::MemoryTag;
pub use mt_resource::MtResource;
