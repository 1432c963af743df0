//! # Worker State and Task Functions
//!
//! This module defines the two building blocks the worker loop is made of:
//! - `TaskFn`: the function a worker runs for every queued item
//! - `WorkerState`: the named states of the worker loop and the predicates that decide
//!   when the loop sleeps and when it exits
//!
//! ## State Transitions
//! ```text
//! Running ──quit(drain)──▶ Draining ──queue empty──▶ Stopped
//!    │                        │
//!    └──quit(discard)──▶ Discarding ◀──quit(discard)─┘
//!                             └──next wake──▶ Stopped
//! ```

use super::WorkerHandle;

/// A function run on the worker thread for every item popped from the queue.
///
/// The handle lets a task push follow-up work onto the same worker.
///
/// Implemented for every `FnMut(&WorkerHandle<T>, T) + Send + 'static`, so a closure
/// capturing the task argument is the usual way to provide one.
pub trait TaskFn<T: Send + 'static>: Send + 'static {
    /// Processes one item.
    fn run(&mut self, worker: &WorkerHandle<T>, item: T);
}

impl<T, F> TaskFn<T> for F
where
    T: Send + 'static,
    F: FnMut(&WorkerHandle<T>, T) + Send + 'static,
{
    fn run(&mut self, worker: &WorkerHandle<T>, item: T) {
        self(worker, item)
    }
}

/// Where the worker loop is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WorkerState {
    /// Accepting pushes and processing items
    Running,
    /// Finishing the queued items, then stopping; pushes are rejected
    Draining,
    /// Stopping at the next wake; queued items are dropped
    Discarding,
    /// The worker thread has exited
    Stopped,
}

impl WorkerState {
    /// Whether new items may be pushed.
    pub fn accepts_pushes(self) -> bool {
        self == WorkerState::Running
    }

    /// Whether the loop should keep sleeping on the condition variable.
    pub fn should_wait(self, queue_empty: bool, suspended: bool) -> bool {
        match self {
            WorkerState::Running => queue_empty || suspended,
            WorkerState::Draining => !queue_empty && suspended,
            WorkerState::Discarding | WorkerState::Stopped => false,
        }
    }

    /// Whether the loop should exit instead of taking the next item.
    pub fn should_exit(self, queue_empty: bool) -> bool {
        match self {
            WorkerState::Running => false,
            WorkerState::Draining => queue_empty,
            WorkerState::Discarding | WorkerState::Stopped => true,
        }
    }

    /// The state after a quit request. Draining never overrides a discard.
    pub fn after_quit(self, drain: bool) -> WorkerState {
        match (self, drain) {
            (WorkerState::Running, true) => WorkerState::Draining,
            (WorkerState::Running | WorkerState::Draining, false) => WorkerState::Discarding,
            (state, _) => state,
        }
    }
}
