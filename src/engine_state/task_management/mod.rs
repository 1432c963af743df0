//! # Task Management System
//!
//! This module provides the engine's dedicated worker: one named thread draining a
//! blocking FIFO queue. It is how work that must not stall the producer thread (resource
//! uploads) gets serialized onto a thread of its own.
//!
//! ## Architecture Overview
//!
//! - `Worker`: owns the thread and its quit subscription; stops and joins on drop
//! - `WorkerHandle`: cloneable handle for pushing items and waiting, usable from any thread
//! - `TaskFn`: the function invoked for each item, on the worker thread
//! - `WorkerState`: named loop states (Running, Draining, Discarding, Stopped)
//!
//! ## Worker Loop
//! 1. Lock the queue and sleep on the condition variable while there is nothing to do
//! 2. Exit if the state says so (draining with an empty queue, or discarding)
//! 3. Pop the front item, mark it in flight, unlock
//! 4. Run the task function without holding the lock
//! 5. Re-lock, clear the in-flight mark, and wake idle waiters if the queue is empty
//!
//! At most one item is ever in flight, items are processed in push order, and the queue
//! is only touched with the lock held.
//!
//! ## Shutdown
//! - `quit(true)` finishes every queued item first (drain)
//! - `quit(false)` exits at the next wake and drops whatever is still queued
//! - `stop()` drains, joins the thread, and drops the quit subscription
//!
//! The worker subscribes to `EventCode::ApplicationQuit` on the context it was started
//! with and begins draining when that event fires.
//!
//! There is no per-task timeout: a task that never returns stalls the worker and every
//! caller of `wait_until_idle`.
//!
//! ## Example Usage
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use voxel_engine_core::core::EngineContext;
//! use voxel_engine_core::engine_state::task_management::{Worker, WorkerHandle};
//!
//! let context = EngineContext::new();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//! let mut worker = Worker::start("example", &context, move |_: &WorkerHandle<u32>, item: u32| {
//!     sink.lock().unwrap().push(item);
//! })
//! .unwrap();
//!
//! for item in 0..4 {
//!     worker.push(item).unwrap();
//! }
//! worker.wait_until_idle().unwrap();
//! assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
//! worker.stop();
//! ```

pub mod task;

use std::{
    collections::VecDeque,
    io,
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Condvar, Mutex, MutexGuard, OnceLock, PoisonError},
    thread::{self, JoinHandle, ThreadId},
};

use log::{debug, error, info, warn};
use thiserror::Error;

use crate::core::{EngineContext, EventCode, ListenerId};

pub use task::{TaskFn, WorkerState};

/// Errors reported by the worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The worker is quitting or stopped and no longer accepts items.
    #[error("worker is {state:?} and no longer accepts items")]
    NotAccepting {
        /// State at the time of the push
        state: WorkerState,
    },
    /// `wait_until_idle` was called from the worker's own thread.
    #[error("cannot wait for the worker to go idle from its own thread")]
    CalledFromWorker,
    /// The operating system refused to create the worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
}

struct WorkerQueue<T> {
    items: VecDeque<T>,
    state: WorkerState,
    suspended: bool,
    in_flight: bool,
    processed: u64,
}

impl<T> WorkerQueue<T> {
    fn is_idle(&self) -> bool {
        self.items.is_empty() && !self.in_flight
    }
}

struct WorkerShared<T> {
    name: String,
    queue: Mutex<WorkerQueue<T>>,
    condvar: Condvar,
    thread_id: OnceLock<ThreadId>,
}

impl<T> WorkerShared<T> {
    fn lock(&self) -> MutexGuard<'_, WorkerQueue<T>> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait<'a>(&self, guard: MutexGuard<'a, WorkerQueue<T>>) -> MutexGuard<'a, WorkerQueue<T>> {
        self.condvar.wait(guard).unwrap_or_else(PoisonError::into_inner)
    }
}

/// Cloneable handle to a running worker.
pub struct WorkerHandle<T> {
    shared: Arc<WorkerShared<T>>,
}

impl<T> Clone for WorkerHandle<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Send + 'static> WorkerHandle<T> {
    /// Appends an item to the queue and wakes the worker.
    ///
    /// # Errors
    /// [`WorkerError::NotAccepting`] once the worker has been told to quit.
    pub fn push(&self, item: T) -> Result<(), WorkerError> {
        let mut queue = self.shared.lock();
        if !queue.state.accepts_pushes() {
            warn!(
                "Worker '{}' rejected an item while {:?}",
                self.shared.name, queue.state
            );
            return Err(WorkerError::NotAccepting { state: queue.state });
        }

        queue.items.push_back(item);
        self.shared.condvar.notify_all();
        Ok(())
    }

    /// Blocks until every pushed item has finished processing, or the worker stops.
    ///
    /// # Errors
    /// [`WorkerError::CalledFromWorker`] when called from inside a task, where waiting
    /// would never finish.
    pub fn wait_until_idle(&self) -> Result<(), WorkerError> {
        if self.shared.thread_id.get() == Some(&thread::current().id()) {
            warn!(
                "Worker '{}' was asked to wait for itself to go idle",
                self.shared.name
            );
            return Err(WorkerError::CalledFromWorker);
        }

        let mut queue = self.shared.lock();
        while !queue.is_idle() && queue.state != WorkerState::Stopped {
            queue = self.shared.wait(queue);
        }
        Ok(())
    }

    /// Tells the worker to stop. With `drain` the queued items are processed first;
    /// without it they are dropped at the next wake.
    pub fn quit(&self, drain: bool) {
        let mut queue = self.shared.lock();
        let next = queue.state.after_quit(drain);
        if next != queue.state {
            debug!(
                "Worker '{}' {:?} -> {:?} ({} queued)",
                self.shared.name,
                queue.state,
                next,
                queue.items.len()
            );
            queue.state = next;
        }
        self.shared.condvar.notify_all();
    }

    /// Stops the worker from taking new items. Pushes are still accepted.
    pub fn suspend(&self) {
        self.shared.lock().suspended = true;
    }

    /// Lets a suspended worker continue.
    pub fn resume(&self) {
        self.shared.lock().suspended = false;
        self.shared.condvar.notify_all();
    }

    /// Current loop state.
    pub fn state(&self) -> WorkerState {
        self.shared.lock().state
    }

    /// Number of items waiting in the queue, not counting one in flight.
    pub fn queue_len(&self) -> usize {
        self.shared.lock().items.len()
    }

    /// Number of items the task function has finished.
    pub fn processed(&self) -> u64 {
        self.shared.lock().processed
    }

    /// Name the worker thread was given.
    pub fn name(&self) -> &str {
        &self.shared.name
    }
}

/// A dedicated thread draining a FIFO queue of `T`.
///
/// The item type fixes the queue stride: every pushed item has exactly the layout the
/// queue was created for.
pub struct Worker<T: Send + 'static> {
    handle: WorkerHandle<T>,
    thread: Option<JoinHandle<()>>,
    quit_listener: Option<(EngineContext, ListenerId)>,
}

impl<T: Send + 'static> Worker<T> {
    /// Spawns the worker thread and subscribes it to the context's quit event.
    ///
    /// # Arguments
    /// * `name` - Thread name, also used in log messages
    /// * `context` - Context whose `ApplicationQuit` event makes the worker drain
    /// * `task` - Function run for each item on the worker thread
    ///
    /// # Errors
    /// [`WorkerError::Spawn`] if the thread could not be created.
    pub fn start<F: TaskFn<T>>(
        name: impl Into<String>,
        context: &EngineContext,
        task: F,
    ) -> Result<Self, WorkerError> {
        let name = name.into();
        let handle = WorkerHandle {
            shared: Arc::new(WorkerShared {
                name: name.clone(),
                queue: Mutex::new(WorkerQueue {
                    items: VecDeque::new(),
                    state: WorkerState::Running,
                    suspended: false,
                    in_flight: false,
                    processed: 0,
                }),
                condvar: Condvar::new(),
                thread_id: OnceLock::new(),
            }),
        };

        let loop_handle = handle.clone();
        let thread = thread::Builder::new()
            .name(name.clone())
            .spawn(move || run_worker_loop(loop_handle, task))?;

        let quit_handle = handle.clone();
        let listener = context.subscribe(
            EventCode::ApplicationQuit,
            Box::new(move |_, _, _| {
                quit_handle.quit(true);
                false
            }),
        );

        info!("Worker '{name}' started");
        Ok(Self {
            handle,
            thread: Some(thread),
            quit_listener: Some((context.clone(), listener)),
        })
    }

    /// A cloneable handle for pushing from other threads.
    pub fn handle(&self) -> WorkerHandle<T> {
        self.handle.clone()
    }

    /// See [`WorkerHandle::push`].
    pub fn push(&self, item: T) -> Result<(), WorkerError> {
        self.handle.push(item)
    }

    /// See [`WorkerHandle::wait_until_idle`].
    pub fn wait_until_idle(&self) -> Result<(), WorkerError> {
        self.handle.wait_until_idle()
    }

    /// See [`WorkerHandle::quit`].
    pub fn quit(&self, drain: bool) {
        self.handle.quit(drain)
    }

    /// See [`WorkerHandle::suspend`].
    pub fn suspend(&self) {
        self.handle.suspend()
    }

    /// See [`WorkerHandle::resume`].
    pub fn resume(&self) {
        self.handle.resume()
    }

    /// See [`WorkerHandle::state`].
    pub fn state(&self) -> WorkerState {
        self.handle.state()
    }

    /// Returns `true` once the thread has been joined.
    pub fn is_stopped(&self) -> bool {
        self.thread.is_none()
    }

    /// Drains the queue, joins the thread and drops the quit subscription.
    ///
    /// Calling it again is a no-op.
    pub fn stop(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        // A suspended worker would never drain
        self.handle.resume();
        self.handle.quit(true);
        if thread.join().is_err() {
            error!("Worker '{}' thread panicked", self.handle.name());
        }

        if let Some((context, listener)) = self.quit_listener.take() {
            context.unregister(EventCode::ApplicationQuit, listener);
        }
        info!(
            "Worker '{}' stopped after {} items",
            self.handle.name(),
            self.handle.processed()
        );
    }
}

impl<T: Send + 'static> Drop for Worker<T> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run_worker_loop<T: Send + 'static, F: TaskFn<T>>(handle: WorkerHandle<T>, mut task: F) {
    let shared = &handle.shared;
    let _ = shared.thread_id.set(thread::current().id());

    loop {
        let item = {
            let mut queue = shared.lock();
            while queue.state.should_wait(queue.items.is_empty(), queue.suspended) {
                queue = shared.wait(queue);
            }

            if queue.state.should_exit(queue.items.is_empty()) {
                let discarded = queue.items.len();
                queue.items.clear();
                queue.state = WorkerState::Stopped;
                shared.condvar.notify_all();
                if discarded > 0 {
                    warn!("Worker '{}' discarded {discarded} queued items", shared.name);
                }
                break;
            }

            let Some(item) = queue.items.pop_front() else {
                continue;
            };
            queue.in_flight = true;
            item
        };

        if panic::catch_unwind(AssertUnwindSafe(|| task.run(&handle, item))).is_err() {
            error!("Task panicked on worker '{}'", shared.name);
        }

        let mut queue = shared.lock();
        queue.in_flight = false;
        queue.processed += 1;
        if queue.items.is_empty() {
            shared.condvar.notify_all();
        }
    }

    debug!("Worker '{}' loop exited", shared.name);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::EventContext;
    use std::{
        sync::mpsc,
        time::Duration,
    };

    fn collecting_worker(
        context: &EngineContext,
    ) -> (Worker<u32>, Arc<Mutex<Vec<u32>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let worker = Worker::start("test-worker", context, move |_: &WorkerHandle<u32>, item: u32| {
            sink.lock().unwrap().push(item);
        })
        .unwrap();
        (worker, seen)
    }

    #[test]
    fn processes_items_in_push_order() {
        let context = EngineContext::new();
        let (mut worker, seen) = collecting_worker(&context);
        for item in 0..100 {
            worker.push(item).unwrap();
        }
        worker.wait_until_idle().unwrap();

        assert_eq!(*seen.lock().unwrap(), (0..100).collect::<Vec<_>>());
        worker.stop();
        assert_eq!(worker.state(), WorkerState::Stopped);
    }

    #[test]
    fn pushes_from_many_threads_each_run_once() {
        let context = EngineContext::new();
        let (mut worker, seen) = collecting_worker(&context);
        let producers: Vec<_> = (0..4u32)
            .map(|producer| {
                let handle = worker.handle();
                thread::spawn(move || {
                    for item in 0..25 {
                        handle.push(producer * 100 + item).unwrap();
                    }
                })
            })
            .collect();
        for producer in producers {
            producer.join().unwrap();
        }
        worker.wait_until_idle().unwrap();

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 100);
        for producer in 0..4u32 {
            let from_producer: Vec<u32> = seen
                .iter()
                .copied()
                .filter(|item| item / 100 == producer)
                .collect();
            assert_eq!(from_producer, (0..25).map(|item| producer * 100 + item).collect::<Vec<_>>());
        }
        worker.stop();
    }

    #[test]
    fn wait_until_idle_waits_for_running_tasks() {
        let context = EngineContext::new();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let done = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&done);
        let worker = Worker::start("gated", &context, move |_: &WorkerHandle<()>, (): ()| {
            release_rx.recv().unwrap();
            *counter.lock().unwrap() += 1;
        })
        .unwrap();

        for _ in 0..3 {
            worker.push(()).unwrap();
        }

        let (idle_tx, idle_rx) = mpsc::channel();
        let handle = worker.handle();
        let waiter = thread::spawn(move || {
            handle.wait_until_idle().unwrap();
            idle_tx.send(()).unwrap();
        });

        for _ in 0..3 {
            assert!(idle_rx.recv_timeout(Duration::from_millis(50)).is_err());
            release_tx.send(()).unwrap();
        }
        idle_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(*done.lock().unwrap(), 3);
        waiter.join().unwrap();
    }

    #[test]
    fn drain_finishes_queued_items() {
        let context = EngineContext::new();
        let (mut worker, seen) = collecting_worker(&context);
        worker.suspend();
        for item in 0..10 {
            worker.push(item).unwrap();
        }
        worker.stop();

        assert_eq!(seen.lock().unwrap().len(), 10);
        assert!(worker.is_stopped());
    }

    #[test]
    fn wait_until_idle_blocks_while_suspended() {
        let context = EngineContext::new();
        let (mut worker, seen) = collecting_worker(&context);
        worker.suspend();
        for item in 0..5 {
            worker.push(item).unwrap();
        }

        let (idle_tx, idle_rx) = mpsc::channel();
        let handle = worker.handle();
        let waiter = thread::spawn(move || {
            handle.wait_until_idle().unwrap();
            idle_tx.send(()).unwrap();
        });

        assert!(idle_rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(worker.handle().queue_len(), 5);

        worker.resume();
        idle_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(*seen.lock().unwrap(), (0..5).collect::<Vec<_>>());
        waiter.join().unwrap();
        worker.stop();
    }

    #[test]
    fn immediate_quit_discards_queued_items() {
        let context = EngineContext::new();
        let (mut worker, seen) = collecting_worker(&context);
        worker.suspend();
        for item in 0..10 {
            worker.push(item).unwrap();
        }
        worker.quit(false);
        worker.resume();
        worker.stop();

        assert!(seen.lock().unwrap().is_empty());
        assert_eq!(worker.state(), WorkerState::Stopped);
    }

    #[test]
    fn push_after_quit_is_rejected() {
        let context = EngineContext::new();
        let (mut worker, seen) = collecting_worker(&context);
        worker.quit(true);
        assert!(matches!(
            worker.push(1),
            Err(WorkerError::NotAccepting { .. })
        ));
        worker.stop();
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn quit_event_drains_the_worker() {
        let context = EngineContext::new();
        let (mut worker, seen) = collecting_worker(&context);
        worker.push(7).unwrap();

        let sender = context.next_listener_id();
        context.fire(EventCode::ApplicationQuit, sender, &EventContext::Empty);
        assert!(worker.push(8).is_err());

        worker.stop();
        assert_eq!(*seen.lock().unwrap(), vec![7]);
        assert_eq!(
            context.events().read().listener_count(EventCode::ApplicationQuit),
            0
        );
    }

    #[test]
    fn tasks_can_push_follow_up_work() {
        let context = EngineContext::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut worker = Worker::start("chain", &context, move |worker: &WorkerHandle<u32>, item: u32| {
            sink.lock().unwrap().push(item);
            if item < 5 {
                worker.push(item + 1).unwrap();
            }
        })
        .unwrap();

        worker.push(0).unwrap();
        worker.wait_until_idle().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
        worker.stop();
    }

    #[test]
    fn waiting_from_inside_a_task_is_rejected() {
        let context = EngineContext::new();
        let (result_tx, result_rx) = mpsc::channel();
        let worker = Worker::start("self-wait", &context, move |worker: &WorkerHandle<()>, (): ()| {
            let result = worker.wait_until_idle();
            result_tx
                .send(matches!(result, Err(WorkerError::CalledFromWorker)))
                .unwrap();
        })
        .unwrap();

        worker.push(()).unwrap();
        assert!(result_rx.recv_timeout(Duration::from_secs(5)).unwrap());
    }

    #[test]
    fn a_panicking_task_does_not_kill_the_worker() {
        let context = EngineContext::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let mut worker = Worker::start("panicky", &context, move |_: &WorkerHandle<u32>, item: u32| {
            if item == 1 {
                panic!("task failed");
            }
            sink.lock().unwrap().push(item);
        })
        .unwrap();

        for item in 0..3 {
            worker.push(item).unwrap();
        }
        worker.wait_until_idle().unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![0, 2]);
        assert_eq!(worker.handle().processed(), 3);
        worker.stop();
    }
}
