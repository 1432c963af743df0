//! # Engine Context
//!
//! The explicitly constructed, explicitly owned home of engine-wide coordination state.
//! Components that need to hear about application-level events (the resource worker,
//! the engine's frame ring) receive a context when they are built instead of reaching
//! for process-wide globals.
//!
//! A context is cheap to clone; clones share the same dispatcher.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

use log::debug;

use super::{
    events::{EventCallback, EventCode, EventContext, EventDispatcher, ListenerId},
    MtResource,
};

/// Shared coordination state for one engine instance.
#[derive(Clone)]
pub struct EngineContext {
    events: MtResource<EventDispatcher>,
    next_listener: Arc<AtomicU64>,
}

impl EngineContext {
    /// Creates a context with an empty dispatcher.
    pub fn new() -> Self {
        Self {
            events: MtResource::new(EventDispatcher::new()),
            next_listener: Arc::new(AtomicU64::new(1)),
        }
    }

    /// Hands out a listener identity no other component of this context holds.
    pub fn next_listener_id(&self) -> ListenerId {
        ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed))
    }

    /// Registers `callback` under a fresh identity and returns it.
    pub fn subscribe(&self, code: EventCode, callback: EventCallback) -> ListenerId {
        let listener = self.next_listener_id();
        self.events.write().register(code, listener, callback);
        debug!("Listener {listener:?} subscribed to {code:?}");
        listener
    }

    /// Registers `callback` for an identity the caller already owns.
    pub fn register(&self, code: EventCode, listener: ListenerId, callback: EventCallback) -> bool {
        self.events.write().register(code, listener, callback)
    }

    /// Removes a listener. Returns `false` if it was not registered.
    pub fn unregister(&self, code: EventCode, listener: ListenerId) -> bool {
        self.events.write().unregister(code, listener)
    }

    /// Fires an event on the calling thread. Returns `true` if a listener handled it.
    pub fn fire(&self, code: EventCode, sender: ListenerId, context: &EventContext) -> bool {
        self.events.read().fire(code, sender, context)
    }

    /// The shared dispatcher.
    pub fn events(&self) -> &MtResource<EventDispatcher> {
        &self.events
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new()
    }
}
