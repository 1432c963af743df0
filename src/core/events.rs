//! # Event Dispatcher
//!
//! A small synchronous publish/subscribe table. Each [`EventCode`] owns an ordered list
//! of listeners; firing a code calls its listeners in registration order until one of
//! them reports the event as handled.
//!
//! The engine uses it to carry the application-quit signal into the resource worker and
//! the frame ring without either of them depending on the code that decides to quit.
//!
//! Listeners run on the thread that fires the event, while the dispatcher is borrowed.
//! A listener must not register or unregister listeners on the same dispatcher.

use log::{trace, warn};

/// Identifies a listener (or the sender of an event).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(pub u64);

/// Every event the dispatcher knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum EventCode {
    /// The application is shutting down
    ApplicationQuit = 0,
    /// Application-defined event, usually carrying [`EventContext::Raw`]
    Custom,
}

impl EventCode {
    /// Number of event codes; the size of the dispatch table.
    pub const COUNT: usize = 2;

    /// Every code, in table order.
    pub const ALL: [EventCode; Self::COUNT] = [EventCode::ApplicationQuit, EventCode::Custom];

    fn slot(self) -> usize {
        self as usize
    }
}

/// Data carried alongside an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventContext {
    /// No payload
    #[default]
    Empty,
    /// Sixteen bytes of caller-defined data
    Raw([u64; 2]),
}

/// Callback invoked when an event fires. Returns `true` to mark the event handled,
/// which stops delivery to later listeners.
pub type EventCallback = Box<dyn Fn(EventCode, ListenerId, &EventContext) -> bool + Send + Sync>;

struct Registration {
    listener: ListenerId,
    callback: EventCallback,
}

/// Table of listeners keyed by [`EventCode`].
pub struct EventDispatcher {
    table: Vec<Vec<Registration>>,
}

impl EventDispatcher {
    /// Creates a dispatcher with no listeners.
    pub fn new() -> Self {
        Self {
            table: (0..EventCode::COUNT).map(|_| Vec::new()).collect(),
        }
    }

    /// Adds `callback` for `code` on behalf of `listener`.
    ///
    /// Returns `false` (and logs) if `listener` is already registered for `code`;
    /// the existing registration is kept.
    pub fn register(&mut self, code: EventCode, listener: ListenerId, callback: EventCallback) -> bool {
        let listeners = &mut self.table[code.slot()];
        if listeners.iter().any(|registration| registration.listener == listener) {
            warn!("Listener {listener:?} is already registered for {code:?}");
            return false;
        }

        listeners.push(Registration { listener, callback });
        true
    }

    /// Removes `listener` from `code`.
    ///
    /// Returns `false` (and logs) if `listener` was not registered for `code`.
    pub fn unregister(&mut self, code: EventCode, listener: ListenerId) -> bool {
        let listeners = &mut self.table[code.slot()];
        match listeners
            .iter()
            .position(|registration| registration.listener == listener)
        {
            Some(position) => {
                listeners.remove(position);
                true
            }
            None => {
                warn!("Listener {listener:?} is not registered for {code:?}");
                false
            }
        }
    }

    /// Delivers an event to the listeners of `code`, in registration order.
    ///
    /// Returns `true` if a listener handled the event.
    pub fn fire(&self, code: EventCode, sender: ListenerId, context: &EventContext) -> bool {
        trace!("Firing {code:?} from {sender:?}");
        self.table[code.slot()]
            .iter()
            .any(|registration| (registration.callback)(code, sender, context))
    }

    /// Number of listeners registered for `code`.
    pub fn listener_count(&self, code: EventCode) -> usize {
        self.table[code.slot()].len()
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
