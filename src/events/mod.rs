//! Typed event delivery between the session core and UI layers.
//!
//! The bus decouples SessionManager and ProfileStore from whatever renders
//! them. Publishing is safe from session I/O threads; a single-threaded UI
//! loop consumes events through a channel subscription. Delivery per
//! publisher is totally ordered because publish holds the subscriber list
//! lock, so events for one session arrive in the order they occurred.
//!
//! The ordering guarantee cuts both ways: publishers may hold their own
//! internal locks while calling `publish`, so callback subscribers run with
//! those locks held and must never call back into SessionManager or
//! ProfileStore. A consumer that needs to query state on an event uses a
//! channel subscription and reacts from its own thread.

use crate::log_warn;
use crate::manager::SessionState;
use crate::profile::ProfileId;
use crate::session::SessionId;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Mutex;
use std::sync::mpsc::{self, Receiver, Sender};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileChangeKind {
    Added,
    Updated,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    SessionStateChanged { session: SessionId, state: SessionState },
    DataAvailable { session: SessionId },
    ProfileChanged { profile: ProfileId, kind: ProfileChangeKind },
}

enum Subscriber {
    Channel(Sender<Event>),
    Callback(Box<dyn Fn(&Event) + Send>),
}

#[derive(Default)]
pub struct EventBus {
    subscribers: Mutex<Vec<Subscriber>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe with a channel. The receiver sees every event published
    /// after this call; dropping it unsubscribes on the next publish.
    pub fn subscribe(&self) -> Receiver<Event> {
        let (tx, rx) = mpsc::channel();
        self.lock_subscribers().push(Subscriber::Channel(tx));
        rx
    }

    /// Subscribe with a callback invoked on the publishing thread.
    ///
    /// The callback runs while the publisher's internal locks may be held
    /// (SessionManager publishes under its session-table mutex). It must
    /// return quickly and must not call back into the publishing component,
    /// or it deadlocks. Use [`subscribe`](Self::subscribe) when the handler
    /// needs to query session or profile state.
    pub fn subscribe_fn<F>(&self, callback: F)
    where
        F: Fn(&Event) + Send + 'static,
    {
        self.lock_subscribers().push(Subscriber::Callback(Box::new(callback)));
    }

    /// Deliver an event to every live subscriber. A panicking callback is
    /// contained and must not stop delivery to the rest.
    pub fn publish(&self, event: Event) {
        let mut subscribers = self.lock_subscribers();
        subscribers.retain(|subscriber| match subscriber {
            Subscriber::Channel(tx) => tx.send(event.clone()).is_ok(),
            Subscriber::Callback(callback) => {
                if catch_unwind(AssertUnwindSafe(|| callback(&event))).is_err() {
                    log_warn!("Event subscriber panicked while handling {:?}", event);
                }
                true
            }
        });
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock_subscribers().len()
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        match self.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[cfg(test)]
#[path = "../test/events.rs"]
mod tests;
