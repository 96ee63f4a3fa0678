//
// events.rs
//
// Typed publish/subscribe channels for workspace lifecycle and watcher events
//

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::dispose::Disposable;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;
type ListenerList<T> = Arc<Mutex<Vec<(u64, Listener<T>)>>>;

/// A typed event channel with ordered, at-least-once delivery.
///
/// Listeners are invoked in subscription order every time [`Emitter::fire`]
/// is called. There is no replay: a listener only sees events fired after it
/// subscribed. Dropping or disposing the returned [`EventSubscription`]
/// detaches the listener.
pub struct Emitter<T> {
    listeners: ListenerList<T>,
    next_id: AtomicU64,
}

impl<T> Default for Emitter<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Emitter<T> {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(0),
        }
    }

    /// Register a listener. The subscription must be kept alive (or added to
    /// a store) for the listener to stay registered.
    pub fn subscribe(&self, listener: impl Fn(&T) + Send + Sync + 'static) -> EventSubscription
    where
        T: 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut guard) = self.listeners.lock() {
            guard.push((id, Arc::new(listener)));
        }
        let weak: Weak<Mutex<Vec<(u64, Listener<T>)>>> = Arc::downgrade(&self.listeners);
        EventSubscription {
            remove: Some(Box::new(move || {
                if let Some(list) = weak.upgrade() {
                    if let Ok(mut guard) = list.lock() {
                        guard.retain(|(lid, _)| *lid != id);
                    }
                }
            })),
        }
    }

    /// Deliver `value` to every registered listener, in subscription order.
    ///
    /// Listeners run outside the internal lock so they may subscribe or
    /// dispose other subscriptions without deadlocking.
    pub fn fire(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = match self.listeners.lock() {
            Ok(guard) => guard.iter().map(|(_, l)| l.clone()).collect(),
            Err(_) => return,
        };
        for listener in snapshot {
            listener(value);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().map(|g| g.len()).unwrap_or(0)
    }
}

/// Handle detaching a listener from its [`Emitter`] when disposed.
pub struct EventSubscription {
    remove: Option<Box<dyn FnOnce() + Send>>,
}

impl Disposable for EventSubscription {
    fn dispose(&mut self) -> anyhow::Result<()> {
        if let Some(remove) = self.remove.take() {
            remove();
        }
        Ok(())
    }
}
