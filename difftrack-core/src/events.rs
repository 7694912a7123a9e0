//! Typed observer channels.
//!
//! Dispatch is synchronous and in registration order. Listeners are
//! snapshotted before dispatch, so a listener may subscribe or unsubscribe
//! from inside a callback. A panicking listener is logged and skipped; it
//! never unwinds into the emitter.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Listeners<T> {
    next_id: u64,
    entries: Vec<(u64, Listener<T>)>,
}

/// A single typed event channel.
pub struct Emitter<T> {
    channel: &'static str,
    listeners: Arc<Mutex<Listeners<T>>>,
}

impl<T: 'static> Emitter<T> {
    pub fn new(channel: &'static str) -> Self {
        Self {
            channel,
            listeners: Arc::new(Mutex::new(Listeners {
                next_id: 0,
                entries: Vec::new(),
            })),
        }
    }

    /// Register a listener. Dropping or disposing the handle unsubscribes.
    pub fn on<F>(&self, callback: F) -> Subscription
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = {
            let mut listeners = self.listeners.lock();
            let id = listeners.next_id;
            listeners.next_id += 1;
            listeners.entries.push((id, Arc::new(callback)));
            id
        };
        let weak: Weak<Mutex<Listeners<T>>> = Arc::downgrade(&self.listeners);
        Subscription::new(move || {
            if let Some(listeners) = weak.upgrade() {
                listeners.lock().entries.retain(|(entry, _)| *entry != id);
            }
        })
    }

    pub fn emit(&self, value: &T) {
        let snapshot: Vec<Listener<T>> = self
            .listeners
            .lock()
            .entries
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| listener(value))).is_err() {
                tracing::error!(channel = self.channel, "subscriber panicked during dispatch");
            }
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().entries.len()
    }

    /// Drop every listener. Outstanding handles become no-ops.
    pub fn clear(&self) {
        self.listeners.lock().entries.clear();
    }
}

impl<T> fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("channel", &self.channel)
            .field("listeners", &self.listeners.lock().entries.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Subscription handles
// ---------------------------------------------------------------------------

type Disposer = Box<dyn FnOnce() + Send>;

/// Unsubscribe handle. Disposal runs at most once, on `dispose()` or on drop.
pub struct Subscription {
    disposer: Mutex<Option<Disposer>>,
}

impl Subscription {
    pub fn new<F>(disposer: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            disposer: Mutex::new(Some(Box::new(disposer))),
        }
    }

    /// A handle with nothing to dispose.
    pub fn empty() -> Self {
        Self {
            disposer: Mutex::new(None),
        }
    }

    pub fn dispose(&self) {
        let disposer = self.disposer.lock().take();
        if let Some(disposer) = disposer {
            disposer();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposer.lock().is_none()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

/// A set of subscriptions disposed together.
#[derive(Debug, Default)]
pub struct SubscriptionGroup {
    items: Mutex<Vec<Subscription>>,
}

impl SubscriptionGroup {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, subscription: Subscription) {
        self.items.lock().push(subscription);
    }

    /// Dispose and remove every member. The group stays usable.
    pub fn dispose(&self) {
        let items = std::mem::take(&mut *self.items.lock());
        for item in &items {
            item.dispose();
        }
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
