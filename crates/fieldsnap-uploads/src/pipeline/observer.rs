//! Change notification fan-out

use super::panic_message;
use parking_lot::Mutex;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tracing::warn;

type Listener = Arc<dyn Fn() + Send + Sync>;

/// Payload-free "something changed" signal
///
/// Listeners are called synchronously by whoever mutated state, after the
/// state lock has been released. They receive nothing and are expected to
/// re-read what they need. The same mutations bump a `watch` version counter
/// for async consumers.
pub struct ObserverBus {
    listeners: Arc<Mutex<Vec<(u64, Listener)>>>,
    next_id: AtomicU64,
    version: watch::Sender<u64>,
}

impl ObserverBus {
    pub fn new() -> Self {
        let (version, _) = watch::channel(0);
        Self {
            listeners: Arc::new(Mutex::new(Vec::new())),
            next_id: AtomicU64::new(1),
            version,
        }
    }

    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.lock().push((id, Arc::new(listener)));

        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    /// New receiver on the version counter; the current value counts as seen
    pub fn changes(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Must not be called with the registry lock held
    pub fn notify(&self) {
        self.version.send_modify(|v| *v = v.wrapping_add(1));

        // Snapshot so listeners can subscribe or unsubscribe while being called
        let listeners: Vec<(u64, Listener)> = self.listeners.lock().clone();

        for (id, listener) in listeners {
            if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener())) {
                warn!(
                    listener_id = id,
                    panic = %panic_message(payload.as_ref()),
                    "Upload listener panicked; skipped for this change"
                );
            }
        }
    }
}

impl Default for ObserverBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle returned by [`ObserverBus::subscribe`]; unsubscribes on drop
#[must_use = "dropping a Subscription unsubscribes the listener"]
pub struct Subscription {
    id: u64,
    listeners: Weak<Mutex<Vec<(u64, Listener)>>>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        // Drop does the work
    }

    fn remove(&self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.lock().retain(|(id, _)| *id != self.id);
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
