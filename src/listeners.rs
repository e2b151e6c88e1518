//! Listener tables backing both client-scope and per-instance event
//! subscriptions (spec §3, §4.5, §9).
//!
//! Rust closures have no stable identity the way JS functions do, so
//! `remove_listener` cannot compare callbacks by pointer equality.
//! Subscribing instead returns a [`ListenerId`] disposer handle that the
//! caller holds onto and passes back to remove exactly that subscription.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde_json::Value;

/// Identifies a single subscription, returned by `on`/`once` and accepted
/// by `remove_listener`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ListenerId(u64);

type Callback = dyn Fn(&Value) + Send + Sync;

struct Entry {
    id: ListenerId,
    callback: Arc<Callback>,
    once: bool,
}

/// A registry of callbacks keyed by event name (spec §3: "event name →
/// ordered list"), shared by a client's table and each resource instance's
/// table.
#[derive(Default)]
pub struct ListenerTable {
    next_id: AtomicU64,
    by_type: RwLock<BTreeMap<String, Vec<Entry>>>,
}

impl ListenerTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a callback that fires on every dispatch of `event_type`.
    pub fn on<F>(&self, event_type: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.insert(event_type, Arc::new(callback), false)
    }

    /// Registers a callback that fires at most once for `event_type`, then
    /// is removed before the invocation that triggers it (spec §4.6:
    /// "once" listeners are removed before being invoked so a callback
    /// that re-subscribes doesn't immediately re-fire from the same
    /// dispatch).
    pub fn once<F>(&self, event_type: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.insert(event_type, Arc::new(callback), true)
    }

    fn insert(&self, event_type: &str, callback: Arc<Callback>, once: bool) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        self.by_type
            .write()
            .entry(event_type.to_string())
            .or_default()
            .push(Entry { id, callback, once });
        id
    }

    /// Removes a single subscription by its handle, regardless of which
    /// event name it is registered under. Returns `true` if a matching
    /// entry was found and removed.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut by_type = self.by_type.write();
        let mut removed = false;
        for entries in by_type.values_mut() {
            let before = entries.len();
            entries.retain(|e| e.id != id);
            removed |= entries.len() != before;
        }
        by_type.retain(|_, entries| !entries.is_empty());
        removed
    }

    /// Removes every subscription for `event_type`, leaving zero listeners
    /// for it and not affecting any other event name (spec §8). When
    /// `event_type` is `None`, removes every subscription for every event
    /// name.
    pub fn remove_all_listeners(&self, event_type: Option<&str>) {
        let mut by_type = self.by_type.write();
        match event_type {
            Some(event_type) => {
                by_type.remove(event_type);
            }
            None => by_type.clear(),
        }
    }

    /// Returns the total number of currently registered subscriptions,
    /// across every event name.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_type.read().values().map(Vec::len).sum()
    }

    /// Returns whether this table has no subscriptions for any event name.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_type.read().values().all(Vec::is_empty)
    }

    /// Dispatches `payload` to every callback registered for `event_type`.
    /// Callbacks registered under other event names are not invoked
    /// (spec §4.6 steps 4-5: "listeners for `type`").
    pub fn dispatch(&self, event_type: &str, payload: &Value) {
        self.dispatch_reporting(event_type, payload, |message| {
            tracing::error!(message, "listener panicked during dispatch");
        });
    }

    /// Same as [`ListenerTable::dispatch`], but panics are reported via
    /// `on_panic` instead of a bare `tracing::error!`, so a caller can wire
    /// them to an error sink (e.g. [`crate::router::EventRouter`]'s
    /// `RouterError` channel).
    pub fn dispatch_reporting(
        &self,
        event_type: &str,
        payload: &Value,
        mut on_panic: impl FnMut(String),
    ) {
        let snapshot: Vec<Entry> = {
            let mut by_type = self.by_type.write();
            let Some(entries) = by_type.get_mut(event_type) else {
                return;
            };
            let (once, persistent): (Vec<Entry>, Vec<Entry>) =
                entries.drain(..).partition(|e| e.once);
            *entries = persistent;
            once
        };
        for entry in &snapshot {
            call_isolated(&entry.callback, payload, &mut on_panic);
        }

        let persistent_snapshot: Vec<Arc<Callback>> = {
            let by_type = self.by_type.read();
            by_type
                .get(event_type)
                .map(|entries| entries.iter().map(|e| Arc::clone(&e.callback)).collect())
                .unwrap_or_default()
        };
        for callback in &persistent_snapshot {
            call_isolated(callback, payload, &mut on_panic);
        }
    }
}

fn call_isolated(callback: &Callback, payload: &Value, on_panic: &mut impl FnMut(String)) {
    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| callback(payload)));
    if let Err(panic) = result {
        let message = panic
            .downcast_ref::<&str>()
            .map(ToString::to_string)
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "listener panicked with a non-string payload".to_string());
        on_panic(message);
    }
}
