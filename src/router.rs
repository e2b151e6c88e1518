//! Event Router: promotes raw event JSON into typed fields and dispatches
//! it to client-wide and per-instance listeners (spec §4.6).
//!
//! Grounded on `packages/thaumic-core/src/sonos/subscription_arbiter.rs`'s
//! `DashSet`-backed shared-state pattern, generalized here to a
//! weak-reference index so the router never keeps a resource instance
//! alive purely because an event mentioned it.

use std::sync::{Arc, Weak};

use dashmap::DashMap;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

use crate::listeners::ListenerTable;
use crate::resource::{ResourceFactory, ResourceInstance};
use crate::schema::{EventSchema, KnownKind};

/// Reported when a registered listener panics during dispatch (spec §9
/// per-listener panic isolation). The router keeps running; this is purely
/// informational for the embedding application.
#[derive(Debug, Clone)]
pub struct RouterError {
    /// Where the panic happened: `"client"` or the event type that
    /// triggered the per-instance dispatch.
    pub scope: String,
    /// The panic payload, downcast to a string where possible.
    pub message: String,
}

/// Weak-reference index of live resource instances, keyed by kind and
/// identity, so the router can find an existing instance to dispatch to
/// without creating a new one and without keeping it alive once every
/// other owner has dropped it.
#[derive(Default)]
pub struct InstanceIndex {
    instances: DashMap<(KnownKind, String), Weak<ResourceInstance>>,
}

impl InstanceIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a live instance, pruning the entry if it has already been
    /// dropped.
    pub fn get(&self, kind: KnownKind, identity: &str) -> Option<Arc<ResourceInstance>> {
        let key = (kind, identity.to_string());
        match self.instances.get(&key).and_then(|weak| weak.upgrade()) {
            Some(instance) => Some(instance),
            None => {
                self.instances.remove(&key);
                None
            }
        }
    }

    /// Records a newly created instance under its kind and identity.
    pub fn insert(&self, kind: KnownKind, identity: String, instance: Arc<ResourceInstance>) {
        self.instances.insert((kind, identity), Arc::downgrade(&instance));
    }
}

/// Promotes and dispatches inbound WebSocket events (spec §4.6).
pub struct EventRouter {
    events: Arc<EventSchema>,
    index: Arc<InstanceIndex>,
    factory: Arc<ResourceFactory>,
    client_listeners: Arc<ListenerTable>,
    error_tx: mpsc::UnboundedSender<RouterError>,
}

impl EventRouter {
    /// Creates a router over the given event schema, instance index, and
    /// resource factory, dispatching client-scope events to
    /// `client_listeners` and reporting listener panics to `error_tx`.
    pub fn new(
        events: Arc<EventSchema>,
        index: Arc<InstanceIndex>,
        factory: Arc<ResourceFactory>,
        client_listeners: Arc<ListenerTable>,
        error_tx: mpsc::UnboundedSender<RouterError>,
    ) -> Self {
        Self {
            events,
            index,
            factory,
            client_listeners,
            error_tx,
        }
    }

    /// Dispatches a single raw event payload, as decoded from one
    /// WebSocket text frame.
    ///
    /// Dispatch order (spec §4.6 step 3): client-wide listeners first,
    /// then each promoted field's per-instance listeners, in field
    /// declaration order. An event type absent from the schema still
    /// dispatches client-wide (best-effort fallback), just without any
    /// promotion.
    pub fn dispatch(&self, payload: &Value) {
        let Some(event_type) = payload.get("type").and_then(Value::as_str) else {
            return;
        };

        self.report_dispatch(&self.client_listeners, event_type, payload, "client");

        let Some(descriptor) = self.events.event(event_type) else {
            debug!(event_type, "dispatched (no schema entry, client scope only)");
            return;
        };

        let mut promoted = Vec::new();
        for field in &descriptor.fields {
            let Some(kind) = field.promotable_kind() else {
                continue;
            };
            let Some(field_value) = payload.get(&field.name) else {
                continue;
            };
            let identity = field_value
                .get(kind.identity_field())
                .and_then(Value::as_str);
            let Some(identity) = identity else { continue };

            let instance = match self.index.get(kind, identity) {
                Some(existing) => {
                    if let Some(fields) = field_value.as_object() {
                        existing.set_fields(fields.clone());
                    }
                    existing
                }
                None => self.factory.wrap(kind, field_value, None),
            };

            self.report_dispatch(instance.listeners(), event_type, payload, event_type);
            promoted.push((kind, identity.to_string()));
        }

        debug!(event_type, ?promoted, "dispatched");
    }

    fn report_dispatch(&self, table: &ListenerTable, event_type: &str, payload: &Value, scope: &str) {
        let error_tx = self.error_tx.clone();
        let scope = scope.to_string();
        table.dispatch_reporting(event_type, payload, move |message| {
            let _ = error_tx.send(RouterError {
                scope: scope.clone(),
                message,
            });
        });
    }
}
