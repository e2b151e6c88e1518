//! Resource instances: pre-bound operation handles with their own listener
//! table (spec §4.4, §9).

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::{Map, Value};
use tokio_util::sync::CancellationToken;

use crate::error::{ClientError, ClientResult};
use crate::invoker::HttpInvoker;
use crate::listeners::{ListenerId, ListenerTable};
use crate::schema::{Catalog, KnownKind};
use crate::{binder, router};

/// A live handle to a single resource on the server: a known identity, the
/// fields last known about it, and pre-bound operations that implicitly
/// carry that identity.
pub struct ResourceInstance {
    kind: KnownKind,
    identity: String,
    fields: parking_lot::RwLock<Map<String, Value>>,
    listeners: ListenerTable,
    catalog: Arc<Catalog>,
    invoker: Arc<HttpInvoker>,
}

impl ResourceInstance {
    /// The kind of resource this instance represents.
    #[must_use]
    pub fn kind(&self) -> KnownKind {
        self.kind
    }

    /// The instance's identity value (its `id` or `name`, per
    /// [`KnownKind::identity_field`]).
    #[must_use]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// A snapshot of the fields last known about this instance.
    #[must_use]
    pub fn fields(&self) -> Map<String, Value> {
        self.fields.read().clone()
    }

    /// Replaces the known fields, e.g. after a promoted event refreshes
    /// them (spec §4.6).
    pub(crate) fn set_fields(&self, fields: Map<String, Value>) {
        *self.fields.write() = fields;
    }

    /// Registers a callback fired on every dispatch of `event_type` scoped
    /// to this instance.
    pub fn on<F>(&self, event_type: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.listeners.on(event_type, callback)
    }

    /// Registers a callback fired on the next dispatch of `event_type`
    /// scoped to this instance, then removed.
    pub fn once<F>(&self, event_type: &str, callback: F) -> ListenerId
    where
        F: Fn(&Value) + Send + Sync + 'static,
    {
        self.listeners.once(event_type, callback)
    }

    /// Removes a single subscription previously returned by `on`/`once`.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.listeners.remove_listener(id)
    }

    /// Removes every subscription on this instance for `event_type`, or
    /// every subscription on this instance when `event_type` is `None`
    /// (spec §8).
    pub fn remove_all_listeners(&self, event_type: Option<&str>) {
        self.listeners.remove_all_listeners(event_type);
    }

    pub(crate) fn listeners(&self) -> &ListenerTable {
        &self.listeners
    }

    pub(crate) fn has_listeners(&self) -> bool {
        !self.listeners.is_empty()
    }

    /// Invokes a named operation on this resource's namespace, implicitly
    /// binding the identity parameter and merging `opts` over it.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::SchemaInvalid`] if the resource namespace or
    /// operation is unknown, otherwise surfaces whatever
    /// [`binder::bind`]/[`HttpInvoker::invoke`] returns.
    pub async fn call(
        &self,
        operation: &str,
        mut opts: BTreeMap<String, Value>,
        cancel: &CancellationToken,
    ) -> ClientResult<Value> {
        let namespace = self.kind.resource_namespace();
        let descriptor = self.catalog.operation(namespace, operation).ok_or_else(|| {
            ClientError::SchemaInvalid(format!(
                "unknown operation '{operation}' on resource '{namespace}'"
            ))
        })?;

        let identity_param = self.kind.identity_parameter();
        opts.entry(identity_param.to_string())
            .or_insert_with(|| Value::String(self.identity.clone()));

        let plan = binder::bind(descriptor, &opts)?;
        self.invoker.invoke(plan, cancel).await
    }
}

/// Builds [`ResourceInstance`]s from decoded HTTP responses, pre-binding
/// their identity (spec §4.4).
pub struct ResourceFactory {
    catalog: Arc<Catalog>,
    invoker: Arc<HttpInvoker>,
    index: Arc<router::InstanceIndex>,
}

impl ResourceFactory {
    /// Creates a factory sharing the given catalog, invoker, and
    /// weak-reference instance index.
    pub fn new(catalog: Arc<Catalog>, invoker: Arc<HttpInvoker>, index: Arc<router::InstanceIndex>) -> Self {
        Self {
            catalog,
            invoker,
            index,
        }
    }

    /// Wraps a decoded JSON object as a resource instance of `kind`,
    /// reusing a previously-created instance for the same identity if one
    /// is still alive, so repeated lookups share a listener table.
    ///
    /// `override_identity` lets a caller who just issued a local-ID-bearing
    /// create request supply the identity directly, for call shapes that
    /// don't echo it back in the body.
    pub fn wrap(
        &self,
        kind: KnownKind,
        body: &Value,
        override_identity: Option<&str>,
    ) -> Arc<ResourceInstance> {
        let fields = body.as_object().cloned().unwrap_or_default();
        let identity = override_identity
            .map(ToString::to_string)
            .or_else(|| {
                fields
                    .get(kind.identity_field())
                    .and_then(Value::as_str)
                    .map(ToString::to_string)
            })
            .unwrap_or_default();

        if let Some(existing) = self.index.get(kind, &identity) {
            existing.set_fields(fields);
            return existing;
        }

        let instance = Arc::new(ResourceInstance {
            kind,
            identity: identity.clone(),
            fields: parking_lot::RwLock::new(fields),
            listeners: ListenerTable::new(),
            catalog: Arc::clone(&self.catalog),
            invoker: Arc::clone(&self.invoker),
        });
        self.index.insert(kind, identity, Arc::clone(&instance));
        instance
    }
}
