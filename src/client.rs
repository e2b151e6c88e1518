//! Client Facade: the composition root wiring every collaborator together
//! behind a small public surface (spec §2, §4.7).
//!
//! Grounded on `packages/thaumic-core/src/bootstrap.rs`'s
//! `BootstrappedServices` composition-root pattern: one place that
//! constructs every collaborator and exposes a narrow facade over them.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::info;
use url::Url;

use crate::config::ConnectOptions;
use crate::creators::{CreatorArgs, Creators};
use crate::error::{ClientError, ClientResult};
use crate::invoker::HttpInvoker;
use crate::listeners::{ListenerId, ListenerTable};
use crate::resource::{ResourceFactory, ResourceInstance};
use crate::router::{EventRouter, InstanceIndex, RouterError};
use crate::schema::loader::basic_auth_header;
use crate::schema::{Catalog, EventSchema, KnownKind, SchemaLoader};
use crate::transport::{ReqwestTransport, Transport, TungsteniteTransport, WsTransport};
use crate::ws_session::{SessionState, WsSession};

/// The telephony control client: loads the server's schema, then exposes
/// resource namespaces and an event stream built on top of it.
pub struct Client {
    catalog: Arc<Catalog>,
    invoker: Arc<HttpInvoker>,
    factory: Arc<ResourceFactory>,
    creators: Creators,
    client_listeners: Arc<ListenerTable>,
    options: ConnectOptions,
    router: Arc<EventRouter>,
    ws_transport: Arc<dyn WsTransport>,
    session: Option<Arc<WsSession>>,
    session_task: Option<tokio::task::JoinHandle<()>>,
    errors: tokio::sync::mpsc::UnboundedReceiver<RouterError>,
}

impl Client {
    /// Connects to the server named in `options`: loads its resource and
    /// event schemas and wires up every internal collaborator. Does not
    /// open the WebSocket session; call [`Client::start`] for that.
    ///
    /// # Errors
    ///
    /// [`ClientError::HostIsNotReachable`] if the server cannot be reached,
    /// or [`ClientError::SchemaInvalid`] if its self-description documents
    /// are malformed.
    pub async fn connect(options: ConnectOptions) -> ClientResult<Self> {
        Self::connect_with_transports(
            options,
            Arc::new(ReqwestTransport::new()),
            Arc::new(TungsteniteTransport),
        )
        .await
    }

    /// Same as [`Client::connect`], but with injectable transports, for
    /// tests that substitute a mock HTTP/WebSocket collaborator.
    pub async fn connect_with_transports(
        options: ConnectOptions,
        http_transport: Arc<dyn Transport>,
        ws_transport: Arc<dyn WsTransport>,
    ) -> ClientResult<Self> {
        let base_url = Url::parse(&options.base_url)
            .map_err(|e| ClientError::SchemaInvalid(format!("invalid base url: {e}")))?;

        let loader = SchemaLoader::new(Arc::clone(&http_transport));
        let (catalog, events) = loader
            .load(&options.base_url, &options.username, &options.password)
            .await?;
        let catalog = Arc::new(catalog);
        let events = Arc::new(events);

        let invoker = Arc::new(HttpInvoker::new(
            http_transport,
            base_url,
            options.username.clone(),
            options.password.clone(),
        ));
        let index = Arc::new(InstanceIndex::new());
        let factory = Arc::new(ResourceFactory::new(Arc::clone(&catalog), Arc::clone(&invoker), Arc::clone(&index)));
        let client_listeners = Arc::new(ListenerTable::new());
        let (error_tx, error_rx) = tokio::sync::mpsc::unbounded_channel();
        let router = Arc::new(EventRouter::new(
            events,
            index,
            Arc::clone(&factory),
            Arc::clone(&client_listeners),
            error_tx,
        ));

        info!("client connected, schema loaded");
        Ok(Self {
            catalog,
            invoker,
            creators: Creators::new(Arc::clone(&factory)),
            factory,
            client_listeners,
            options,
            router,
            ws_transport,
            errors: error_rx,
            session: None,
            session_task: None,
        })
    }

    /// Starts the WebSocket event session in the background, subscribed to
    /// `apps` (the Stasis application names to receive events for) and
    /// optionally every event regardless of application (spec §4.5,
    /// `start(apps, subscribeAll?)`). A no-op if already started.
    pub fn start(&mut self, apps: &[String], subscribe_all: bool) {
        if self.session_task.is_some() {
            return;
        }
        let session = Arc::new(build_session(
            &self.options,
            Arc::clone(&self.router),
            Arc::clone(&self.ws_transport),
            apps,
            subscribe_all,
        ));
        self.session = Some(Arc::clone(&session));
        self.session_task = Some(tokio::spawn(async move {
            session.run().await;
        }));
    }

    /// Stops the WebSocket event session and waits for its background
    /// task to finish.
    pub async fn stop(&mut self) {
        if let Some(session) = &self.session {
            session.stop();
        }
        if let Some(task) = self.session_task.take() {
            let _ = task.await;
        }
    }

    /// The current WebSocket session state.
    #[must_use]
    pub fn session_state(&self) -> Option<SessionState> {
        self.session.as_ref().map(|s| s.state())
    }

    /// The loaded operation catalog, e.g. for introspecting available
    /// resources and operations.
    #[must_use]
    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Drains one pending listener-panic report, if any, without blocking
    /// (spec §9 per-listener panic isolation).
    pub fn next_error(&mut self) -> Option<RouterError> {
        self.errors.try_recv().ok()
    }

    /// Registers a callback fired on every dispatch of `event_type`,
    /// before any per-instance dispatch.
    pub fn on(&self, event_type: &str, callback: impl Fn(&Value) + Send + Sync + 'static) -> ListenerId {
        self.client_listeners.on(event_type, callback)
    }

    /// Registers a callback fired once on the next dispatch of `event_type`.
    pub fn once(&self, event_type: &str, callback: impl Fn(&Value) + Send + Sync + 'static) -> ListenerId {
        self.client_listeners.once(event_type, callback)
    }

    /// Removes a single client-scope subscription.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.client_listeners.remove_listener(id)
    }

    /// Removes every client-scope subscription for `event_type`, or every
    /// client-scope subscription at all when `event_type` is `None`
    /// (spec §8).
    pub fn remove_all_listeners(&self, event_type: Option<&str>) {
        self.client_listeners.remove_all_listeners(event_type);
    }

    /// Invokes an arbitrary operation on a resource namespace, without an
    /// existing instance to bind through (e.g. `bridges().list()`).
    ///
    /// # Errors
    ///
    /// [`ClientError::SchemaInvalid`] if the resource or operation is
    /// unknown, otherwise whatever [`crate::binder::bind`] or
    /// [`HttpInvoker::invoke`] returns.
    pub async fn call(
        &self,
        resource: &str,
        operation: &str,
        opts: BTreeMap<String, Value>,
        cancel: &CancellationToken,
    ) -> ClientResult<Value> {
        let descriptor = self
            .catalog
            .operation(resource, operation)
            .ok_or_else(|| {
                ClientError::SchemaInvalid(format!("unknown operation '{operation}' on resource '{resource}'"))
            })?;
        let plan = crate::binder::bind(descriptor, &opts)?;
        self.invoker.invoke(plan, cancel).await
    }

    /// Wraps a decoded JSON object as a resource instance, e.g. after
    /// calling `list` and wanting to attach listeners to each result.
    #[must_use]
    pub fn wrap(&self, kind: KnownKind, body: &Value) -> Arc<ResourceInstance> {
        self.factory.wrap(kind, body, None)
    }

    /// Creates a locally-identified bridge instance ahead of any network
    /// call, so listeners can be attached before the creating request is
    /// sent.
    #[must_use]
    pub fn new_bridge(&self, args: CreatorArgs) -> Arc<ResourceInstance> {
        self.creators.new_bridge(args)
    }

    /// Creates a locally-identified channel instance.
    #[must_use]
    pub fn new_channel(&self, args: CreatorArgs) -> Arc<ResourceInstance> {
        self.creators.new_channel(args)
    }

    /// Creates a locally-identified playback instance.
    #[must_use]
    pub fn new_playback(&self, args: CreatorArgs) -> Arc<ResourceInstance> {
        self.creators.new_playback(args)
    }

    /// Creates a locally-identified instance of any other known kind.
    #[must_use]
    pub fn new_instance(&self, kind: KnownKind, args: CreatorArgs) -> Arc<ResourceInstance> {
        self.creators.create(kind, args)
    }

}

fn build_session(
    options: &ConnectOptions,
    router: Arc<EventRouter>,
    ws_transport: Arc<dyn WsTransport>,
    apps: &[String],
    subscribe_all: bool,
) -> WsSession {
    let ws_url = to_ws_url(&options.base_url, apps, subscribe_all);
    let headers = vec![(
        "Authorization".to_string(),
        basic_auth_header(&options.username, &options.password),
    )];
    WsSession::new(ws_transport, router, ws_url, headers, options)
}

/// Rewrites the base URL's scheme to `ws`/`wss`, appends the events
/// endpoint, and adds `app=<csv>` (and `subscribeAll=true` when requested)
/// as query parameters (spec §6).
fn to_ws_url(base_url: &str, apps: &[String], subscribe_all: bool) -> String {
    let mut url = base_url.replacen("http://", "ws://", 1);
    if url == base_url {
        url = base_url.replacen("https://", "wss://", 1);
    }
    let mut query = url::form_urlencoded::Serializer::new(String::new());
    query.append_pair("app", &apps.join(","));
    if subscribe_all {
        query.append_pair("subscribeAll", "true");
    }
    format!("{}/ari/events?{}", url.trim_end_matches('/'), query.finish())
}
