//! WebSocket Session: the connect/reconnect state machine driving the
//! event stream (spec §4.5, §5).
//!
//! Grounded on `packages/thaumic-core/src/sonos/retry.rs`'s fixed-table
//! exponential backoff, generalized here into open-ended doubling capped
//! at a configured ceiling, and on `runtime::TaskSpawner` for the
//! background-task ownership pattern.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ConnectOptions;
use crate::router::EventRouter;
use crate::transport::{WsMessage, WsTransport};

/// Current state of a [`WsSession`]'s connection lifecycle (spec §4.5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not yet started.
    Idle,
    /// Dialing the server for the first time, or after a drop.
    Connecting,
    /// Connected and dispatching events.
    Open,
    /// Waiting out a backoff delay before the next connect attempt.
    Reconnecting,
    /// Exceeded `max_consecutive_failures`; will not retry again.
    GaveUp,
    /// Stopped by an explicit caller request.
    Stopped,
}

/// The WebSocket event session: owns the connect/reconnect loop and feeds
/// every inbound event to the [`EventRouter`].
pub struct WsSession {
    transport: Arc<dyn WsTransport>,
    router: Arc<EventRouter>,
    url: String,
    headers: Vec<(String, String)>,
    reconnect_ceiling: Duration,
    max_consecutive_failures: u32,
    idle_timeout: Duration,
    state: Arc<parking_lot::Mutex<SessionState>>,
    consecutive_failures: Arc<AtomicU32>,
    stop_requested: Arc<AtomicBool>,
    cancel: CancellationToken,
}

impl WsSession {
    /// Creates a session that will dial `url` with `headers` once started.
    pub fn new(
        transport: Arc<dyn WsTransport>,
        router: Arc<EventRouter>,
        url: String,
        headers: Vec<(String, String)>,
        options: &ConnectOptions,
    ) -> Self {
        Self {
            transport,
            router,
            url,
            headers,
            reconnect_ceiling: Duration::from_millis(options.reconnect_ceiling_ms),
            max_consecutive_failures: options.max_consecutive_failures,
            idle_timeout: Duration::from_millis(options.idle_timeout_ms),
            state: Arc::new(parking_lot::Mutex::new(SessionState::Idle)),
            consecutive_failures: Arc::new(AtomicU32::new(0)),
            stop_requested: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
        }
    }

    /// The current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Runs the connect/reconnect loop until stopped or given up. Intended
    /// to be spawned as a background task; returns once the session
    /// reaches `GaveUp` or `Stopped`.
    pub async fn run(&self) {
        loop {
            if self.stop_requested.load(Ordering::SeqCst) {
                self.set_state(SessionState::Stopped);
                return;
            }

            self.set_state(SessionState::Connecting);
            match self.transport.connect(&self.url, self.headers.clone()).await {
                Ok(mut connection) => {
                    self.consecutive_failures.store(0, Ordering::SeqCst);
                    self.set_state(SessionState::Open);
                    info!("websocket session connected");
                    self.dispatch_lifecycle_event("WebSocketConnected");

                    loop {
                        let next = tokio::select! {
                            biased;
                            () = self.cancel.cancelled() => break,
                            message = crate::transport::recv_with_idle_timeout(&mut *connection, self.idle_timeout) => message,
                        };
                        match next {
                            Some(Ok(WsMessage::Text(text))) => self.handle_text(&text),
                            Some(Ok(WsMessage::Closed)) | None => {
                                debug!("websocket connection closed by peer");
                                break;
                            }
                            Some(Err(e)) => {
                                warn!(error = %e, "websocket connection error");
                                break;
                            }
                        }
                    }

                    if self.stop_requested.load(Ordering::SeqCst) {
                        self.set_state(SessionState::Stopped);
                        return;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "websocket connect failed");
                }
            }

            let failures = self.consecutive_failures.fetch_add(1, Ordering::SeqCst) + 1;
            if failures >= self.max_consecutive_failures {
                warn!(failures, "giving up after too many consecutive failures");
                self.set_state(SessionState::GaveUp);
                self.dispatch_lifecycle_event("WebSocketMaxRetries");
                return;
            }

            self.set_state(SessionState::Reconnecting);
            self.dispatch_lifecycle_event("WebSocketReconnecting");
            let delay = backoff_delay(failures, self.reconnect_ceiling);
            debug!(?delay, attempt = failures, "backing off before reconnect");
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => {
                    self.set_state(SessionState::Stopped);
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Requests the session stop. Interrupts an in-progress backoff sleep
    /// or read immediately via the session's [`CancellationToken`].
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.cancel.cancel();
    }

    fn handle_text(&self, text: &str) {
        match serde_json::from_str::<serde_json::Value>(text) {
            Ok(payload) => self.router.dispatch(&payload),
            Err(e) => warn!(error = %e, "dropping malformed event frame"),
        }
    }

    /// Dispatches a synthetic `{"type": event_type}` envelope through the
    /// router so client-scope listeners can observe WebSocket lifecycle
    /// transitions the same way they observe server events (spec §4.5,
    /// §6: `WebSocketConnected`/`WebSocketReconnecting`/`WebSocketMaxRetries`).
    fn dispatch_lifecycle_event(&self, event_type: &str) {
        self.router.dispatch(&serde_json::json!({ "type": event_type }));
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock() = state;
    }
}

/// Exponential backoff, doubling from a 200ms base and capped at `ceiling`
/// (generalizes the teacher's fixed three-step table into an open-ended
/// series for an unbounded `max_consecutive_failures`).
fn backoff_delay(attempt: u32, ceiling: Duration) -> Duration {
    const BASE_MS: u64 = 200;
    let scaled = BASE_MS.saturating_mul(1u64 << attempt.min(20));
    Duration::from_millis(scaled).min(ceiling)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_delay_doubles_up_to_ceiling() {
        let ceiling = Duration::from_millis(30_000);
        assert_eq!(backoff_delay(1, ceiling), Duration::from_millis(400));
        assert_eq!(backoff_delay(2, ceiling), Duration::from_millis(800));
        assert_eq!(backoff_delay(10, ceiling), ceiling);
    }

    #[test]
    fn initial_state_is_idle() {
        let router = test_router();
        let session = WsSession::new(
            Arc::new(NeverConnects),
            router,
            "ws://localhost/events".into(),
            vec![],
            &ConnectOptions::new("http://localhost", "u", "p"),
        );
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn gives_up_after_max_consecutive_failures() {
        let router = test_router();
        let mut options = ConnectOptions::new("http://localhost", "u", "p");
        options.max_consecutive_failures = 2;
        options.reconnect_ceiling_ms = 1;
        let session = Arc::new(WsSession::new(
            Arc::new(NeverConnects),
            router,
            "ws://localhost/events".into(),
            vec![],
            &options,
        ));
        session.run().await;
        assert_eq!(session.state(), SessionState::GaveUp);
    }

    fn test_router_with_client_listeners() -> (Arc<EventRouter>, Arc<crate::listeners::ListenerTable>) {
        use crate::invoker::HttpInvoker;
        use crate::resource::ResourceFactory;
        use crate::router::InstanceIndex;
        use crate::schema::{Catalog, EventSchema};
        use crate::transport::{RawRequest, RawResponse, Transport, TransportFailure};
        use async_trait::async_trait;
        use std::collections::BTreeMap;

        struct NullTransport;
        #[async_trait]
        impl Transport for NullTransport {
            async fn send(&self, _r: RawRequest) -> Result<RawResponse, TransportFailure> {
                Ok(RawResponse {
                    status: 200,
                    body: serde_json::Value::Null,
                    reason: "OK".into(),
                })
            }
        }

        let catalog = Arc::new(Catalog::new(BTreeMap::new()).unwrap());
        let invoker = Arc::new(HttpInvoker::new(
            Arc::new(NullTransport),
            url::Url::parse("http://localhost:8088").unwrap(),
            "u".into(),
            "p".into(),
        ));
        let index = Arc::new(InstanceIndex::new());
        let factory = Arc::new(ResourceFactory::new(catalog, invoker, Arc::clone(&index)));
        let (error_tx, _error_rx) = tokio::sync::mpsc::unbounded_channel();
        let client_listeners = Arc::new(crate::listeners::ListenerTable::new());
        let router = Arc::new(EventRouter::new(
            Arc::new(EventSchema::default()),
            index,
            factory,
            Arc::clone(&client_listeners),
            error_tx,
        ));
        (router, client_listeners)
    }

    fn test_router() -> Arc<EventRouter> {
        test_router_with_client_listeners().0
    }

    #[tokio::test]
    async fn giving_up_dispatches_websocket_max_retries_to_client_listeners() {
        use std::sync::atomic::AtomicBool as StdAtomicBool;

        let (router, client_listeners) = test_router_with_client_listeners();
        let fired = Arc::new(StdAtomicBool::new(false));
        let fired_clone = Arc::clone(&fired);
        client_listeners.on("WebSocketMaxRetries", move |_| {
            fired_clone.store(true, Ordering::SeqCst);
        });

        let mut options = ConnectOptions::new("http://localhost", "u", "p");
        options.max_consecutive_failures = 1;
        options.reconnect_ceiling_ms = 1;
        let session = WsSession::new(
            Arc::new(NeverConnects),
            router,
            "ws://localhost/events".into(),
            vec![],
            &options,
        );
        session.run().await;
        assert!(fired.load(Ordering::SeqCst));
    }

    struct NeverConnects;

    #[async_trait::async_trait]
    impl WsTransport for NeverConnects {
        async fn connect(
            &self,
            _url: &str,
            _headers: Vec<(String, String)>,
        ) -> Result<Box<dyn crate::transport::WsConnection>, crate::transport::TransportFailure> {
            Err(crate::transport::TransportFailure::Connect("refused".into()))
        }
    }
}
