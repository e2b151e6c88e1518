//! Abstract HTTP and WebSocket transport collaborators (spec §1, §6).
//!
//! The core client is generic over these two traits so that a caller can
//! substitute a mock transport in tests without going through real sockets.
//! This mirrors the teacher's pattern of hiding a platform-specific
//! collaborator behind a trait — see `context::IpDetector` and
//! `runtime::TaskSpawner` in `packages/thaumic-core`.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use thiserror::Error;
use tokio_tungstenite::tungstenite::Message as TungsteniteMessage;

/// A transport-level failure, distinguished so callers higher up the stack
/// can map it to the right [`crate::error::ClientError`] variant (connect
/// failures become `HostIsNotReachable`, mid-call failures become
/// `TransportError`).
#[derive(Debug, Error)]
pub enum TransportFailure {
    /// DNS resolution, connection refusal, or TLS handshake failure.
    #[error("connect failed: {0}")]
    Connect(String),
    /// A failure after the connection was established.
    #[error("transport failed: {0}")]
    Io(String),
}

impl From<reqwest::Error> for TransportFailure {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            Self::Connect(err.to_string())
        } else {
            Self::Io(err.to_string())
        }
    }
}

/// Request body, already shaped by the parameter binder.
#[derive(Debug, Clone)]
pub enum RequestBody {
    /// JSON body with `Content-Type: application/json`.
    Json(Value),
    /// URL-encoded form body.
    Form(Vec<(String, String)>),
}

/// A fully-assembled HTTP request, ready to send.
#[derive(Debug, Clone)]
pub struct RawRequest {
    /// HTTP method.
    pub method: reqwest::Method,
    /// Absolute URL.
    pub url: String,
    /// Request headers, including authentication.
    pub headers: Vec<(String, String)>,
    /// Optional request body.
    pub body: Option<RequestBody>,
}

/// A decoded HTTP response.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body, parsed as JSON when possible; `Value::Null` for an
    /// empty or non-JSON body.
    pub body: Value,
    /// The HTTP reason phrase, used as a fallback error message.
    pub reason: String,
}

/// Abstract HTTP transport collaborator.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends `request` and returns the decoded response, or a transport
    /// failure if the request could not be completed at all.
    async fn send(&self, request: RawRequest) -> Result<RawResponse, TransportFailure>;
}

/// Default [`Transport`] implementation backed by `reqwest`.
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with a freshly built, connection-pooling client.
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::builder()
                .build()
                .expect("reqwest client configuration is always valid"),
        }
    }
}

impl Default for ReqwestTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: RawRequest) -> Result<RawResponse, TransportFailure> {
        let mut builder = self.client.request(request.method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        builder = match request.body {
            Some(RequestBody::Json(value)) => builder.json(&value),
            Some(RequestBody::Form(fields)) => builder.form(&fields),
            None => builder,
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let reason = response
            .status()
            .canonical_reason()
            .unwrap_or("unknown")
            .to_string();
        let bytes = response.bytes().await?;
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        Ok(RawResponse {
            status,
            body,
            reason,
        })
    }
}

/// A single inbound WebSocket message.
#[derive(Debug, Clone)]
pub enum WsMessage {
    /// A text frame, expected to contain a JSON event envelope.
    Text(String),
    /// The peer closed the connection.
    Closed,
}

/// An open WebSocket connection.
#[async_trait]
pub trait WsConnection: Send {
    /// Waits for the next message, or `None` once the stream is exhausted.
    async fn recv(&mut self) -> Option<Result<WsMessage, TransportFailure>>;
}

/// Abstract WebSocket transport collaborator.
#[async_trait]
pub trait WsTransport: Send + Sync {
    /// Opens a WebSocket connection to `url` with the given headers
    /// (carrying Basic auth, per spec §6).
    async fn connect(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
    ) -> Result<Box<dyn WsConnection>, TransportFailure>;
}

/// Default [`WsTransport`] implementation backed by `tokio-tungstenite`.
pub struct TungsteniteTransport;

#[async_trait]
impl WsTransport for TungsteniteTransport {
    async fn connect(
        &self,
        url: &str,
        headers: Vec<(String, String)>,
    ) -> Result<Box<dyn WsConnection>, TransportFailure> {
        use tokio_tungstenite::tungstenite::client::IntoClientRequest;

        let mut request = url
            .into_client_request()
            .map_err(|e| TransportFailure::Connect(e.to_string()))?;
        for (name, value) in headers {
            if let (Ok(name), Ok(value)) = (
                tokio_tungstenite::tungstenite::http::HeaderName::try_from(name),
                tokio_tungstenite::tungstenite::http::HeaderValue::from_str(&value),
            ) {
                request.headers_mut().insert(name, value);
            }
        }

        let (stream, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| TransportFailure::Connect(e.to_string()))?;
        Ok(Box::new(TungsteniteConnection { stream }))
    }
}

struct TungsteniteConnection {
    stream: tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >,
}

#[async_trait]
impl WsConnection for TungsteniteConnection {
    async fn recv(&mut self) -> Option<Result<WsMessage, TransportFailure>> {
        loop {
            return match self.stream.next().await {
                Some(Ok(TungsteniteMessage::Text(text))) => {
                    Some(Ok(WsMessage::Text(text.to_string())))
                }
                Some(Ok(TungsteniteMessage::Ping(payload))) => {
                    let _ = self.stream.send(TungsteniteMessage::Pong(payload)).await;
                    continue;
                }
                Some(Ok(TungsteniteMessage::Pong(_))) => continue,
                Some(Ok(TungsteniteMessage::Close(_))) | None => Some(Ok(WsMessage::Closed)),
                Some(Ok(TungsteniteMessage::Binary(_))) | Some(Ok(TungsteniteMessage::Frame(_))) => {
                    continue
                }
                Some(Err(e)) => Some(Err(TransportFailure::Io(e.to_string()))),
            };
        }
    }
}

/// Default idle-read timeout wrapper shared by [`crate::ws_session::WsSession`].
pub(crate) async fn recv_with_idle_timeout(
    conn: &mut dyn WsConnection,
    idle_timeout: Duration,
) -> Option<Result<WsMessage, TransportFailure>> {
    match tokio::time::timeout(idle_timeout, conn.recv()).await {
        Ok(result) => result,
        Err(_) => Some(Err(TransportFailure::Io("idle timeout".into()))),
    }
}
