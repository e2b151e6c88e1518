//! HTTP Invoker: sends a [`RequestPlan`] over a [`Transport`] and maps the
//! outcome to a [`ClientResult`] (spec §4.3).

use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::binder::RequestPlan;
use crate::error::{ClientError, ClientResult};
use crate::schema::loader::basic_auth_header;
use crate::transport::{RawRequest, Transport};

/// Sends bound requests and decodes their responses.
pub struct HttpInvoker {
    transport: Arc<dyn Transport>,
    base_url: Url,
    username: String,
    password: String,
}

impl HttpInvoker {
    /// Creates an invoker bound to a server and a set of credentials.
    pub fn new(transport: Arc<dyn Transport>, base_url: Url, username: String, password: String) -> Self {
        Self {
            transport,
            base_url,
            username,
            password,
        }
    }

    /// Sends `plan`, returning the decoded JSON response body.
    ///
    /// # Errors
    ///
    /// - [`ClientError::Cancelled`] if `cancel` fires before the response
    ///   arrives.
    /// - [`ClientError::HostIsNotReachable`] on connect failure.
    /// - [`ClientError::TransportError`] on a mid-call network failure.
    /// - [`ClientError::ServerError`] if the server responds with a status
    ///   `>= 400`.
    pub async fn invoke(&self, plan: RequestPlan, cancel: &CancellationToken) -> ClientResult<Value> {
        if cancel.is_cancelled() {
            return Err(ClientError::Cancelled);
        }

        let mut url = self.base_url.clone();
        url.set_path(&plan.path);
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &plan.query {
                pairs.append_pair(key, value);
            }
        }

        let request = RawRequest {
            method: plan.method,
            url: url.to_string(),
            headers: vec![(
                "Authorization".to_string(),
                basic_auth_header(&self.username, &self.password),
            )],
            body: plan.body,
        };

        let response = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(ClientError::Cancelled),
            result = self.transport.send(request) => result,
        };

        let response = response.map_err(|e| {
            let message = e.to_string();
            match e {
                crate::transport::TransportFailure::Connect(_) => {
                    ClientError::HostIsNotReachable(message)
                }
                crate::transport::TransportFailure::Io(_) => ClientError::TransportError(message),
            }
        })?;

        if response.status >= 400 {
            let message = extract_message(&response.body).unwrap_or(response.reason);
            return Err(ClientError::ServerError {
                status: response.status,
                message,
            });
        }

        Ok(response.body)
    }
}

fn extract_message(body: &Value) -> Option<String> {
    body.get("message")
        .and_then(Value::as_str)
        .map(ToString::to_string)
}
