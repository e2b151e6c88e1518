//! Fetches and parses the operation catalog and event model (spec §4.1).
//!
//! Grounded on `packages/thaumic-core/src/sonos/discovery/mod.rs`'s fan-out
//! concurrent-probe pattern and `sonos/gena_client.rs`'s single-owned
//! `reqwest::Client` struct idiom.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::try_join_all;
use url::Url;

use crate::error::{ClientError, ClientResult};
use crate::transport::{RawRequest, Transport};

use super::catalog::{
    Catalog, OperationDescriptor, RawResourceDocument, RawRootDocument, ResourceDescriptor,
};
use super::events::{EventSchema, FieldDescriptor, RawEventsDocument};
use super::EventDescriptor;

/// Path of the root document listing every resource document (spec §4.1
/// leaves the literal path as an implementation detail; `/ari/…` is named
/// as the REST convention in spec §6).
pub const ROOT_RESOURCES_PATH: &str = "/ari/api-docs/resources.json";

/// Path of the document describing event shapes, used when the root
/// document does not list one itself.
pub const DEFAULT_EVENTS_PATH: &str = "/ari/api-docs/events.json";

/// Loads the [`Catalog`] and [`EventSchema`] from a server's self-description
/// documents.
pub struct SchemaLoader {
    transport: Arc<dyn Transport>,
}

impl SchemaLoader {
    /// Creates a loader over the given HTTP transport.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Loads the catalog and event schema from `base_url`, authenticating
    /// with `username`/`password`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::HostIsNotReachable`] on DNS/connect/TLS
    /// failure, or [`ClientError::SchemaInvalid`] if a fetched document is
    /// malformed or missing required top-level keys.
    pub async fn load(
        &self,
        base_url: &str,
        username: &str,
        password: &str,
    ) -> ClientResult<(Catalog, EventSchema)> {
        let base = Url::parse(base_url)
            .map_err(|e| ClientError::SchemaInvalid(format!("invalid base url: {e}")))?;

        let root_body = self
            .fetch_json(&join_url(&base, ROOT_RESOURCES_PATH), username, password)
            .await?;
        let root: RawRootDocument = serde_json::from_value(root_body)
            .map_err(|e| ClientError::SchemaInvalid(format!("root document: {e}")))?;

        let mut events_path = None;
        let mut resource_paths = Vec::new();
        for entry in root.apis {
            if resource_name_from_path(&entry.path) == "events" {
                events_path = Some(entry.path);
            } else {
                resource_paths.push(entry.path);
            }
        }

        let resource_targets: Vec<(String, String)> = resource_paths
            .iter()
            .map(|path| (resource_name_from_path(path), join_url(&base, path)))
            .collect();

        let fetches = resource_targets.into_iter().map(|(name, url)| async move {
            let body = self.fetch_json(&url, username, password).await?;
            let doc: RawResourceDocument = serde_json::from_value(body)
                .map_err(|e| ClientError::SchemaInvalid(format!("resource '{name}': {e}")))?;
            parse_resource(&name, doc)
        });
        let resources = try_join_all(fetches).await?;
        let resources: BTreeMap<String, ResourceDescriptor> = resources
            .into_iter()
            .map(|r| (r.name.clone(), r))
            .collect();
        let catalog = Catalog::new(resources)?;

        let events_url = join_url(
            &base,
            events_path.as_deref().unwrap_or(DEFAULT_EVENTS_PATH),
        );
        let events_body = self.fetch_json(&events_url, username, password).await?;
        let raw_events: RawEventsDocument = serde_json::from_value(events_body)
            .map_err(|e| ClientError::SchemaInvalid(format!("events document: {e}")))?;
        let event_schema = parse_events(raw_events);

        Ok((catalog, event_schema))
    }

    async fn fetch_json(
        &self,
        url: &str,
        username: &str,
        password: &str,
    ) -> ClientResult<serde_json::Value> {
        let request = RawRequest {
            method: reqwest::Method::GET,
            url: url.to_string(),
            headers: vec![(
                "Authorization".to_string(),
                basic_auth_header(username, password),
            )],
            body: None,
        };
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| ClientError::HostIsNotReachable(e.to_string()))?;
        if response.status >= 400 {
            return Err(ClientError::SchemaInvalid(format!(
                "fetching {url}: server returned {}",
                response.status
            )));
        }
        Ok(response.body)
    }
}

pub(crate) fn basic_auth_header(username: &str, password: &str) -> String {
    use base64::Engine;
    format!("Basic {}", base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}")))
}

fn join_url(base: &Url, path: &str) -> String {
    let mut joined = base.clone();
    joined.set_path(path);
    joined.to_string()
}

fn resource_name_from_path(path: &str) -> String {
    path.rsplit('/')
        .next()
        .unwrap_or(path)
        .trim_end_matches(".json")
        .to_string()
}

fn parse_resource(name: &str, doc: RawResourceDocument) -> ClientResult<ResourceDescriptor> {
    let mut operations = BTreeMap::new();
    for api in doc.apis {
        let path_template = api.path.unwrap_or_default();
        for raw_op in api.operations {
            let method = raw_op
                .http_method
                .parse::<reqwest::Method>()
                .map_err(|_| {
                    ClientError::SchemaInvalid(format!(
                        "resource '{name}' operation '{}': invalid HTTP method '{}'",
                        raw_op.nickname, raw_op.http_method
                    ))
                })?;
            let parameters = raw_op
                .parameters
                .into_iter()
                .map(super::catalog::RawParameter::into_descriptor)
                .collect();
            operations.insert(
                raw_op.nickname.clone(),
                OperationDescriptor {
                    name: raw_op.nickname,
                    method,
                    path_template: path_template.clone(),
                    parameters,
                    response_type: raw_op.response_class,
                    summary: raw_op.summary,
                },
            );
        }
    }
    Ok(ResourceDescriptor {
        name: name.to_string(),
        operations,
    })
}

fn parse_events(doc: RawEventsDocument) -> EventSchema {
    let events = doc
        .models
        .into_iter()
        .map(|(name, model)| {
            let fields = model
                .properties
                .into_iter()
                .map(|(field_name, raw_field)| FieldDescriptor {
                    name: field_name,
                    declared_type: raw_field.declared_type(),
                    description: raw_field.description,
                })
                .collect();
            (name, EventDescriptor { fields })
        })
        .collect();
    EventSchema::new(events)
}
