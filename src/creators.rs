//! Instance Creators: build a locally-identified [`ResourceInstance`]
//! before any request reaches the server, so a caller can attach listeners
//! to it immediately (spec §4.4).

use serde_json::{Map, Value};
use uuid::Uuid;

use crate::resource::{ResourceFactory, ResourceInstance};
use crate::schema::KnownKind;
use std::sync::Arc;

/// The four call shapes a creator accepts (spec §4.4): no arguments, a
/// caller-supplied identity, caller-supplied fields, or both.
#[derive(Debug, Clone, Default)]
pub struct CreatorArgs {
    /// Caller-supplied identity; a fresh UUID v4 is generated when absent.
    pub id: Option<String>,
    /// Caller-supplied initial fields, merged under the identity field.
    pub fields: Map<String, Value>,
}

impl CreatorArgs {
    /// `Creator()`.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// `Creator(id)`.
    #[must_use]
    pub fn with_id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            fields: Map::new(),
        }
    }

    /// `Creator(fields)`.
    #[must_use]
    pub fn with_fields(fields: Map<String, Value>) -> Self {
        Self { id: None, fields }
    }

    /// `Creator(id, fields)`.
    #[must_use]
    pub fn with_id_and_fields(id: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            id: Some(id.into()),
            fields,
        }
    }
}

/// Generates a fresh locally-created identity, in the lowercase
/// hyphenated UUID v4 shape the server's own IDs take.
#[must_use]
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

/// Instance creators, constructing a locally-identified instance ahead of
/// any network call.
pub struct Creators {
    factory: Arc<ResourceFactory>,
}

impl Creators {
    /// Creates a `Creators` sharing the given resource factory.
    pub fn new(factory: Arc<ResourceFactory>) -> Self {
        Self { factory }
    }

    /// Builds a locally-identified instance of `kind`, usable with any
    /// [`KnownKind`] including the ones with dedicated convenience
    /// constructors below.
    #[must_use]
    pub fn create(&self, kind: KnownKind, args: CreatorArgs) -> Arc<ResourceInstance> {
        let identity = args.id.unwrap_or_else(generate_id);
        let mut fields = args.fields;
        fields.insert(
            kind.identity_field().to_string(),
            Value::String(identity.clone()),
        );
        self.factory
            .wrap(kind, &Value::Object(fields), Some(&identity))
    }

    /// `Client::new_bridge` equivalent (spec §4.4 example).
    #[must_use]
    pub fn new_bridge(&self, args: CreatorArgs) -> Arc<ResourceInstance> {
        self.create(KnownKind::Bridge, args)
    }

    /// `Client::new_channel` equivalent (spec §4.4 example).
    #[must_use]
    pub fn new_channel(&self, args: CreatorArgs) -> Arc<ResourceInstance> {
        self.create(KnownKind::Channel, args)
    }

    /// `Client::new_playback` equivalent (spec §4.4 example).
    #[must_use]
    pub fn new_playback(&self, args: CreatorArgs) -> Arc<ResourceInstance> {
        self.create(KnownKind::Playback, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::invoker::HttpInvoker;
    use crate::router::InstanceIndex;
    use crate::schema::Catalog;
    use crate::transport::{RawRequest, RawResponse, Transport, TransportFailure};
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    struct NullTransport;

    #[async_trait]
    impl Transport for NullTransport {
        async fn send(&self, _request: RawRequest) -> Result<RawResponse, TransportFailure> {
            Ok(RawResponse {
                status: 200,
                body: Value::Null,
                reason: "OK".into(),
            })
        }
    }

    fn creators() -> Creators {
        let catalog = Arc::new(Catalog::new(BTreeMap::new()).unwrap());
        let invoker = Arc::new(HttpInvoker::new(
            Arc::new(NullTransport),
            url::Url::parse("http://localhost:8088").unwrap(),
            "u".into(),
            "p".into(),
        ));
        let factory = Arc::new(ResourceFactory::new(catalog, invoker, Arc::new(InstanceIndex::new())));
        Creators::new(factory)
    }

    #[test]
    fn generated_id_matches_uuid_v4_shape() {
        let id = generate_id();
        let parts: Vec<&str> = id.split('-').collect();
        assert_eq!(parts.len(), 5);
        assert_eq!(parts[0].len(), 8);
        assert_eq!(parts[1].len(), 4);
        assert_eq!(parts[2].len(), 4);
        assert_eq!(parts[3].len(), 4);
        assert_eq!(parts[4].len(), 12);
    }

    #[test]
    fn new_bridge_with_no_args_gets_generated_identity() {
        let creators = creators();
        let bridge = creators.new_bridge(CreatorArgs::none());
        assert!(!bridge.identity().is_empty());
        assert_eq!(bridge.kind(), KnownKind::Bridge);
    }

    #[test]
    fn new_channel_with_explicit_id_uses_it() {
        let creators = creators();
        let channel = creators.new_channel(CreatorArgs::with_id("my-channel-1"));
        assert_eq!(channel.identity(), "my-channel-1");
    }

    #[test]
    fn create_with_fields_merges_identity() {
        let creators = creators();
        let mut fields = Map::new();
        fields.insert("app".to_string(), Value::String("demo".into()));
        let playback = creators.create(
            KnownKind::Playback,
            CreatorArgs::with_id_and_fields("pb-1", fields),
        );
        assert_eq!(playback.identity(), "pb-1");
        assert_eq!(playback.fields().get("app").unwrap(), "demo");
    }
}
