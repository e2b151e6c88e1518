//! Event schema types (spec §3: EventSchema, EventDescriptor, KnownKinds).

use std::collections::BTreeMap;
use std::fmt;

use serde::Deserialize;

/// The closed set of resource kinds that participate in event scoping and
/// local instance creation (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum KnownKind {
    /// A mixing bridge.
    Bridge,
    /// A call leg.
    Channel,
    /// An audio playback.
    Playback,
    /// An in-progress recording.
    LiveRecording,
    /// A voicemail mailbox.
    Mailbox,
    /// A device's presence state.
    DeviceState,
    /// A SIP/PJSIP endpoint.
    Endpoint,
    /// A stored sound file.
    Sound,
    /// A stasis application context.
    Application,
}

impl KnownKind {
    /// All known kinds, in declaration order.
    pub const ALL: [KnownKind; 9] = [
        KnownKind::Bridge,
        KnownKind::Channel,
        KnownKind::Playback,
        KnownKind::LiveRecording,
        KnownKind::Mailbox,
        KnownKind::DeviceState,
        KnownKind::Endpoint,
        KnownKind::Sound,
        KnownKind::Application,
    ];

    /// Parses a kind from a schema type name, e.g. `"Bridge"`.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "Bridge" => Self::Bridge,
            "Channel" => Self::Channel,
            "Playback" => Self::Playback,
            "LiveRecording" => Self::LiveRecording,
            "Mailbox" => Self::Mailbox,
            "DeviceState" => Self::DeviceState,
            "Endpoint" => Self::Endpoint,
            "Sound" => Self::Sound,
            "Application" => Self::Application,
            _ => return None,
        })
    }

    /// The JSON field name used to identify an instance of this kind
    /// (spec §3 Identity rules: `id` for Bridge/Channel/Playback, `name`
    /// for everything else).
    #[must_use]
    pub fn identity_field(self) -> &'static str {
        match self {
            Self::Bridge | Self::Channel | Self::Playback => "id",
            Self::LiveRecording
            | Self::Mailbox
            | Self::DeviceState
            | Self::Endpoint
            | Self::Sound
            | Self::Application => "name",
        }
    }

    /// The resource namespace name this kind is exposed under, e.g.
    /// `"bridges"` for `Bridge`.
    #[must_use]
    pub fn resource_namespace(self) -> &'static str {
        match self {
            Self::Bridge => "bridges",
            Self::Channel => "channels",
            Self::Playback => "playbacks",
            Self::LiveRecording => "recordings",
            Self::Mailbox => "mailboxes",
            Self::DeviceState => "deviceStates",
            Self::Endpoint => "endpoints",
            Self::Sound => "sounds",
            Self::Application => "applications",
        }
    }

    /// The path-parameter name an operation on this kind's namespace uses
    /// to bind an instance's identity, e.g. `"bridgeId"` for the path
    /// template `/bridges/{bridgeId}`. Distinct from [`Self::identity_field`],
    /// which names the JSON field an event/body uses to *report* identity
    /// (`"id"`/`"name"`) rather than the operation parameter that *binds*
    /// it.
    #[must_use]
    pub fn identity_parameter(self) -> &'static str {
        match self {
            Self::Bridge => "bridgeId",
            Self::Channel => "channelId",
            Self::Playback => "playbackId",
            Self::LiveRecording => "recordingName",
            Self::Mailbox => "mailboxName",
            Self::DeviceState => "deviceName",
            Self::Endpoint => "endpointId",
            Self::Sound => "soundId",
            Self::Application => "applicationName",
        }
    }
}

impl fmt::Display for KnownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Bridge => "Bridge",
            Self::Channel => "Channel",
            Self::Playback => "Playback",
            Self::LiveRecording => "LiveRecording",
            Self::Mailbox => "Mailbox",
            Self::DeviceState => "DeviceState",
            Self::Endpoint => "Endpoint",
            Self::Sound => "Sound",
            Self::Application => "Application",
        })
    }
}

/// A single field declared on an event (spec §3).
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field name.
    pub name: String,
    /// Declared type name, e.g. `"Bridge"` or `"string"`.
    pub declared_type: String,
    /// Human-readable description, if any.
    pub description: Option<String>,
}

impl FieldDescriptor {
    /// Returns the [`KnownKind`] this field promotes to, if its declared
    /// type names one (spec §3: "promotable").
    #[must_use]
    pub fn promotable_kind(&self) -> Option<KnownKind> {
        KnownKind::parse(&self.declared_type)
    }
}

/// Describes a single event type's field shape (spec §3).
#[derive(Debug, Clone, Default)]
pub struct EventDescriptor {
    /// Fields, in declaration order (promotion order follows this, per
    /// spec §4.6 step 2).
    pub fields: Vec<FieldDescriptor>,
}

/// The full event schema, mapping event name to its descriptor (spec §3).
#[derive(Debug, Clone, Default)]
pub struct EventSchema {
    events: BTreeMap<String, EventDescriptor>,
}

impl EventSchema {
    /// Builds an event schema from its events.
    #[must_use]
    pub fn new(events: BTreeMap<String, EventDescriptor>) -> Self {
        Self { events }
    }

    /// Looks up an event's descriptor by name.
    #[must_use]
    pub fn event(&self, name: &str) -> Option<&EventDescriptor> {
        self.events.get(name)
    }
}

/// Raw wire shape of the events document's `models` section.
#[derive(Debug, Deserialize)]
pub struct RawEventsDocument {
    /// Event models, keyed by event name.
    pub models: BTreeMap<String, RawEventModel>,
}

/// Raw wire shape of a single event model.
#[derive(Debug, Deserialize)]
pub struct RawEventModel {
    /// Declared fields, keyed by field name.
    #[serde(default)]
    pub properties: BTreeMap<String, RawEventField>,
}

/// Raw wire shape of a single event field.
#[derive(Debug, Deserialize)]
pub struct RawEventField {
    /// Declared type name, e.g. `"Bridge"`.
    #[serde(rename = "type", default)]
    pub type_name: Option<String>,
    /// `$ref` form used by some schema dialects in place of `type`.
    #[serde(rename = "$ref", default)]
    pub type_ref: Option<String>,
    /// Human-readable description, if any.
    #[serde(default)]
    pub description: Option<String>,
}

impl RawEventField {
    pub(crate) fn declared_type(&self) -> String {
        self.type_name
            .clone()
            .or_else(|| self.type_ref.clone())
            .unwrap_or_else(|| "string".to_string())
    }
}
