//! Dynamic client for a schema-described telephony control REST+WebSocket
//! API (in the shape of Asterisk's ARI).
//!
//! The client loads its operation catalog and event model from the
//! server's own self-description documents at connect time, so adding an
//! operation or event field to the server requires no client code change.
//! See [`Client`] for the main entry point.

pub mod binder;
pub mod client;
pub mod config;
pub mod creators;
pub mod error;
pub mod invoker;
pub mod listeners;
pub mod resource;
pub mod router;
pub mod schema;
pub mod transport;
pub mod ws_session;

pub use client::Client;
pub use config::ConnectOptions;
pub use creators::CreatorArgs;
pub use error::{ClientError, ClientResult};
pub use resource::ResourceInstance;
pub use router::RouterError;
pub use schema::KnownKind;
