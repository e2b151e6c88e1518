//! Schema types and the loader that materializes them from the server's
//! self-description documents (spec §2 component 1, §4.1).

pub mod catalog;
pub mod events;
pub mod loader;

pub use catalog::{Catalog, OperationDescriptor, ParameterDescriptor, Placement, ResourceDescriptor, ValueType};
pub use events::{EventDescriptor, EventSchema, FieldDescriptor, KnownKind};
pub use loader::SchemaLoader;
