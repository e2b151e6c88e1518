//! Operation catalog types (spec §3: Catalog, OperationDescriptor,
//! ParameterDescriptor).

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::error::{ClientError, ClientResult};

/// Where a parameter's value is placed in the HTTP request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    /// Substituted into a `{placeholder}` in the path template.
    Path,
    /// Added to the query string.
    Query,
    /// Contributes to the JSON request body.
    Body,
    /// Added to a URL-encoded form body.
    Form,
    /// Added as a request header.
    Header,
}

impl Placement {
    /// Parses a placement name, treating anything unrecognized as `Query`
    /// (spec §3: "The binder treats unknown placements as query").
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw {
            "path" => Self::Path,
            "body" => Self::Body,
            "form" => Self::Form,
            "header" => Self::Header,
            _ => Self::Query,
        }
    }
}

/// Declared shape of a parameter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueType {
    /// A single scalar value.
    Scalar,
    /// A list of values.
    List,
}

/// Describes a single parameter accepted by an operation.
#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    /// Parameter name, matching the caller-supplied option map key.
    pub name: String,
    /// Where this parameter's value is placed in the request.
    pub placement: Placement,
    /// Whether the operation fails without this parameter.
    pub required: bool,
    /// Declared scalar-or-list shape.
    pub value_type: ValueType,
    /// Human-readable description, if the schema document provided one.
    pub description: Option<String>,
}

/// Describes a single callable operation on a resource (spec §3).
#[derive(Debug, Clone)]
pub struct OperationDescriptor {
    /// Operation name, unique within its resource.
    pub name: String,
    /// HTTP method.
    pub method: reqwest::Method,
    /// Path template, containing named `{placeholders}`.
    pub path_template: String,
    /// Ordered parameter list.
    pub parameters: Vec<ParameterDescriptor>,
    /// Declared response type name, if any.
    pub response_type: Option<String>,
    /// Short human-readable summary, if any.
    pub summary: Option<String>,
}

impl OperationDescriptor {
    /// Validates that every `{placeholder}` in the path template corresponds
    /// to exactly one `Path`-placement parameter (spec §3 invariant).
    fn validate(&self) -> ClientResult<()> {
        let placeholders = extract_placeholders(&self.path_template);
        for placeholder in &placeholders {
            let matches = self
                .parameters
                .iter()
                .filter(|p| p.placement == Placement::Path && &p.name == placeholder)
                .count();
            if matches != 1 {
                return Err(ClientError::SchemaInvalid(format!(
                    "operation '{}': path placeholder '{{{}}}' must match exactly one path parameter, found {}",
                    self.name, placeholder, matches
                )));
            }
        }
        Ok(())
    }
}

fn extract_placeholders(path_template: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut chars = path_template.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        if c == '{' {
            if let Some(end) = path_template[start..].find('}') {
                out.push(path_template[start + 1..start + end].to_string());
            }
        }
    }
    out
}

/// A single resource's set of operations (spec §3).
#[derive(Debug, Clone, Default)]
pub struct ResourceDescriptor {
    /// Resource name, e.g. `"bridges"`.
    pub name: String,
    /// Operations keyed by operation name, unique within the resource.
    pub operations: BTreeMap<String, OperationDescriptor>,
}

impl ResourceDescriptor {
    fn validate(&self) -> ClientResult<()> {
        for op in self.operations.values() {
            op.validate()?;
        }
        Ok(())
    }
}

/// The full operation catalog, immutable once loaded (spec §3).
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    resources: BTreeMap<String, ResourceDescriptor>,
}

impl Catalog {
    /// Builds a catalog from its resources, validating every operation's
    /// path-placeholder invariant.
    pub fn new(resources: BTreeMap<String, ResourceDescriptor>) -> ClientResult<Self> {
        for resource in resources.values() {
            resource.validate()?;
        }
        Ok(Self { resources })
    }

    /// Looks up a resource by name.
    #[must_use]
    pub fn resource(&self, name: &str) -> Option<&ResourceDescriptor> {
        self.resources.get(name)
    }

    /// Looks up an operation by resource and operation name.
    #[must_use]
    pub fn operation(&self, resource: &str, operation: &str) -> Option<&OperationDescriptor> {
        self.resources.get(resource)?.operations.get(operation)
    }

    /// Iterates over all resource names.
    pub fn resource_names(&self) -> impl Iterator<Item = &str> {
        self.resources.keys().map(String::as_str)
    }
}

/// Raw wire shape of a root resources document: a list of resource-doc
/// references.
#[derive(Debug, Deserialize)]
pub struct RawRootDocument {
    /// Entries pointing at each resource document.
    pub apis: Vec<RawRootApiEntry>,
}

/// One entry in a root resources document.
#[derive(Debug, Deserialize)]
pub struct RawRootApiEntry {
    /// Path to the resource document, relative to the root document.
    pub path: String,
}

/// Raw wire shape of a single resource document.
#[derive(Debug, Deserialize)]
pub struct RawResourceDocument {
    /// `basePath` as advertised by the server; rewritten to the configured
    /// host during normalization (spec §4.1).
    #[serde(default)]
    pub base_path: Option<String>,
    /// Declared operation groups.
    pub apis: Vec<RawResourceApiEntry>,
}

/// One API group within a resource document.
#[derive(Debug, Deserialize)]
pub struct RawResourceApiEntry {
    /// Path template for this group's operations (may itself contain
    /// `{placeholders}` shared by all operations in the group).
    #[serde(default)]
    pub path: Option<String>,
    /// Declared operations.
    pub operations: Vec<RawOperation>,
}

/// Raw wire shape of a single operation.
#[derive(Debug, Deserialize)]
pub struct RawOperation {
    /// Operation name.
    pub nickname: String,
    /// HTTP method, e.g. `"GET"`.
    pub http_method: String,
    /// Declared parameters.
    #[serde(default)]
    pub parameters: Vec<RawParameter>,
    /// Declared response type, if any.
    #[serde(default)]
    pub response_class: Option<String>,
    /// Human-readable summary, if any.
    #[serde(default)]
    pub summary: Option<String>,
}

/// Raw wire shape of a single parameter.
#[derive(Debug, Deserialize)]
pub struct RawParameter {
    /// Parameter name.
    pub name: String,
    /// Placement, e.g. `"path"`, `"query"`, `"body"`.
    #[serde(default)]
    pub param_type: String,
    /// Whether the parameter is required.
    #[serde(default)]
    pub required: bool,
    /// Declared value type, e.g. `"List[string]"` implies a list.
    #[serde(default)]
    pub value_type: Option<String>,
    /// Human-readable description, if any.
    #[serde(default)]
    pub description: Option<String>,
}

impl RawParameter {
    pub(crate) fn into_descriptor(self) -> ParameterDescriptor {
        let value_type = match &self.value_type {
            Some(t) if t.starts_with("List[") || t.starts_with("Array[") => ValueType::List,
            _ => ValueType::Scalar,
        };
        ParameterDescriptor {
            name: self.name,
            placement: Placement::parse(&self.param_type),
            required: self.required,
            value_type,
            description: self.description,
        }
    }
}
