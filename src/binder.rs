//! Parameter Binder: turns a caller-supplied option map into a fully-shaped
//! [`RequestPlan`] (spec §4.2).
//!
//! Grounded on `packages/thaumic-core/src/sonos/soap.rs`'s `SoapRequestBuilder`,
//! which collects ordered arguments from callers and only assembles the
//! final request body once all of them have been gathered.

use std::collections::BTreeMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde_json::{Map, Value};

use crate::error::{ClientError, ClientResult};
use crate::schema::{OperationDescriptor, ParameterDescriptor, Placement, ValueType};
use crate::transport::RequestBody;

/// Characters that must be percent-encoded when substituted into a path
/// segment, beyond the control characters `CONTROLS` already covers.
const PATH_SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'/')
    .add(b'%');

/// A fully-assembled, placement-resolved HTTP request, ready for the
/// [`crate::invoker::HttpInvoker`] to send.
#[derive(Debug, Clone)]
pub struct RequestPlan {
    /// HTTP method.
    pub method: reqwest::Method,
    /// Path with every `{placeholder}` substituted, percent-encoded.
    pub path: String,
    /// Query-string pairs, in binding order. A list-typed parameter
    /// contributes one pair per element, all under the same key.
    pub query: Vec<(String, String)>,
    /// Resolved request body, if any parameter bound to body or form.
    pub body: Option<RequestBody>,
}

/// Binds `opts` against `op`'s declared parameters, producing a
/// [`RequestPlan`]. Does not mutate or consume `opts`: values are read by
/// reference, so the caller's map is reusable for a later call.
///
/// # Errors
///
/// Returns [`ClientError::MissingRequiredParameter`] if a required
/// parameter is absent from `opts`. Keys in `opts` that the operation does
/// not declare are silently ignored (spec §4.2: "bogus parameter
/// tolerance").
pub fn bind(op: &OperationDescriptor, opts: &BTreeMap<String, Value>) -> ClientResult<RequestPlan> {
    let mut path = op.path_template.clone();
    let mut query = Vec::new();
    let mut form_fields = Vec::new();
    let mut body_params: Vec<(String, Value)> = Vec::new();

    for param in &op.parameters {
        let value = match opts.get(&param.name) {
            Some(v) => v,
            None if param.required => {
                return Err(ClientError::MissingRequiredParameter(param.name.clone()))
            }
            None => continue,
        };

        match param.placement {
            Placement::Path => {
                let rendered = scalar_to_path_segment(value);
                let encoded = utf8_percent_encode(&rendered, PATH_SEGMENT).to_string();
                path = path.replace(&format!("{{{}}}", param.name), &encoded);
            }
            Placement::Query => push_query(&mut query, param, value),
            Placement::Form => push_form(&mut form_fields, param, value),
            Placement::Header => {
                // Header-placed parameters are not exercised by this API's
                // schema in practice; fold them into the query string so
                // their value is never silently dropped.
                push_query(&mut query, param, value);
            }
            Placement::Body => {
                body_params.push((param.name.clone(), wrap_body_value(param, value)));
            }
        }
    }

    let body = match body_params.len() {
        0 if form_fields.is_empty() => None,
        0 => Some(RequestBody::Form(form_fields)),
        1 => Some(RequestBody::Json(body_params.into_iter().next().unwrap().1)),
        _ => {
            let mut merged = Map::new();
            merged.extend(body_params);
            Some(RequestBody::Json(Value::Object(merged)))
        }
    };

    Ok(RequestPlan {
        method: op.method.clone(),
        path,
        query,
        body,
    })
}

fn push_query(query: &mut Vec<(String, String)>, param: &ParameterDescriptor, value: &Value) {
    match param.value_type {
        ValueType::List => {
            for element in list_elements(value) {
                query.push((param.name.clone(), scalar_to_query_string(&element)));
            }
        }
        ValueType::Scalar => query.push((param.name.clone(), scalar_to_query_string(value))),
    }
}

fn push_form(form_fields: &mut Vec<(String, String)>, param: &ParameterDescriptor, value: &Value) {
    match param.value_type {
        ValueType::List => {
            for element in list_elements(value) {
                form_fields.push((param.name.clone(), scalar_to_query_string(&element)));
            }
        }
        ValueType::Scalar => form_fields.push((param.name.clone(), scalar_to_query_string(value))),
    }
}

/// Applies the `variables`/`fields` wrap-once rule (spec §4.2 step 4): a
/// list-typed parameter always serializes as a JSON array, never wrapped.
/// Otherwise, a parameter named `variables` or `fields` whose value is a
/// JSON object not already keyed by that name is wrapped as
/// `{"variables": value}` (or `{"fields": value}`); a value already
/// wrapped that way, or any other parameter, passes through unchanged
/// (spec §8: wrapped exactly once even when re-invoked).
fn wrap_body_value(param: &ParameterDescriptor, value: &Value) -> Value {
    if param.value_type == ValueType::List {
        return Value::Array(list_elements(value));
    }
    if matches!(param.name.as_str(), "variables" | "fields") {
        if let Value::Object(obj) = value {
            if !obj.contains_key(&param.name) {
                let mut wrapper = Map::new();
                wrapper.insert(param.name.clone(), value.clone());
                return Value::Object(wrapper);
            }
        }
    }
    value.clone()
}

fn list_elements(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        other => vec![other.clone()],
    }
}

fn scalar_to_path_segment(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => scalar_to_query_string(other),
    }
}

fn scalar_to_query_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn op(parameters: Vec<ParameterDescriptor>) -> OperationDescriptor {
        OperationDescriptor {
            name: "op".into(),
            method: reqwest::Method::POST,
            path_template: "/bridges/{bridgeId}".into(),
            parameters,
            response_type: None,
            summary: None,
        }
    }

    fn param(name: &str, placement: Placement, required: bool, value_type: ValueType) -> ParameterDescriptor {
        ParameterDescriptor {
            name: name.into(),
            placement,
            required,
            value_type,
            description: None,
        }
    }

    #[test]
    fn missing_required_parameter_fails() {
        let descriptor = op(vec![param("bridgeId", Placement::Path, true, ValueType::Scalar)]);
        let opts = BTreeMap::new();
        let err = bind(&descriptor, &opts).unwrap_err();
        assert_eq!(err.code(), "missing_required_parameter");
    }

    #[test]
    fn path_parameter_is_substituted_and_encoded() {
        let descriptor = op(vec![param("bridgeId", Placement::Path, true, ValueType::Scalar)]);
        let mut opts = BTreeMap::new();
        opts.insert("bridgeId".into(), Value::String("a b/c".into()));
        let plan = bind(&descriptor, &opts).unwrap();
        assert_eq!(plan.path, "/bridges/a%20b%2Fc");
    }

    #[test]
    fn undeclared_keys_are_silently_dropped() {
        let descriptor = op(vec![param("bridgeId", Placement::Path, true, ValueType::Scalar)]);
        let mut opts = BTreeMap::new();
        opts.insert("bridgeId".into(), Value::String("b1".into()));
        opts.insert("nonsense".into(), Value::String("ignored".into()));
        let plan = bind(&descriptor, &opts).unwrap();
        assert_eq!(plan.path, "/bridges/b1");
    }

    #[test]
    fn list_query_parameter_repeats_key() {
        let descriptor = op(vec![
            param("bridgeId", Placement::Path, true, ValueType::Scalar),
            param("channels", Placement::Query, false, ValueType::List),
        ]);
        let mut opts = BTreeMap::new();
        opts.insert("bridgeId".into(), Value::String("b1".into()));
        opts.insert(
            "channels".into(),
            Value::Array(vec![Value::String("c1".into()), Value::String("c2".into())]),
        );
        let plan = bind(&descriptor, &opts).unwrap();
        assert_eq!(
            plan.query,
            vec![("channels".to_string(), "c1".to_string()), ("channels".to_string(), "c2".to_string())]
        );
    }

    #[test]
    fn single_variables_body_parameter_wraps_without_nesting_under_its_name() {
        let descriptor = op(vec![
            param("bridgeId", Placement::Path, true, ValueType::Scalar),
            param("variables", Placement::Body, false, ValueType::Scalar),
        ]);
        let mut opts = BTreeMap::new();
        opts.insert("bridgeId".into(), Value::String("b1".into()));
        let mut vars = Map::new();
        vars.insert("key".into(), Value::String("value".into()));
        opts.insert("variables".into(), Value::Object(vars));
        let plan = bind(&descriptor, &opts).unwrap();
        match plan.body {
            Some(RequestBody::Json(Value::Object(obj))) => {
                assert!(obj.get("variables").unwrap().is_object());
                assert_eq!(obj.len(), 1);
            }
            _ => panic!("expected a JSON body"),
        }
    }

    #[test]
    fn already_wrapped_variables_value_is_not_wrapped_again() {
        let descriptor = op(vec![param("variables", Placement::Body, false, ValueType::Scalar)]);
        let mut opts = BTreeMap::new();
        let mut inner = Map::new();
        inner.insert("key".into(), Value::String("value".into()));
        let mut already_wrapped = Map::new();
        already_wrapped.insert("variables".into(), Value::Object(inner.clone()));
        opts.insert("variables".into(), Value::Object(already_wrapped));
        let plan = bind(&descriptor, &opts).unwrap();
        match plan.body {
            Some(RequestBody::Json(Value::Object(obj))) => {
                assert_eq!(obj.len(), 1);
                assert_eq!(obj.get("variables").unwrap(), &Value::Object(inner));
            }
            _ => panic!("expected a JSON body"),
        }
    }

    #[test]
    fn single_non_wrapping_body_parameter_is_used_as_is_not_nested_under_its_name() {
        let descriptor = op(vec![param("endpoint", Placement::Body, false, ValueType::Scalar)]);
        let mut opts = BTreeMap::new();
        opts.insert("endpoint".into(), Value::String("PJSIP/softphone".into()));
        let plan = bind(&descriptor, &opts).unwrap();
        match plan.body {
            Some(RequestBody::Json(Value::String(s))) => assert_eq!(s, "PJSIP/softphone"),
            other => panic!("expected a raw JSON string body, got {other:?}"),
        }
    }

    #[test]
    fn multiple_body_parameters_merge_into_one_object_keyed_by_name() {
        let descriptor = op(vec![
            param("endpoint", Placement::Body, false, ValueType::Scalar),
            param("app", Placement::Body, false, ValueType::Scalar),
        ]);
        let mut opts = BTreeMap::new();
        opts.insert("endpoint".into(), Value::String("PJSIP/softphone".into()));
        opts.insert("app".into(), Value::String("unittests".into()));
        let plan = bind(&descriptor, &opts).unwrap();
        match plan.body {
            Some(RequestBody::Json(Value::Object(obj))) => {
                assert_eq!(obj.get("endpoint").unwrap(), "PJSIP/softphone");
                assert_eq!(obj.get("app").unwrap(), "unittests");
            }
            _ => panic!("expected a JSON body"),
        }
    }

    #[test]
    fn list_typed_body_parameter_serializes_as_array_never_wrapped() {
        let descriptor = op(vec![param("fields", Placement::Body, false, ValueType::List)]);
        let mut opts = BTreeMap::new();
        opts.insert(
            "fields".into(),
            Value::Array(vec![Value::String("a".into()), Value::String("b".into())]),
        );
        let plan = bind(&descriptor, &opts).unwrap();
        match plan.body {
            Some(RequestBody::Json(Value::Array(items))) => assert_eq!(items.len(), 2),
            other => panic!("expected a raw JSON array body, got {other:?}"),
        }
    }

    #[test]
    fn opts_are_not_mutated() {
        let descriptor = op(vec![param("bridgeId", Placement::Path, true, ValueType::Scalar)]);
        let mut opts = BTreeMap::new();
        opts.insert("bridgeId".into(), Value::String("b1".into()));
        let before = opts.clone();
        let _ = bind(&descriptor, &opts).unwrap();
        assert_eq!(opts, before);
    }
}
