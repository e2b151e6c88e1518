//! End-to-end schema loading and operation invocation against a mock ARI
//! server, driven entirely through the public `Client` facade.

use serde_json::json;
use stasis_client::{ClientError, ConnectOptions};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn mount_minimal_schema(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/ari/api-docs/resources.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "apis": [
                {"path": "/ari/api-docs/bridges.json"},
                {"path": "/ari/api-docs/events.json"}
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/ari/api-docs/bridges.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "apis": [
                {
                    "path": "/bridges",
                    "operations": [
                        {"nickname": "list", "http_method": "GET", "parameters": []},
                        {
                            "nickname": "createWithId",
                            "http_method": "POST",
                            "parameters": [
                                {"name": "bridgeId", "param_type": "path", "required": true},
                                {"name": "name", "param_type": "query", "required": false}
                            ]
                        }
                    ]
                },
                {
                    "path": "/bridges/{bridgeId}/addChannel",
                    "operations": [
                        {
                            "nickname": "addChannel",
                            "http_method": "POST",
                            "parameters": [
                                {"name": "bridgeId", "param_type": "path", "required": true},
                                {
                                    "name": "channel",
                                    "param_type": "query",
                                    "required": true,
                                    "value_type": "List[string]"
                                },
                                {"name": "variables", "param_type": "body", "required": false}
                            ]
                        }
                    ]
                }
            ]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/ari/api-docs/events.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "models": {
                "BridgeCreated": {
                    "properties": {
                        "bridge": {"type": "Bridge"}
                    }
                }
            }
        })))
        .mount(server)
        .await;
}

fn options(server: &MockServer) -> ConnectOptions {
    ConnectOptions::new(server.uri(), "user", "pass")
}

#[tokio::test]
async fn connect_loads_catalog_and_events() {
    let server = MockServer::start().await;
    mount_minimal_schema(&server).await;

    let client = stasis_client::Client::connect(options(&server)).await.unwrap();
    let catalog = client.catalog();
    assert!(catalog.operation("bridges", "list").is_some());
    assert!(catalog.operation("bridges", "createWithId").is_some());
    assert!(catalog.operation("bridges", "addChannel").is_some());
}

#[tokio::test]
async fn connect_fails_with_schema_invalid_on_malformed_root_document() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ari/api-docs/resources.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
        .mount(&server)
        .await;

    let err = stasis_client::Client::connect(options(&server)).await.unwrap_err();
    assert_eq!(err.code(), "schema_invalid");
}

#[tokio::test]
async fn connect_fails_with_schema_invalid_when_root_document_missing_apis_key() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ari/api-docs/resources.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"nope": true})))
        .mount(&server)
        .await;

    let err = stasis_client::Client::connect(options(&server)).await.unwrap_err();
    assert_eq!(err.code(), "schema_invalid");
}

#[tokio::test]
async fn call_with_bogus_parameter_is_tolerated() {
    let server = MockServer::start().await;
    mount_minimal_schema(&server).await;
    Mock::given(method("GET"))
        .and(path("/bridges"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": "b1"}])))
        .mount(&server)
        .await;

    let client = stasis_client::Client::connect(options(&server)).await.unwrap();
    let mut opts = std::collections::BTreeMap::new();
    opts.insert("nonsenseField".to_string(), json!("ignored"));
    let result = client
        .call("bridges", "list", opts, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result[0]["id"], "b1");
}

#[tokio::test]
async fn call_missing_required_parameter_never_reaches_the_server() {
    let server = MockServer::start().await;
    mount_minimal_schema(&server).await;
    // No mock registered for /bridges/{bridgeId}/addChannel: if the binder
    // let the call through without bridgeId, wiremock would 404 with a
    // connection-wide mismatch rather than our own error variant.

    let client = stasis_client::Client::connect(options(&server)).await.unwrap();
    let opts = std::collections::BTreeMap::new();
    let err = client
        .call("bridges", "addChannel", opts, &CancellationToken::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "missing_required_parameter");
}

#[tokio::test]
async fn server_error_status_surfaces_message_field() {
    let server = MockServer::start().await;
    mount_minimal_schema(&server).await;
    Mock::given(method("GET"))
        .and(path("/bridges"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "no such bridge"})))
        .mount(&server)
        .await;

    let client = stasis_client::Client::connect(options(&server)).await.unwrap();
    let err = client
        .call("bridges", "list", std::collections::BTreeMap::new(), &CancellationToken::new())
        .await
        .unwrap_err();
    match err {
        ClientError::ServerError { status, message } => {
            assert_eq!(status, 404);
            assert_eq!(message, "no such bridge");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn variables_object_wraps_once_in_request_body() {
    let server = MockServer::start().await;
    mount_minimal_schema(&server).await;
    Mock::given(method("POST"))
        .and(path("/bridges/b1/addChannel"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
        .mount(&server)
        .await;

    let client = stasis_client::Client::connect(options(&server)).await.unwrap();
    let mut opts = std::collections::BTreeMap::new();
    opts.insert("bridgeId".to_string(), json!("b1"));
    opts.insert("channel".to_string(), json!(["c1", "c2"]));
    let mut vars = serde_json::Map::new();
    vars.insert("key".to_string(), json!("value"));
    opts.insert("variables".to_string(), serde_json::Value::Object(vars));

    let result = client
        .call("bridges", "addChannel", opts, &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(result["ok"], true);
}

#[tokio::test]
async fn wrap_promotes_list_response_elements_with_independent_listener_tables() {
    let server = MockServer::start().await;
    mount_minimal_schema(&server).await;
    Mock::given(method("GET"))
        .and(path("/bridges"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "b1", "name": "one"},
            {"id": "b2", "name": "two"}
        ])))
        .mount(&server)
        .await;

    let client = stasis_client::Client::connect(options(&server)).await.unwrap();
    let body = client
        .call("bridges", "list", std::collections::BTreeMap::new(), &CancellationToken::new())
        .await
        .unwrap();
    let instances: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|b| client.wrap(stasis_client::KnownKind::Bridge, b))
        .collect();

    assert_eq!(instances[0].identity(), "b1");
    assert_eq!(instances[1].identity(), "b2");
    assert!(!std::sync::Arc::ptr_eq(&instances[0], &instances[1]));
}
