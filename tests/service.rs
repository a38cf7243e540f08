//! End-to-end calls through the RPC protocol, the HTTP gateway and the internal socket.

use std::sync::Arc;

use password_service::config::GatewayUpstream;
use password_service::rpc::protocol::{FaultCode, CODE_PRECONDITION_FAILED};
use password_service::rpc::{Call, Reply, RpcClient};
use password_service::ShutdownOutcome;
use reqwest::StatusCode;
use serde_json::{json, Value};

mod common;

const PASSWORD: &str = "correct horse battery staple";

#[tokio::test]
async fn test_rpc_hash_and_verify() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::test_config(dir.path());
    let running = common::start(config.clone(), common::argon2(&config)).await;
    let mut conn = common::rpc_connect(running.local_addr()).await;

    let hashed = common::expect_hashed(conn.call(common::hash_call(PASSWORD)).await.unwrap());
    assert!(hashed.error.is_none());
    assert!(hashed.hash.starts_with("$argon2id$"));

    let ok = conn.call(common::verify_call(PASSWORD, &hashed.hash)).await.unwrap();
    let ok = common::expect_verified(ok);
    assert!(ok.valid);
    assert!(ok.error.is_none());

    let wrong = conn.call(common::verify_call("Tr0ub4dor&3", &hashed.hash)).await.unwrap();
    let wrong = common::expect_verified(wrong);
    assert!(!wrong.valid);
    assert!(wrong.error.is_none());

    running.shutdown().await;
}

#[tokio::test]
async fn test_rpc_validation_errors() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::test_config(dir.path());
    let running = common::start(config.clone(), common::argon2(&config)).await;
    let mut conn = common::rpc_connect(running.local_addr()).await;

    let empty = common::expect_hashed(conn.call(common::hash_call("")).await.unwrap());
    assert_eq!(empty.hash, "");
    let error = empty.error.unwrap();
    assert_eq!(error.code, CODE_PRECONDITION_FAILED);
    assert_eq!(error.message, "password value is mandatory");

    let no_hash = common::expect_verified(conn.call(common::verify_call("pw", "")).await.unwrap());
    assert!(!no_hash.valid);
    assert_eq!(no_hash.error.unwrap().message, "hash value is mandatory");

    let garbage = conn.call(common::verify_call("pw", "not-a-phc-string")).await.unwrap();
    let garbage = common::expect_verified(garbage);
    assert!(!garbage.valid);
    assert_eq!(garbage.error.unwrap().code, 400);

    running.shutdown().await;
}

#[tokio::test]
async fn test_rpc_ping() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::test_config(dir.path());
    let running = common::start(config.clone(), common::argon2(&config)).await;
    let mut conn = common::rpc_connect(running.local_addr()).await;

    match conn.call(Call::Ping).await.unwrap() {
        Reply::Pong(pong) => assert!(pong.timestamp.seconds > 1_600_000_000),
        other => panic!("unexpected reply: {other:?}"),
    }
    running.shutdown().await;
}

#[tokio::test]
async fn test_internal_socket_client() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::test_config(dir.path());
    let running = common::start(config.clone(), common::argon2(&config)).await;

    let socket = running.internal_socket().unwrap().to_path_buf();
    let client = RpcClient::connect(&socket, &config.rpc).await.unwrap();
    let hashed = common::expect_hashed(client.call(common::hash_call(PASSWORD)).await.unwrap());
    let verified = client.call(common::verify_call(PASSWORD, &hashed.hash)).await.unwrap();
    assert!(common::expect_verified(verified).valid);
    assert_eq!(client.idle_count(), 1);

    running.shutdown().await;
}

async fn http_gateway(upstream: GatewayUpstream) {
    let dir = tempfile::tempdir().unwrap();
    let mut config = common::test_config(dir.path());
    config.http.gateway_upstream = upstream;
    let running = common::start(config.clone(), common::argon2(&config)).await;
    let addr = running.local_addr();
    let http = reqwest::Client::new();

    let hashed: Value = http
        .post(common::http_url(addr, "/v1/password/hash"))
        .json(&json!({ "password": PASSWORD }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(hashed["error"], Value::Null);
    let hash = hashed["hash"].as_str().unwrap().to_string();
    assert!(hash.starts_with("$argon2id$"));

    let verified: Value = http
        .post(common::http_url(addr, "/v1/password/verify"))
        .json(&json!({ "password": PASSWORD, "hash": hash }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(verified, json!({ "valid": true, "error": null }));

    let rejected: Value = http
        .post(common::http_url(addr, "/v1/password/verify"))
        .json(&json!({ "password": "wrong", "hash": hash }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(rejected, json!({ "valid": false, "error": null }));

    assert_eq!(running.shutdown().await, ShutdownOutcome::Clean);
}

#[tokio::test]
async fn test_http_gateway_over_internal_socket() {
    http_gateway(GatewayUpstream::InternalSocket).await;
}

#[tokio::test]
async fn test_http_gateway_in_process() {
    http_gateway(GatewayUpstream::InProcess).await;
}

#[tokio::test]
async fn test_http_errors() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::test_config(dir.path());
    let running = common::start(config.clone(), common::argon2(&config)).await;
    let addr = running.local_addr();
    let http = reqwest::Client::new();

    let validation = http
        .post(common::http_url(addr, "/v1/password/hash"))
        .json(&json!({}))
        .send()
        .await
        .unwrap();
    assert_eq!(validation.status(), StatusCode::OK);
    let body: Value = validation.json().await.unwrap();
    assert_eq!(body["hash"], "");
    assert_eq!(body["error"]["code"], 412);

    let malformed = http
        .post(common::http_url(addr, "/v1/password/hash"))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(malformed.status(), StatusCode::BAD_REQUEST);
    assert!(malformed.headers().contains_key("x-request-id"));
    let body: Value = malformed.json().await.unwrap();
    assert_eq!(body["code"], "invalid_argument");

    let missing = http.get(common::http_url(addr, "/v2/nothing")).send().await.unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);

    running.shutdown().await;
}

#[tokio::test]
async fn test_telemetry_endpoints() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::test_config(dir.path());
    let running = common::start(config.clone(), common::argon2(&config)).await;
    let addr = running.local_addr();
    let http = reqwest::Client::new();

    let health: Value = http
        .get(common::http_url(addr, "/healthz"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "OK");

    let finger: Value = http
        .get(common::http_url(addr, "/.well-known/finger"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(finger["service-name"], "Password");
    assert_eq!(finger["endpoints"], json!(["rpc", "http"]));

    let ping: Value = http
        .get(common::http_url(addr, "/v1/ping"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let timestamp = ping["timestamp"].as_str().unwrap();
    assert!(timestamp.starts_with("20") && timestamp.ends_with('Z'), "{timestamp}");

    let metrics = http.get(common::http_url(addr, "/metrics")).send().await.unwrap();
    assert_eq!(metrics.status(), StatusCode::NOT_FOUND);

    running.shutdown().await;
}

#[tokio::test]
async fn test_handler_panic_is_contained() {
    let dir = tempfile::tempdir().unwrap();
    let config = common::test_config(dir.path());
    let running = common::start(config, Arc::new(common::PanickingHandler)).await;
    let addr = running.local_addr();

    let mut conn = common::rpc_connect(addr).await;
    match conn.call(common::hash_call("panic")).await.unwrap() {
        Reply::Fault(fault) => {
            assert_eq!(fault.code, FaultCode::Internal);
            assert_eq!(fault.message, "internal error");
        }
        other => panic!("unexpected reply: {other:?}"),
    }
    // Same connection keeps working.
    let ok = common::expect_hashed(conn.call(common::hash_call("fine")).await.unwrap());
    assert_eq!(ok.hash, "ok:fine");

    let http = reqwest::Client::new();
    let response = http
        .post(common::http_url(addr, "/v1/password/hash"))
        .json(&json!({ "password": "panic" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, json!({ "code": "internal", "error": "internal error" }));

    assert_eq!(running.shutdown().await, ShutdownOutcome::Clean);
}
