use std::sync::Arc;
use std::time::Duration;

use idreq::prelude::{ApiRequest, RequestExecutor, UreqTransport};
use serde_json::Value;

mod common;

use common::{MockResponse, MockServer};

fn transport() -> UreqTransport {
    UreqTransport::builder()
        .timeout(Duration::from_secs(2))
        .build()
        .expect("transport should build")
}

#[test]
fn redirect_is_followed_inside_the_transport() {
    let server = MockServer::start_responses(vec![
        MockResponse::new(302, vec![("Location", "/api/v1/users/u1")], b"".to_vec()),
        MockResponse::new(
            200,
            vec![("Content-Type", "application/json")],
            br#"{"id":"u1"}"#.to_vec(),
        ),
    ]);

    let executor = RequestExecutor::new(Arc::new(transport()));
    let response = executor
        .execute(
            ApiRequest::get(format!("{}/api/v1/me", server.base_url)).expect("url should parse"),
        )
        .expect("redirect should resolve to the final response");

    assert_eq!(response.status(), 200);
    let body: Value = response.json().expect("body should decode");
    assert_eq!(body["id"], "u1");

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].path, "/api/v1/me");
    assert_eq!(requests[1].path, "/api/v1/users/u1");
    // Redirect hops are not retries; no retry bookkeeping appears.
    assert!(!requests[1].headers.contains_key("x-retry-count"));
}

#[test]
fn see_other_switches_post_to_get_and_drops_the_body() {
    let server = MockServer::start_responses(vec![
        MockResponse::new(303, vec![("Location", "/api/v1/users/u9")], b"".to_vec()),
        MockResponse::new(
            200,
            vec![("Content-Type", "application/json")],
            br#"{"id":"u9"}"#.to_vec(),
        ),
    ]);

    let executor = RequestExecutor::new(Arc::new(transport()));
    let request = ApiRequest::post(format!("{}/api/v1/users", server.base_url))
        .expect("url should parse")
        .json(&serde_json::json!({ "profile": { "login": "jdoe" } }))
        .expect("body should serialize");

    let response = executor
        .execute(request)
        .expect("see-other redirect should resolve");
    assert_eq!(response.status(), 200);

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].method, "POST");
    assert!(!requests[0].body.is_empty());
    assert_eq!(requests[1].method, "GET");
    assert!(requests[1].body.is_empty());
    assert!(!requests[1].headers.contains_key("content-type"));
}

#[test]
fn temporary_redirect_replays_a_buffered_body() {
    let server = MockServer::start_responses(vec![
        MockResponse::new(307, vec![("Location", "/api/v1/users?retry=1")], b"".to_vec()),
        MockResponse::new(
            201,
            vec![("Content-Type", "application/json")],
            br#"{"id":"u2"}"#.to_vec(),
        ),
    ]);

    let executor = RequestExecutor::new(Arc::new(transport()));
    let payload = serde_json::json!({ "profile": { "login": "asmith" } });
    let request = ApiRequest::post(format!("{}/api/v1/users", server.base_url))
        .expect("url should parse")
        .json(&payload)
        .expect("body should serialize");

    let response = executor
        .execute(request)
        .expect("temporary redirect should replay the body");
    assert_eq!(response.status(), 201);

    let requests = server.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].method, "POST");
    assert_eq!(requests[0].body, requests[1].body);
}

#[test]
fn inconsistent_pool_caps_still_produce_a_working_transport() {
    let server = MockServer::start_responses(vec![MockResponse::new(
        200,
        vec![("Content-Type", "application/json")],
        br#"{"ok":true}"#.to_vec(),
    )]);

    // Total below per-host is inconsistent; both caps revert to defaults.
    let transport = UreqTransport::builder()
        .timeout(Duration::from_secs(2))
        .max_connections_per_host(64)
        .max_connections_total(8)
        .build()
        .expect("misconfigured caps fall back instead of failing");

    let executor = RequestExecutor::new(Arc::new(transport));
    let response = executor
        .execute(ApiRequest::get(format!("{}/ping", server.base_url)).expect("url should parse"))
        .expect("request should succeed");
    assert_eq!(response.status(), 200);
}

#[test]
fn proxy_configuration_with_credentials_builds() {
    let transport = UreqTransport::builder()
        .timeout(Duration::from_secs(1))
        .proxy("proxy.internal.example.com", 8080)
        .proxy_basic_auth("svc-idreq", "hunter2")
        .build();

    assert!(transport.is_ok());
}

#[test]
fn response_body_is_fully_buffered_with_content_length() {
    let payload = br#"{"items":[1,2,3,4,5]}"#.to_vec();
    let server = MockServer::start_responses(vec![MockResponse::new(
        200,
        vec![("Content-Type", "application/json")],
        payload.clone(),
    )]);

    let executor = RequestExecutor::new(Arc::new(transport()));
    let response = executor
        .execute(ApiRequest::get(format!("{}/items", server.base_url)).expect("url should parse"))
        .expect("request should succeed");

    assert_eq!(response.content_length(), payload.len());
    assert_eq!(response.body().as_ref(), payload.as_slice());
}

#[test]
fn oversized_response_body_is_a_fatal_transport_error() {
    let server = MockServer::start_responses(vec![MockResponse::new(
        200,
        vec![("Content-Type", "text/plain")],
        b"0123456789".to_vec(),
    )]);

    let transport = UreqTransport::builder()
        .timeout(Duration::from_secs(2))
        .max_response_body_bytes(4)
        .build()
        .expect("transport should build");
    let executor = RequestExecutor::new(Arc::new(transport));

    let error = executor
        .execute(ApiRequest::get(format!("{}/large", server.base_url)).expect("url should parse"))
        .expect_err("body exceeds the configured limit");
    assert_eq!(error.code(), idreq::ErrorCode::Transport);
}
