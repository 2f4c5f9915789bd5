#![allow(clippy::tests_outside_test_module, reason = "integration tests live in tests/ dir")]
#![allow(clippy::expect_used, clippy::unwrap_used, reason = "panics are the assertion mechanism in integration tests")]

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tower::ServiceExt;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use tokenguard_core::identity::CredentialMap;
use tokenguard_core::store::MemoryUsageStore;
use tokenguard_core::{
    build_gateway_router, AdmissionController, GatewayState, IdentityResolver, LimitRegistry,
    ManualClock,
};
use tokenguard_types::{GatewayConfig, LimitProfile};

const START_MS: i64 = 1_700_000_000_000;

/// `"hello"` (1) + 3 per message + 4 per conversation + 50 output budget.
const HELLO_ESTIMATE: u64 = 58;

struct Harness {
    router: Router,
    controller: Arc<AdmissionController>,
    _worker: JoinHandle<()>,
}

fn harness(upstream_url: &str, profile: LimitProfile, timeout_secs: u64) -> Harness {
    let mut config = GatewayConfig::default();
    config.upstream.url = upstream_url.to_string();
    config.upstream.timeout_secs = timeout_secs;
    config.upstream.connect_timeout_secs = 1;

    let clock = ManualClock::new(START_MS);
    let store = Arc::new(MemoryUsageStore::new(Arc::new(clock.clone())));
    let controller =
        Arc::new(AdmissionController::new(store, LimitRegistry::new(profile), Arc::new(clock)));
    let credentials = CredentialMap::default().with_credential("sk-user1", "user1");
    let resolver = Arc::new(IdentityResolver::new(&config.identity, credentials));

    let (state, worker) =
        GatewayState::from_config(&config, Arc::clone(&controller), resolver).expect("state");
    let router = build_gateway_router(
        state,
        &config.upstream.metered_paths,
        &config.upstream.passthrough_paths,
    );
    Harness { router, controller, _worker: worker }
}

fn chat_body() -> serde_json::Value {
    serde_json::json!({
        "model": "test-model",
        "messages": [{"role": "user", "content": "hello"}],
        "max_tokens": 50
    })
}

fn chat_request(identity: &str, body: Body) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header("content-type", "application/json")
        .header("x-user-id", identity)
        .body(body)
        .unwrap()
}

async fn body_json_of(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Reconciliation happens off the response path; poll until it lands.
async fn wait_for_minute_tokens(controller: &AdmissionController, identity: &str, expected: u64) {
    for _ in 0..100 {
        let usage = controller.store().get_usage(identity).await.unwrap();
        if usage.tokens_this_minute == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    let usage = controller.store().get_usage(identity).await.unwrap();
    panic!("tokens_this_minute stayed at {}, expected {expected}", usage.tokens_this_minute);
}

#[tokio::test]
async fn test_allowed_request_is_forwarded_and_reconciled() {
    let server = MockServer::start().await;
    let upstream_body = serde_json::json!({
        "id": "cmpl-1",
        "choices": [{"message": {"role": "assistant", "content": "hi there"}}],
        "usage": {"prompt_tokens": 10, "completion_tokens": 20, "total_tokens": 30}
    });
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(body_json(chat_body()))
        .and(header("x-user-id", "u1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(upstream_body.clone()))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri(), LimitProfile::default(), 30);
    let request = chat_request("u1", Body::from(chat_body().to_string()));
    let response = h.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-user-id"], "u1");
    assert_eq!(response.headers()["x-estimated-tokens"], HELLO_ESTIMATE.to_string().as_str());
    assert!(response.headers().contains_key("x-process-time-ms"));
    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(body_json_of(response).await, upstream_body);

    wait_for_minute_tokens(&h.controller, "u1", 30).await;
    let usage = h.controller.store().get_usage("u1").await.unwrap();
    assert_eq!(usage.requests_this_minute, 1);
}

#[tokio::test]
async fn test_denied_request_never_reaches_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let profile = LimitProfile { tpm: 10, ..Default::default() };
    let h = harness(&server.uri(), profile, 30);
    let response =
        h.router.clone().oneshot(chat_request("u1", Body::from(chat_body().to_string()))).await.unwrap();

    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.headers()["retry-after"], "180");
    let body = body_json_of(response).await;
    assert_eq!(body["error"]["type"], "rate_limit_exceeded");
    assert_eq!(body["error"]["code"], "tpm");
    assert_eq!(body["error"]["user_id"], "u1");
    assert_eq!(body["error"]["estimated_tokens"], HELLO_ESTIMATE);

    let usage = h.controller.store().get_usage("u1").await.unwrap();
    assert_eq!(usage.tokens_this_minute, 0);
    assert!(usage.cooldown_until_ms > START_MS);

    // second attempt hits the cooldown gate
    let again =
        h.router.clone().oneshot(chat_request("u1", Body::from(chat_body().to_string()))).await.unwrap();
    assert_eq!(body_json_of(again).await["error"]["code"], "cooldown");
}

#[tokio::test]
async fn test_malformed_body_is_rejected_before_admission() {
    let server = MockServer::start().await;
    Mock::given(method("POST")).respond_with(ResponseTemplate::new(200)).expect(0).mount(&server).await;

    let h = harness(&server.uri(), LimitProfile::default(), 30);
    let response = h.router.clone().oneshot(chat_request("u1", Body::from("{oops"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json_of(response).await["error"]["type"], "invalid_request_error");
    assert!(h.controller.list_identities().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unreachable_upstream_keeps_charge() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let h = harness(&format!("http://127.0.0.1:{port}"), LimitProfile::default(), 30);
    let response =
        h.router.clone().oneshot(chat_request("u1", Body::from(chat_body().to_string()))).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json_of(response).await["error"]["type"], "upstream_unreachable");

    let usage = h.controller.store().get_usage("u1").await.unwrap();
    assert_eq!(usage.tokens_this_minute, HELLO_ESTIMATE);
}

#[tokio::test]
async fn test_upstream_timeout_is_distinct() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(3)))
        .mount(&server)
        .await;

    let h = harness(&server.uri(), LimitProfile::default(), 1);
    let response =
        h.router.clone().oneshot(chat_request("u1", Body::from(chat_body().to_string()))).await.unwrap();

    assert_eq!(response.status(), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body_json_of(response).await["error"]["type"], "upstream_timeout");
}

#[tokio::test]
async fn test_event_stream_is_relayed_and_reconciled() {
    let server = MockServer::start().await;
    let stream = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"hi\"}}]}\n\n",
        "data: {\"choices\":[],\"usage\":{\"prompt_tokens\":4,\"completion_tokens\":6}}\n\n",
        "data: [DONE]\n\n",
    );
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(stream, "text/event-stream"))
        .mount(&server)
        .await;

    let h = harness(&server.uri(), LimitProfile::default(), 30);
    let mut body = chat_body();
    body["stream"] = serde_json::json!(true);
    let response =
        h.router.clone().oneshot(chat_request("u1", Body::from(body.to_string()))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(bytes.as_ref(), stream.as_bytes());

    wait_for_minute_tokens(&h.controller, "u1", 10).await;
}

#[tokio::test]
async fn test_bearer_credential_identifies_caller() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"choices": []})))
        .mount(&server)
        .await;

    let h = harness(&server.uri(), LimitProfile::default(), 30);
    let request = Request::builder()
        .method("POST")
        .uri("/v1/completions")
        .header("authorization", "Bearer sk-user1")
        .body(Body::from(r#"{"prompt": "hello", "max_tokens": 5}"#))
        .unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-user-id"], "user1");
    // no usage in the response: the estimate stays
    assert_eq!(h.controller.store().get_usage("user1").await.unwrap().tokens_this_minute, 6);
}

#[tokio::test]
async fn test_passthrough_route_skips_admission() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1/models"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"data": []})))
        .expect(1)
        .mount(&server)
        .await;

    let h = harness(&server.uri(), LimitProfile { rpm: 0, ..Default::default() }, 30);
    let request = Request::builder().uri("/v1/models").body(Body::empty()).unwrap();
    let response = h.router.clone().oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json_of(response).await, serde_json::json!({"data": []}));
    assert!(h.controller.list_identities().await.unwrap().is_empty());
}
