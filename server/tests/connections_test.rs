//! Integration tests for the connection endpoints:
//! touch -> self-lookup, owner rebinding, user resolution and expiry.

use serde_json::{json, Value};
use tokio::net::TcpListener;

use tether_server::config::Config;
use tether_server::state::AppState;
use tether_server::users::UserRecord;

/// Helper: start the server on a random port and return the base URL plus
/// a handle on its state so tests can seed users directly.
async fn start_test_server() -> (String, AppState, tempfile::TempDir) {
    let tmp_dir = tempfile::tempdir().expect("Failed to create temp dir");
    let config = Config {
        user_cache: tmp_dir.path().join("users.json").to_string_lossy().into_owned(),
        ..Config::default()
    };
    let state = AppState::from_config(&config);

    let app = tether_server::routes::build_router(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{}", addr), state, tmp_dir)
}

async fn touch(client: &reqwest::Client, base_url: &str, fingerprint: &str) -> reqwest::Response {
    client
        .post(format!("{}/connections/new/", base_url))
        .query(&[("fingerprint", fingerprint)])
        .send()
        .await
        .unwrap()
}

async fn lookup(client: &reqwest::Client, base_url: &str, fingerprint: &str) -> (u16, Value) {
    let resp = client
        .get(format!("{}/connections/self/", base_url))
        .query(&[("fingerprint", fingerprint)])
        .send()
        .await
        .unwrap();
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn test_health_check() {
    let (base_url, _state, _tmp) = start_test_server().await;

    let resp = reqwest::get(format!("{}/health", base_url)).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "ok");
}

#[tokio::test]
async fn test_touch_then_lookup() {
    let (base_url, state, _tmp) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = touch(&client, &base_url, "fp-1").await;
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.json::<Value>().await.unwrap(), Value::Null);
    assert_eq!(state.connections.len(), 1);

    let (status, body) = lookup(&client, &base_url, "fp-1").await;
    assert_eq!(status, 200);
    assert_eq!(body["connection"]["fingerprint"], "fp-1");
    assert_eq!(body["connection"]["update"], true);
    assert_eq!(body["connection"]["current_user"], Value::Null);
    assert!(body["connection"]["creation"].is_f64());
    assert!(body["connection"]["last_update"].is_f64());
    assert_eq!(body["user"], Value::Null);

    // The flag was cleared by the first lookup
    let (status, body) = lookup(&client, &base_url, "fp-1").await;
    assert_eq!(status, 200);
    assert_eq!(body["connection"]["update"], false);
}

#[tokio::test]
async fn test_lookup_unknown_fingerprint_returns_404() {
    let (base_url, state, _tmp) = start_test_server().await;
    let client = reqwest::Client::new();

    let (status, body) = lookup(&client, &base_url, "nobody").await;
    assert_eq!(status, 404);
    assert_eq!(body, json!({ "connection": null, "user": null }));
    assert!(state.connections.is_empty());
}

#[tokio::test]
async fn test_routes_without_trailing_slash() {
    let (base_url, _state, _tmp) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/connections/new", base_url))
        .query(&[("fingerprint", "fp-2")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);

    let resp = client
        .get(format!("{}/connections/self", base_url))
        .query(&[("fingerprint", "fp-2")])
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
}

#[tokio::test]
async fn test_missing_fingerprint_is_rejected() {
    let (base_url, state, _tmp) = start_test_server().await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/connections/new/", base_url))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert!(state.connections.is_empty());
}

#[tokio::test]
async fn test_owned_fingerprint_is_recreated_on_lookup() {
    let (base_url, state, _tmp) = start_test_server().await;
    let client = reqwest::Client::new();

    state.users.put("alice", UserRecord::with_owner("fp-owned"));

    // No touch needed: ownership alone creates the record
    let (status, body) = lookup(&client, &base_url, "fp-owned").await;
    assert_eq!(status, 200);
    assert_eq!(body["connection"]["fingerprint"], "fp-owned");
    assert_eq!(body["connection"]["update"], true);

    // Every lookup rebinds, so the flag reads true again
    let (_, body) = lookup(&client, &base_url, "fp-owned").await;
    assert_eq!(body["connection"]["update"], true);
}

#[tokio::test]
async fn test_lookup_returns_bound_user() {
    let (base_url, state, _tmp) = start_test_server().await;
    let client = reqwest::Client::new();

    state.users.put(
        "bob",
        UserRecord::default().field("display_name", json!("Bob")),
    );
    touch(&client, &base_url, "fp-bob").await;
    state.connections.bind_user("fp-bob", Some("bob")).unwrap();

    let (status, body) = lookup(&client, &base_url, "fp-bob").await;
    assert_eq!(status, 200);
    assert_eq!(body["connection"]["current_user"], "bob");
    assert_eq!(body["user"]["display_name"], "Bob");
    assert_eq!(body["user"]["owner"], Value::Null);
}

#[tokio::test]
async fn test_dangling_user_returns_500() {
    let (base_url, state, _tmp) = start_test_server().await;
    let client = reqwest::Client::new();

    touch(&client, &base_url, "fp-x").await;
    state.connections.bind_user("fp-x", Some("deleted")).unwrap();

    let (status, body) = lookup(&client, &base_url, "fp-x").await;
    assert_eq!(status, 500);
    assert_eq!(body, json!({ "error": "internal server error" }));
}

#[tokio::test]
async fn test_swept_connection_is_gone() {
    let (base_url, state, _tmp) = start_test_server().await;
    let client = reqwest::Client::new();

    touch(&client, &base_url, "fp-idle").await;
    let last_update = state.connections.get("fp-idle").unwrap().last_update;

    state
        .connections
        .sweep_at(30, last_update + chrono::TimeDelta::seconds(31));

    let (status, _) = lookup(&client, &base_url, "fp-idle").await;
    assert_eq!(status, 404);
}
