//! End-to-end tests for the HTTP surface.
//!
//! Each test binds the router to an ephemeral port and talks to it with a
//! real HTTP client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};
use subsmith::filter::AllowList;
use subsmith::probe::TcpProbe;
use subsmith::server::{AppState, router};
use subsmith::service::SubscriptionService;
use subsmith::store::MemoryStore;
use tokio::net::TcpListener;

const VLESS_WS: &str = "vless://d342d11e-d424-4583-b36e-524ab1f0afa4@example.com:443?encryption=none&security=tls&sni=example.com&type=ws&path=%2Fws&host=example.com#MyNode";
const HY2: &str = "hy2://secret@hy.example.com:8443?sni=hy.example.com#hy-node";

async fn spawn_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let service = SubscriptionService::new(
        Arc::new(MemoryStore::new()),
        AllowList::default(),
        Duration::from_secs(60),
        format!("http://{}", addr),
    );
    let state = AppState {
        service: Arc::new(service),
        probe: Arc::new(TcpProbe::new(Duration::from_secs(2)).unwrap()),
    };
    let app = router(state, &[]);

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn create(addr: SocketAddr, body: Value) -> reqwest::Response {
    reqwest::Client::new()
        .post(format!("http://{}/create-personal-sub", addr))
        .json(&body)
        .send()
        .await
        .unwrap()
}

// ============================================================================
// Subscription Lifecycle
// ============================================================================

#[tokio::test]
async fn test_create_then_fetch_both_formats() {
    let addr = spawn_server().await;

    let response = create(addr, json!({"configs": [VLESS_WS, HY2], "core": "singbox"})).await;
    assert_eq!(response.status(), 200);
    let created: Value = response.json().await.unwrap();

    let handle = created["uuid"].as_str().unwrap();
    let clash_url = created["clashSubscriptionUrl"].as_str().unwrap();
    let singbox_url = created["singboxSubscriptionUrl"].as_str().unwrap();
    assert_eq!(clash_url, format!("http://{}/sub/clash/{}", addr, handle));
    assert_eq!(singbox_url, format!("http://{}/sub/singbox/{}", addr, handle));

    let clash = reqwest::get(clash_url).await.unwrap();
    assert_eq!(clash.status(), 200);
    assert!(
        clash.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/yaml")
    );
    let yaml: serde_yaml::Value = serde_yaml::from_str(&clash.text().await.unwrap()).unwrap();
    let proxies = yaml["proxies"].as_sequence().unwrap();
    // Clash has no hy2 mapping, so only the vless node survives
    assert_eq!(proxies.len(), 1);
    assert_eq!(proxies[0]["name"].as_str(), Some("MyNode"));

    let singbox = reqwest::get(singbox_url).await.unwrap();
    assert_eq!(singbox.status(), 200);
    assert!(
        singbox.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("application/json")
    );
    let doc: Value = singbox.json().await.unwrap();
    let tags: Vec<&str> = doc["outbounds"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|o| o["tag"].as_str())
        .collect();
    assert!(tags.contains(&"MyNode"));
    assert!(tags.contains(&"hy-node"));
}

#[tokio::test]
async fn test_caller_supplied_handle_is_used() {
    let addr = spawn_server().await;

    let response = create(
        addr,
        json!({"configs": [VLESS_WS], "uuid": "my-sub_01", "core": "xray"}),
    )
    .await;
    assert_eq!(response.status(), 200);
    let created: Value = response.json().await.unwrap();
    assert_eq!(created["uuid"], "my-sub_01");

    let fetched = reqwest::get(format!("http://{}/sub/clash/my-sub_01", addr))
        .await
        .unwrap();
    assert_eq!(fetched.status(), 200);
}

#[tokio::test]
async fn test_create_with_no_valid_configs_is_bad_request() {
    let addr = spawn_server().await;

    let response = create(addr, json!({"configs": ["not-a-valid-uri"], "core": "xray"})).await;
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], 400);
    assert!(body["error"].as_str().is_some());
}

#[tokio::test]
async fn test_malformed_body_is_bad_request() {
    let addr = spawn_server().await;

    let response = create(addr, json!({"configs": [VLESS_WS], "core": "clash-meta"})).await;
    assert_eq!(response.status(), 400);

    let response = reqwest::Client::new()
        .post(format!("http://{}/create-personal-sub", addr))
        .header("content-type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn test_unknown_handle_is_not_found() {
    let addr = spawn_server().await;

    let response = reqwest::get(format!("http://{}/sub/clash/does-not-exist", addr))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], 404);
}

#[tokio::test]
async fn test_unknown_format_is_not_found() {
    let addr = spawn_server().await;

    let created: Value = create(addr, json!({"configs": [VLESS_WS], "core": "xray"}))
        .await
        .json()
        .await
        .unwrap();
    let handle = created["uuid"].as_str().unwrap();

    let response = reqwest::get(format!("http://{}/sub/v2ray/{}", addr, handle))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn test_stored_quic_only_subscription_fails_clash_render() {
    let addr = spawn_server().await;

    let created: Value = create(addr, json!({"configs": [HY2], "core": "singbox"}))
        .await
        .json()
        .await
        .unwrap();
    let handle = created["uuid"].as_str().unwrap();

    let clash = reqwest::get(format!("http://{}/sub/clash/{}", addr, handle))
        .await
        .unwrap();
    assert_eq!(clash.status(), 500);

    let singbox = reqwest::get(format!("http://{}/sub/singbox/{}", addr, handle))
        .await
        .unwrap();
    assert_eq!(singbox.status(), 200);
}

// ============================================================================
// Probe & Health
// ============================================================================

#[tokio::test]
async fn test_ping_reachable_target() {
    let addr = spawn_server().await;

    let target = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = target.local_addr().unwrap().port();
    tokio::spawn(async move {
        let _ = target.accept().await;
    });

    let response = reqwest::Client::new()
        .post(format!("http://{}/ping", addr))
        .json(&json!({"host": "127.0.0.1", "port": port}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert!(body["latencyMs"].is_u64(), "unexpected body: {}", body);
}

#[tokio::test]
async fn test_ping_quic_config_reports_error() {
    let addr = spawn_server().await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/ping", addr))
        .json(&json!({"config": HY2}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].as_str().unwrap().contains("QUIC"));
}

#[tokio::test]
async fn test_ping_unparseable_config_reports_error() {
    let addr = spawn_server().await;

    let response = reqwest::Client::new()
        .post(format!("http://{}/ping", addr))
        .json(&json!({"config": "garbage"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_health() {
    let addr = spawn_server().await;

    let response = reqwest::get(format!("http://{}/health", addr)).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "ok");
}
