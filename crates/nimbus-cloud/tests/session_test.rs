mod common;

use chrono::{Duration, TimeZone, Utc};
use common::{CountingStore, MockTransport, v2_token};
use nimbus_cloud::{
    AuthProtocol, ClientConfig, CloudClient, CloudError, Credentials, EndpointSelector, Headers,
    HttpResponse, ManualClock, Method, ScopeOptions,
};
use std::sync::Arc;

fn base_config() -> ClientConfig {
    ClientConfig::new(
        AuthProtocol::KeystoneV2Password,
        "https://identity.example.com:5000",
        Credentials::new("demo-user", "s3cret"),
    )
    .with_scope(ScopeOptions::default().with_tenant("demo"))
}

fn forced_selector() -> EndpointSelector {
    EndpointSelector {
        base_url: Some("https://compute.example.com/v2/1337".to_string()),
        auth_token: Some("FORCED".to_string()),
        ..Default::default()
    }
}

async fn get(client: &CloudClient, path: &str) -> nimbus_cloud::Result<HttpResponse> {
    client
        .executor()
        .call(path, Method::Get, Headers::new(), None)
        .await
}

/// T1 at 0s, reused at 10s, replaced at 3700s
#[tokio::test]
async fn test_token_expiry_end_to_end() {
    let start = Utc.with_ymd_and_hms(2030, 1, 1, 0, 0, 0).unwrap();
    let clock = Arc::new(ManualClock::new(start));
    let transport = MockTransport::new();
    transport.push_auth(v2_token("T1", "2030-01-01T01:00:00Z"));
    transport.push_auth(v2_token("T2", "2030-01-01T03:00:00Z"));
    transport.push_service(HttpResponse::new(200));

    let client =
        CloudClient::new(base_config().with_clock(clock.clone()), transport.clone()).unwrap();

    get(&client, "/servers").await.unwrap();
    assert_eq!(transport.auth_calls(), 1);

    clock.advance(Duration::seconds(10));
    get(&client, "/servers").await.unwrap();
    assert_eq!(transport.auth_calls(), 1);
    let request = transport.last_service_request().unwrap();
    assert_eq!(request.headers.get("X-Auth-Token"), Some("T1"));
    assert_eq!(request.url, "https://compute.example.com/v2/1337/servers");

    clock.set(start + Duration::seconds(3700));
    get(&client, "/servers").await.unwrap();
    assert_eq!(transport.auth_calls(), 2);
    let request = transport.last_service_request().unwrap();
    assert_eq!(request.headers.get("X-Auth-Token"), Some("T2"));
}

#[tokio::test]
async fn test_forced_token_never_authenticates() {
    let transport = MockTransport::new();
    transport.push_service(HttpResponse::new(200));

    let client = CloudClient::new(base_config().with_selector(forced_selector()), transport.clone())
        .unwrap();

    for _ in 0..25 {
        get(&client, "/servers/detail").await.unwrap();
    }
    assert_eq!(transport.auth_calls(), 0);
    assert_eq!(transport.service_calls(), 25);
    assert!(client.executor().catalog().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unauthorized_evicts_exactly_once() {
    let store = CountingStore::new();
    let transport = MockTransport::new();
    transport.push_auth(v2_token("T1", "2999-01-01T00:00:00Z"));
    transport.push_auth(v2_token("T2", "2999-01-01T00:00:00Z"));
    transport.push_service(HttpResponse::new(401).with_body("Authentication required"));
    transport.push_service(HttpResponse::new(200));

    let client =
        CloudClient::new(base_config().with_store(store.clone()), transport.clone()).unwrap();

    let err = get(&client, "/servers").await.unwrap_err();
    assert!(err.is_unauthorized());
    assert_eq!(err.to_string(), "Unauthorized: Authentication required");
    assert_eq!(store.clears(), 1);

    // the next call starts a fresh session
    get(&client, "/servers").await.unwrap();
    assert_eq!(transport.auth_calls(), 2);
    let request = transport.last_service_request().unwrap();
    assert_eq!(request.headers.get("X-Auth-Token"), Some("T2"));
    assert_eq!(store.clears(), 1);
}

#[tokio::test]
async fn test_unauthorized_with_forced_token_keeps_store() {
    let store = CountingStore::new();
    let transport = MockTransport::new();
    transport.push_service(HttpResponse::new(401));
    transport.push_service(HttpResponse::new(200));

    let config = base_config()
        .with_selector(forced_selector())
        .with_store(store.clone());
    let client = CloudClient::new(config, transport.clone()).unwrap();

    let err = get(&client, "/servers").await.unwrap_err();
    assert!(matches!(err, CloudError::Unauthorized(_)));
    assert_eq!(store.clears(), 0);

    get(&client, "/servers").await.unwrap();
    assert_eq!(transport.auth_calls(), 0);
    let request = transport.last_service_request().unwrap();
    assert_eq!(request.headers.get("X-Auth-Token"), Some("FORCED"));
}

#[tokio::test]
async fn test_evicting_forced_token_falls_back_to_credentials() {
    let transport = MockTransport::new();
    transport.push_auth(v2_token("T1", "2999-01-01T00:00:00Z"));
    transport.push_service(HttpResponse::new(401));
    transport.push_service(HttpResponse::new(200));

    let config = base_config()
        .with_selector(forced_selector())
        .evict_forced_token_on_unauthorized(true);
    let client = CloudClient::new(config, transport.clone()).unwrap();

    assert!(get(&client, "/servers").await.is_err());
    get(&client, "/servers").await.unwrap();

    assert_eq!(transport.auth_calls(), 1);
    let request = transport.last_service_request().unwrap();
    assert_eq!(request.headers.get("X-Auth-Token"), Some("T1"));
    assert_eq!(request.url, "https://compute.example.com/v2/1337/servers");
}

#[tokio::test]
async fn test_shared_store_spares_second_client_a_handshake() {
    let store = CountingStore::new();
    let transport = MockTransport::new();
    transport.push_auth(v2_token("T1", "2999-01-01T00:00:00Z"));
    transport.push_service(HttpResponse::new(200));

    let first =
        CloudClient::new(base_config().with_store(store.clone()), transport.clone()).unwrap();
    let second =
        CloudClient::new(base_config().with_store(store.clone()), transport.clone()).unwrap();

    get(&first, "/servers").await.unwrap();
    get(&second, "/servers").await.unwrap();
    assert_eq!(transport.auth_calls(), 1);
}

#[tokio::test]
async fn test_shared_store_keeps_sessions_apart_per_secret() {
    let store = CountingStore::new();
    let transport = MockTransport::new();
    transport.push_auth(v2_token("T1", "2999-01-01T00:00:00Z"));
    transport.push_auth(HttpResponse::new(401).with_body("Invalid user / password"));

    let good =
        CloudClient::new(base_config().with_store(store.clone()), transport.clone()).unwrap();
    assert_eq!(good.executor().ensure_session().await.unwrap().token, "T1");

    let mut config = base_config().with_store(store.clone());
    config.credentials = Credentials::new("demo-user", "WRONG-PASSWORD");
    let wrong = CloudClient::new(config, transport.clone()).unwrap();

    let err = wrong.executor().ensure_session().await.unwrap_err();
    assert!(matches!(err, CloudError::InvalidCredentials(_)), "got {err:?}");
    assert_eq!(transport.auth_calls(), 2);
}

#[tokio::test]
async fn test_invalid_credentials_surface_unchanged() {
    let transport = MockTransport::new();
    transport.push_auth(
        HttpResponse::json(
            401,
            &serde_json::json!({
                "unauthorized": {"code": 401, "message": "Invalid user / password"}
            }),
        ),
    );

    let client = CloudClient::new(base_config(), transport.clone()).unwrap();
    let err = get(&client, "/servers").await.unwrap_err();
    match err {
        CloudError::InvalidCredentials(message) => assert_eq!(message, "Invalid user / password"),
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(transport.service_calls(), 0);
}
