//! End-to-end tests through the full gateway router and a live upstream.
//!
//! The upstream is an in-process Axum server on an ephemeral port. Most
//! tests drive the gateway with `oneshot`; the served tests put it behind a
//! real listener so the server decides when response bodies are done.
//!
//! Run with: `cargo test --test gateway_tests`
#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Json;
use axum::Router;
use axum::body::{Body, Bytes};
use axum::http::{HeaderMap, Request, Response, StatusCode, Uri, header};
use axum::routing::{get, post};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tower::ServiceExt;

use gateway_guard::audit::MemorySink;
use gateway_guard::gateway::RouteDefinition;
use gateway_guard::models::{AuditRecord, AuthenticationRecord, ClientType};
use gateway_guard::store::MemoryStore;
use gateway_guard::{AppState, Config, build_router};

async fn inspect(uri: Uri, headers: HeaderMap, body: Bytes) -> Json<Value> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
    };

    Json(json!({
        "uri": uri.to_string(),
        "authorization": header("authorization"),
        "request_id": header("x-request-id"),
        "body": String::from_utf8_lossy(&body),
    }))
}

async fn spawn_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/api/orders", post(|| async { Json(json!({ "ok": true })) }))
        .route("/api/orders/inspect", post(inspect))
        .route(
            "/api/orders/report.csv",
            get(|| async { ([(header::CONTENT_TYPE, "text/csv")], "id,total\n1,10\n") }),
        )
        .route("/api/orders/archive", post(|| async { StatusCode::NO_CONTENT }));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

struct Gateway {
    app: Router,
    sink: MemorySink,
}

async fn gateway(upstream: SocketAddr) -> Gateway {
    let store = MemoryStore::new();
    store
        .insert_token("user-token", AuthenticationRecord::user("portal", ["ROLE_USER"]))
        .await;
    store
        .insert_token("service-token", AuthenticationRecord::client("billing"))
        .await;
    store.insert_roles("/api/orders", ["USER"]).await;
    store.insert_roles("/api/orders/inspect", ["USER"]).await;

    let routes = RouteDefinition::parse_list(&format!(
        "orders=/api/orders=http://{upstream};down=/down=http://127.0.0.1:1"
    ))
    .unwrap();
    let config = Config {
        routes,
        ..Config::default()
    };

    let sink = MemorySink::new();
    let state = AppState::new(config, Arc::new(store), Arc::new(sink.clone())).unwrap();

    Gateway {
        app: build_router(state),
        sink,
    }
}

async fn collect(response: Response<Body>) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

// =============================================================================
// Forwarding
// =============================================================================

#[tokio::test]
async fn test_authorized_json_exchange() {
    let gw = gateway(spawn_upstream().await).await;

    let response = gw
        .app
        .oneshot(
            Request::post("/api/orders")
                .header(header::AUTHORIZATION, "Bearer user-token")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(r#"{"a":1}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["client_type"], "password");
    assert_eq!(response.headers()["client_id"], "portal");
    let request_id = response.headers()["x-request-id"].clone();
    assert_eq!(collect(response).await.as_ref(), br#"{"ok":true}"#);

    let records = gw.sink.records();
    assert_eq!(records.len(), 1);
    let record = &records[0];
    assert_eq!(record.request_id, request_id.to_str().unwrap());
    assert_eq!(record.target_server.as_deref(), Some("orders"));
    assert_eq!(record.client_id.as_deref(), Some("portal"));
    assert_eq!(record.client_type, Some(ClientType::Password));
    assert_eq!(record.request_body.as_deref(), Some(r#"{"a":1}"#));
    assert_eq!(record.response_data.as_deref(), Some(r#"{"ok":true}"#));
    assert_eq!(record.status, Some(200));
}

#[tokio::test]
async fn test_upstream_receives_request_unchanged() {
    let gw = gateway(spawn_upstream().await).await;
    let payload = r#"{"items":[{"sku":"A-1","qty":2}]}"#;

    let response = gw
        .app
        .oneshot(
            Request::post("/api/orders/inspect?dry_run=true")
                .header(header::AUTHORIZATION, "Bearer user-token")
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    let request_id = response.headers()["x-request-id"].clone();
    let seen: Value = serde_json::from_slice(&collect(response).await).unwrap();
    assert_eq!(seen["request_id"], request_id.to_str().unwrap());
    assert_eq!(seen["uri"], "/api/orders/inspect?dry_run=true");
    assert_eq!(seen["authorization"], "Bearer user-token");
    assert_eq!(seen["body"], payload);
}

#[tokio::test]
async fn test_non_json_upstream_response_streams_through() {
    let gw = gateway(spawn_upstream().await).await;

    let response = gw
        .app
        .oneshot(
            Request::get("/api/orders/report.csv")
                .header(header::AUTHORIZATION, "Bearer service-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.headers()["content-type"], "text/csv");
    assert_eq!(collect(response).await.as_ref(), b"id,total\n1,10\n");

    let record = gw.sink.records().remove(0);
    assert_eq!(record.client_type, Some(ClientType::Client));
    assert!(record.response_data.is_none());
}

// =============================================================================
// Host harness errors
// =============================================================================

#[tokio::test]
async fn test_unrouted_path_is_not_found() {
    let gw = gateway(spawn_upstream().await).await;

    let response = gw
        .app
        .oneshot(
            Request::get("/nowhere")
                .header(header::AUTHORIZATION, "Bearer service-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body: Value = serde_json::from_slice(&collect(response).await).unwrap();
    assert_eq!(body["code"], 404);

    let record = gw.sink.records().remove(0);
    assert_eq!(record.status, Some(404));
    assert!(record.target_server.is_none());
}

#[tokio::test]
async fn test_unreachable_upstream_is_bad_gateway() {
    let gw = gateway(spawn_upstream().await).await;

    let response = gw
        .app
        .oneshot(
            Request::get("/down/anything")
                .header(header::AUTHORIZATION, "Bearer service-token")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    collect(response).await;

    let record = gw.sink.records().remove(0);
    assert_eq!(record.target_server.as_deref(), Some("down"));
    assert_eq!(record.status, Some(502));
}

#[tokio::test]
async fn test_denied_request_never_reaches_upstream_or_audit() {
    let gw = gateway(spawn_upstream().await).await;

    let response = gw
        .app
        .oneshot(Request::post("/api/orders").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(&collect(response).await).unwrap();
    assert_eq!(body["code"], 401);
    assert!(gw.sink.is_empty());
}

// =============================================================================
// Health endpoints
// =============================================================================

#[tokio::test]
async fn test_health_endpoints_are_whitelisted() {
    let gw = gateway(spawn_upstream().await).await;

    let response = gw
        .app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let health: Value = serde_json::from_slice(&collect(response).await).unwrap();
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["routes"], 2);

    let ready = gw
        .app
        .oneshot(Request::get("/ready").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(ready.status(), StatusCode::OK);
}

// =============================================================================
// Served over a real connection
// =============================================================================

async fn serve(app: Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });
    addr
}

/// Records are emitted from the server task; give it a moment.
async fn wait_for_records(sink: &MemorySink, count: usize) -> Vec<AuditRecord> {
    for _ in 0..50 {
        if sink.len() >= count {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    sink.records()
}

#[tokio::test]
async fn test_served_exchanges_complete_without_error() {
    let gw = gateway(spawn_upstream().await).await;
    let addr = serve(gw.app).await;
    let client = reqwest::Client::new();
    let base = format!("http://{addr}");

    let csv = client
        .get(format!("{base}/api/orders/report.csv"))
        .bearer_auth("service-token")
        .send()
        .await
        .unwrap();
    assert_eq!(csv.status(), reqwest::StatusCode::OK);
    assert_eq!(csv.text().await.unwrap(), "id,total\n1,10\n");
    wait_for_records(&gw.sink, 1).await;

    let missing = client
        .get(format!("{base}/nowhere"))
        .bearer_auth("service-token")
        .send()
        .await
        .unwrap();
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);
    missing.text().await.unwrap();
    wait_for_records(&gw.sink, 2).await;

    let head = client
        .head(format!("{base}/api/orders/report.csv"))
        .bearer_auth("service-token")
        .send()
        .await
        .unwrap();
    assert_eq!(head.status(), reqwest::StatusCode::OK);
    wait_for_records(&gw.sink, 3).await;

    let archived = client
        .post(format!("{base}/api/orders/archive"))
        .bearer_auth("service-token")
        .send()
        .await
        .unwrap();
    assert_eq!(archived.status(), reqwest::StatusCode::NO_CONTENT);
    wait_for_records(&gw.sink, 4).await;

    let created = client
        .post(format!("{base}/api/orders"))
        .bearer_auth("user-token")
        .header(header::CONTENT_TYPE, "application/json")
        .body(r#"{"a":1}"#)
        .send()
        .await
        .unwrap();
    assert_eq!(created.text().await.unwrap(), r#"{"ok":true}"#);

    let records = wait_for_records(&gw.sink, 5).await;
    assert_eq!(records.len(), 5);
    for record in &records {
        assert!(
            record.error.is_none(),
            "{} {} recorded as failed: {:?}",
            record.request_method,
            record.request_path,
            record.error
        );
        assert_eq!(record.ip, "127.0.0.1");
    }

    let statuses: Vec<_> = records.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        [Some(200), Some(404), Some(200), Some(204), Some(200)]
    );
    assert_eq!(records[2].request_method, "HEAD");
    assert_eq!(records[4].response_data.as_deref(), Some(r#"{"ok":true}"#));
}
