//! HTTP surface tests
//!
//! Drives the router with in-process requests over the in-memory store:
//! bearer token handling, status codes for each error kind and the JSON
//! shape of a created gate entry.

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    Router,
};
use jsonwebtoken::{encode, EncodingKey, Header};
use material_qms_backend::{
    create_app, middleware::auth::Claims, store::MemoryWorkflowStore, AppState, Config,
};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use tower::ServiceExt;

fn app() -> Router {
    let store = Arc::new(MemoryWorkflowStore::with_demo_directory());
    create_app(AppState::new(store, Config::default()))
}

fn token(sub: &str, name: &str, role: &str) -> String {
    let claims = Claims {
        sub: sub.to_string(),
        name: name.to_string(),
        role: role.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(Config::default().jwt.secret.as_bytes()),
    )
    .unwrap()
}

fn security_token() -> String {
    token("sec-off-1", "Jennifer Lee", "Security Officer")
}

fn post_json(uri: &str, bearer: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str, bearer: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", bearer))
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn gate_entry_body() -> Value {
    json!({
        "material_name": "Lactose",
        "vehicle_number": "MH12AB1234",
        "quantity": "500",
        "uom": "kg"
    })
}

#[tokio::test]
async fn test_health_is_public() {
    let response = app()
        .oneshot(Request::builder().uri("/api/v1/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["store"], "connected");
}

#[tokio::test]
async fn test_missing_token_is_unauthorized() {
    let response = app()
        .oneshot(
            Request::builder()
                .uri("/api/v1/gate-entries")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_token_with_wrong_secret_is_unauthorized() {
    let claims = Claims {
        sub: "sec-off-1".to_string(),
        name: "Jennifer Lee".to_string(),
        role: "Security Officer".to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::hours(1)).timestamp(),
    };
    let forged = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"other")).unwrap();

    let response = app()
        .oneshot(get("/api/v1/gate-entries", &forged))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_gate_entry_returns_created_record() {
    let response = app()
        .oneshot(post_json("/api/v1/gate-entries", &security_token(), gate_entry_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    assert_eq!(body["status"], "Awaiting GRN");
    assert_eq!(body["created_by"], "sec-off-1");
    assert_eq!(body["entry_code"].as_str().map(str::len), Some(7));
}

#[tokio::test]
async fn test_wrong_role_is_forbidden() {
    let bearer = token("scm-wh-1", "James Wilson", "Warehouse Manager");
    let response = app()
        .oneshot(post_json("/api/v1/gate-entries", &bearer, gate_entry_body()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::FORBIDDEN);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "FORBIDDEN");
}

#[tokio::test]
async fn test_invalid_payload_names_the_field() {
    let mut payload = gate_entry_body();
    payload["quantity"] = json!("0");

    let response = app()
        .oneshot(post_json("/api/v1/gate-entries", &security_token(), payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
    assert_eq!(body["error"]["field"], "quantity");
}

#[tokio::test]
async fn test_over_precise_quantity_is_bad_request() {
    let mut payload = gate_entry_body();
    payload["quantity"] = json!("0.0004");

    let response = app()
        .oneshot(post_json("/api/v1/gate-entries", &security_token(), payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let body = json_body(response).await;
    assert_eq!(body["error"]["field"], "quantity");
}

#[tokio::test]
async fn test_unknown_test_is_not_found() {
    let bearer = token("qc-op-1", "Lisa Anderson", "QC Operator");
    let uri = format!("/api/v1/quality-tests/{}/start", uuid::Uuid::new_v4());
    let response = app()
        .oneshot(post_json(&uri, &bearer, json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_second_grn_is_conflict() {
    let app = app();
    let created = app
        .clone()
        .oneshot(post_json("/api/v1/gate-entries", &security_token(), gate_entry_body()))
        .await
        .unwrap();
    let entry = json_body(created).await;

    let bearer = token("scm-wh-1", "James Wilson", "Warehouse Manager");
    let grn = json!({
        "gate_entry_id": entry["id"],
        "po_number": "PO-2024-001",
        "quantity_received": "500",
        "items": [
            { "description": "Lactose monohydrate", "quantity": "500", "price": "10", "vat_rate": "5" }
        ]
    });

    let first = app
        .clone()
        .oneshot(post_json("/api/v1/grns", &bearer, grn.clone()))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let body = json_body(first).await;
    let gross: Decimal = body["gross_total"].as_str().unwrap().parse().unwrap();
    assert_eq!(gross, Decimal::from(5250));

    let second = app
        .oneshot(post_json("/api/v1/grns", &bearer, grn))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CONFLICT);
}
