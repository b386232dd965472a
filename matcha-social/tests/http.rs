mod common;

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::{profile, Harness};
use matcha_shared::types::auth::Claims;
use matcha_social::config::AppConfig;
use matcha_social::{router, AppState};

fn app(h: &Harness) -> Router {
    let state = Arc::new(AppState {
        engine: h.engine.clone(),
        config: AppConfig::default(),
        database: None,
        metrics_handle: None,
    });
    router().with_state(state)
}

fn bearer(user: Uuid) -> String {
    let secret = AppConfig::default().jwt_secret;
    let token = encode(&Header::default(), &Claims::new(user, 600), &EncodingKey::from_secret(secret.as_bytes()))
        .unwrap();
    format!("Bearer {token}")
}

async fn call(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

#[tokio::test]
async fn health_reports_healthy_without_a_database() {
    let h = Harness::new();
    let request = Request::get("/health").body(Body::empty()).unwrap();
    let (status, body) = call(app(&h), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "matcha-social");
}

#[tokio::test]
async fn like_requires_a_bearer_token() {
    let h = Harness::new();
    let bob = h.add(profile("bob"));
    let request = Request::post(format!("/likes/{bob}")).body(Body::empty()).unwrap();
    let (status, body) = call(app(&h), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn like_and_relationship_round_trip() {
    let h = Harness::new();
    let alice = h.add(profile("alice"));
    let bob = h.add(profile("bob"));

    let request = Request::post(format!("/likes/{bob}"))
        .header("Authorization", bearer(alice))
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(app(&h), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["state"], "LIKED");
    assert_eq!(body["data"]["both_matched"], false);

    let request = Request::post(format!("/likes/{bob}"))
        .header("Authorization", bearer(alice))
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(app(&h), request).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "E1003");

    let request = Request::get(format!("/relationships/{alice}"))
        .header("Authorization", bearer(bob))
        .body(Body::empty())
        .unwrap();
    let (_, body) = call(app(&h), request).await;
    assert_eq!(body["data"]["reverse_state"], "LIKED");
}

#[tokio::test]
async fn bad_filters_map_to_bad_request_with_details() {
    let h = Harness::new();
    let alice = h.add(profile("alice"));

    let request = Request::post("/discovery/search")
        .header("Authorization", bearer(alice))
        .header("Content-Type", "application/json")
        .body(Body::from(json!({ "filter": { "height": { "$gt": 1 } } }).to_string()))
        .unwrap();
    let (status, body) = call(app(&h), request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "E2001");
    assert_eq!(body["error"]["details"]["field"], "height");
}

#[tokio::test]
async fn notification_inbox_routes() {
    let h = Harness::new();
    let alice = h.add(profile("alice"));
    let bob = h.add(profile("bob"));
    h.engine.record_visit(alice, bob).unwrap();

    let request = Request::get("/notifications/unread-count")
        .header("Authorization", bearer(bob))
        .body(Body::empty())
        .unwrap();
    let (_, body) = call(app(&h), request).await;
    assert_eq!(body["data"]["count"], 1);

    let request = Request::post("/notifications/mark-all-read")
        .header("Authorization", bearer(bob))
        .body(Body::empty())
        .unwrap();
    let (status, body) = call(app(&h), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["updated"], 1);
}
