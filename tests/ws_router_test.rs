// Router-level tests via tower::ServiceExt::oneshot.
//
// Note: without a real upgrade handshake the WebSocketUpgrade extractor
// rejects the request (test-environment artifact; a live server answers
// 101). These tests verify routing, not the upgrade itself.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use relay::api::{create_ws_router, WsAppState};
use relay::registry::ConnectionRegistry;
use std::sync::Arc;
use tower::ServiceExt;

fn make_router() -> Router {
    let state = Arc::new(WsAppState {
        registry: Arc::new(ConnectionRegistry::default()),
    });
    create_ws_router(state)
}

fn get_request(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn test_ws_route_rejects_plain_get() {
    let app = make_router();
    let resp = app.oneshot(get_request("/ws")).await.unwrap();
    // Route exists but the request is not an upgrade
    assert!(resp.status().is_client_error());
}

#[tokio::test]
async fn test_unknown_path_is_404() {
    let app = make_router();
    let resp = app.oneshot(get_request("/nope")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_post_to_ws_route_is_rejected() {
    let app = make_router();
    let resp = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/ws")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::METHOD_NOT_ALLOWED);
}
