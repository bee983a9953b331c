mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, TestApp};

#[tokio::test]
async fn status_and_health_are_public() {
    let app = TestApp::new().await;

    let status = app.request(Method::GET, "/api/v1/status", None, None).await;
    assert_eq!(status.status(), StatusCode::OK);
    assert_eq!(body_json(status).await["service"], "shopstock-api");

    let health = app.request(Method::GET, "/api/v1/health", None, None).await;
    assert_eq!(health.status(), StatusCode::OK);
    assert_eq!(body_json(health).await["checks"]["database"], "healthy");
}

#[tokio::test]
async fn responses_carry_request_id_and_security_headers() {
    let app = TestApp::new().await;
    let response = app.request(Method::GET, "/api/v1/status", None, None).await;

    assert!(response.headers().contains_key("x-request-id"));
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
}

#[tokio::test]
async fn openapi_document_is_served() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::GET, "/api-docs/openapi.json", None, None)
        .await;
    assert_eq!(response.status(), StatusCode::OK);

    let doc = body_json(response).await;
    assert!(doc["paths"]["/api/v1/orders"].is_object());
    assert!(doc["paths"]["/api/v1/stock/stock-outs"].is_object());
}

#[tokio::test]
async fn invalid_token_is_unauthorized() {
    let app = TestApp::new().await;
    let response = app
        .request(Method::GET, "/api/v1/orders", None, Some("not-a-jwt"))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
