mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, TestApp};
use serde_json::json;

#[tokio::test]
async fn registering_a_known_phone_returns_the_existing_customer() {
    let app = TestApp::new().await;
    let fx = app.fixture().await;

    let created = app
        .request_as(
            &fx.staff,
            Method::POST,
            "/api/v1/customers",
            Some(json!({ "name": "Minh", "phone": "0912345678" })),
        )
        .await;
    assert_eq!(created.status(), StatusCode::CREATED);
    let created = body_json(created).await;
    assert_eq!(created["name"], "Minh");

    let again = app
        .request_as(
            &fx.admin,
            Method::POST,
            "/api/v1/customers",
            Some(json!({ "name": "Someone else", "phone": " 0912345678 " })),
        )
        .await;
    assert_eq!(again.status(), StatusCode::OK);
    let again = body_json(again).await;
    assert_eq!(again["id"], created["id"]);
    assert_eq!(again["name"], "Minh");
}

#[tokio::test]
async fn malformed_phone_numbers_are_rejected() {
    let app = TestApp::new().await;
    let fx = app.fixture().await;

    for phone in ["12345", "09123456789", "09l2345678"] {
        let response = app
            .request_as(
                &fx.staff,
                Method::POST,
                "/api/v1/customers",
                Some(json!({ "name": "Minh", "phone": phone })),
            )
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{phone}");
    }
}

#[tokio::test]
async fn customers_can_be_fetched_by_id() {
    let app = TestApp::new().await;
    let fx = app.fixture().await;

    let response = app
        .request_as(
            &fx.staff,
            Method::GET,
            &format!("/api/v1/customers/{}", fx.customer.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["phone"], "0901234567");
    assert!(body["createdAt"].is_string());

    let missing = app
        .request_as(&fx.staff, Method::GET, "/api/v1/customers/4242", None)
        .await;
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn customer_routes_require_a_token() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::POST,
            "/api/v1/customers",
            Some(json!({ "name": "Minh", "phone": "0912345678" })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}
