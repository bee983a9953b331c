mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, date, TestApp};
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;
use shopstock_api::entities::{stock_lot, stock_out};

#[tokio::test]
async fn availability_ignores_expired_lots_and_respects_category() {
    let app = TestApp::new().await;
    let fx = app.fixture().await;
    let frozen = app.seed_category(fx.warehouse.id, "Frozen").await;
    let fish = app.seed_product("FISH", dec!(500), None).await;
    app.seed_lot(fish.id, &fx.category, 4, Some(date(2024, 3, 1))).await;
    app.seed_lot(fish.id, &fx.category, 9, Some(date(2023, 12, 1))).await;
    app.seed_lot(fish.id, &frozen, 6, None).await;

    let pooled = body_json(
        app.request_as(
            &fx.staff,
            Method::GET,
            &format!(
                "/api/v1/stock/available?productId={}&shopId={}&warehouseId={}",
                fish.id, fx.shop.id, fx.warehouse.id
            ),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(pooled["available"], 10);

    let frozen_only = body_json(
        app.request_as(
            &fx.staff,
            Method::GET,
            &format!(
                "/api/v1/stock/available?productId={}&shopId={}&warehouseId={}&categoryId={}",
                fish.id, fx.shop.id, fx.warehouse.id, frozen.id
            ),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(frozen_only["available"], 6);
}

#[tokio::test]
async fn staff_cannot_query_another_shop() {
    let app = TestApp::new().await;
    let fx = app.fixture().await;
    let elsewhere = app.seed_shop("Harbour").await;
    let dock = app.seed_warehouse(elsewhere.id, "Dock").await;

    let response = app
        .request_as(
            &fx.staff,
            Method::GET,
            &format!(
                "/api/v1/stock/available?productId=1&shopId={}&warehouseId={}",
                elsewhere.id, dock.id
            ),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn intake_merges_matching_lots() {
    let app = TestApp::new().await;
    let fx = app.fixture().await;
    let tea = app.seed_product("TEA", dec!(10), None).await;
    let payload = json!({
        "productId": tea.id,
        "categoryId": fx.category.id,
        "warehouseId": fx.warehouse.id,
        "quantity": 5,
        "expiryDate": "2024-05-01"
    });

    let first = app
        .request_as(&fx.staff, Method::POST, "/api/v1/stock/lots", Some(payload.clone()))
        .await;
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = body_json(first).await;
    assert_eq!(first["quantity"], 5);
    assert_eq!(first["shopId"], fx.shop.id);

    let second = body_json(
        app.request_as(&fx.staff, Method::POST, "/api/v1/stock/lots", Some(payload))
            .await,
    )
    .await;
    assert_eq!(second["id"], first["id"]);
    assert_eq!(second["quantity"], 10);

    let undated = body_json(
        app.request_as(
            &fx.staff,
            Method::POST,
            "/api/v1/stock/lots",
            Some(json!({
                "productId": tea.id,
                "categoryId": fx.category.id,
                "warehouseId": fx.warehouse.id,
                "quantity": 2
            })),
        )
        .await,
    )
    .await;
    assert_ne!(undated["id"], first["id"]);
    assert_eq!(stock_lot::Entity::find().count(&*app.db).await.unwrap(), 2);
}

#[tokio::test]
async fn intake_validates_references() {
    let app = TestApp::new().await;
    let fx = app.fixture().await;
    let tea = app.seed_product("TEA", dec!(10), None).await;
    let elsewhere = app.seed_shop("Harbour").await;
    let dock = app.seed_warehouse(elsewhere.id, "Dock").await;
    let dock_category = app.seed_category(dock.id, "Dry").await;

    let zero = app
        .request_as(
            &fx.admin,
            Method::POST,
            "/api/v1/stock/lots",
            Some(json!({
                "productId": tea.id, "categoryId": fx.category.id,
                "warehouseId": fx.warehouse.id, "quantity": 0
            })),
        )
        .await;
    assert_eq!(zero.status(), StatusCode::BAD_REQUEST);

    let mismatched = app
        .request_as(
            &fx.admin,
            Method::POST,
            "/api/v1/stock/lots",
            Some(json!({
                "productId": tea.id, "categoryId": dock_category.id,
                "warehouseId": fx.warehouse.id, "quantity": 3
            })),
        )
        .await;
    assert_eq!(mismatched.status(), StatusCode::BAD_REQUEST);

    let foreign = app
        .request_as(
            &fx.staff,
            Method::POST,
            "/api/v1/stock/lots",
            Some(json!({
                "productId": tea.id, "categoryId": dock_category.id,
                "warehouseId": dock.id, "quantity": 3
            })),
        )
        .await;
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn lot_count_can_be_corrected_and_empty_lots_deleted() {
    let app = TestApp::new().await;
    let fx = app.fixture().await;
    let tea = app.seed_product("TEA", dec!(10), None).await;
    let lot = app.seed_lot(tea.id, &fx.category, 8, None).await;
    let uri = format!("/api/v1/stock/lots/{}", lot.id);

    let negative = app
        .request_as(&fx.staff, Method::PUT, &uri, Some(json!({ "quantity": -1 })))
        .await;
    assert_eq!(negative.status(), StatusCode::BAD_REQUEST);

    let still_stocked = app.request_as(&fx.staff, Method::DELETE, &uri, None).await;
    assert_eq!(still_stocked.status(), StatusCode::BAD_REQUEST);

    let updated = app
        .request_as(&fx.staff, Method::PUT, &uri, Some(json!({ "quantity": 0 })))
        .await;
    assert_eq!(updated.status(), StatusCode::OK);
    assert_eq!(body_json(updated).await["updatedBy"], fx.staff.id);

    let deleted = app.request_as(&fx.staff, Method::DELETE, &uri, None).await;
    assert_eq!(deleted.status(), StatusCode::OK);
    assert!(body_json(deleted).await["message"].is_string());

    let gone = app.request_as(&fx.staff, Method::DELETE, &uri, None).await;
    assert_eq!(gone.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn stock_out_draws_fefo_and_is_recorded() {
    let app = TestApp::new().await;
    let fx = app.fixture().await;
    let tea = app.seed_product("TEA", dec!(10), None).await;
    let soon = app.seed_lot(tea.id, &fx.category, 2, Some(date(2024, 1, 10))).await;
    let later = app.seed_lot(tea.id, &fx.category, 5, Some(date(2024, 9, 1))).await;

    let response = app
        .request_as(
            &fx.staff,
            Method::POST,
            "/api/v1/stock/stock-outs",
            Some(json!({
                "productId": tea.id,
                "warehouseId": fx.warehouse.id,
                "quantity": 3,
                "reason": "damaged"
            })),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["reason"], "damaged");
    assert_eq!(body["deductions"].as_array().unwrap().len(), 2);

    assert_eq!(app.lot_quantity(soon.id).await, 0);
    assert_eq!(app.lot_quantity(later.id).await, 4);
    assert_eq!(stock_out::Entity::find().count(&*app.db).await.unwrap(), 1);

    let too_much = app
        .request_as(
            &fx.staff,
            Method::POST,
            "/api/v1/stock/stock-outs",
            Some(json!({
                "productId": tea.id,
                "warehouseId": fx.warehouse.id,
                "quantity": 50
            })),
        )
        .await;
    assert_eq!(too_much.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.lot_quantity(later.id).await, 4);
    assert_eq!(stock_out::Entity::find().count(&*app.db).await.unwrap(), 1);
}

#[tokio::test]
async fn stock_routes_require_a_token() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::GET,
            "/api/v1/stock/available?productId=1&shopId=1&warehouseId=1",
            None,
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn lot_listing_is_fefo_ordered_and_scoped_to_the_staff_shop() {
    let app = TestApp::new().await;
    let fx = app.fixture().await;
    let tea = app.seed_product("TEA", dec!(10), None).await;
    let undated = app.seed_lot(tea.id, &fx.category, 3, None).await;
    let later = app.seed_lot(tea.id, &fx.category, 5, Some(date(2024, 6, 1))).await;
    let soon = app.seed_lot(tea.id, &fx.category, 2, Some(date(2024, 2, 1))).await;
    let stale = app.seed_lot(tea.id, &fx.category, 4, Some(date(2023, 11, 1))).await;
    let empty = app.seed_lot(tea.id, &fx.category, 0, Some(date(2024, 3, 1))).await;

    let elsewhere = app.seed_shop("Harbour").await;
    let dock = app.seed_warehouse(elsewhere.id, "Dock").await;
    let dock_category = app.seed_category(dock.id, "Dry").await;
    app.seed_lot(tea.id, &dock_category, 9, None).await;

    let page = body_json(
        app.request_as(&fx.staff, Method::GET, "/api/v1/stock/lots", None)
            .await,
    )
    .await;
    let ids: Vec<i64> = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|lot| lot["id"].as_i64().unwrap())
        .collect();
    assert_eq!(
        ids,
        vec![soon.id, empty.id, later.id, undated.id]
            .into_iter()
            .map(i64::from)
            .collect::<Vec<_>>()
    );
    assert_eq!(page["total"], 4);
    assert_eq!(page["items"][0]["productCode"], "TEA");
    assert_eq!(page["items"][0]["categoryName"], "Dry goods");
    assert_eq!(page["items"][0]["expired"], false);

    let with_expired = body_json(
        app.request_as(
            &fx.staff,
            Method::GET,
            "/api/v1/stock/lots?includeExpired=true&inStockOnly=true",
            None,
        )
        .await,
    )
    .await;
    assert_eq!(with_expired["total"], 4);
    assert_eq!(with_expired["items"][0]["id"], stale.id);
    assert_eq!(with_expired["items"][0]["expired"], true);

    let everything = body_json(
        app.request_as(&fx.admin, Method::GET, "/api/v1/stock/lots?limit=2", None)
            .await,
    )
    .await;
    assert_eq!(everything["total"], 5);
    assert_eq!(everything["totalPages"], 3);
    assert_eq!(everything["items"].as_array().unwrap().len(), 2);

    let foreign = app
        .request_as(
            &fx.staff,
            Method::GET,
            &format!("/api/v1/stock/lots?shopId={}", elsewhere.id),
            None,
        )
        .await;
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn lot_listing_filters_by_warehouse_category_and_product() {
    let app = TestApp::new().await;
    let fx = app.fixture().await;
    let frozen = app.seed_category(fx.warehouse.id, "Frozen").await;
    let tea = app.seed_product("TEA", dec!(10), None).await;
    let fish = app.seed_product("FISH", dec!(500), None).await;
    app.seed_lot(tea.id, &fx.category, 3, None).await;
    let fish_lot = app.seed_lot(fish.id, &frozen, 6, None).await;
    app.seed_lot(fish.id, &fx.category, 1, None).await;

    let page = body_json(
        app.request_as(
            &fx.admin,
            Method::GET,
            &format!(
                "/api/v1/stock/lots?warehouseId={}&categoryId={}&productId={}",
                fx.warehouse.id, frozen.id, fish.id
            ),
            None,
        )
        .await,
    )
    .await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["id"], fish_lot.id);
    assert_eq!(page["items"][0]["categoryName"], "Frozen");
}

#[tokio::test]
async fn totals_sum_usable_stock_per_product() {
    let app = TestApp::new().await;
    let fx = app.fixture().await;
    let frozen = app.seed_category(fx.warehouse.id, "Frozen").await;
    let tea = app.seed_product("TEA", dec!(10), None).await;
    let fish = app.seed_product("FISH", dec!(500), None).await;
    let salt = app.seed_product("SALT", dec!(5), None).await;
    app.seed_lot(tea.id, &fx.category, 3, Some(date(2024, 4, 1))).await;
    app.seed_lot(tea.id, &frozen, 4, Some(date(2024, 2, 1))).await;
    app.seed_lot(tea.id, &fx.category, 7, Some(date(2023, 12, 1))).await;
    app.seed_lot(fish.id, &frozen, 6, None).await;
    app.seed_lot(salt.id, &fx.category, 0, None).await;

    let response = app
        .request_as(
            &fx.staff,
            Method::GET,
            &format!("/api/v1/stock/totals?warehouseId={}", fx.warehouse.id),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    let totals = body_json(response).await;
    let totals = totals.as_array().unwrap();
    assert_eq!(totals.len(), 2);

    assert_eq!(totals[0]["productCode"], "FISH");
    assert_eq!(totals[0]["available"], 6);
    assert!(totals[0]["nearestExpiry"].is_null());

    assert_eq!(totals[1]["productCode"], "TEA");
    assert_eq!(totals[1]["available"], 7);
    assert_eq!(totals[1]["lotCount"], 2);
    assert_eq!(totals[1]["nearestExpiry"], "2024-02-01");
    assert_eq!(totals[1]["categoryNames"], json!(["Dry goods", "Frozen"]));

    let frozen_only = body_json(
        app.request_as(
            &fx.staff,
            Method::GET,
            &format!(
                "/api/v1/stock/totals?warehouseId={}&categoryId={}",
                fx.warehouse.id, frozen.id
            ),
            None,
        )
        .await,
    )
    .await;
    let tea_frozen = frozen_only
        .as_array()
        .unwrap()
        .iter()
        .find(|t| t["productCode"] == "TEA")
        .cloned()
        .unwrap();
    assert_eq!(tea_frozen["available"], 4);
}

#[tokio::test]
async fn totals_respect_shop_boundaries() {
    let app = TestApp::new().await;
    let fx = app.fixture().await;
    let elsewhere = app.seed_shop("Harbour").await;
    let dock = app.seed_warehouse(elsewhere.id, "Dock").await;

    let foreign = app
        .request_as(
            &fx.staff,
            Method::GET,
            &format!("/api/v1/stock/totals?warehouseId={}", dock.id),
            None,
        )
        .await;
    assert_eq!(foreign.status(), StatusCode::FORBIDDEN);

    let missing = app
        .request_as(&fx.admin, Method::GET, "/api/v1/stock/totals?warehouseId=999", None)
        .await;
    assert_eq!(missing.status(), StatusCode::BAD_REQUEST);
}
