use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post, put},
    Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    auth::{AuthRouterExt, Requester, Role},
    entities::{stock_lot, stock_out},
    errors::ServiceError,
    services::stock_ledger::{
        LotDeduction, ProductStockTotal, ReceiveStockRequest, SetLotQuantityRequest, StockKey,
        StockLotPage, StockLotQuery, StockOutRequest, StockTotalsQuery,
    },
    AppState,
};

#[derive(Debug, Clone, Deserialize, Validate, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct AvailableStockQuery {
    #[validate(range(min = 1))]
    pub product_id: i32,
    #[validate(range(min = 1))]
    pub shop_id: i32,
    #[validate(range(min = 1))]
    pub warehouse_id: i32,
    /// Without a category every category of the warehouse is counted
    pub category_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AvailableStockResponse {
    pub available: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockLotView {
    pub id: i32,
    pub product_id: i32,
    pub category_id: i32,
    pub warehouse_id: i32,
    pub shop_id: i32,
    pub image_id: Option<i32>,
    pub quantity: i32,
    pub expiry_date: Option<NaiveDate>,
    pub created_by: Option<i32>,
    pub updated_by: Option<i32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<stock_lot::Model> for StockLotView {
    fn from(lot: stock_lot::Model) -> Self {
        Self {
            id: lot.id,
            product_id: lot.product_id,
            category_id: lot.category_id,
            warehouse_id: lot.warehouse_id,
            shop_id: lot.shop_id,
            image_id: lot.image_id,
            quantity: lot.quantity,
            expiry_date: lot.expiry_date,
            created_by: lot.created_by,
            updated_by: lot.updated_by,
            created_at: lot.created_at,
            updated_at: lot.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockOutView {
    pub id: i32,
    pub product_id: i32,
    pub warehouse_id: i32,
    pub shop_id: i32,
    pub quantity: i32,
    pub reason: Option<String>,
    pub created_by: i32,
    pub created_at: DateTime<Utc>,
    pub deductions: Vec<LotDeduction>,
}

impl StockOutView {
    fn new(record: stock_out::Model, deductions: Vec<LotDeduction>) -> Self {
        Self {
            id: record.id,
            product_id: record.product_id,
            warehouse_id: record.warehouse_id,
            shop_id: record.shop_id,
            quantity: record.quantity,
            reason: record.reason,
            created_by: record.created_by,
            created_at: record.created_at,
            deductions,
        }
    }
}

pub fn stock_routes() -> Router<AppState> {
    Router::new()
        .route("/stock/available", get(available_stock))
        .route("/stock/lots", get(list_lots).post(receive_stock))
        .route("/stock/totals", get(product_totals))
        .route("/stock/lots/:lotId", put(set_lot_quantity).delete(delete_lot))
        .route("/stock/stock-outs", post(create_stock_out))
        .with_roles(&[Role::Admin, Role::Staff])
}

/// Usable quantity of a product, ignoring empty and expired lots
#[utoipa::path(
    get,
    path = "/api/v1/stock/available",
    summary = "Available stock",
    params(AvailableStockQuery),
    responses(
        (status = 200, description = "Available quantity", body = AvailableStockResponse),
        (status = 400, description = "Invalid query", body = crate::errors::ErrorResponse),
        (status = 403, description = "Shop belongs to someone else", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn available_stock(
    State(state): State<AppState>,
    requester: Requester,
    Query(query): Query<AvailableStockQuery>,
) -> Result<Json<AvailableStockResponse>, ServiceError> {
    query.validate()?;
    requester.ensure_shop_access(query.shop_id)?;

    let available = state
        .services
        .stock
        .query_available(StockKey {
            product_id: query.product_id,
            shop_id: query.shop_id,
            warehouse_id: query.warehouse_id,
            category_id: query.category_id,
        })
        .await?;
    Ok(Json(AvailableStockResponse { available }))
}

/// Stock lots, earliest expiry first. Staff only see their own shop.
#[utoipa::path(
    get,
    path = "/api/v1/stock/lots",
    summary = "List stock lots",
    params(StockLotQuery),
    responses(
        (status = 200, description = "Page of stock lots", body = StockLotPage),
        (status = 400, description = "Invalid query", body = crate::errors::ErrorResponse),
        (status = 403, description = "Shop belongs to someone else", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_lots(
    State(state): State<AppState>,
    requester: Requester,
    Query(query): Query<StockLotQuery>,
) -> Result<Json<StockLotPage>, ServiceError> {
    let page = state.services.stock.list_lots(&requester, query).await?;
    Ok(Json(page))
}

/// Orderable quantity per product in a warehouse
#[utoipa::path(
    get,
    path = "/api/v1/stock/totals",
    summary = "Stock totals per product",
    params(StockTotalsQuery),
    responses(
        (status = 200, description = "Usable stock per product", body = [ProductStockTotal]),
        (status = 400, description = "Invalid query or unknown warehouse", body = crate::errors::ErrorResponse),
        (status = 403, description = "Warehouse belongs to another shop", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn product_totals(
    State(state): State<AppState>,
    requester: Requester,
    Query(query): Query<StockTotalsQuery>,
) -> Result<Json<Vec<ProductStockTotal>>, ServiceError> {
    let totals = state.services.stock.product_totals(&requester, query).await?;
    Ok(Json(totals))
}

/// Receive stock into a warehouse category
#[utoipa::path(
    post,
    path = "/api/v1/stock/lots",
    summary = "Receive stock",
    description = "Credits the lot with the same product, category, image and expiry, or opens a new one",
    request_body = ReceiveStockRequest,
    responses(
        (status = 201, description = "Stock received", body = StockLotView),
        (status = 400, description = "Invalid request or unknown reference", body = crate::errors::ErrorResponse),
        (status = 403, description = "Warehouse belongs to another shop", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn receive_stock(
    State(state): State<AppState>,
    requester: Requester,
    Json(request): Json<ReceiveStockRequest>,
) -> Result<(StatusCode, Json<StockLotView>), ServiceError> {
    let lot = state.services.stock.receive(&requester, request).await?;
    Ok((StatusCode::CREATED, Json(lot.into())))
}

#[utoipa::path(
    put,
    path = "/api/v1/stock/lots/{lotId}",
    summary = "Set lot quantity",
    params(("lotId" = i32, Path, description = "Stock lot ID")),
    request_body = SetLotQuantityRequest,
    responses(
        (status = 200, description = "Lot updated", body = StockLotView),
        (status = 400, description = "Negative quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Lot not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn set_lot_quantity(
    State(state): State<AppState>,
    Path(lot_id): Path<i32>,
    requester: Requester,
    Json(request): Json<SetLotQuantityRequest>,
) -> Result<Json<StockLotView>, ServiceError> {
    request.validate()?;
    let lot = state
        .services
        .stock
        .set_quantity(&requester, lot_id, request.quantity)
        .await?;
    Ok(Json(lot.into()))
}

#[utoipa::path(
    delete,
    path = "/api/v1/stock/lots/{lotId}",
    summary = "Delete empty lot",
    params(("lotId" = i32, Path, description = "Stock lot ID")),
    responses(
        (status = 200, description = "Lot deleted", body = MessageResponse),
        (status = 400, description = "Lot still holds stock", body = crate::errors::ErrorResponse),
        (status = 404, description = "Lot not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn delete_lot(
    State(state): State<AppState>,
    Path(lot_id): Path<i32>,
    requester: Requester,
) -> Result<Json<MessageResponse>, ServiceError> {
    state.services.stock.delete_lot(&requester, lot_id).await?;
    Ok(Json(MessageResponse {
        message: format!("Stock lot {} deleted", lot_id),
    }))
}

/// Take stock out of a warehouse for reasons other than an order
#[utoipa::path(
    post,
    path = "/api/v1/stock/stock-outs",
    summary = "Record stock-out",
    request_body = StockOutRequest,
    responses(
        (status = 201, description = "Stock removed", body = StockOutView),
        (status = 400, description = "Invalid request or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 403, description = "Warehouse belongs to another shop", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_stock_out(
    State(state): State<AppState>,
    requester: Requester,
    Json(request): Json<StockOutRequest>,
) -> Result<(StatusCode, Json<StockOutView>), ServiceError> {
    let result = state.services.stock.stock_out(&requester, request).await?;
    Ok((
        StatusCode::CREATED,
        Json(StockOutView::new(result.stock_out, result.deductions)),
    ))
}
