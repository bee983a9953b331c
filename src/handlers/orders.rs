use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, patch, post},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::{
    auth::{AuthRouterExt, Requester, Role},
    errors::ServiceError,
    services::{
        order_status::OrderStatus,
        orders::{
            CreateOrderRequest, OrderDetails, OrderListQuery, OrderPage, OrderSummary, OrderView,
            StaffOrderRequest,
        },
    },
    AppState,
};

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    #[schema(example = "ready_for_pickup")]
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatusResponse {
    pub message: String,
    pub order_id: i32,
    pub status: OrderStatus,
}

/// Order routes. Staff-only creation sits behind its own role gate.
pub fn order_routes() -> Router<AppState> {
    let shared = Router::new()
        .route("/orders", get(list_orders).post(create_order))
        .route("/orders/:orderId", get(get_order))
        .route("/orders/:orderId/details", get(get_order_details))
        .route("/orders/:orderId/status", patch(update_order_status))
        .with_roles(&[Role::Admin, Role::Staff]);

    let staff_only = Router::new()
        .route("/orders/staff", post(create_staff_order))
        .with_roles(&[Role::Staff]);

    shared.merge(staff_only)
}

/// Create an order for a given shop and warehouse
#[utoipa::path(
    post,
    path = "/api/v1/orders",
    summary = "Create order",
    description = "Allocates stock first-expiry-first-out, prices every line from the product master and stores the order atomically",
    request_body = CreateOrderRequest,
    responses(
        (status = 201, description = "Order created", body = OrderSummary,
            headers(("X-Request-Id" = String, description = "Unique request id"))
        ),
        (status = 400, description = "Invalid request, unknown reference or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Shop belongs to someone else", body = crate::errors::ErrorResponse),
        (status = 503, description = "Contended, retry", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_order(
    State(state): State<AppState>,
    requester: Requester,
    Json(request): Json<CreateOrderRequest>,
) -> Result<(StatusCode, Json<OrderSummary>), ServiceError> {
    let summary = state
        .services
        .orders
        .create_order(&requester, request)
        .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Create an order in the caller's own shop
#[utoipa::path(
    post,
    path = "/api/v1/orders/staff",
    summary = "Create order as staff",
    description = "Shop and warehouse are taken from the staff member's assignment",
    request_body = StaffOrderRequest,
    responses(
        (status = 201, description = "Order created", body = OrderSummary),
        (status = 400, description = "Invalid request, no shop assignment or insufficient stock", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Staff role required", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_staff_order(
    State(state): State<AppState>,
    requester: Requester,
    Json(request): Json<StaffOrderRequest>,
) -> Result<(StatusCode, Json<OrderSummary>), ServiceError> {
    let summary = state
        .services
        .orders
        .create_order_as_staff(&requester, request)
        .await?;
    Ok((StatusCode::CREATED, Json(summary)))
}

/// Move an order forward through its lifecycle
#[utoipa::path(
    patch,
    path = "/api/v1/orders/{orderId}/status",
    summary = "Update order status",
    params(("orderId" = i32, Path, description = "Order ID")),
    request_body = UpdateOrderStatusRequest,
    responses(
        (status = 200, description = "Status updated", body = OrderStatusResponse),
        (status = 400, description = "Unknown status or backward transition", body = crate::errors::ErrorResponse),
        (status = 403, description = "Order belongs to another shop", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Status changed concurrently", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    requester: Requester,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<Json<OrderStatusResponse>, ServiceError> {
    let change = state
        .services
        .order_status
        .update_status(&requester, order_id, &request.status)
        .await?;

    let message = if change.changed() {
        format!("Order status updated to {}", change.to)
    } else {
        format!("Order is already {}", change.to)
    };
    Ok(Json(OrderStatusResponse {
        message,
        order_id,
        status: change.to,
    }))
}

/// List orders visible to the caller
#[utoipa::path(
    get,
    path = "/api/v1/orders",
    summary = "List orders",
    description = "Newest first. Staff only see orders of their own shop.",
    params(OrderListQuery),
    responses(
        (status = 200, description = "Orders retrieved", body = OrderPage),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn list_orders(
    State(state): State<AppState>,
    requester: Requester,
    Query(query): Query<OrderListQuery>,
) -> Result<Json<OrderPage>, ServiceError> {
    let page = state.services.orders.list_orders(&requester, query).await?;
    Ok(Json(page))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{orderId}",
    summary = "Get order",
    params(("orderId" = i32, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order retrieved", body = OrderView),
        (status = 403, description = "Order belongs to another shop", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    requester: Requester,
) -> Result<Json<OrderView>, ServiceError> {
    let order = state.services.orders.get_order(&requester, order_id).await?;
    Ok(Json(order))
}

#[utoipa::path(
    get,
    path = "/api/v1/orders/{orderId}/details",
    summary = "Get order with lines",
    description = "Order header, customer and every line with the stock lots it drew from",
    params(("orderId" = i32, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order details retrieved", body = OrderDetails),
        (status = 403, description = "Order belongs to another shop", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_order_details(
    State(state): State<AppState>,
    Path(order_id): Path<i32>,
    requester: Requester,
) -> Result<Json<OrderDetails>, ServiceError> {
    let details = state
        .services
        .orders
        .get_order_details(&requester, order_id)
        .await?;
    Ok(Json(details))
}
