use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};

use crate::{
    auth::{AuthRouterExt, Requester, Role},
    errors::ServiceError,
    services::customers::{CreateCustomerRequest, CustomerView},
    AppState,
};

pub fn customer_routes() -> Router<AppState> {
    Router::new()
        .route("/customers", post(create_customer))
        .route("/customers/:customerId", get(get_customer))
        .with_roles(&[Role::Admin, Role::Staff])
}

/// Register a customer, or return the one already holding the phone number
#[utoipa::path(
    post,
    path = "/api/v1/customers",
    summary = "Register customer",
    request_body = CreateCustomerRequest,
    responses(
        (status = 201, description = "Customer created", body = CustomerView),
        (status = 200, description = "Customer with this phone already exists", body = CustomerView),
        (status = 400, description = "Invalid name or phone", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn create_customer(
    State(state): State<AppState>,
    _requester: Requester,
    Json(request): Json<CreateCustomerRequest>,
) -> Result<(StatusCode, Json<CustomerView>), ServiceError> {
    let (customer, created) = state.services.customers.find_or_create(request).await?;
    let status = if created {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(customer)))
}

#[utoipa::path(
    get,
    path = "/api/v1/customers/{customerId}",
    summary = "Get customer",
    params(("customerId" = i32, Path, description = "Customer ID")),
    responses(
        (status = 200, description = "Customer retrieved", body = CustomerView),
        (status = 404, description = "Customer not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = []))
)]
pub async fn get_customer(
    State(state): State<AppState>,
    Path(customer_id): Path<i32>,
    _requester: Requester,
) -> Result<Json<CustomerView>, ServiceError> {
    let customer = state.services.customers.get(customer_id).await?;
    Ok(Json(customer))
}
