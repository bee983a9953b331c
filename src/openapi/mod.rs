use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ShopStock API",
        version = "1.0.0",
        description = r#"
# ShopStock API

Order and stock engine for retail shops. Each shop owns warehouses, each warehouse
is split into categories, and stock is held in lots with an optional expiry date.

## Features

- **Orders**: atomic creation with first-expiry-first-out stock allocation
- **Order lifecycle**: processing, ready_for_pickup, completed (forward only)
- **Stock**: intake, counts, stock-outs, lot listings, per-product totals and availability
- **Customers**: registration keyed by phone number

## Authentication

Every endpoint except `/health` and `/status` requires a bearer token:

```
Authorization: Bearer <your-jwt-token>
```

Staff accounts only see and act on their own shop.

## Errors

```json
{
  "error": "Bad Request",
  "message": "Insufficient stock for product 7: requested 4, short by 1",
  "request_id": "req-abc123xyz",
  "timestamp": "2024-01-01T00:00:00Z"
}
```

Money amounts are decimal strings.
        "#,
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "Orders", description = "Order creation, lookup and status"),
        (name = "Stock", description = "Stock lots and availability"),
        (name = "Customers", description = "Customer registration"),
    ),
    paths(
        // Orders
        crate::handlers::orders::create_order,
        crate::handlers::orders::create_staff_order,
        crate::handlers::orders::update_order_status,
        crate::handlers::orders::list_orders,
        crate::handlers::orders::get_order,
        crate::handlers::orders::get_order_details,

        // Customers
        crate::handlers::customers::create_customer,
        crate::handlers::customers::get_customer,

        // Stock
        crate::handlers::stock::available_stock,
        crate::handlers::stock::list_lots,
        crate::handlers::stock::product_totals,
        crate::handlers::stock::receive_stock,
        crate::handlers::stock::set_lot_quantity,
        crate::handlers::stock::delete_lot,
        crate::handlers::stock::create_stock_out,
    ),
    components(
        schemas(
            // Order types
            crate::services::orders::CreateOrderRequest,
            crate::services::orders::StaffOrderRequest,
            crate::services::orders::OrderItemRequest,
            crate::services::orders::OrderSummary,
            crate::services::orders::OrderView,
            crate::services::orders::OrderLineView,
            crate::services::orders::OrderDetails,
            crate::services::orders::OrderPage,
            crate::services::orders::PaymentMethod,
            crate::services::order_status::OrderStatus,
            crate::handlers::orders::UpdateOrderStatusRequest,
            crate::handlers::orders::OrderStatusResponse,

            // Customer types
            crate::services::customers::CreateCustomerRequest,
            crate::services::customers::CustomerView,

            // Stock types
            crate::services::stock_ledger::ReceiveStockRequest,
            crate::services::stock_ledger::SetLotQuantityRequest,
            crate::services::stock_ledger::StockOutRequest,
            crate::services::stock_ledger::LotDeduction,
            crate::services::stock_ledger::StockLotListing,
            crate::services::stock_ledger::StockLotPage,
            crate::services::stock_ledger::ProductStockTotal,
            crate::handlers::stock::AvailableStockResponse,
            crate::handlers::stock::StockLotView,
            crate::handlers::stock::StockOutView,
            crate::handlers::stock::MessageResponse,

            // Error types
            crate::errors::ErrorResponse
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDocV1;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "Bearer",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDocV1::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openapi_document_lists_order_and_stock_routes() {
        let openapi = ApiDocV1::openapi();
        let json = serde_json::to_string(&openapi).unwrap();
        assert!(json.contains("ShopStock API"));
        assert!(json.contains("/api/v1/orders/{orderId}/status"));
        assert!(json.contains("/api/v1/stock/stock-outs"));
        assert!(json.contains("/api/v1/stock/totals"));
        assert!(json.contains("ProductStockTotal"));
        assert!(json.contains("\"Bearer\""));
    }
}
