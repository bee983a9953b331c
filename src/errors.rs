use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{DbErr, SqlErr};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

fn current_request_id() -> Option<String> {
    crate::tracing::current_request_id().map(|rid| rid.as_str().to_string())
}

/// Error body returned by every failing endpoint
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "error": "Bad Request",
    "message": "Insufficient stock for product 7: requested 4, short by 1",
    "details": null,
    "request_id": "req-abc123xyz",
    "timestamp": "2024-12-09T10:30:00.000Z"
}))]
pub struct ErrorResponse {
    /// HTTP status category (e.g., "Not Found", "Bad Request")
    #[schema(example = "Bad Request")]
    pub error: String,
    /// Human-readable error description
    pub message: String,
    /// Set to "retryable" when the whole operation may safely be retried
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    /// Unique request identifier for support and debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "req-abc123xyz")]
    pub request_id: Option<String>,
    /// RFC 3339 timestamp when the error occurred
    pub timestamp: String,
}

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(DbErr),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Customer {0} not found")]
    CustomerNotFound(i32),

    #[error("Product {0} not found")]
    ProductNotFound(i32),

    #[error("Shop {0} not found")]
    ShopNotFound(i32),

    #[error("Warehouse {0} not found")]
    WarehouseNotFound(i32),

    #[error("Category {0} not found")]
    CategoryNotFound(i32),

    #[error("Order {0} not found")]
    OrderNotFound(i32),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Staff user {0} is not assigned to a shop")]
    StaffNotAssigned(i32),

    #[error("Insufficient stock for product {product_id}: requested {requested}, short by {shortfall}")]
    InsufficientStock {
        product_id: i32,
        requested: i32,
        shortfall: i32,
    },

    #[error("Product {0} has no positive list or promotional price")]
    InvalidPrice(i32),

    #[error("Invalid status: {0}")]
    InvalidStatus(String),

    #[error("Cannot move order from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Concurrent modification: {0}")]
    ConcurrencyConflict(String),

    #[error("Order code generation exhausted after {0} attempts")]
    CodeGenerationExhausted(u32),

    #[error("Service busy: {0}")]
    Busy(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

/// Fragments of driver messages that mean "lost a lock race or ran out of time".
const TRANSIENT_DB_MARKERS: [&str; 9] = [
    "database is locked",
    "database table is locked",
    "deadlock detected",
    "could not serialize access",
    "lock timeout",
    "could not obtain lock",
    "canceling statement due to statement timeout",
    "pool timed out",
    "connection acquire timeout",
];

impl From<DbErr> for ServiceError {
    fn from(err: DbErr) -> Self {
        ServiceError::from_db(err)
    }
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    /// Classifies a storage error: unique violations become conflicts, lock and
    /// timeout failures become `Busy`, everything else stays a database error.
    pub fn from_db(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(detail)) = err.sql_err() {
            return ServiceError::ConcurrencyConflict(detail);
        }

        let text = err.to_string().to_ascii_lowercase();
        if TRANSIENT_DB_MARKERS
            .iter()
            .any(|marker| text.contains(marker))
        {
            return ServiceError::Busy(err.to_string());
        }

        ServiceError::DatabaseError(err)
    }

    /// True when the failed operation left no effects and may be retried as a whole.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Busy(_) | Self::CodeGenerationExhausted(_) | Self::ConcurrencyConflict(_)
        )
    }

    /// Returns the HTTP status code for this error.
    /// This is the single source of truth for error-to-status mapping.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ValidationError(_)
            | Self::InvalidStatus(_)
            | Self::InvalidTransition { .. }
            | Self::InvalidPrice(_)
            | Self::InsufficientStock { .. }
            | Self::CustomerNotFound(_)
            | Self::ProductNotFound(_)
            | Self::ShopNotFound(_)
            | Self::WarehouseNotFound(_)
            | Self::CategoryNotFound(_)
            | Self::StaffNotAssigned(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::AccessDenied(_) => StatusCode::FORBIDDEN,
            Self::OrderNotFound(_) | Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::ConcurrencyConflict(_) => StatusCode::CONFLICT,
            Self::Busy(_) | Self::CodeGenerationExhausted(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::DatabaseError(_) | Self::InternalError(_) | Self::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns the error message suitable for HTTP responses.
    /// Internal errors return generic messages to avoid leaking implementation details.
    pub fn response_message(&self) -> String {
        match self {
            Self::DatabaseError(_) => "Database error".to_string(),
            Self::InternalError(_) | Self::Other(_) => "Internal server error".to_string(),
            Self::Busy(_) => "Service busy, retry the request".to_string(),
            Self::ConcurrencyConflict(_) => {
                "The request conflicted with a concurrent change, retry the request".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        }

        let err = ErrorResponse {
            error: status.canonical_reason().unwrap_or("Error").to_string(),
            message: self.response_message(),
            details: self.is_retryable().then(|| "retryable".to_string()),
            request_id: current_request_id(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        };

        (status, Json(err)).into_response()
    }
}
