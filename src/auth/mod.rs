/*!
 * # Authentication and Authorization Module
 *
 * Bearer JWTs (HS256) carry the user id in `sub`. Every authenticated request
 * resolves that id against the `users` table into a [`Requester`], which the
 * services use for shop scoping. Routers opt into role checks with
 * [`AuthRouterExt::with_roles`].
 */

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use sea_orm::{DatabaseConnection, EntityTrait};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::AppConfig;
use crate::entities::user;

mod types;

pub use types::*;

/// Claim structure for JWT tokens
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // Subject (user ID)
    pub jti: String, // JWT ID
    pub iat: i64,    // Issued at time
    pub exp: i64,    // Expiration time
    pub nbf: i64,    // Not valid before time
    pub iss: String, // Issuer
    pub aud: String, // Audience
}

/// Authentication configuration
#[derive(Clone, Debug)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_audience: String,
    pub jwt_issuer: String,
    pub access_token_expiration: Duration,
}

impl AuthConfig {
    pub fn new(jwt_secret: String, jwt_audience: String, jwt_issuer: String) -> Self {
        Self {
            jwt_secret,
            jwt_audience,
            jwt_issuer,
            access_token_expiration: Duration::from_secs(30 * 60),
        }
    }
}

impl From<&AppConfig> for AuthConfig {
    fn from(cfg: &AppConfig) -> Self {
        Self::new(
            cfg.jwt_secret.clone(),
            cfg.auth_audience.clone(),
            cfg.auth_issuer.clone(),
        )
    }
}

/// Validates bearer tokens and resolves them to requesters
#[derive(Debug, Clone)]
pub struct AuthService {
    pub config: AuthConfig,
    pub db: Arc<DatabaseConnection>,
}

impl AuthService {
    pub fn new(config: AuthConfig, db: Arc<DatabaseConnection>) -> Self {
        Self { config, db }
    }

    /// Issues an access token for `user_id`. Login flows live outside this
    /// service; this is used by operator tooling and tests.
    pub fn issue_token(&self, user_id: i32) -> Result<String, AuthError> {
        let now = Utc::now();
        let exp = now
            + ChronoDuration::from_std(self.config.access_token_expiration)
                .map_err(|_| AuthError::InternalError("Invalid token duration".to_string()))?;

        let claims = Claims {
            sub: user_id.to_string(),
            jti: Uuid::new_v4().to_string(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
            nbf: now.timestamp(),
            iss: self.config.jwt_issuer.clone(),
            aud: self.config.jwt_audience.clone(),
        };

        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()),
        )
        .map_err(|e| AuthError::TokenCreation(e.to_string()))
    }

    /// Validate a JWT token and extract the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[self.config.jwt_issuer.as_str()]);
        validation.set_audience(&[self.config.jwt_audience.as_str()]);
        validation.validate_nbf = true;

        decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()),
            &validation,
        )
        .map(|data| data.claims)
        .map_err(|e| match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::InvalidToken,
        })
    }

    /// Looks the token subject up in the user directory
    pub async fn resolve_requester(&self, claims: &Claims) -> Result<Requester, AuthError> {
        let user_id: i32 = claims.sub.parse().map_err(|_| AuthError::InvalidToken)?;

        let user = user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await
            .map_err(|e| AuthError::DatabaseError(e.to_string()))?
            .ok_or(AuthError::UserNotFound)?;

        let role = Role::from_str(&user.role).map_err(|_| {
            warn!(user_id, role = %user.role, "User has an unknown role");
            AuthError::InsufficientPermissions
        })?;

        Ok(Requester {
            user_id: user.id,
            role,
            shop_id: user.shop_id,
        })
    }
}

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    MissingAuth,

    #[error("Invalid token")]
    InvalidToken,

    #[error("Token has expired")]
    TokenExpired,

    #[error("Token creation failed: {0}")]
    TokenCreation(String),

    #[error("User not found")]
    UserNotFound,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_code, error_message): (StatusCode, &str, String) = match &self {
            Self::MissingAuth => (
                StatusCode::UNAUTHORIZED,
                "AUTH_MISSING",
                "Authentication required".to_string(),
            ),
            Self::InvalidToken => (
                StatusCode::UNAUTHORIZED,
                "AUTH_INVALID_TOKEN",
                "Invalid authentication token".to_string(),
            ),
            Self::TokenExpired => (
                StatusCode::UNAUTHORIZED,
                "AUTH_TOKEN_EXPIRED",
                "Token has expired".to_string(),
            ),
            Self::TokenCreation(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_TOKEN_CREATION_FAILED",
                msg.clone(),
            ),
            // The token was well formed but names nobody we know.
            Self::UserNotFound => (
                StatusCode::UNAUTHORIZED,
                "AUTH_USER_NOT_FOUND",
                "User not found".to_string(),
            ),
            Self::InsufficientPermissions => (
                StatusCode::FORBIDDEN,
                "AUTH_INSUFFICIENT_PERMISSIONS",
                "Insufficient permissions".to_string(),
            ),
            Self::DatabaseError(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_DATABASE_ERROR",
                "Database error".to_string(),
            ),
            Self::InternalError(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "AUTH_INTERNAL_ERROR",
                msg.clone(),
            ),
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": error_code,
                "message": error_message,
            }
        }));

        (status, body).into_response()
    }
}

#[axum::async_trait]
impl<S> FromRequestParts<S> for Requester
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Requester>()
            .cloned()
            .ok_or(AuthError::MissingAuth)
    }
}

/// Authentication middleware that resolves the bearer token to a `Requester`
pub async fn auth_middleware(mut request: Request, next: Next) -> Response {
    let auth_service = match request.extensions().get::<Arc<AuthService>>() {
        Some(service) => service.clone(),
        None => {
            return AuthError::InternalError("Authentication service not available".to_string())
                .into_response();
        }
    };

    match extract_requester(request.headers(), &auth_service).await {
        Ok(requester) => {
            debug!(user_id = requester.user_id, role = %requester.role, "Authenticated request");
            request.extensions_mut().insert(requester);
            next.run(request).await
        }
        Err(e) => e.into_response(),
    }
}

async fn extract_requester(
    headers: &HeaderMap,
    auth_service: &AuthService,
) -> Result<Requester, AuthError> {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingAuth)?;

    let claims = auth_service.validate_token(token)?;
    auth_service.resolve_requester(&claims).await
}

/// Role middleware: the resolved requester must hold one of `allowed`
pub async fn role_middleware(
    State(allowed): State<Arc<[Role]>>,
    request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let requester = request
        .extensions()
        .get::<Requester>()
        .ok_or(AuthError::MissingAuth)?;

    if !allowed.contains(&requester.role) {
        return Err(AuthError::InsufficientPermissions);
    }

    Ok(next.run(request).await)
}

/// Extension methods for Router to add auth middleware
pub trait AuthRouterExt {
    fn with_auth(self) -> Self;
    fn with_roles(self, roles: &[Role]) -> Self;
}

impl<S> AuthRouterExt for axum::Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    fn with_auth(self) -> Self {
        self.layer(axum::middleware::from_fn(auth_middleware))
    }

    // Layers run outside-in, so auth is added last to run first.
    fn with_roles(self, roles: &[Role]) -> Self {
        let allowed: Arc<[Role]> = roles.into();
        self.layer(axum::middleware::from_fn_with_state(allowed, role_middleware))
            .with_auth()
    }
}
