//! Authentication middleware for protected routes.

use axum::{
    Json,
    extract::{FromRequestParts, Request, State},
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::{IntoResponse, Response},
};
use closure_core::auth::UserRole;
use closure_shared::types::{CompanyId, UserId};
use closure_shared::{AppError, Claims, JwtError};
use serde_json::json;

use crate::AppState;
use crate::error::ApiError;

/// Extracts the bearer token from the Authorization header.
fn extract_bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
}

fn unauthorized(code: &str, message: &str) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({
            "success": false,
            "errors": [{ "code": code, "message": message }]
        })),
    )
        .into_response()
}

/// Validates the Bearer JWT and stores its claims in request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok());

    let Some(token) = auth_header.and_then(extract_bearer_token) else {
        return unauthorized(
            "MISSING_TOKEN",
            "Authorization header with Bearer token is required",
        );
    };

    match state.jwt_service.verify(token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            next.run(request).await
        }
        Err(JwtError::Expired) => unauthorized("TOKEN_EXPIRED", "Token has expired"),
        Err(_) => unauthorized("INVALID_TOKEN", "Invalid or malformed token"),
    }
}

/// Extractor for authenticated user claims.
///
/// ```ignore
/// async fn handler(user: AuthUser) -> impl IntoResponse {
///     let company_id = user.company_id();
///     // ...
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl AuthUser {
    /// Returns the user ID from the claims.
    #[must_use]
    pub const fn user_id(&self) -> UserId {
        self.0.user_id()
    }

    /// Returns the company the token is scoped to.
    #[must_use]
    pub const fn company_id(&self) -> CompanyId {
        self.0.company_id()
    }

    /// Returns the user's role, rejecting roles this service does not know.
    pub fn role(&self) -> Result<UserRole, ApiError> {
        self.0
            .role
            .parse()
            .map_err(|_| ApiError(AppError::Forbidden(format!("unknown role '{}'", self.0.role))))
    }

    /// Returns the inner claims.
    #[must_use]
    pub fn claims(&self) -> &Claims {
        &self.0
    }
}

impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| unauthorized("UNAUTHORIZED", "Authentication required"))
    }
}
