//! Authentication middleware for `/users` and `/doctors` routes.
//!
//! Extracts the bearer token from the `Authorization` header (or, for room
//! socket upgrades, the `token` query parameter), validates it and injects
//! the resulting [`Principal`] into request extensions. Each route group is
//! mounted with its own [`AuthState`] naming the role it admits.

use crate::auth::JwtValidator;
use crate::errors::ConsultationError;
use crate::models::Principal;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use common::types::Role;
use std::sync::Arc;
use tracing::instrument;

/// State for the authentication middleware.
#[derive(Clone)]
pub struct AuthState {
    pub jwt_validator: Arc<JwtValidator>,

    /// Role admitted by the guarded route group.
    pub required_role: Role,
}

/// Extract the bearer token from the header, falling back to `?token=`.
fn extract_bearer_token(req: &Request) -> Result<&str, ConsultationError> {
    if let Some(header) = req.headers().get("authorization") {
        let value = header.to_str().map_err(|_| {
            tracing::debug!(target: "cs.middleware.auth", "Non-ASCII Authorization header");
            ConsultationError::InvalidToken("Invalid Authorization header format".to_string())
        })?;
        return value.strip_prefix("Bearer ").ok_or_else(|| {
            tracing::debug!(target: "cs.middleware.auth", "Invalid Authorization header format");
            ConsultationError::InvalidToken("Invalid Authorization header format".to_string())
        });
    }

    req.uri()
        .query()
        .and_then(|query| {
            query
                .split('&')
                .find_map(|pair| pair.strip_prefix("token="))
        })
        .filter(|token| !token.is_empty())
        .ok_or_else(|| {
            tracing::debug!(target: "cs.middleware.auth", "Missing bearer credential");
            ConsultationError::InvalidToken("Missing Authorization header".to_string())
        })
}

/// Validate the bearer credential and enforce the route group's role.
///
/// # Response
///
/// - 401 if the token is missing or invalid
/// - 403 if the token is valid but carries another role
/// - Otherwise continues with `Principal` in extensions
#[instrument(skip_all, name = "cs.middleware.auth")]
pub async fn require_auth(
    State(state): State<Arc<AuthState>>,
    mut req: Request,
    next: Next,
) -> Result<impl IntoResponse, ConsultationError> {
    let token = extract_bearer_token(&req)?;
    let principal = state.jwt_validator.validate(token)?;

    if principal.role != state.required_role {
        tracing::debug!(
            target: "cs.middleware.auth",
            role = %principal.role,
            "Role not admitted on this route"
        );
        return Err(ConsultationError::Forbidden(format!(
            "This endpoint requires role '{}'",
            state.required_role
        )));
    }

    req.extensions_mut().insert::<Principal>(principal);

    Ok(next.run(req).await)
}
