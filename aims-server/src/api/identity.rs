//! Request identity and the optional API token.
//!
//! The acting user arrives as `x-aims-user` / `x-aims-role` headers set by
//! the session layer in front of this service and is trusted as given.

use std::sync::Arc;

use aims_core::{Role, UserId};
use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::service::{Actor, ServiceError};
use crate::AppState;

pub const USER_HEADER: &str = "x-aims-user";
pub const ROLE_HEADER: &str = "x-aims-role";

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Read the acting user from request headers.
pub fn actor_from_headers(headers: &HeaderMap) -> Result<Actor, ServiceError> {
    let user = header_value(headers, USER_HEADER).ok_or_else(|| {
        ServiceError::Unauthenticated(format!("missing {} header", USER_HEADER))
    })?;
    let role = header_value(headers, ROLE_HEADER).ok_or_else(|| {
        ServiceError::Unauthenticated(format!("missing {} header", ROLE_HEADER))
    })?;
    let role: Role = role
        .parse()
        .map_err(|e: aims_core::ParseError| ServiceError::BadRequest(e.to_string()))?;
    Ok(Actor::new(UserId::from(user), role))
}

#[async_trait]
impl<S> FromRequestParts<S> for Actor
where
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        actor_from_headers(&parts.headers)
    }
}

/// Check `Authorization: Bearer <token>` against the configured token.
/// With no token configured every request passes.
pub fn validate_auth(headers: &HeaderMap, api_token: Option<&str>) -> Result<(), ServiceError> {
    let Some(expected_token) = api_token else {
        return Ok(());
    };

    let auth_header = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    match auth_header {
        Some(value) if value.starts_with("Bearer ") => {
            if &value[7..] == expected_token {
                Ok(())
            } else {
                Err(ServiceError::Unauthenticated("invalid token".to_string()))
            }
        }
        Some(_) => Err(ServiceError::Unauthenticated(
            "invalid Authorization header format, expected: Bearer <token>".to_string(),
        )),
        None => Err(ServiceError::Unauthenticated(
            "missing Authorization header, expected: Bearer <token>".to_string(),
        )),
    }
}

/// Middleware guarding the `/api` routes.
pub async fn require_api_token(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Result<Response, ServiceError> {
    if let Err(e) = validate_auth(request.headers(), state.api_token.as_deref()) {
        warn!("Rejected {} {}: {}", request.method(), request.uri().path(), e);
        return Err(e);
    }
    Ok(next.run(request).await)
}
