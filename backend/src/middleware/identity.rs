//! Identity middleware
//!
//! The platform never authenticates callers itself: the gateway in front of
//! it does, and forwards the acting user as headers. This middleware turns
//! those headers into an [`IdentityContext`] for handlers to consume.

use axum::{
    async_trait,
    body::Body,
    extract::{FromRequestParts, Request},
    http::{request::Parts, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use crate::error::{ErrorDetail, ErrorResponse};
use shared::IdentityContext;

const USER_ID_HEADER: &str = "x-user-id";
const USER_ROLES_HEADER: &str = "x-user-roles";

/// Identity middleware that resolves the acting user from gateway headers
pub async fn identity_middleware(mut request: Request<Body>, next: Next) -> Response {
    let user_id = match request
        .headers()
        .get(USER_ID_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(uuid::Uuid::parse_str)
    {
        Some(Ok(id)) => id,
        Some(Err(_)) => return unauthorized_response("Invalid x-user-id header"),
        None => return unauthorized_response("Missing x-user-id header"),
    };

    let roles: Vec<String> = request
        .headers()
        .get(USER_ROLES_HEADER)
        .and_then(|h| h.to_str().ok())
        .map(|raw| {
            raw.split(',')
                .map(|r| r.trim().to_string())
                .filter(|r| !r.is_empty())
                .collect()
        })
        .unwrap_or_default();

    request
        .extensions_mut()
        .insert(IdentityContext::new(user_id, roles));

    next.run(request).await
}

/// Extractor for the identity the middleware resolved
#[derive(Clone, Debug)]
pub struct CurrentIdentity(pub IdentityContext);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentIdentity
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<IdentityContext>()
            .cloned()
            .map(CurrentIdentity)
            .ok_or_else(|| unauthorized_response("Missing identity context"))
    }
}

/// Create unauthorized response
fn unauthorized_response(message: &str) -> Response {
    let error = ErrorResponse {
        error: ErrorDetail {
            code: "UNAUTHORIZED".to_string(),
            message: message.to_string(),
            field: None,
        },
    };

    (StatusCode::UNAUTHORIZED, Json(error)).into_response()
}
