use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};

use checkin_types::api::Claims;
use checkin_types::models::Role;

use crate::auth::{AppState, decode_token};
use crate::cookie::extract_cookie;
use crate::error::ApiError;

/// Validate the session token (cookie first, then `Authorization: Bearer`)
/// and attach its `Claims` to the request.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = session_token(req.headers(), &state.cookie.name).ok_or_else(ApiError::not_authenticated)?;

    let claims = decode_token(&state.secret, &token).map_err(|_| ApiError::not_authenticated())?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Must run inside `require_auth`.
pub async fn require_admin(req: Request, next: Next) -> Result<Response, ApiError> {
    require_role(Role::Admin, req, next).await
}

/// Must run inside `require_auth`.
pub async fn require_student(req: Request, next: Next) -> Result<Response, ApiError> {
    require_role(Role::Student, req, next).await
}

async fn require_role(role: Role, req: Request, next: Next) -> Result<Response, ApiError> {
    let claims = req
        .extensions()
        .get::<Claims>()
        .ok_or_else(ApiError::not_authenticated)?;

    if claims.role != role {
        return Err(ApiError::Forbidden("Unauthorized".into()));
    }
    Ok(next.run(req).await)
}

fn session_token(headers: &HeaderMap, cookie_name: &str) -> Option<String> {
    extract_cookie(headers, cookie_name).or_else(|| {
        headers
            .typed_get::<Authorization<Bearer>>()
            .map(|auth| auth.token().to_string())
    })
}
