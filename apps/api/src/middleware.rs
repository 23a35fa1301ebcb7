use std::str::FromStr;

use axum::extract::{Extension, Request, State};
use axum::http::HeaderMap;
use axum::middleware::Next;
use axum::response::Response;
use rolegate_core::{AppError, UserIdentity};
use rolegate_domain::{PermissionRequirement, UserId};

use crate::error::ApiResult;
use crate::state::AppState;

pub const GATEWAY_SECRET_HEADER: &str = "x-gateway-secret";
pub const USER_ID_HEADER: &str = "x-user-id";
pub const USER_NAME_HEADER: &str = "x-user-name";

/// Accepts the identity asserted by the trusted gateway.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> ApiResult<Response> {
    let identity = gateway_identity(request.headers(), &state.gateway_shared_secret)?;

    request.extensions_mut().insert(identity);
    Ok(next.run(request).await)
}

/// Guards a route with the requirement installed as a request extension.
pub async fn require_permission(
    State(state): State<AppState>,
    Extension(requirement): Extension<PermissionRequirement>,
    request: Request,
    next: Next,
) -> ApiResult<Response> {
    let identity = request
        .extensions()
        .get::<UserIdentity>()
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_owned()))?;
    let user_id = actor_id(identity)?;

    state
        .authorization_service
        .require(user_id, &requirement)
        .await?;

    Ok(next.run(request).await)
}

/// Returns the user id of an authenticated identity.
pub fn actor_id(identity: &UserIdentity) -> Result<UserId, AppError> {
    UserId::from_str(identity.subject())
        .map_err(|_| AppError::Unauthorized("authenticated subject is not a user id".to_owned()))
}

fn gateway_identity(headers: &HeaderMap, shared_secret: &str) -> Result<UserIdentity, AppError> {
    let presented_secret = header_value(headers, GATEWAY_SECRET_HEADER).unwrap_or_default();
    if !secrets_match(presented_secret, shared_secret) {
        return Err(AppError::Unauthorized(
            "request did not come through the identity gateway".to_owned(),
        ));
    }

    let subject = header_value(headers, USER_ID_HEADER)
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::Unauthorized("authentication required".to_owned()))?;
    UserId::from_str(subject)
        .map_err(|_| AppError::Unauthorized(format!("invalid user id '{subject}'")))?;

    let display_name = header_value(headers, USER_NAME_HEADER)
        .filter(|value| !value.trim().is_empty())
        .unwrap_or(subject);

    Ok(UserIdentity::new(subject.trim(), display_name))
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

fn secrets_match(presented: &str, expected: &str) -> bool {
    presented.len() == expected.len()
        && presented
            .bytes()
            .zip(expected.bytes())
            .fold(0_u8, |difference, (left, right)| difference | (left ^ right))
            == 0
}
