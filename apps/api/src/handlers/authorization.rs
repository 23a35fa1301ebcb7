use axum::Json;
use axum::extract::{Extension, State};
use rolegate_core::UserIdentity;
use rolegate_domain::PermissionRequirement;

use crate::dto::{AuthorizeRequest, AuthorizeResponse, ResolvedPermissionsResponse};
use crate::error::ApiResult;
use crate::middleware::actor_id;
use crate::state::AppState;


pub async fn my_permissions_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
) -> ApiResult<Json<ResolvedPermissionsResponse>> {
    let resolved = state
        .authorization_service
        .resolve_permissions(actor_id(&user)?)
        .await?;

    Ok(Json(ResolvedPermissionsResponse::from(resolved)))
}

/// Evaluates a requirement for the current actor without failing the request.
pub async fn authorize_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Json(payload): Json<AuthorizeRequest>,
) -> ApiResult<Json<AuthorizeResponse>> {
    let requirement = PermissionRequirement::parse(payload.permissions, payload.mode)?
        .with_admin_bypass(payload.allow_admin);
    let decision = state
        .authorization_service
        .check(actor_id(&user)?, &requirement)
        .await?;

    Ok(Json(AuthorizeResponse::from(decision)))
}
