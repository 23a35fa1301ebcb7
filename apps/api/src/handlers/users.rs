use std::str::FromStr;

use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use rolegate_core::UserIdentity;
use rolegate_domain::{RoleName, UserId};

use crate::dto::{
    AssignRoleRequest, CreateUserRequest, RefreshBindingResponse, SetUserActiveRequest,
    UserResponse,
};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_users_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<UserResponse>>> {
    let users = state
        .role_binding_service
        .list_users()
        .await?
        .into_iter()
        .map(UserResponse::from)
        .collect();

    Ok(Json(users))
}

pub async fn get_user_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<UserResponse>> {
    let user_id = UserId::from_str(user_id.as_str())?;
    let account = state.role_binding_service.get_user(user_id).await?;

    Ok(Json(UserResponse::from(account)))
}

pub async fn create_user_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Json(payload): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let user_id = UserId::from_str(payload.user_id.as_str())?;
    let account = state
        .role_binding_service
        .bind_new_user(user_id, payload.display_name.as_str())
        .await?;

    tracing::info!(actor = user.subject(), user_id = %user_id, "user created via api");
    Ok((StatusCode::CREATED, Json(UserResponse::from(account))))
}

pub async fn assign_role_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(user_id): Path<String>,
    Json(payload): Json<AssignRoleRequest>,
) -> ApiResult<Json<UserResponse>> {
    let user_id = UserId::from_str(user_id.as_str())?;
    let role_name = RoleName::new(payload.role)?;
    let account = state
        .role_binding_service
        .assign_role(user_id, &role_name)
        .await?;

    tracing::info!(actor = user.subject(), user_id = %user_id, role = %role_name, "role assigned via api");
    Ok(Json(UserResponse::from(account)))
}

pub async fn set_user_active_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(user_id): Path<String>,
    Json(payload): Json<SetUserActiveRequest>,
) -> ApiResult<Json<UserResponse>> {
    let user_id = UserId::from_str(user_id.as_str())?;
    let account = state
        .role_binding_service
        .set_user_active(user_id, payload.active)
        .await?;

    tracing::info!(actor = user.subject(), user_id = %user_id, active = payload.active, "user activation changed via api");
    Ok(Json(UserResponse::from(account)))
}

pub async fn delete_user_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(user_id): Path<String>,
) -> ApiResult<StatusCode> {
    let user_id = UserId::from_str(user_id.as_str())?;
    state.role_binding_service.delete_user(user_id).await?;

    tracing::info!(actor = user.subject(), user_id = %user_id, "user deleted via api");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn refresh_binding_handler(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> ApiResult<Json<RefreshBindingResponse>> {
    let user_id = UserId::from_str(user_id.as_str())?;
    let repaired = state.role_binding_service.refresh_binding(user_id).await?;

    Ok(Json(RefreshBindingResponse { repaired }))
}
