use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use rolegate_core::UserIdentity;
use rolegate_domain::{RoleName, RoleSpec};

use crate::dto::{CreateRoleRequest, ForceQuery, RoleResponse, UpdateRoleRequest};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_roles_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<RoleResponse>>> {
    let roles = state
        .role_registry
        .list()
        .await?
        .into_iter()
        .map(RoleResponse::from)
        .collect();

    Ok(Json(roles))
}

pub async fn get_role_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<RoleResponse>> {
    let name = RoleName::new(name)?;
    let summary = state.role_registry.get(&name).await?;

    Ok(Json(RoleResponse::from(summary)))
}

pub async fn create_role_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Json(payload): Json<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<RoleResponse>)> {
    let spec = RoleSpec::parse(
        payload.name.as_str(),
        payload.display_name,
        payload.description,
        &payload.permissions,
        false,
        payload.priority,
        payload.active,
    )?;

    let role = state.role_registry.create_role(spec).await?;
    tracing::info!(actor = user.subject(), role = %role.name(), "role created via api");

    Ok((StatusCode::CREATED, Json(RoleResponse::from_role(&role, 0))))
}

/// Replaces a role wholesale and pushes the change to its bound users.
pub async fn update_role_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(name): Path<String>,
    Query(query): Query<ForceQuery>,
    Json(payload): Json<UpdateRoleRequest>,
) -> ApiResult<Json<RoleResponse>> {
    let spec = RoleSpec::parse(
        name.as_str(),
        payload.display_name,
        payload.description,
        &payload.permissions,
        false,
        payload.priority,
        payload.active,
    )?;

    let role = state
        .role_registry
        .update_role(&spec.name, spec.attributes, query.force)
        .await?;
    let propagation = state
        .role_binding_service
        .propagate_role_changes(std::slice::from_ref(&role), false)
        .await?;

    tracing::info!(
        actor = user.subject(),
        role = %role.name(),
        force = query.force,
        users_affected = propagation.users_affected,
        "role updated via api"
    );

    let summary = state.role_registry.get(role.name()).await?;
    Ok(Json(RoleResponse::from(summary)))
}

pub async fn delete_role_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    let name = RoleName::new(name)?;
    state.role_registry.delete_role(&name).await?;

    tracing::info!(actor = user.subject(), role = %name, "role deleted via api");
    Ok(StatusCode::NO_CONTENT)
}
