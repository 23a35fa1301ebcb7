use axum::Json;
use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use rolegate_core::UserIdentity;
use rolegate_domain::{Permission, PermissionAttributes, PermissionName, Role};

use crate::dto::{CreatePermissionRequest, PermissionResponse, UpdatePermissionRequest};
use crate::error::ApiResult;
use crate::state::AppState;

pub async fn list_permissions_handler(
    State(state): State<AppState>,
) -> ApiResult<Json<Vec<PermissionResponse>>> {
    let permissions = state
        .permission_registry
        .list()
        .await?
        .into_iter()
        .map(PermissionResponse::from)
        .collect();

    Ok(Json(permissions))
}

pub async fn get_permission_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> ApiResult<Json<PermissionResponse>> {
    let name = PermissionName::new(name)?;
    let permission = state.permission_registry.get(&name).await?;

    Ok(Json(PermissionResponse::from(permission)))
}

pub async fn create_permission_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Json(payload): Json<CreatePermissionRequest>,
) -> ApiResult<(StatusCode, Json<PermissionResponse>)> {
    let permission = Permission::new(
        PermissionName::new(payload.name)?,
        payload.resource,
        PermissionAttributes {
            description: payload.description,
            category: payload.category,
            active: payload.active,
        },
    )?;

    let permission = state.permission_registry.create(permission).await?;
    tracing::info!(actor = user.subject(), permission = %permission.name(), "permission created via api");

    Ok((StatusCode::CREATED, Json(PermissionResponse::from(permission))))
}

/// Replaces mutable attributes and drops cached grants of users whose roles
/// reference the permission.
pub async fn update_permission_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(name): Path<String>,
    Json(payload): Json<UpdatePermissionRequest>,
) -> ApiResult<Json<PermissionResponse>> {
    let name = PermissionName::new(name)?;
    let permission = state
        .permission_registry
        .update(
            &name,
            PermissionAttributes {
                description: payload.description,
                category: payload.category,
                active: payload.active,
            },
        )
        .await?;

    let referencing_roles: Vec<Role> = state
        .role_registry
        .list()
        .await?
        .into_iter()
        .map(|summary| summary.role)
        .filter(|role| role.permissions().contains(&name))
        .collect();
    state
        .role_binding_service
        .propagate_role_changes(&referencing_roles, false)
        .await?;

    tracing::info!(actor = user.subject(), permission = %name, "permission updated via api");
    Ok(Json(PermissionResponse::from(permission)))
}

pub async fn delete_permission_handler(
    State(state): State<AppState>,
    Extension(user): Extension<UserIdentity>,
    Path(name): Path<String>,
) -> ApiResult<StatusCode> {
    let name = PermissionName::new(name)?;
    state.permission_registry.delete(&name).await?;

    tracing::info!(actor = user.subject(), permission = %name, "permission deleted via api");
    Ok(StatusCode::NO_CONTENT)
}
