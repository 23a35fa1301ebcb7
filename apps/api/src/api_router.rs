use axum::middleware::from_fn_with_state;
use axum::routing::{MethodRouter, delete, get, post, put};
use axum::{Extension, Router};
use rolegate_core::AppError;
use rolegate_domain::{PermissionRequirement, RequirementMode};
use tower_http::trace::TraceLayer;

use crate::state::AppState;
use crate::{handlers, middleware};

mod cors;

use cors::build_cors_layer;

pub fn build_router(app_state: AppState, frontend_url: &str) -> Result<Router, AppError> {
    let guard = RouteGuard {
        app_state: app_state.clone(),
    };

    let protected_routes = Router::new()
        .route(
            "/api/me/permissions",
            get(handlers::authorization::my_permissions_handler),
        )
        .route(
            "/api/authorize",
            post(handlers::authorization::authorize_handler),
        )
        .route(
            "/api/permissions",
            guard
                .require(
                    get(handlers::permissions::list_permissions_handler),
                    "rbac.permissions.view",
                )?
                .merge(guard.require(
                    post(handlers::permissions::create_permission_handler),
                    "rbac.permissions.create",
                )?),
        )
        .route(
            "/api/permissions/{name}",
            guard
                .require(
                    get(handlers::permissions::get_permission_handler),
                    "rbac.permissions.view",
                )?
                .merge(guard.require(
                    put(handlers::permissions::update_permission_handler),
                    "rbac.permissions.update",
                )?)
                .merge(guard.require(
                    delete(handlers::permissions::delete_permission_handler),
                    "rbac.permissions.delete",
                )?),
        )
        .route(
            "/api/roles",
            guard
                .require(get(handlers::roles::list_roles_handler), "rbac.roles.view")?
                .merge(guard.require(
                    post(handlers::roles::create_role_handler),
                    "rbac.roles.create",
                )?),
        )
        .route(
            "/api/roles/{name}",
            guard
                .require(get(handlers::roles::get_role_handler), "rbac.roles.view")?
                .merge(guard.require(
                    put(handlers::roles::update_role_handler),
                    "rbac.roles.update",
                )?)
                .merge(guard.require(
                    delete(handlers::roles::delete_role_handler),
                    "rbac.roles.delete",
                )?),
        )
        .route(
            "/api/users",
            guard
                .require(get(handlers::users::list_users_handler), "rbac.users.view")?
                .merge(guard.require(
                    post(handlers::users::create_user_handler),
                    "rbac.users.create",
                )?),
        )
        .route(
            "/api/users/{user_id}",
            guard
                .require(get(handlers::users::get_user_handler), "rbac.users.view")?
                .merge(guard.require_with(
                    delete(handlers::users::delete_user_handler),
                    PermissionRequirement::parse(["rbac.users.delete"], RequirementMode::All)?
                        .without_admin_bypass(),
                )),
        )
        .route(
            "/api/users/{user_id}/role",
            guard.require(
                put(handlers::users::assign_role_handler),
                "rbac.users.assign",
            )?,
        )
        .route(
            "/api/users/{user_id}/active",
            guard.require(
                put(handlers::users::set_user_active_handler),
                "rbac.users.update",
            )?,
        )
        .route(
            "/api/users/{user_id}/refresh",
            guard.require(
                post(handlers::users::refresh_binding_handler),
                "rbac.users.update",
            )?,
        )
        .route_layer(from_fn_with_state(
            app_state.clone(),
            middleware::require_auth,
        ));

    Ok(Router::new()
        .route("/health", get(handlers::health::health_handler))
        .merge(protected_routes)
        .layer(TraceLayer::new_for_http())
        .layer(build_cors_layer(frontend_url)?)
        .with_state(app_state))
}

struct RouteGuard {
    app_state: AppState,
}

impl RouteGuard {
    /// Wraps a method router with a single-permission requirement.
    fn require(
        &self,
        method_router: MethodRouter<AppState>,
        permission: &str,
    ) -> Result<MethodRouter<AppState>, AppError> {
        let requirement = PermissionRequirement::parse([permission], RequirementMode::All)?;
        Ok(self.require_with(method_router, requirement))
    }

    fn require_with(
        &self,
        method_router: MethodRouter<AppState>,
        requirement: PermissionRequirement,
    ) -> MethodRouter<AppState> {
        method_router
            .route_layer(from_fn_with_state(
                self.app_state.clone(),
                middleware::require_permission,
            ))
            .route_layer(Extension(requirement))
    }
}
