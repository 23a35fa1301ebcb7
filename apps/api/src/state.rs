use rolegate_application::{
    AuthorizationService, PermissionRegistry, RoleBindingService, RoleRegistry,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub permission_registry: PermissionRegistry,
    pub role_registry: RoleRegistry,
    pub role_binding_service: RoleBindingService,
    pub authorization_service: AuthorizationService,
    pub gateway_shared_secret: String,
}
