use rolegate_application::RoleSummary;
use rolegate_domain::{
    AllowBasis, Decision, Permission, RequirementMode, ResolvedPermissions, Role, UserAccount,
};
use serde::{Deserialize, Serialize};

/// Health response payload.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// API representation of a permission.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionResponse {
    pub name: String,
    pub resource: String,
    pub action: String,
    pub description: Option<String>,
    pub category: Option<String>,
    pub active: bool,
}

impl From<Permission> for PermissionResponse {
    fn from(value: Permission) -> Self {
        Self {
            name: value.name().as_str().to_owned(),
            resource: value.resource().to_owned(),
            action: value.action().as_str().to_owned(),
            description: value.description().map(ToOwned::to_owned),
            category: value.category().map(ToOwned::to_owned),
            active: value.is_active(),
        }
    }
}

/// Incoming payload for permission creation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePermissionRequest {
    pub name: String,
    #[serde(default)]
    pub resource: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Incoming payload replacing a permission's mutable attributes.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePermissionRequest {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// API representation of a role with its bound user count.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoleResponse {
    pub name: String,
    pub display_name: String,
    pub description: Option<String>,
    pub permissions: Vec<String>,
    pub is_system: bool,
    pub active: bool,
    pub priority: i32,
    pub user_count: u64,
}

impl RoleResponse {
    pub fn from_role(role: &Role, user_count: u64) -> Self {
        Self {
            name: role.name().as_str().to_owned(),
            display_name: role.display_name().to_owned(),
            description: role.description().map(ToOwned::to_owned),
            permissions: role
                .permissions()
                .iter()
                .map(|permission| permission.as_str().to_owned())
                .collect(),
            is_system: role.is_system(),
            active: role.is_active(),
            priority: role.priority(),
            user_count,
        }
    }
}

impl From<RoleSummary> for RoleResponse {
    fn from(value: RoleSummary) -> Self {
        Self::from_role(&value.role, value.user_count)
    }
}

/// Incoming payload for custom role creation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRoleRequest {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Incoming payload replacing a role's attributes wholesale.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRoleRequest {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default)]
    pub priority: i32,
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Query flag allowing system role updates.
#[derive(Debug, Default, Deserialize)]
pub struct ForceQuery {
    #[serde(default)]
    pub force: bool,
}

/// API representation of a user account and its binding.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub user_id: String,
    pub display_name: String,
    pub active: bool,
    pub role: String,
}

impl From<UserAccount> for UserResponse {
    fn from(value: UserAccount) -> Self {
        Self {
            user_id: value.user_id().to_string(),
            display_name: value.display_name().to_owned(),
            active: value.is_active(),
            role: value.binding().role_name().as_str().to_owned(),
        }
    }
}

/// Incoming payload binding a new user to the default role.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    pub user_id: String,
    pub display_name: String,
}

/// Incoming payload for role reassignment.
#[derive(Debug, Deserialize)]
pub struct AssignRoleRequest {
    pub role: String,
}

/// Incoming payload for account activation changes.
#[derive(Debug, Deserialize)]
pub struct SetUserActiveRequest {
    pub active: bool,
}

/// Result of a binding repair.
#[derive(Debug, Serialize)]
pub struct RefreshBindingResponse {
    pub repaired: bool,
}

/// Permission set the current actor holds.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedPermissionsResponse {
    pub user_id: String,
    pub role: String,
    pub is_admin: bool,
    pub permissions: Vec<String>,
}

impl From<ResolvedPermissions> for ResolvedPermissionsResponse {
    fn from(value: ResolvedPermissions) -> Self {
        Self {
            user_id: value.user_id().to_string(),
            role: value.role_name().as_str().to_owned(),
            is_admin: value.is_admin(),
            permissions: value
                .permissions()
                .iter()
                .map(|permission| permission.as_str().to_owned())
                .collect(),
        }
    }
}

/// Requirement evaluated on behalf of the current actor.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizeRequest {
    pub permissions: Vec<String>,
    #[serde(default)]
    pub mode: RequirementMode,
    #[serde(default = "default_allow_admin")]
    pub allow_admin: bool,
}

/// Outcome of an evaluated requirement.
#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basis: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl From<Decision> for AuthorizeResponse {
    fn from(value: Decision) -> Self {
        match value {
            Decision::Allow(basis) => Self {
                allowed: true,
                basis: Some(match basis {
                    AllowBasis::AdministratorBypass => "administrator-bypass",
                    AllowBasis::Granted => "granted",
                }),
                reason: None,
            },
            Decision::Deny(reason) => Self {
                allowed: false,
                basis: None,
                reason: Some(reason.code()),
            },
        }
    }
}

fn default_active() -> bool {
    true
}

fn default_allow_admin() -> bool {
    true
}
