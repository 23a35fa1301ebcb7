use async_trait::async_trait;

use rolegate_core::AppResult;
use rolegate_domain::{Role, RoleName};

/// Role projection for administrative views.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSummary {
    /// Stored role.
    pub role: Role,
    /// Number of users currently bound to the role.
    pub user_count: u64,
}

/// Repository port for role records.
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Lists every role ordered by priority, then name.
    async fn list_roles(&self) -> AppResult<Vec<Role>>;

    /// Finds one role by name.
    async fn find_role(&self, name: &RoleName) -> AppResult<Option<Role>>;

    /// Inserts a new role with its grants. Fails with a conflict when the name exists.
    async fn insert_role(&self, role: Role) -> AppResult<()>;

    /// Replaces attributes and grants of an existing role in one atomic write.
    async fn replace_role(&self, role: Role) -> AppResult<()>;

    /// Deletes a role. Implementations refuse while users are still bound.
    async fn delete_role(&self, name: &RoleName) -> AppResult<()>;
}
