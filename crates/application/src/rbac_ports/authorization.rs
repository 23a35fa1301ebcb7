use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use rolegate_core::AppResult;
use rolegate_domain::{PermissionName, RoleName, UserId};

/// Live grants reachable from one user's binding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectGrants {
    /// Whether the user account is active.
    pub user_active: bool,
    /// Name of the role reached through `role_ref`.
    ///
    /// Falls back to the binding's role name when the reference dangles.
    pub role_name: RoleName,
    /// Whether the referenced role is active.
    pub role_active: bool,
    /// Active permissions of the referenced role.
    pub permissions: Vec<PermissionName>,
}

/// Read-side port used for request-time permission resolution.
#[async_trait]
pub trait AuthorizationRepository: Send + Sync {
    /// Resolves grants through the user's `role_ref`.
    ///
    /// Returns `None` when the user does not exist. A dangling role
    /// reference yields an empty permission list.
    async fn find_subject_grants(&self, user_id: UserId) -> AppResult<Option<SubjectGrants>>;
}

/// Optional per-user cache for resolved grants.
#[async_trait]
pub trait PermissionCache: Send + Sync {
    /// Returns cached grants for one user.
    async fn get_grants(&self, user_id: UserId) -> AppResult<Option<SubjectGrants>>;

    /// Stores grants for one user with ttl.
    async fn set_grants(
        &self,
        user_id: UserId,
        grants: &SubjectGrants,
        ttl_seconds: u32,
    ) -> AppResult<()>;

    /// Drops cached grants for the given users.
    async fn invalidate(&self, user_ids: &[UserId]) -> AppResult<()>;
}
