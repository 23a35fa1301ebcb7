use std::collections::HashMap;

use async_trait::async_trait;

use rolegate_core::{AppError, AppResult, RejectionReason};
use rolegate_domain::{RoleBinding, RoleName, UserAccount, UserId};

/// Repository port for user accounts and their role bindings.
///
/// Writes that take a `floor` role refuse with `admin-floor-violation` when
/// the user is the last active member of that role. The check and the write
/// must be atomic for every writer sharing the store.
#[async_trait]
pub trait RoleBindingRepository: Send + Sync {
    /// Finds one user account.
    async fn find_user(&self, user_id: UserId) -> AppResult<Option<UserAccount>>;

    /// Lists every user account.
    async fn list_users(&self) -> AppResult<Vec<UserAccount>>;

    /// Lists users whose denormalized role name is one of `role_names`.
    async fn list_users_bound_to(&self, role_names: &[RoleName]) -> AppResult<Vec<UserAccount>>;

    /// Inserts a new user account. Fails with a conflict when the id exists.
    async fn insert_user(&self, account: UserAccount) -> AppResult<()>;

    /// Writes both halves of a binding together.
    async fn save_binding(
        &self,
        user_id: UserId,
        binding: RoleBinding,
        floor: Option<&RoleName>,
    ) -> AppResult<()>;

    /// Updates the account active flag.
    async fn set_user_active(
        &self,
        user_id: UserId,
        active: bool,
        floor: Option<&RoleName>,
    ) -> AppResult<()>;

    /// Deletes a user account together with its binding.
    async fn delete_user(&self, user_id: UserId, floor: Option<&RoleName>) -> AppResult<()>;

    /// Counts bound users per role name, active or not.
    async fn count_users_per_role(&self) -> AppResult<HashMap<RoleName, u64>>;
}

/// Rejection returned when a write would remove the last active member of `role_name`.
#[must_use]
pub fn admin_floor_violation(user_id: UserId, role_name: &RoleName) -> AppError {
    AppError::Rejected(
        RejectionReason::AdminFloorViolation,
        format!("user '{user_id}' is the last active member of role '{role_name}'"),
    )
}
