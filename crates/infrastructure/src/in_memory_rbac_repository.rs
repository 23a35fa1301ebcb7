use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use rolegate_application::{
    AuthorizationRepository, PermissionRepository, RoleBindingRepository, RoleRepository,
    SubjectGrants, admin_floor_violation,
};
use rolegate_core::{AppError, AppResult, RejectionReason};
use rolegate_domain::{
    Permission, PermissionName, Role, RoleBinding, RoleName, UserAccount, UserId,
};
use tokio::sync::RwLock;

#[cfg(test)]
mod tests;

#[derive(Debug, Default)]
struct RbacState {
    permissions: BTreeMap<PermissionName, Permission>,
    roles: BTreeMap<RoleName, Role>,
    users: BTreeMap<UserId, UserAccount>,
}

impl RbacState {
    fn bound_user_count(&self, role_name: &RoleName) -> usize {
        self.users
            .values()
            .filter(|user| user.binding().role_name() == role_name)
            .count()
    }

    /// Refuses when `user_id` is the last active member of the floor role.
    fn ensure_floor_survives(&self, user_id: UserId, floor: Option<&RoleName>) -> AppResult<()> {
        let Some(role_name) = floor else {
            return Ok(());
        };
        let is_member = self
            .users
            .get(&user_id)
            .is_some_and(|user| user.is_active_member_of(role_name));
        let active_members = self
            .users
            .values()
            .filter(|user| user.is_active_member_of(role_name))
            .count();

        if is_member && active_members <= 1 {
            return Err(admin_floor_violation(user_id, role_name));
        }
        Ok(())
    }
}

/// In-memory RBAC store implementing every repository port.
///
/// All state sits behind one lock so each mutation is applied atomically.
#[derive(Debug, Default)]
pub struct InMemoryRbacRepository {
    state: RwLock<RbacState>,
}

impl InMemoryRbacRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionRepository for InMemoryRbacRepository {
    async fn list_permissions(&self) -> AppResult<Vec<Permission>> {
        Ok(self.state.read().await.permissions.values().cloned().collect())
    }

    async fn find_permission(&self, name: &PermissionName) -> AppResult<Option<Permission>> {
        Ok(self.state.read().await.permissions.get(name).cloned())
    }

    async fn find_permissions_by_names(
        &self,
        names: &[PermissionName],
    ) -> AppResult<Vec<Permission>> {
        let state = self.state.read().await;
        Ok(names
            .iter()
            .filter_map(|name| state.permissions.get(name).cloned())
            .collect())
    }

    async fn insert_permission(&self, permission: Permission) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.permissions.contains_key(permission.name()) {
            return Err(AppError::Conflict(format!(
                "permission '{}' already exists",
                permission.name()
            )));
        }

        state
            .permissions
            .insert(permission.name().clone(), permission);
        Ok(())
    }

    async fn update_permission(&self, permission: Permission) -> AppResult<()> {
        let mut state = self.state.write().await;
        let Some(stored) = state.permissions.get_mut(permission.name()) else {
            return Err(AppError::NotFound(format!(
                "permission '{}' does not exist",
                permission.name()
            )));
        };

        *stored = stored.with_attributes(permission.attributes());
        Ok(())
    }

    async fn delete_permission(&self, name: &PermissionName) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state
            .roles
            .values()
            .any(|role| role.permissions().contains(name))
        {
            return Err(AppError::Rejected(
                RejectionReason::PermissionInUse,
                format!("permission '{name}' is still granted by a role"),
            ));
        }

        state
            .permissions
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("permission '{name}' does not exist")))
    }

    async fn count_roles_referencing(&self, name: &PermissionName) -> AppResult<u64> {
        Ok(self
            .state
            .read()
            .await
            .roles
            .values()
            .filter(|role| role.permissions().contains(name))
            .count() as u64)
    }
}

#[async_trait]
impl RoleRepository for InMemoryRbacRepository {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        let mut roles: Vec<Role> = self.state.read().await.roles.values().cloned().collect();
        roles.sort_by(|left, right| {
            left.priority()
                .cmp(&right.priority())
                .then_with(|| left.name().as_str().cmp(right.name().as_str()))
        });
        Ok(roles)
    }

    async fn find_role(&self, name: &RoleName) -> AppResult<Option<Role>> {
        Ok(self.state.read().await.roles.get(name).cloned())
    }

    async fn insert_role(&self, role: Role) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.roles.contains_key(role.name()) {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                role.name()
            )));
        }

        state.roles.insert(role.name().clone(), role);
        Ok(())
    }

    async fn replace_role(&self, role: Role) -> AppResult<()> {
        let mut state = self.state.write().await;
        let Some(stored) = state.roles.get_mut(role.name()) else {
            return Err(AppError::NotFound(format!(
                "role '{}' does not exist",
                role.name()
            )));
        };

        *stored = role;
        Ok(())
    }

    async fn delete_role(&self, name: &RoleName) -> AppResult<()> {
        let mut state = self.state.write().await;
        let bound_users = state.bound_user_count(name);
        if bound_users > 0 {
            return Err(AppError::Rejected(
                RejectionReason::RoleInUse,
                format!("role '{name}' is still bound to {bound_users} user(s)"),
            ));
        }

        state
            .roles
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("role '{name}' does not exist")))
    }
}

#[async_trait]
impl RoleBindingRepository for InMemoryRbacRepository {
    async fn find_user(&self, user_id: UserId) -> AppResult<Option<UserAccount>> {
        Ok(self.state.read().await.users.get(&user_id).cloned())
    }

    async fn list_users(&self) -> AppResult<Vec<UserAccount>> {
        Ok(self.state.read().await.users.values().cloned().collect())
    }

    async fn list_users_bound_to(&self, role_names: &[RoleName]) -> AppResult<Vec<UserAccount>> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .filter(|user| role_names.contains(user.binding().role_name()))
            .cloned()
            .collect())
    }

    async fn insert_user(&self, account: UserAccount) -> AppResult<()> {
        let mut state = self.state.write().await;
        if state.users.contains_key(&account.user_id()) {
            return Err(AppError::Conflict(format!(
                "user '{}' already exists",
                account.user_id()
            )));
        }

        state.users.insert(account.user_id(), account);
        Ok(())
    }

    async fn save_binding(
        &self,
        user_id: UserId,
        binding: RoleBinding,
        floor: Option<&RoleName>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.ensure_floor_survives(user_id, floor)?;
        let Some(account) = state.users.get_mut(&user_id) else {
            return Err(AppError::NotFound(format!("user '{user_id}' does not exist")));
        };

        *account = account.with_binding(binding);
        Ok(())
    }

    async fn set_user_active(
        &self,
        user_id: UserId,
        active: bool,
        floor: Option<&RoleName>,
    ) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.ensure_floor_survives(user_id, floor)?;
        let Some(account) = state.users.get_mut(&user_id) else {
            return Err(AppError::NotFound(format!("user '{user_id}' does not exist")));
        };

        *account = account.with_active(active);
        Ok(())
    }

    async fn delete_user(&self, user_id: UserId, floor: Option<&RoleName>) -> AppResult<()> {
        let mut state = self.state.write().await;
        state.ensure_floor_survives(user_id, floor)?;
        state
            .users
            .remove(&user_id)
            .map(|_| ())
            .ok_or_else(|| AppError::NotFound(format!("user '{user_id}' does not exist")))
    }

    async fn count_users_per_role(&self) -> AppResult<HashMap<RoleName, u64>> {
        let state = self.state.read().await;
        let mut counts = HashMap::new();
        for user in state.users.values() {
            *counts.entry(user.binding().role_name().clone()).or_insert(0) += 1;
        }

        Ok(counts)
    }
}

#[async_trait]
impl AuthorizationRepository for InMemoryRbacRepository {
    async fn find_subject_grants(&self, user_id: UserId) -> AppResult<Option<SubjectGrants>> {
        let state = self.state.read().await;
        let Some(user) = state.users.get(&user_id) else {
            return Ok(None);
        };

        let role = state
            .roles
            .values()
            .find(|role| role.role_id() == user.binding().role_ref());
        let permissions = role
            .map(|role| {
                role.permissions()
                    .iter()
                    .filter(|name| {
                        state
                            .permissions
                            .get(*name)
                            .is_some_and(Permission::is_active)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        Ok(Some(SubjectGrants {
            user_active: user.is_active(),
            role_name: role.map_or_else(|| user.binding().role_name(), Role::name).clone(),
            role_active: role.is_some_and(Role::is_active),
            permissions,
        }))
    }
}
