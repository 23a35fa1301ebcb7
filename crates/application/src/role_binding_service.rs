use std::sync::Arc;

use serde::Serialize;

use rolegate_core::{AppError, AppResult};
use rolegate_domain::{Role, RoleBinding, RoleName, UserAccount, UserId};

use crate::{AdministrationLock, PermissionCache, RbacPolicy, RoleBindingRepository, RoleRepository};


/// Counts produced by propagating role changes to bound users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PropagationCounts {
    /// Users bound to a changed role, plus users whose stale binding was repaired.
    pub users_affected: usize,
    /// Bindings whose role reference was repaired.
    pub bindings_repaired: usize,
    /// Cached permission sets dropped.
    pub cache_invalidations: usize,
}

/// Application service for user accounts and their role bindings.
#[derive(Clone)]
pub struct RoleBindingService {
    repository: Arc<dyn RoleBindingRepository>,
    roles: Arc<dyn RoleRepository>,
    policy: RbacPolicy,
    lock: AdministrationLock,
    permission_cache: Option<Arc<dyn PermissionCache>>,
}

impl RoleBindingService {
    /// Creates a binding service from its repositories.
    #[must_use]
    pub fn new(
        repository: Arc<dyn RoleBindingRepository>,
        roles: Arc<dyn RoleRepository>,
        policy: RbacPolicy,
        lock: AdministrationLock,
    ) -> Self {
        Self {
            repository,
            roles,
            policy,
            lock,
            permission_cache: None,
        }
    }

    /// Configures the permission cache invalidated on every binding change.
    #[must_use]
    pub fn with_permission_cache(mut self, cache: Arc<dyn PermissionCache>) -> Self {
        self.permission_cache = Some(cache);
        self
    }

    /// Lists user accounts.
    pub async fn list_users(&self) -> AppResult<Vec<UserAccount>> {
        self.repository.list_users().await
    }

    /// Returns one user account.
    pub async fn get_user(&self, user_id: UserId) -> AppResult<UserAccount> {
        self.find_user(user_id).await
    }

    /// Creates an account bound to the minimal-privilege role.
    pub async fn bind_new_user(
        &self,
        user_id: UserId,
        display_name: &str,
    ) -> AppResult<UserAccount> {
        let _guard = self.lock.acquire().await;

        let role = self.find_role(&self.policy.default_role).await?;
        let account = UserAccount::new(user_id, display_name, true, RoleBinding::to_role(&role))?;
        self.repository.insert_user(account.clone()).await?;

        tracing::info!(user_id = %user_id, role = %role.name(), "user bound to default role");
        Ok(account)
    }

    /// Reassigns a user to another role.
    pub async fn assign_role(&self, user_id: UserId, role_name: &RoleName) -> AppResult<UserAccount> {
        let _guard = self.lock.acquire().await;

        let account = self.find_user(user_id).await?;
        let role = self.find_role(role_name).await?;
        let floor = (!self.policy.is_admin_role(role_name)).then_some(&self.policy.admin_role);

        let binding = RoleBinding::to_role(&role);
        self.repository
            .save_binding(user_id, binding.clone(), floor)
            .await?;
        self.invalidate(&[user_id]).await;

        tracing::info!(user_id = %user_id, role = %role_name, "role assigned");
        Ok(account.with_binding(binding))
    }

    /// Activates or deactivates a user account.
    pub async fn set_user_active(&self, user_id: UserId, active: bool) -> AppResult<UserAccount> {
        let _guard = self.lock.acquire().await;

        let account = self.find_user(user_id).await?;
        let floor = (!active).then_some(&self.policy.admin_role);

        self.repository
            .set_user_active(user_id, active, floor)
            .await?;
        self.invalidate(&[user_id]).await;

        tracing::info!(user_id = %user_id, active, "user activation changed");
        Ok(account.with_active(active))
    }

    /// Deletes a user account together with its binding.
    pub async fn delete_user(&self, user_id: UserId) -> AppResult<()> {
        let _guard = self.lock.acquire().await;

        self.repository
            .delete_user(user_id, Some(&self.policy.admin_role))
            .await?;
        self.invalidate(&[user_id]).await;

        tracing::info!(user_id = %user_id, "user deleted");
        Ok(())
    }

    /// Re-points a user's role reference at the role named by its binding.
    ///
    /// Returns whether a repair was written.
    pub async fn refresh_binding(&self, user_id: UserId) -> AppResult<bool> {
        let _guard = self.lock.acquire().await;

        let account = self.find_user(user_id).await?;
        let role = self.find_role(account.binding().role_name()).await?;
        if account.binding().is_consistent_with(&role) {
            return Ok(false);
        }

        self.repository
            .save_binding(user_id, RoleBinding::to_role(&role), None)
            .await?;
        self.invalidate(&[user_id]).await;

        tracing::info!(user_id = %user_id, role = %role.name(), "role binding repaired");
        Ok(true)
    }

    /// Repairs stale references and drops cached permissions for users of changed roles.
    ///
    /// With `dry_run` the counts describe what would happen and nothing is written.
    pub async fn propagate_role_changes(
        &self,
        changed_roles: &[Role],
        dry_run: bool,
    ) -> AppResult<PropagationCounts> {
        self.propagate(changed_roles, &[], dry_run).await
    }

    /// Propagates one reconciliation pass.
    ///
    /// Users of `changed_roles` are handled as by [`Self::propagate_role_changes`].
    /// Users of `settled_roles` are only repaired when their reference is stale,
    /// which completes a pass interrupted after its role writes.
    pub async fn propagate_reconciled_roles(
        &self,
        changed_roles: &[Role],
        settled_roles: &[Role],
        dry_run: bool,
    ) -> AppResult<PropagationCounts> {
        self.propagate(changed_roles, settled_roles, dry_run).await
    }

    async fn propagate(
        &self,
        changed_roles: &[Role],
        settled_roles: &[Role],
        dry_run: bool,
    ) -> AppResult<PropagationCounts> {
        if changed_roles.is_empty() && settled_roles.is_empty() {
            return Ok(PropagationCounts::default());
        }

        let _guard = self.lock.acquire().await;

        let names: Vec<RoleName> = changed_roles
            .iter()
            .chain(settled_roles)
            .map(|role| role.name().clone())
            .collect();
        let users = self.repository.list_users_bound_to(&names).await?;

        let mut counts = PropagationCounts::default();
        let mut affected = Vec::new();

        for user in &users {
            let bound_name = user.binding().role_name();
            let changed = changed_roles.iter().find(|role| role.name() == bound_name);
            let Some(role) =
                changed.or_else(|| settled_roles.iter().find(|role| role.name() == bound_name))
            else {
                continue;
            };

            let stale = !user.binding().is_consistent_with(role);
            if stale {
                counts.bindings_repaired += 1;
                if !dry_run {
                    self.repository
                        .save_binding(user.user_id(), RoleBinding::to_role(role), None)
                        .await?;
                }
            }
            if changed.is_some() || stale {
                affected.push(user.user_id());
            }
        }

        counts.users_affected = affected.len();
        if self.permission_cache.is_some() && !affected.is_empty() {
            counts.cache_invalidations = affected.len();
            if !dry_run {
                self.invalidate(&affected).await;
            }
        }

        tracing::info!(
            users_affected = counts.users_affected,
            bindings_repaired = counts.bindings_repaired,
            cache_invalidations = counts.cache_invalidations,
            dry_run,
            "role changes propagated"
        );
        Ok(counts)
    }

    async fn invalidate(&self, user_ids: &[UserId]) {
        if let Some(cache) = &self.permission_cache
            && let Err(error) = cache.invalidate(user_ids).await
        {
            tracing::warn!(users = user_ids.len(), %error, "permission cache invalidation failed");
        }
    }

    async fn find_user(&self, user_id: UserId) -> AppResult<UserAccount> {
        self.repository
            .find_user(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user '{user_id}' does not exist")))
    }

    async fn find_role(&self, name: &RoleName) -> AppResult<Role> {
        self.roles
            .find_role(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{name}' does not exist")))
    }
}
