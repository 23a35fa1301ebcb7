use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use tokio::sync::Mutex;

use rolegate_core::{AppError, AppResult};
use rolegate_domain::{
    Permission, PermissionAttributes, PermissionName, Role, RoleAttributes, RoleBinding, RoleId,
    RoleName, UserAccount, UserId,
};

use crate::{
    AuthorizationRepository, PermissionCache, PermissionRepository, RbacPolicy, ReconcileLease,
    ReconcileLeaseCoordinator, RoleBindingRepository, RoleRepository, SubjectGrants,
    admin_floor_violation,
};

pub(crate) fn permission_name(value: &str) -> PermissionName {
    match PermissionName::new(value) {
        Ok(name) => name,
        Err(error) => panic!("invalid test permission '{value}': {error}"),
    }
}

pub(crate) fn role_name(value: &str) -> RoleName {
    match RoleName::new(value) {
        Ok(name) => name,
        Err(error) => panic!("invalid test role '{value}': {error}"),
    }
}

pub(crate) fn permission(name: &str) -> Permission {
    match Permission::new(
        permission_name(name),
        None,
        PermissionAttributes {
            description: None,
            category: None,
            active: true,
        },
    ) {
        Ok(permission) => permission,
        Err(error) => panic!("invalid test permission '{name}': {error}"),
    }
}

pub(crate) fn inactive_permission(name: &str) -> Permission {
    permission(name).with_attributes(PermissionAttributes {
        description: None,
        category: None,
        active: false,
    })
}

pub(crate) fn role_attributes(name: &str, permissions: &[&str]) -> RoleAttributes {
    RoleAttributes {
        display_name: name.to_owned(),
        description: None,
        permissions: permissions.iter().map(|value| permission_name(value)).collect(),
        active: true,
        priority: 100,
    }
}

pub(crate) fn role_with(name: &str, is_system: bool, permissions: &[&str]) -> Role {
    match Role::new(
        RoleId::new(),
        role_name(name),
        is_system,
        role_attributes(name, permissions),
    ) {
        Ok(role) => role,
        Err(error) => panic!("invalid test role '{name}': {error}"),
    }
}

pub(crate) fn user_bound_to(role: &Role, active: bool) -> UserAccount {
    match UserAccount::new(UserId::new(), "Test User", active, RoleBinding::to_role(role)) {
        Ok(account) => account,
        Err(error) => panic!("invalid test user: {error}"),
    }
}

pub(crate) fn policy() -> RbacPolicy {
    RbacPolicy::new(role_name("admin"), role_name("user"))
}

/// Shared in-memory store implementing every repository port.
#[derive(Default)]
pub(crate) struct FakeRbacStore {
    permissions: Mutex<BTreeMap<PermissionName, Permission>>,
    roles: Mutex<BTreeMap<RoleName, Role>>,
    users: Mutex<BTreeMap<UserId, UserAccount>>,
    writes: Mutex<usize>,
}

impl FakeRbacStore {
    pub(crate) async fn seed_permission(&self, permission: Permission) {
        self.permissions
            .lock()
            .await
            .insert(permission.name().clone(), permission);
    }

    pub(crate) async fn seed_role(&self, role: Role) {
        self.roles.lock().await.insert(role.name().clone(), role);
    }

    pub(crate) async fn seed_user(&self, account: UserAccount) {
        self.users.lock().await.insert(account.user_id(), account);
    }

    pub(crate) async fn permission_count(&self) -> usize {
        self.permissions.lock().await.len()
    }

    pub(crate) async fn stored_role(&self, name: &str) -> Option<Role> {
        self.roles.lock().await.get(&role_name(name)).cloned()
    }

    pub(crate) async fn stored_permission(&self, name: &str) -> Option<Permission> {
        self.permissions
            .lock()
            .await
            .get(&permission_name(name))
            .cloned()
    }

    pub(crate) async fn stored_user(&self, user_id: UserId) -> Option<UserAccount> {
        self.users.lock().await.get(&user_id).cloned()
    }

    pub(crate) async fn write_count(&self) -> usize {
        *self.writes.lock().await
    }

    async fn record_write(&self) {
        *self.writes.lock().await += 1;
    }
}

#[async_trait]
impl PermissionRepository for FakeRbacStore {
    async fn list_permissions(&self) -> AppResult<Vec<Permission>> {
        Ok(self.permissions.lock().await.values().cloned().collect())
    }

    async fn find_permission(&self, name: &PermissionName) -> AppResult<Option<Permission>> {
        Ok(self.permissions.lock().await.get(name).cloned())
    }

    async fn find_permissions_by_names(
        &self,
        names: &[PermissionName],
    ) -> AppResult<Vec<Permission>> {
        let permissions = self.permissions.lock().await;
        Ok(names
            .iter()
            .filter_map(|name| permissions.get(name).cloned())
            .collect())
    }

    async fn insert_permission(&self, permission: Permission) -> AppResult<()> {
        let mut permissions = self.permissions.lock().await;
        if permissions.contains_key(permission.name()) {
            return Err(AppError::Conflict(format!(
                "permission '{}' already exists",
                permission.name()
            )));
        }
        permissions.insert(permission.name().clone(), permission);
        drop(permissions);
        self.record_write().await;
        Ok(())
    }

    async fn update_permission(&self, permission: Permission) -> AppResult<()> {
        self.permissions
            .lock()
            .await
            .insert(permission.name().clone(), permission);
        self.record_write().await;
        Ok(())
    }

    async fn delete_permission(&self, name: &PermissionName) -> AppResult<()> {
        self.permissions.lock().await.remove(name);
        self.record_write().await;
        Ok(())
    }

    async fn count_roles_referencing(&self, name: &PermissionName) -> AppResult<u64> {
        Ok(self
            .roles
            .lock()
            .await
            .values()
            .filter(|role| role.permissions().contains(name))
            .count() as u64)
    }
}

#[async_trait]
impl RoleRepository for FakeRbacStore {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        let mut roles: Vec<Role> = self.roles.lock().await.values().cloned().collect();
        roles.sort_by(|left, right| {
            left.priority()
                .cmp(&right.priority())
                .then_with(|| left.name().as_str().cmp(right.name().as_str()))
        });
        Ok(roles)
    }

    async fn find_role(&self, name: &RoleName) -> AppResult<Option<Role>> {
        Ok(self.roles.lock().await.get(name).cloned())
    }

    async fn insert_role(&self, role: Role) -> AppResult<()> {
        let mut roles = self.roles.lock().await;
        if roles.contains_key(role.name()) {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                role.name()
            )));
        }
        roles.insert(role.name().clone(), role);
        drop(roles);
        self.record_write().await;
        Ok(())
    }

    async fn replace_role(&self, role: Role) -> AppResult<()> {
        self.roles.lock().await.insert(role.name().clone(), role);
        self.record_write().await;
        Ok(())
    }

    async fn delete_role(&self, name: &RoleName) -> AppResult<()> {
        self.roles.lock().await.remove(name);
        self.record_write().await;
        Ok(())
    }
}

#[async_trait]
impl RoleBindingRepository for FakeRbacStore {
    async fn find_user(&self, user_id: UserId) -> AppResult<Option<UserAccount>> {
        Ok(self.users.lock().await.get(&user_id).cloned())
    }

    async fn list_users(&self) -> AppResult<Vec<UserAccount>> {
        Ok(self.users.lock().await.values().cloned().collect())
    }

    async fn list_users_bound_to(&self, role_names: &[RoleName]) -> AppResult<Vec<UserAccount>> {
        Ok(self
            .users
            .lock()
            .await
            .values()
            .filter(|user| role_names.contains(user.binding().role_name()))
            .cloned()
            .collect())
    }

    async fn insert_user(&self, account: UserAccount) -> AppResult<()> {
        let mut users = self.users.lock().await;
        if users.contains_key(&account.user_id()) {
            return Err(AppError::Conflict(format!(
                "user '{}' already exists",
                account.user_id()
            )));
        }
        users.insert(account.user_id(), account);
        drop(users);
        self.record_write().await;
        Ok(())
    }

    async fn save_binding(
        &self,
        user_id: UserId,
        binding: RoleBinding,
        floor: Option<&RoleName>,
    ) -> AppResult<()> {
        let mut users = self.users.lock().await;
        check_floor(&users, user_id, floor)?;
        let Some(account) = users.get(&user_id).cloned() else {
            return Err(AppError::NotFound(format!("user '{user_id}' does not exist")));
        };
        users.insert(user_id, account.with_binding(binding));
        drop(users);
        self.record_write().await;
        Ok(())
    }

    async fn set_user_active(
        &self,
        user_id: UserId,
        active: bool,
        floor: Option<&RoleName>,
    ) -> AppResult<()> {
        let mut users = self.users.lock().await;
        check_floor(&users, user_id, floor)?;
        let Some(account) = users.get(&user_id).cloned() else {
            return Err(AppError::NotFound(format!("user '{user_id}' does not exist")));
        };
        users.insert(user_id, account.with_active(active));
        drop(users);
        self.record_write().await;
        Ok(())
    }

    async fn delete_user(&self, user_id: UserId, floor: Option<&RoleName>) -> AppResult<()> {
        let mut users = self.users.lock().await;
        check_floor(&users, user_id, floor)?;
        if users.remove(&user_id).is_none() {
            return Err(AppError::NotFound(format!("user '{user_id}' does not exist")));
        }
        drop(users);
        self.record_write().await;
        Ok(())
    }

    async fn count_users_per_role(&self) -> AppResult<HashMap<RoleName, u64>> {
        let mut counts = HashMap::new();
        for user in self.users.lock().await.values() {
            *counts.entry(user.binding().role_name().clone()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

fn check_floor(
    users: &BTreeMap<UserId, UserAccount>,
    user_id: UserId,
    floor: Option<&RoleName>,
) -> AppResult<()> {
    let Some(role_name) = floor else {
        return Ok(());
    };
    if !users
        .get(&user_id)
        .is_some_and(|user| user.is_active_member_of(role_name))
    {
        return Ok(());
    }

    let active_members = users
        .values()
        .filter(|user| user.is_active_member_of(role_name))
        .count();
    if active_members <= 1 {
        return Err(admin_floor_violation(user_id, role_name));
    }

    Ok(())
}

#[async_trait]
impl AuthorizationRepository for FakeRbacStore {
    async fn find_subject_grants(&self, user_id: UserId) -> AppResult<Option<SubjectGrants>> {
        let Some(user) = self.users.lock().await.get(&user_id).cloned() else {
            return Ok(None);
        };

        let role = self
            .roles
            .lock()
            .await
            .values()
            .find(|role| role.role_id() == user.binding().role_ref())
            .cloned();
        let permissions = self.permissions.lock().await;

        Ok(Some(SubjectGrants {
            user_active: user.is_active(),
            role_name: role
                .as_ref()
                .map_or_else(|| user.binding().role_name(), Role::name)
                .clone(),
            role_active: role.as_ref().is_some_and(Role::is_active),
            permissions: role
                .map(|role| {
                    role.permissions()
                        .iter()
                        .filter(|name| permissions.get(*name).is_some_and(Permission::is_active))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default(),
        }))
    }
}

/// Permission cache fake recording invalidations.
#[derive(Default)]
pub(crate) struct FakePermissionCache {
    entries: Mutex<HashMap<UserId, SubjectGrants>>,
    invalidated: Mutex<Vec<UserId>>,
}

impl FakePermissionCache {
    pub(crate) async fn invalidated(&self) -> Vec<UserId> {
        self.invalidated.lock().await.clone()
    }

    pub(crate) async fn contains(&self, user_id: UserId) -> bool {
        self.entries.lock().await.contains_key(&user_id)
    }
}

#[async_trait]
impl PermissionCache for FakePermissionCache {
    async fn get_grants(&self, user_id: UserId) -> AppResult<Option<SubjectGrants>> {
        Ok(self.entries.lock().await.get(&user_id).cloned())
    }

    async fn set_grants(
        &self,
        user_id: UserId,
        grants: &SubjectGrants,
        _ttl_seconds: u32,
    ) -> AppResult<()> {
        self.entries.lock().await.insert(user_id, grants.clone());
        Ok(())
    }

    async fn invalidate(&self, user_ids: &[UserId]) -> AppResult<()> {
        let mut entries = self.entries.lock().await;
        for user_id in user_ids {
            entries.remove(user_id);
        }
        self.invalidated.lock().await.extend_from_slice(user_ids);
        Ok(())
    }
}

/// Lease fake with an optional pre-existing holder.
#[derive(Default)]
pub(crate) struct FakeLeaseCoordinator {
    held: Mutex<Option<ReconcileLease>>,
    releases: Mutex<usize>,
    renewals: Mutex<usize>,
    renewals_before_loss: Mutex<Option<usize>>,
}

impl FakeLeaseCoordinator {
    pub(crate) async fn hold(&self, holder_id: &str) {
        *self.held.lock().await = Some(ReconcileLease {
            scope_key: "rbac:reconcile".to_owned(),
            token: "other".to_owned(),
            holder_id: holder_id.to_owned(),
        });
    }

    pub(crate) async fn is_held(&self) -> bool {
        self.held.lock().await.is_some()
    }

    pub(crate) async fn release_count(&self) -> usize {
        *self.releases.lock().await
    }

    pub(crate) async fn renewal_count(&self) -> usize {
        *self.renewals.lock().await
    }

    /// Lets `renewals` renewals succeed, then reports the lease as taken over.
    pub(crate) async fn lose_lease_after(&self, renewals: usize) {
        *self.renewals_before_loss.lock().await = Some(renewals);
    }
}

#[async_trait]
impl ReconcileLeaseCoordinator for FakeLeaseCoordinator {
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        _lease_seconds: u32,
    ) -> AppResult<Option<ReconcileLease>> {
        let mut held = self.held.lock().await;
        if held.is_some() {
            return Ok(None);
        }

        let lease = ReconcileLease {
            scope_key: scope_key.to_owned(),
            token: "token".to_owned(),
            holder_id: holder_id.to_owned(),
        };
        *held = Some(lease.clone());
        Ok(Some(lease))
    }

    async fn renew_lease(&self, lease: &ReconcileLease, _lease_seconds: u32) -> AppResult<bool> {
        let mut renewals = self.renewals.lock().await;
        *renewals += 1;
        if let Some(limit) = *self.renewals_before_loss.lock().await
            && *renewals > limit
        {
            *self.held.lock().await = None;
            return Ok(false);
        }

        Ok(self
            .held
            .lock()
            .await
            .as_ref()
            .is_some_and(|current| current.token == lease.token))
    }

    async fn release_lease(&self, lease: &ReconcileLease) -> AppResult<()> {
        let mut held = self.held.lock().await;
        if held.as_ref().is_some_and(|current| current.token == lease.token) {
            *held = None;
        }
        *self.releases.lock().await += 1;
        Ok(())
    }
}
