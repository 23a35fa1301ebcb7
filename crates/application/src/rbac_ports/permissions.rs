use std::collections::HashMap;

use async_trait::async_trait;

use rolegate_core::AppResult;
use rolegate_domain::{Permission, PermissionName};

/// Result of resolving a set of permission names against the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionLookup {
    /// Existing, active permissions.
    pub active: Vec<Permission>,
    /// Names with no stored permission.
    pub missing: Vec<PermissionName>,
    /// Names whose stored permission is deactivated.
    pub inactive: Vec<PermissionName>,
}

impl PermissionLookup {
    /// Classifies `names` against the permissions currently known for them.
    ///
    /// Order of `names` is preserved in every bucket.
    #[must_use]
    pub fn resolve<'a>(
        names: &[PermissionName],
        known: impl IntoIterator<Item = &'a Permission>,
    ) -> Self {
        let known: HashMap<&PermissionName, &Permission> = known
            .into_iter()
            .map(|permission| (permission.name(), permission))
            .collect();

        let mut lookup = Self::default();
        for name in names {
            match known.get(name) {
                Some(permission) if permission.is_active() => {
                    lookup.active.push((*permission).clone());
                }
                Some(_) => lookup.inactive.push(name.clone()),
                None => lookup.missing.push(name.clone()),
            }
        }

        lookup
    }

    /// Returns whether every requested name resolved to an active permission.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.missing.is_empty() && self.inactive.is_empty()
    }
}

/// Repository port for the permission catalog.
#[async_trait]
pub trait PermissionRepository: Send + Sync {
    /// Lists every stored permission ordered by name.
    async fn list_permissions(&self) -> AppResult<Vec<Permission>>;

    /// Finds one permission by name.
    async fn find_permission(&self, name: &PermissionName) -> AppResult<Option<Permission>>;

    /// Finds every stored permission whose name is in `names`.
    async fn find_permissions_by_names(
        &self,
        names: &[PermissionName],
    ) -> AppResult<Vec<Permission>>;

    /// Inserts a new permission. Fails with a conflict when the name exists.
    async fn insert_permission(&self, permission: Permission) -> AppResult<()>;

    /// Persists mutable attributes of an existing permission.
    async fn update_permission(&self, permission: Permission) -> AppResult<()>;

    /// Removes a permission record.
    async fn delete_permission(&self, name: &PermissionName) -> AppResult<()>;

    /// Counts roles whose grant list references `name`.
    async fn count_roles_referencing(&self, name: &PermissionName) -> AppResult<u64>;
}
