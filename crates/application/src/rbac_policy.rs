use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard};

use rolegate_domain::RoleName;

/// Deployment-level access-control settings shared by services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RbacPolicy {
    /// Role whose members bypass checks and count toward the administrator floor.
    pub admin_role: RoleName,
    /// Minimal-privilege role new users are bound to.
    pub default_role: RoleName,
    /// Per-user resolution cache ttl. Zero disables caching.
    pub permission_cache_ttl_seconds: u32,
}

impl RbacPolicy {
    /// Creates a policy from validated role names.
    #[must_use]
    pub fn new(admin_role: RoleName, default_role: RoleName) -> Self {
        Self {
            admin_role,
            default_role,
            permission_cache_ttl_seconds: 30,
        }
    }

    /// Overrides the resolution cache ttl.
    #[must_use]
    pub fn with_permission_cache_ttl_seconds(mut self, ttl_seconds: u32) -> Self {
        self.permission_cache_ttl_seconds = ttl_seconds;
        self
    }

    /// Returns whether `role_name` is the administrator role.
    #[must_use]
    pub fn is_admin_role(&self, role_name: &RoleName) -> bool {
        &self.admin_role == role_name
    }
}

/// Process-wide lock serializing guarded administrative writes.
///
/// Services that check bound-user counts or the administrator floor hold
/// the guard from the check until the write completes.
#[derive(Debug, Clone, Default)]
pub struct AdministrationLock {
    inner: Arc<Mutex<()>>,
}

impl AdministrationLock {
    /// Creates a fresh lock.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access.
    pub async fn acquire(&self) -> MutexGuard<'_, ()> {
        self.inner.lock().await
    }
}
