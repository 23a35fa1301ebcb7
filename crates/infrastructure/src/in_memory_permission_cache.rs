use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rolegate_application::{PermissionCache, SubjectGrants};
use rolegate_core::AppResult;
use rolegate_domain::UserId;
use tokio::sync::RwLock;

#[derive(Debug, Clone)]
struct GrantsCacheEntry {
    grants: SubjectGrants,
    expires_at: Instant,
}

/// Process-local cache adapter for resolved grants.
#[derive(Default)]
pub struct InMemoryPermissionCache {
    entries: RwLock<HashMap<UserId, GrantsCacheEntry>>,
}

impl InMemoryPermissionCache {
    /// Creates an empty in-memory permission cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PermissionCache for InMemoryPermissionCache {
    async fn get_grants(&self, user_id: UserId) -> AppResult<Option<SubjectGrants>> {
        {
            let entries = self.entries.read().await;
            match entries.get(&user_id) {
                Some(entry) if entry.expires_at > Instant::now() => {
                    return Ok(Some(entry.grants.clone()));
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }

        let mut entries = self.entries.write().await;
        if entries
            .get(&user_id)
            .is_some_and(|entry| entry.expires_at <= Instant::now())
        {
            entries.remove(&user_id);
        }

        Ok(None)
    }

    async fn set_grants(
        &self,
        user_id: UserId,
        grants: &SubjectGrants,
        ttl_seconds: u32,
    ) -> AppResult<()> {
        if ttl_seconds == 0 {
            return Ok(());
        }

        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(u64::from(ttl_seconds)))
            .unwrap_or(now);

        self.entries.write().await.insert(
            user_id,
            GrantsCacheEntry {
                grants: grants.clone(),
                expires_at,
            },
        );

        Ok(())
    }

    async fn invalidate(&self, user_ids: &[UserId]) -> AppResult<()> {
        let mut entries = self.entries.write().await;
        for user_id in user_ids {
            entries.remove(user_id);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use rolegate_application::{PermissionCache, SubjectGrants};
    use rolegate_domain::{RoleName, UserId};

    use super::InMemoryPermissionCache;

    fn grants() -> SubjectGrants {
        let Ok(role_name) = RoleName::new("user") else {
            panic!("role name should be valid");
        };
        SubjectGrants {
            user_active: true,
            role_name,
            role_active: true,
            permissions: Vec::new(),
        }
    }

    #[tokio::test]
    async fn stores_and_invalidates_entries() {
        let cache = InMemoryPermissionCache::new();
        let user_id = UserId::new();

        assert!(cache.set_grants(user_id, &grants(), 30).await.is_ok());
        assert!(matches!(cache.get_grants(user_id).await, Ok(Some(_))));

        assert!(cache.invalidate(&[user_id]).await.is_ok());
        assert!(matches!(cache.get_grants(user_id).await, Ok(None)));
    }

    #[tokio::test]
    async fn zero_ttl_is_not_stored() {
        let cache = InMemoryPermissionCache::new();
        let user_id = UserId::new();

        assert!(cache.set_grants(user_id, &grants(), 0).await.is_ok());
        assert!(matches!(cache.get_grants(user_id).await, Ok(None)));
    }
}
