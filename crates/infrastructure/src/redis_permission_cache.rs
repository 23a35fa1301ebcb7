//! Redis-backed cache of resolved grants shared across API instances.

use async_trait::async_trait;
use redis::AsyncCommands;
use rolegate_application::{PermissionCache, SubjectGrants};
use rolegate_core::{AppError, AppResult};
use rolegate_domain::UserId;

/// Redis implementation of the permission cache port.
#[derive(Clone)]
pub struct RedisPermissionCache {
    client: redis::Client,
    key_prefix: String,
}

impl RedisPermissionCache {
    /// Creates a cache adapter with a configured Redis client and key prefix.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, user_id: UserId) -> String {
        format!("{}:user={user_id}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl PermissionCache for RedisPermissionCache {
    async fn get_grants(&self, user_id: UserId) -> AppResult<Option<SubjectGrants>> {
        let mut connection = self.connection().await?;

        let encoded: Option<String> =
            connection.get(self.key_for(user_id)).await.map_err(|error| {
                AppError::Internal(format!("failed to read permission cache entry: {error}"))
            })?;

        encoded
            .as_deref()
            .map(|value| {
                serde_json::from_str::<SubjectGrants>(value).map_err(|error| {
                    AppError::Internal(format!("invalid permission cache entry: {error}"))
                })
            })
            .transpose()
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

        let value = serde_json::to_string(grants).map_err(|error| {
            AppError::Internal(format!("failed to encode permission cache entry: {error}"))
        })?;
        let mut connection = self.connection().await?;

        connection
            .set_ex(self.key_for(user_id), value, u64::from(ttl_seconds))
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to write permission cache entry: {error}"))
            })
    }

    async fn invalidate(&self, user_ids: &[UserId]) -> AppResult<()> {
        if user_ids.is_empty() {
            return Ok(());
        }

        let keys: Vec<String> = user_ids
            .iter()
            .map(|user_id| self.key_for(*user_id))
            .collect();
        let mut connection = self.connection().await?;

        connection.del::<_, ()>(keys).await.map_err(|error| {
            AppError::Internal(format!("failed to invalidate permission cache entries: {error}"))
        })
    }
}
