//! Redis-backed single-flight lease for reconciliation runs.

use async_trait::async_trait;
use redis::Script;
use redis::aio::MultiplexedConnection;
use rolegate_application::{ReconcileLease, ReconcileLeaseCoordinator};
use rolegate_core::{AppError, AppResult};

/// Deletes the key only while it still carries the caller's token.
const RELEASE_IF_HELD_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
end
return 0
"#;

/// Pushes the expiry out only while the key still carries the caller's token.
const EXTEND_IF_HELD_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('EXPIRE', KEYS[1], ARGV[2])
end
return 0
"#;

/// Redis lease shared by every reconciler and API process using the same server.
///
/// The key is written with `SET NX EX`, so a lease always carries its expiry.
#[derive(Clone)]
pub struct RedisReconcileLeaseCoordinator {
    client: redis::Client,
    key_prefix: String,
}

impl RedisReconcileLeaseCoordinator {
    /// Creates a coordinator storing leases under `key_prefix`.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn lease_key(&self, scope_key: &str) -> String {
        format!("{}:{scope_key}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl ReconcileLeaseCoordinator for RedisReconcileLeaseCoordinator {
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<ReconcileLease>> {
        validate_lease_request(scope_key, holder_id, lease_seconds)?;

        let lease = ReconcileLease {
            scope_key: scope_key.to_owned(),
            token: format!("{holder_id}:{}", uuid::Uuid::new_v4()),
            holder_id: holder_id.to_owned(),
        };
        let mut connection = self.connection().await?;

        let reply: Option<String> = redis::cmd("SET")
            .arg(self.lease_key(scope_key))
            .arg(lease.token.as_str())
            .arg("NX")
            .arg("EX")
            .arg(lease_seconds)
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to acquire reconcile lease: {error}"))
            })?;

        Ok(reply.map(|_| lease))
    }

    async fn renew_lease(&self, lease: &ReconcileLease, lease_seconds: u32) -> AppResult<bool> {
        validate_lease_request(&lease.scope_key, &lease.holder_id, lease_seconds)?;

        let mut connection = self.connection().await?;
        let extended = Script::new(EXTEND_IF_HELD_SCRIPT)
            .key(self.lease_key(&lease.scope_key))
            .arg(lease.token.as_str())
            .arg(lease_seconds)
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to renew reconcile lease: {error}"))
            })?;

        Ok(extended > 0)
    }

    async fn release_lease(&self, lease: &ReconcileLease) -> AppResult<()> {
        let mut connection = self.connection().await?;
        let released = Script::new(RELEASE_IF_HELD_SCRIPT)
            .key(self.lease_key(&lease.scope_key))
            .arg(lease.token.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to release reconcile lease: {error}"))
            })?;

        if released == 0 {
            tracing::warn!(
                holder_id = %lease.holder_id,
                "reconcile lease had already expired or changed hands"
            );
        }
        Ok(())
    }
}

pub(crate) fn validate_lease_request(
    scope_key: &str,
    holder_id: &str,
    lease_seconds: u32,
) -> AppResult<()> {
    if scope_key.trim().is_empty() || holder_id.trim().is_empty() {
        return Err(AppError::Validation(
            "reconcile lease needs a scope key and a holder id".to_owned(),
        ));
    }

    if lease_seconds == 0 {
        return Err(AppError::Validation(
            "reconcile lease_seconds must be greater than zero".to_owned(),
        ));
    }

    Ok(())
}
