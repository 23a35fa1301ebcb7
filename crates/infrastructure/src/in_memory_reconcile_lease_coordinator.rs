use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rolegate_application::{ReconcileLease, ReconcileLeaseCoordinator};
use rolegate_core::AppResult;
use tokio::sync::Mutex;

use crate::redis_reconcile_lease_coordinator::validate_lease_request;

#[derive(Debug, Clone)]
struct HeldLease {
    token: String,
    expires_at: Instant,
}

/// Process-local reconciliation lease.
#[derive(Debug, Default)]
pub struct InMemoryReconcileLeaseCoordinator {
    leases: Mutex<HashMap<String, HeldLease>>,
}

impl InMemoryReconcileLeaseCoordinator {
    /// Creates a coordinator with no held leases.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ReconcileLeaseCoordinator for InMemoryReconcileLeaseCoordinator {
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<ReconcileLease>> {
        validate_lease_request(scope_key, holder_id, lease_seconds)?;

        let now = Instant::now();
        let mut leases = self.leases.lock().await;
        if leases
            .get(scope_key)
            .is_some_and(|lease| lease.expires_at > now)
        {
            return Ok(None);
        }

        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());
        let expires_at = expiry_after(now, lease_seconds);
        leases.insert(
            scope_key.to_owned(),
            HeldLease {
                token: token.clone(),
                expires_at,
            },
        );

        Ok(Some(ReconcileLease {
            scope_key: scope_key.to_owned(),
            token,
            holder_id: holder_id.to_owned(),
        }))
    }

    async fn renew_lease(&self, lease: &ReconcileLease, lease_seconds: u32) -> AppResult<bool> {
        validate_lease_request(&lease.scope_key, &lease.holder_id, lease_seconds)?;

        let now = Instant::now();
        let mut leases = self.leases.lock().await;
        match leases.get_mut(&lease.scope_key) {
            Some(held) if held.token == lease.token && held.expires_at > now => {
                held.expires_at = expiry_after(now, lease_seconds);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_lease(&self, lease: &ReconcileLease) -> AppResult<()> {
        let mut leases = self.leases.lock().await;
        if leases
            .get(&lease.scope_key)
            .is_some_and(|held| held.token == lease.token)
        {
            leases.remove(&lease.scope_key);
        }

        Ok(())
    }
}

fn expiry_after(now: Instant, lease_seconds: u32) -> Instant {
    now.checked_add(Duration::from_secs(u64::from(lease_seconds)))
        .unwrap_or(now)
}
