use async_trait::async_trait;

use rolegate_core::AppResult;

/// Lease claimed by one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileLease {
    /// Scope key the lease was claimed for.
    pub scope_key: String,
    /// Ownership token used for compare-and-delete release.
    pub token: String,
    /// Holder identifier for diagnostics.
    pub holder_id: String,
}

/// Single-flight coordination port for reconciliation runs.
#[async_trait]
pub trait ReconcileLeaseCoordinator: Send + Sync {
    /// Attempts to acquire the lease. Returns `None` while another holder owns it.
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<ReconcileLease>>;

    /// Extends a held lease. Returns `false` once the lease has expired or changed hands.
    async fn renew_lease(&self, lease: &ReconcileLease, lease_seconds: u32) -> AppResult<bool>;

    /// Releases one lease using token compare-and-delete semantics.
    async fn release_lease(&self, lease: &ReconcileLease) -> AppResult<()>;
}
