use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::Utc;

use rolegate_core::{AppError, AppResult};
use rolegate_domain::{Permission, PermissionName, RbacDeclaration, RbacDocument, Role};

use crate::{
    PermissionLookup, PermissionRegistry, ReconcileLease, ReconcileLeaseCoordinator, RoleBindingService,
    RoleRegistry, RoleUpsertOutcome, UpsertOutcome,
};

mod report;


pub use report::{EntityCounts, ReconcileReport, ReconcileStep, RoleRejection};

const RECONCILE_LEASE_SCOPE: &str = "rbac:reconcile";
const DEFAULT_LEASE_SECONDS: u32 = 300;

/// Operator-supplied switches for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Compute the report without writing.
    pub dry_run: bool,
    /// Allow updates to system roles.
    pub force: bool,
}

/// Cooperative cancellation signal checked between reconciliation steps.
#[derive(Debug, Clone, Default)]
pub struct ReconcileCancellation {
    cancelled: Arc<AtomicBool>,
}

impl ReconcileCancellation {
    /// Creates a signal that is not cancelled.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Requests cancellation. The current step finishes first.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Returns whether cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Converges the permission and role registries to a declaration.
#[derive(Clone)]
pub struct ReconcileService {
    permissions: PermissionRegistry,
    roles: RoleRegistry,
    bindings: RoleBindingService,
    lease_coordinator: Arc<dyn ReconcileLeaseCoordinator>,
    holder_id: String,
    lease_seconds: u32,
}

impl ReconcileService {
    /// Creates a reconcile service from its collaborators.
    #[must_use]
    pub fn new(
        permissions: PermissionRegistry,
        roles: RoleRegistry,
        bindings: RoleBindingService,
        lease_coordinator: Arc<dyn ReconcileLeaseCoordinator>,
    ) -> Self {
        Self {
            permissions,
            roles,
            bindings,
            lease_coordinator,
            holder_id: "rolegate-reconciler".to_owned(),
            lease_seconds: DEFAULT_LEASE_SECONDS,
        }
    }

    /// Overrides the lease holder identity and duration.
    #[must_use]
    pub fn with_lease_settings(mut self, holder_id: impl Into<String>, lease_seconds: u32) -> Self {
        self.holder_id = holder_id.into();
        self.lease_seconds = lease_seconds.max(1);
        self
    }

    /// Runs one reconciliation.
    ///
    /// The document is validated before the lease is taken. A concurrent run
    /// yields a conflict.
    pub async fn reconcile(
        &self,
        document: RbacDocument,
        options: ReconcileOptions,
        cancellation: &ReconcileCancellation,
    ) -> AppResult<ReconcileReport> {
        let declaration = document.into_declaration()?;

        let Some(lease) = self
            .lease_coordinator
            .try_acquire_lease(RECONCILE_LEASE_SCOPE, &self.holder_id, self.lease_seconds)
            .await?
        else {
            return Err(AppError::Conflict(
                "another reconciliation run holds the lease".to_owned(),
            ));
        };

        tracing::info!(
            permissions = declaration.permissions().len(),
            roles = declaration.roles().len(),
            dry_run = options.dry_run,
            force = options.force,
            "reconciliation started"
        );

        let result = self
            .run_steps(&lease, &declaration, options, cancellation)
            .await;

        if let Err(error) = self.lease_coordinator.release_lease(&lease).await {
            tracing::warn!(%error, "failed to release reconciliation lease");
        }

        if let Ok(report) = &result {
            tracing::info!(
                permissions_created = report.permissions.created,
                permissions_updated = report.permissions.updated,
                roles_created = report.roles.created,
                roles_updated = report.roles.updated,
                roles_rejected = report.rejected_roles.len(),
                users_affected = report.propagation.users_affected,
                "reconciliation finished"
            );
        }

        result
    }

    async fn run_steps(
        &self,
        lease: &ReconcileLease,
        declaration: &RbacDeclaration,
        options: ReconcileOptions,
        cancellation: &ReconcileCancellation,
    ) -> AppResult<ReconcileReport> {
        let mut report = ReconcileReport::started(options, Utc::now());

        if cancellation.is_cancelled() {
            return Ok(report.cancelled(ReconcileStep::Permissions, Utc::now()));
        }
        let permission_view = self
            .sync_permissions(declaration.permissions(), options, &mut report)
            .await?;

        if cancellation.is_cancelled() {
            return Ok(report.cancelled(ReconcileStep::Roles, Utc::now()));
        }
        self.renew_lease(lease, ReconcileStep::Roles).await?;
        let synced = self
            .sync_roles(declaration, &permission_view, options, &mut report)
            .await?;

        if cancellation.is_cancelled() {
            return Ok(report.cancelled(ReconcileStep::Propagation, Utc::now()));
        }
        self.renew_lease(lease, ReconcileStep::Propagation).await?;
        report.propagation = self
            .bindings
            .propagate_reconciled_roles(&synced.changed, &synced.settled, options.dry_run)
            .await?;

        Ok(report.finished(Utc::now()))
    }

    /// Extends the lease before `next_step`. A lost lease aborts the run.
    async fn renew_lease(&self, lease: &ReconcileLease, next_step: ReconcileStep) -> AppResult<()> {
        if self
            .lease_coordinator
            .renew_lease(lease, self.lease_seconds)
            .await?
        {
            return Ok(());
        }

        tracing::warn!(
            holder_id = %lease.holder_id,
            step = ?next_step,
            "reconciliation lease lost before step"
        );
        Err(AppError::Conflict(
            "reconciliation lease expired or was taken over".to_owned(),
        ))
    }

    /// Returns the declared permissions as they stand after this step.
    async fn sync_permissions(
        &self,
        declared: &[Permission],
        options: ReconcileOptions,
        report: &mut ReconcileReport,
    ) -> AppResult<BTreeMap<PermissionName, Permission>> {
        let mut view = BTreeMap::new();

        for permission in declared {
            let upsert = if options.dry_run {
                self.permissions.preview_upsert(permission).await?
            } else {
                self.permissions.upsert(permission).await?
            };

            match upsert.outcome {
                UpsertOutcome::Created => report.permissions.created += 1,
                UpsertOutcome::Updated => report.permissions.updated += 1,
                UpsertOutcome::Unchanged => report.permissions.unchanged += 1,
            }
            report.warnings.extend(upsert.warnings);
            view.insert(upsert.permission.name().clone(), upsert.permission);
        }

        Ok(view)
    }

    async fn sync_roles(
        &self,
        declaration: &RbacDeclaration,
        permission_view: &BTreeMap<PermissionName, Permission>,
        options: ReconcileOptions,
        report: &mut ReconcileReport,
    ) -> AppResult<SyncedRoles> {
        let mut synced = SyncedRoles::default();

        for spec in declaration.roles() {
            let upsert = if options.dry_run {
                let lookup =
                    PermissionLookup::resolve(&spec.attributes.permissions, permission_view.values());
                self.roles
                    .preview_upsert(spec, options.force, &lookup)
                    .await?
            } else {
                self.roles.upsert(spec, options.force).await?
            };

            report.warnings.extend(upsert.warnings);
            match upsert.outcome {
                RoleUpsertOutcome::Created(role) => {
                    report.roles.created += 1;
                    synced.changed.push(role);
                }
                RoleUpsertOutcome::Updated(role) => {
                    report.roles.updated += 1;
                    synced.changed.push(role);
                }
                RoleUpsertOutcome::Unchanged(role) => {
                    report.roles.unchanged += 1;
                    synced.settled.push(role);
                }
                RoleUpsertOutcome::Rejected { reason, message } => {
                    report.roles.rejected += 1;
                    report.rejected_roles.push(RoleRejection {
                        role: spec.name.to_string(),
                        reason,
                        message,
                    });
                }
            }
        }

        Ok(synced)
    }
}

/// Declared roles that were not rejected, split by whether this run wrote them.
#[derive(Default)]
struct SyncedRoles {
    changed: Vec<Role>,
    settled: Vec<Role>,
}
