use chrono::{DateTime, Utc};
use serde::Serialize;

use rolegate_core::RejectionReason;

use super::ReconcileOptions;
use crate::PropagationCounts;

/// Reconciliation step boundaries, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReconcileStep {
    /// Permission catalog sync.
    Permissions,
    /// Role sync.
    Roles,
    /// Binding repair and cache invalidation.
    Propagation,
}

/// Per-entity outcome counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EntityCounts {
    /// Records created.
    pub created: usize,
    /// Records updated.
    pub updated: usize,
    /// Records already converged.
    pub unchanged: usize,
    /// Records refused by a rule.
    pub rejected: usize,
}

/// One role the run refused to write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleRejection {
    /// Declared role name.
    pub role: String,
    /// Machine-readable reason.
    pub reason: RejectionReason,
    /// Operator-facing detail.
    pub message: String,
}

/// Summary of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    /// Whether writes were suppressed.
    pub dry_run: bool,
    /// Whether system roles could be updated.
    pub force: bool,
    /// Run start.
    pub started_at: DateTime<Utc>,
    /// Run end.
    pub finished_at: DateTime<Utc>,
    /// Permission counts.
    pub permissions: EntityCounts,
    /// Role counts.
    pub roles: EntityCounts,
    /// Roles refused with their reasons.
    pub rejected_roles: Vec<RoleRejection>,
    /// Propagation counts.
    pub propagation: PropagationCounts,
    /// Non-fatal warnings.
    pub warnings: Vec<String>,
    /// First step skipped because cancellation was requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cancelled_before: Option<ReconcileStep>,
}

impl ReconcileReport {
    pub(super) fn started(options: ReconcileOptions, started_at: DateTime<Utc>) -> Self {
        Self {
            dry_run: options.dry_run,
            force: options.force,
            started_at,
            finished_at: started_at,
            permissions: EntityCounts::default(),
            roles: EntityCounts::default(),
            rejected_roles: Vec::new(),
            propagation: PropagationCounts::default(),
            warnings: Vec::new(),
            cancelled_before: None,
        }
    }

    pub(super) fn cancelled(mut self, step: ReconcileStep, finished_at: DateTime<Utc>) -> Self {
        tracing::warn!(step = ?step, "reconciliation cancelled");
        self.cancelled_before = Some(step);
        self.finished_at = finished_at;
        self
    }

    pub(super) fn finished(mut self, finished_at: DateTime<Utc>) -> Self {
        self.finished_at = finished_at;
        self
    }

    /// Returns whether any role was rejected.
    #[must_use]
    pub fn has_rejections(&self) -> bool {
        !self.rejected_roles.is_empty()
    }

    /// Returns whether the run wrote, or would write, anything.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.permissions.created + self.permissions.updated + self.roles.created + self.roles.updated
            > 0
            || self.propagation.bindings_repaired > 0
    }
}
