//! Application services and ports.

#![forbid(unsafe_code)]

mod authorization_service;
mod permission_registry;
mod rbac_policy;
mod rbac_ports;
mod reconcile_service;
mod role_binding_service;
mod role_registry;

#[cfg(test)]
mod test_support;

pub use authorization_service::AuthorizationService;
pub use permission_registry::{PermissionRegistry, PermissionUpsert, UpsertOutcome};
pub use rbac_policy::{AdministrationLock, RbacPolicy};
pub use rbac_ports::{
    AuthorizationRepository, PermissionCache, PermissionLookup, PermissionRepository,
    ReconcileLease, ReconcileLeaseCoordinator, RoleBindingRepository, RoleRepository,
    RoleSummary, SubjectGrants, admin_floor_violation,
};
pub use reconcile_service::{
    EntityCounts, ReconcileCancellation, ReconcileOptions, ReconcileReport, ReconcileService,
    ReconcileStep, RoleRejection,
};
pub use role_binding_service::{PropagationCounts, RoleBindingService};
pub use role_registry::{RoleRegistry, RoleUpsert, RoleUpsertOutcome};
