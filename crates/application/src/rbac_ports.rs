mod authorization;
mod bindings;
mod permissions;
mod reconcile;
mod roles;

pub use authorization::{AuthorizationRepository, PermissionCache, SubjectGrants};
pub use bindings::{RoleBindingRepository, admin_floor_violation};
pub use permissions::{PermissionLookup, PermissionRepository};
pub use reconcile::{ReconcileLease, ReconcileLeaseCoordinator};
pub use roles::{RoleRepository, RoleSummary};
