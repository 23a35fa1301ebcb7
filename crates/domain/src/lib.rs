//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod authorization;
mod declaration;
mod permission;
mod role;
mod user;

pub use authorization::{
    AllowBasis, Decision, DenyReason, PermissionRequirement, RequirementMode,
    ResolvedPermissions, authorize, authorize_with_ownership,
};
pub use declaration::{PermissionDocument, RbacDeclaration, RbacDocument, RoleDocument, RoleSpec};
pub use permission::{Permission, PermissionAction, PermissionAttributes, PermissionName};
pub use role::{Role, RoleAttributes, RoleId, RoleName};
pub use user::{RoleBinding, UserAccount, UserId};
