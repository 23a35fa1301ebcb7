//! User accounts as seen by access control: identity, status and role binding.

use std::str::FromStr;

use rolegate_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::role::{Role, RoleId, RoleName};

/// Unique identifier for a user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random user identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a user identifier from an existing UUID value.
    #[must_use]
    pub fn from_uuid(value: Uuid) -> Self {
        Self(value)
    }

    /// Returns the underlying UUID value.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|error| AppError::Validation(format!("invalid user id '{value}': {error}")))
    }
}

/// Denormalized role name plus direct reference to the role record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBinding {
    role_name: RoleName,
    role_ref: RoleId,
}

impl RoleBinding {
    /// Creates a binding that points at `role`.
    #[must_use]
    pub fn to_role(role: &Role) -> Self {
        Self {
            role_name: role.name().clone(),
            role_ref: role.role_id(),
        }
    }

    /// Rebuilds a binding from stored columns.
    #[must_use]
    pub fn from_parts(role_name: RoleName, role_ref: RoleId) -> Self {
        Self {
            role_name,
            role_ref,
        }
    }

    /// Returns the bound role name.
    #[must_use]
    pub fn role_name(&self) -> &RoleName {
        &self.role_name
    }

    /// Returns the bound role record id.
    #[must_use]
    pub fn role_ref(&self) -> RoleId {
        self.role_ref
    }

    /// Returns whether both halves of the binding point at `role`.
    #[must_use]
    pub fn is_consistent_with(&self, role: &Role) -> bool {
        &self.role_name == role.name() && self.role_ref == role.role_id()
    }
}

/// User account projection owned by the access-control subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserAccount {
    user_id: UserId,
    display_name: NonEmptyString,
    active: bool,
    binding: RoleBinding,
}

impl UserAccount {
    /// Creates a validated user account.
    pub fn new(
        user_id: UserId,
        display_name: impl Into<String>,
        active: bool,
        binding: RoleBinding,
    ) -> AppResult<Self> {
        Ok(Self {
            user_id,
            display_name: NonEmptyString::new(display_name)?,
            active,
            binding,
        })
    }

    /// Returns the user identifier.
    #[must_use]
    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    /// Returns the display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Returns whether the account is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the role binding.
    #[must_use]
    pub fn binding(&self) -> &RoleBinding {
        &self.binding
    }

    /// Returns whether this account counts toward the administrator floor.
    #[must_use]
    pub fn is_active_member_of(&self, role_name: &RoleName) -> bool {
        self.active && self.binding.role_name() == role_name
    }

    /// Returns a copy with a replaced binding.
    #[must_use]
    pub fn with_binding(&self, binding: RoleBinding) -> Self {
        Self {
            binding,
            ..self.clone()
        }
    }

    /// Returns a copy with a replaced active flag.
    #[must_use]
    pub fn with_active(&self, active: bool) -> Self {
        Self {
            active,
            ..self.clone()
        }
    }
}
