use std::collections::HashSet;
use std::fmt::{Display, Formatter};

use rolegate_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::permission::{PermissionName, normalize_optional};

/// Unique identifier for a stored role record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RoleId(Uuid);

impl RoleId {
    /// Creates a new random role identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a role identifier from an existing UUID value.
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

impl Default for RoleId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for RoleId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Validated role name: lowercase ASCII, digits, `_` and `-`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoleName(String);

impl RoleName {
    /// Parses and validates a role name.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into().trim().to_owned();
        let mut characters = value.chars();
        let starts_with_letter = characters
            .next()
            .is_some_and(|character| character.is_ascii_lowercase());
        let rest_is_valid = characters.all(|character| {
            character.is_ascii_lowercase()
                || character.is_ascii_digit()
                || character == '_'
                || character == '-'
        });

        if !starts_with_letter || !rest_is_valid {
            return Err(AppError::Validation(format!(
                "role name '{value}' must start with a lowercase letter and contain only lowercase letters, digits, '_' or '-'"
            )));
        }

        Ok(Self(value))
    }

    /// Returns the role name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl TryFrom<String> for RoleName {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RoleName> for String {
    fn from(value: RoleName) -> Self {
        value.0
    }
}

impl Display for RoleName {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Attributes replaced wholesale by a role update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAttributes {
    /// Name shown in administrative views.
    pub display_name: String,
    /// Optional description.
    pub description: Option<String>,
    /// Ordered, duplicate-free permission grants.
    pub permissions: Vec<PermissionName>,
    /// Whether users bound to the role receive its grants.
    pub active: bool,
    /// Display and tie-break ordering, lower first.
    pub priority: i32,
}

/// Named, ordered set of permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    role_id: RoleId,
    name: RoleName,
    display_name: NonEmptyString,
    description: Option<String>,
    permissions: Vec<PermissionName>,
    is_system: bool,
    active: bool,
    priority: i32,
}

impl Role {
    /// Creates a validated role record.
    pub fn new(
        role_id: RoleId,
        name: RoleName,
        is_system: bool,
        attributes: RoleAttributes,
    ) -> AppResult<Self> {
        ensure_unique_permissions(&name, &attributes.permissions)?;

        Ok(Self {
            role_id,
            name,
            display_name: NonEmptyString::new(attributes.display_name.trim())?,
            description: normalize_optional(attributes.description),
            permissions: attributes.permissions,
            is_system,
            active: attributes.active,
            priority: attributes.priority,
        })
    }

    /// Returns the record identifier.
    #[must_use]
    pub fn role_id(&self) -> RoleId {
        self.role_id
    }

    /// Returns the unique role name.
    #[must_use]
    pub fn name(&self) -> &RoleName {
        &self.name
    }

    /// Returns the display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.display_name.as_str()
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the ordered permission grants.
    #[must_use]
    pub fn permissions(&self) -> &[PermissionName] {
        &self.permissions
    }

    /// Returns whether the role is system-protected.
    #[must_use]
    pub fn is_system(&self) -> bool {
        self.is_system
    }

    /// Returns whether the role currently grants its permissions.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the ordering priority.
    #[must_use]
    pub fn priority(&self) -> i32 {
        self.priority
    }

    /// Returns the replaceable attribute set.
    #[must_use]
    pub fn attributes(&self) -> RoleAttributes {
        RoleAttributes {
            display_name: self.display_name.as_str().to_owned(),
            description: self.description.clone(),
            permissions: self.permissions.clone(),
            active: self.active,
            priority: self.priority,
        }
    }

    /// Returns a copy whose attributes are replaced wholesale.
    pub fn with_attributes(&self, attributes: RoleAttributes) -> AppResult<Self> {
        Self::new(self.role_id, self.name.clone(), self.is_system, attributes)
    }

    /// Returns whether applying `attributes` would change this role.
    #[must_use]
    pub fn differs_from(&self, attributes: &RoleAttributes) -> bool {
        let normalized_description = normalize_optional(attributes.description.clone());

        self.display_name.as_str() != attributes.display_name.trim()
            || self.description != normalized_description
            || self.permissions != attributes.permissions
            || self.active != attributes.active
            || self.priority != attributes.priority
    }
}

fn ensure_unique_permissions(name: &RoleName, permissions: &[PermissionName]) -> AppResult<()> {
    let mut seen = HashSet::new();
    for permission in permissions {
        if !seen.insert(permission) {
            return Err(AppError::Validation(format!(
                "role '{name}' lists permission '{permission}' more than once"
            )));
        }
    }

    Ok(())
}
