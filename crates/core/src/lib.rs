//! Shared primitives for all Rust crates in Rolegate.

#![forbid(unsafe_code)]

/// Authentication primitives shared across services.
pub mod auth;

use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use auth::UserIdentity;

/// Result type used across Rolegate crates.
pub type AppResult<T> = Result<T, AppError>;

/// A validated non-empty UTF-8 string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NonEmptyString(String);

impl NonEmptyString {
    /// Creates a validated non-empty string.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(AppError::Validation(
                "value must not be empty or whitespace".to_owned(),
            ));
        }

        Ok(Self(value))
    }

    /// Returns the underlying string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl From<NonEmptyString> for String {
    fn from(value: NonEmptyString) -> Self {
        value.0
    }
}

/// Machine-readable reasons attached to rejected administrative operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RejectionReason {
    /// System roles cannot be deleted or updated without an override.
    SystemRoleProtected,
    /// The role still has users bound to it.
    RoleInUse,
    /// The operation would leave no active administrator.
    AdminFloorViolation,
    /// A role references a permission that does not exist.
    UnknownPermissionReference,
    /// A role references a permission that is deactivated.
    InactivePermissionReference,
    /// The permission is still referenced by at least one role.
    PermissionInUse,
}

impl RejectionReason {
    /// Returns the stable transport value for this reason.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SystemRoleProtected => "system-role-protected",
            Self::RoleInUse => "role-in-use",
            Self::AdminFloorViolation => "admin-floor-violation",
            Self::UnknownPermissionReference => "unknown-permission-reference",
            Self::InactivePermissionReference => "inactive-permission-reference",
            Self::PermissionInUse => "permission-in-use",
        }
    }
}

impl Display for RejectionReason {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Common application error categories.
#[derive(Debug, Error)]
pub enum AppError {
    /// Invalid input or violated invariant.
    #[error("validation error: {0}")]
    Validation(String),

    /// Requested resource does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Write operation conflicts with existing state.
    #[error("conflict: {0}")]
    Conflict(String),

    /// User is not authenticated.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// User is authenticated but blocked by authorization policy.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Operation refused by a protection rule.
    #[error("rejected ({0}): {1}")]
    Rejected(RejectionReason, String),

    /// Internal unexpected error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Returns the rejection reason when this error is a protection refusal.
    #[must_use]
    pub fn rejection_reason(&self) -> Option<RejectionReason> {
        match self {
            Self::Rejected(reason, _) => Some(*reason),
            _ => None,
        }
    }
}
