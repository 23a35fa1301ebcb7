use std::fmt::{Display, Formatter};
use std::str::FromStr;

use rolegate_core::{AppError, AppResult, NonEmptyString};
use serde::{Deserialize, Serialize};

/// Closed set of actions a permission may grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionAction {
    /// Read access.
    View,
    /// Record creation.
    Create,
    /// Record mutation.
    Update,
    /// Record removal.
    Delete,
    /// Approval of a pending record.
    Approve,
    /// Assignment of a record to someone.
    Assign,
    /// Generation of derived output such as reports.
    Generate,
    /// File download.
    Download,
    /// Outbound delivery such as emailing an invoice.
    Send,
    /// File upload.
    Upload,
    /// Bulk export.
    Export,
}

impl PermissionAction {
    /// Returns a stable storage value for this action.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::View => "view",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Approve => "approve",
            Self::Assign => "assign",
            Self::Generate => "generate",
            Self::Download => "download",
            Self::Send => "send",
            Self::Upload => "upload",
            Self::Export => "export",
        }
    }

    /// Returns all known actions.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[PermissionAction] = &[
            PermissionAction::View,
            PermissionAction::Create,
            PermissionAction::Update,
            PermissionAction::Delete,
            PermissionAction::Approve,
            PermissionAction::Assign,
            PermissionAction::Generate,
            PermissionAction::Download,
            PermissionAction::Send,
            PermissionAction::Upload,
            PermissionAction::Export,
        ];

        ALL
    }
}

impl FromStr for PermissionAction {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::all()
            .iter()
            .copied()
            .find(|action| action.as_str() == value)
            .ok_or_else(|| AppError::Validation(format!("unknown permission action '{value}'")))
    }
}

impl Display for PermissionAction {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Validated permission name of the form `resource(.sub-resource)*.action`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PermissionName {
    value: String,
    action: PermissionAction,
}

impl PermissionName {
    /// Parses and validates a permission name.
    pub fn new(value: impl Into<String>) -> AppResult<Self> {
        let value = value.into().trim().to_owned();
        let segments: Vec<&str> = value.split('.').collect();

        if segments.len() < 2 {
            return Err(AppError::Validation(format!(
                "permission name '{value}' must have the form resource.action"
            )));
        }

        if let Some(segment) = segments.iter().find(|segment| !is_valid_segment(segment)) {
            return Err(AppError::Validation(format!(
                "permission name '{value}' has invalid segment '{segment}'"
            )));
        }

        let action_segment = segments.last().copied().unwrap_or_default();
        let action = PermissionAction::from_str(action_segment).map_err(|_| {
            AppError::Validation(format!(
                "permission name '{value}' ends with unknown action '{action_segment}'"
            ))
        })?;

        Ok(Self { value, action })
    }

    /// Returns the full permission name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        self.value.as_str()
    }

    /// Returns the action encoded in the final segment.
    #[must_use]
    pub fn action(&self) -> PermissionAction {
        self.action
    }

    /// Returns the name without its action segment.
    #[must_use]
    pub fn resource_path(&self) -> &str {
        self.value
            .rsplit_once('.')
            .map(|(resource, _)| resource)
            .unwrap_or(self.value.as_str())
    }
}

impl TryFrom<String> for PermissionName {
    type Error = AppError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<PermissionName> for String {
    fn from(value: PermissionName) -> Self {
        value.value
    }
}

impl Display for PermissionName {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

fn is_valid_segment(segment: &str) -> bool {
    let mut characters = segment.chars();
    let Some(first) = characters.next() else {
        return false;
    };

    first.is_ascii_lowercase()
        && characters.all(|character| {
            character.is_ascii_lowercase() || character.is_ascii_digit() || character == '_'
        })
}

/// Mutable permission attributes. Identity fields are not part of this set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionAttributes {
    /// Human-readable description.
    pub description: Option<String>,
    /// Optional grouping for administrative views.
    pub category: Option<String>,
    /// Whether the permission may be granted.
    pub active: bool,
}

/// Atomic capability stored in the permission registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    name: PermissionName,
    resource: NonEmptyString,
    action: PermissionAction,
    description: Option<String>,
    category: Option<String>,
    active: bool,
}

impl Permission {
    /// Creates a validated permission.
    ///
    /// `resource` defaults to the name without its action segment.
    pub fn new(
        name: PermissionName,
        resource: Option<String>,
        attributes: PermissionAttributes,
    ) -> AppResult<Self> {
        let resource = match resource.map(|value| value.trim().to_owned()) {
            Some(value) if !value.is_empty() => NonEmptyString::new(value)?,
            _ => NonEmptyString::new(name.resource_path())?,
        };

        Ok(Self {
            action: name.action(),
            name,
            resource,
            description: normalize_optional(attributes.description),
            category: normalize_optional(attributes.category),
            active: attributes.active,
        })
    }

    /// Returns the unique permission name.
    #[must_use]
    pub fn name(&self) -> &PermissionName {
        &self.name
    }

    /// Returns the resource grouping key.
    #[must_use]
    pub fn resource(&self) -> &str {
        self.resource.as_str()
    }

    /// Returns the granted action.
    #[must_use]
    pub fn action(&self) -> PermissionAction {
        self.action
    }

    /// Returns the optional description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Returns the optional category.
    #[must_use]
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    /// Returns whether the permission may currently be granted.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns the mutable attribute set.
    #[must_use]
    pub fn attributes(&self) -> PermissionAttributes {
        PermissionAttributes {
            description: self.description.clone(),
            category: self.category.clone(),
            active: self.active,
        }
    }

    /// Returns a copy with replaced mutable attributes and unchanged identity.
    #[must_use]
    pub fn with_attributes(&self, attributes: PermissionAttributes) -> Self {
        Self {
            name: self.name.clone(),
            resource: self.resource.clone(),
            action: self.action,
            description: normalize_optional(attributes.description),
            category: normalize_optional(attributes.category),
            active: attributes.active,
        }
    }
}

pub(crate) fn normalize_optional(value: Option<String>) -> Option<String> {
    value.and_then(|value| {
        let trimmed = value.trim().to_owned();
        (!trimmed.is_empty()).then_some(trimmed)
    })
}
