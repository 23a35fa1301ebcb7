//! Declarative permission and role configuration.
//!
//! [`RbacDocument`] mirrors the configuration file one-to-one.
//! [`RbacDocument::into_declaration`] validates the whole document in
//! isolation and either yields a consistent [`RbacDeclaration`] or rejects it
//! with every issue found, so nothing is ever applied from a broken file.

use std::collections::{HashMap, HashSet};
use std::str::FromStr;

use rolegate_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

use crate::permission::{Permission, PermissionAction, PermissionAttributes, PermissionName};
use crate::role::{RoleAttributes, RoleName};

/// One permission entry as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PermissionDocument {
    /// Unique permission name.
    pub name: String,
    /// Optional grouping key, defaults to the name without its action.
    #[serde(default)]
    pub resource: Option<String>,
    /// Optional action, must match the final name segment when present.
    #[serde(default)]
    pub action: Option<String>,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Grouping for administrative views.
    #[serde(default)]
    pub category: Option<String>,
    /// Whether the permission may be granted.
    #[serde(default = "default_active")]
    pub active: bool,
}

/// One role entry as written in the configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct RoleDocument {
    /// Unique role name.
    pub name: String,
    /// Display name, defaults to the role name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Human-readable description.
    #[serde(default)]
    pub description: Option<String>,
    /// Granted permission names, in display order.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Marks a protected system role. Only honored at creation.
    #[serde(default)]
    pub is_system: bool,
    /// Ordering priority, lower first.
    #[serde(default)]
    pub priority: i32,
    /// Whether bound users receive the role's grants.
    #[serde(default = "default_active")]
    pub active: bool,
}

/// Whole configuration document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RbacDocument {
    /// Declared permissions.
    #[serde(default)]
    pub permissions: Vec<PermissionDocument>,
    /// Declared roles.
    #[serde(default)]
    pub roles: Vec<RoleDocument>,
}

fn default_active() -> bool {
    true
}

/// Validated role specification shared by declarations and admin-created roles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSpec {
    /// Unique role name.
    pub name: RoleName,
    /// Requested system flag.
    pub is_system: bool,
    /// Attributes replaced wholesale on update.
    pub attributes: RoleAttributes,
}

impl RoleSpec {
    /// Validates a role from transport values.
    pub fn parse(
        name: &str,
        display_name: Option<String>,
        description: Option<String>,
        permissions: &[String],
        is_system: bool,
        priority: i32,
        active: bool,
    ) -> AppResult<Self> {
        let name = RoleName::new(name)?;
        let permissions = permissions
            .iter()
            .map(|permission| PermissionName::new(permission.as_str()))
            .collect::<AppResult<Vec<_>>>()?;

        let mut seen = HashSet::new();
        if let Some(duplicate) = permissions
            .iter()
            .find(|permission| !seen.insert(*permission))
        {
            return Err(AppError::Validation(format!(
                "role '{name}' lists permission '{duplicate}' more than once"
            )));
        }

        let display_name = display_name
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| name.as_str().to_owned());

        Ok(Self {
            name,
            is_system,
            attributes: RoleAttributes {
                display_name,
                description,
                permissions,
                active,
                priority,
            },
        })
    }
}

/// Self-consistent target state for the reconciler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RbacDeclaration {
    permissions: Vec<Permission>,
    roles: Vec<RoleSpec>,
}

impl RbacDeclaration {
    /// Returns declared permissions in file order.
    #[must_use]
    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    /// Returns declared roles in file order.
    #[must_use]
    pub fn roles(&self) -> &[RoleSpec] {
        &self.roles
    }
}

impl RbacDocument {
    /// Validates the whole document before anything touches storage.
    pub fn into_declaration(self) -> AppResult<RbacDeclaration> {
        let mut issues = Vec::new();
        let mut permissions = Vec::with_capacity(self.permissions.len());
        let mut declared_names = HashSet::new();

        for entry in self.permissions {
            match permission_from_document(entry) {
                Ok(permission) => {
                    if !declared_names.insert(permission.name().clone()) {
                        issues.push(format!(
                            "permission '{}' is declared more than once",
                            permission.name()
                        ));
                        continue;
                    }
                    permissions.push(permission);
                }
                Err(error) => issues.push(issue_text(error)),
            }
        }

        let mut roles = Vec::with_capacity(self.roles.len());
        let mut role_names: HashMap<RoleName, usize> = HashMap::new();

        for entry in self.roles {
            let spec = match RoleSpec::parse(
                entry.name.as_str(),
                entry.display_name,
                entry.description,
                &entry.permissions,
                entry.is_system,
                entry.priority,
                entry.active,
            ) {
                Ok(spec) => spec,
                Err(error) => {
                    issues.push(issue_text(error));
                    continue;
                }
            };

            let occurrences = role_names.entry(spec.name.clone()).or_insert(0);
            *occurrences += 1;
            if *occurrences > 1 {
                issues.push(format!("role '{}' is declared more than once", spec.name));
                continue;
            }

            for permission in &spec.attributes.permissions {
                if !declared_names.contains(permission) {
                    issues.push(format!(
                        "role '{}' references undeclared permission '{permission}'",
                        spec.name
                    ));
                }
            }

            roles.push(spec);
        }

        if !issues.is_empty() {
            return Err(AppError::Validation(format!(
                "rbac declaration rejected with {} issue(s): {}",
                issues.len(),
                issues.join("; ")
            )));
        }

        Ok(RbacDeclaration { permissions, roles })
    }
}

fn permission_from_document(entry: PermissionDocument) -> AppResult<Permission> {
    let name = PermissionName::new(entry.name)?;

    if let Some(action) = entry.action.as_deref() {
        let action = PermissionAction::from_str(action.trim()).map_err(|_| {
            AppError::Validation(format!(
                "permission '{name}' declares unknown action '{action}'"
            ))
        })?;
        if action != name.action() {
            return Err(AppError::Validation(format!(
                "permission '{name}' declares action '{action}' but its name ends with '{}'",
                name.action()
            )));
        }
    }

    Permission::new(
        name,
        entry.resource,
        PermissionAttributes {
            description: entry.description,
            category: entry.category,
            active: entry.active,
        },
    )
}

fn issue_text(error: AppError) -> String {
    match error {
        AppError::Validation(message) => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{PermissionDocument, RbacDocument, RoleDocument};

    fn permission(name: &str) -> PermissionDocument {
        PermissionDocument {
            name: name.to_owned(),
            resource: None,
            action: None,
            description: None,
            category: None,
            active: true,
        }
    }

    fn role(name: &str, permissions: &[&str]) -> RoleDocument {
        RoleDocument {
            name: name.to_owned(),
            display_name: None,
            description: None,
            permissions: permissions.iter().map(|value| (*value).to_owned()).collect(),
            is_system: false,
            priority: 0,
            active: true,
        }
    }

    #[test]
    fn consistent_document_is_accepted() {
        let document = RbacDocument {
            permissions: vec![permission("projects.view"), permission("projects.create")],
            roles: vec![role("manager", &["projects.view", "projects.create"])],
        };

        let declaration = document.into_declaration();
        assert!(declaration.is_ok());
        let Ok(declaration) = declaration else {
            return;
        };
        assert_eq!(declaration.permissions().len(), 2);
        assert_eq!(declaration.roles()[0].attributes.display_name, "manager");
    }

    #[test]
    fn undeclared_reference_rejects_whole_document() {
        let document = RbacDocument {
            permissions: vec![permission("projects.view")],
            roles: vec![
                role("manager", &["projects.view", "reports.generate"]),
                role("assistant", &["projects.view"]),
            ],
        };

        let result = document.into_declaration();
        assert!(matches!(
            result,
            Err(rolegate_core::AppError::Validation(message))
                if message.contains("undeclared permission 'reports.generate'")
        ));
    }

    #[test]
    fn every_issue_is_reported() {
        let mut mismatched = permission("invoices.send");
        mismatched.action = Some("export".to_owned());
        let document = RbacDocument {
            permissions: vec![
                permission("projects.view"),
                permission("projects.view"),
                permission("projects.archive"),
                mismatched,
            ],
            roles: vec![role("manager", &[]), role("manager", &[])],
        };

        let Err(rolegate_core::AppError::Validation(message)) = document.into_declaration()
        else {
            panic!("expected validation error");
        };
        assert!(message.contains("4 issue(s)"));
        assert!(message.contains("declared more than once"));
        assert!(message.contains("unknown action 'archive'"));
        assert!(message.contains("declares action 'export'"));
        assert!(message.contains("role 'manager' is declared more than once"));
    }

    #[test]
    fn document_uses_camel_case_keys() {
        let json = r#"{
            "permissions": [{"name": "reports.generate", "category": "reports"}],
            "roles": [{"name": "admin", "displayName": "Administrator", "isSystem": true,
                       "priority": 0, "permissions": ["reports.generate"]}]
        }"#;

        let document: Result<RbacDocument, _> = serde_json::from_str(json);
        assert!(document.is_ok());
        let Ok(document) = document else {
            return;
        };
        assert!(document.roles[0].is_system);
        assert_eq!(document.roles[0].display_name.as_deref(), Some("Administrator"));
    }
}
