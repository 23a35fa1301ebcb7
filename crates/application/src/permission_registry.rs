use std::sync::Arc;

use rolegate_core::{AppError, AppResult, RejectionReason};
use rolegate_domain::{Permission, PermissionAttributes, PermissionName};
use serde::Serialize;

use crate::{AdministrationLock, PermissionLookup, PermissionRepository};

/// Outcome of converging one stored record to its declared state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpsertOutcome {
    /// The record did not exist and was created.
    Created,
    /// Mutable attributes were changed.
    Updated,
    /// Stored and declared state already matched.
    Unchanged,
}

/// Result of a permission upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionUpsert {
    /// What happened to the stored record.
    pub outcome: UpsertOutcome,
    /// Permission state after the upsert.
    pub permission: Permission,
    /// Non-fatal identity mismatches.
    pub warnings: Vec<String>,
}

/// Application service over the permission catalog.
#[derive(Clone)]
pub struct PermissionRegistry {
    repository: Arc<dyn PermissionRepository>,
    lock: AdministrationLock,
}

impl PermissionRegistry {
    /// Creates a registry from a repository implementation.
    #[must_use]
    pub fn new(repository: Arc<dyn PermissionRepository>, lock: AdministrationLock) -> Self {
        Self { repository, lock }
    }

    /// Creates the permission when absent, otherwise converges its mutable attributes.
    pub async fn upsert(&self, declared: &Permission) -> AppResult<PermissionUpsert> {
        let existing = self.repository.find_permission(declared.name()).await?;
        let planned = plan_upsert(existing.as_ref(), declared);

        match planned.outcome {
            UpsertOutcome::Created => {
                self.repository
                    .insert_permission(planned.permission.clone())
                    .await?;
                tracing::info!(permission = %declared.name(), "permission created");
            }
            UpsertOutcome::Updated => {
                self.repository
                    .update_permission(planned.permission.clone())
                    .await?;
                tracing::info!(permission = %declared.name(), "permission updated");
            }
            UpsertOutcome::Unchanged => {}
        }

        for warning in &planned.warnings {
            tracing::warn!(permission = %declared.name(), "{warning}");
        }

        Ok(planned)
    }

    /// Computes the upsert result without writing.
    pub async fn preview_upsert(&self, declared: &Permission) -> AppResult<PermissionUpsert> {
        let existing = self.repository.find_permission(declared.name()).await?;
        Ok(plan_upsert(existing.as_ref(), declared))
    }

    /// Resolves names to active permissions, reporting missing and inactive names.
    pub async fn find_by_names(&self, names: &[PermissionName]) -> AppResult<PermissionLookup> {
        let found = self.repository.find_permissions_by_names(names).await?;
        Ok(PermissionLookup::resolve(names, &found))
    }

    /// Lists the catalog.
    pub async fn list(&self) -> AppResult<Vec<Permission>> {
        self.repository.list_permissions().await
    }

    /// Returns one permission.
    pub async fn get(&self, name: &PermissionName) -> AppResult<Permission> {
        self.repository
            .find_permission(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("permission '{name}' does not exist")))
    }

    /// Creates a permission through the administrative path.
    pub async fn create(&self, permission: Permission) -> AppResult<Permission> {
        if self
            .repository
            .find_permission(permission.name())
            .await?
            .is_some()
        {
            return Err(AppError::Conflict(format!(
                "permission '{}' already exists",
                permission.name()
            )));
        }

        self.repository.insert_permission(permission.clone()).await?;
        tracing::info!(permission = %permission.name(), "permission created");
        Ok(permission)
    }

    /// Replaces the mutable attributes of one permission.
    pub async fn update(
        &self,
        name: &PermissionName,
        attributes: PermissionAttributes,
    ) -> AppResult<Permission> {
        let updated = self.get(name).await?.with_attributes(attributes);
        self.repository.update_permission(updated.clone()).await?;
        tracing::info!(permission = %name, active = updated.is_active(), "permission updated");
        Ok(updated)
    }

    /// Deletes a permission no role references.
    pub async fn delete(&self, name: &PermissionName) -> AppResult<()> {
        let _guard = self.lock.acquire().await;

        self.get(name).await?;

        let referencing_roles = self.repository.count_roles_referencing(name).await?;
        if referencing_roles > 0 {
            return Err(AppError::Rejected(
                RejectionReason::PermissionInUse,
                format!("permission '{name}' is still granted by {referencing_roles} role(s)"),
            ));
        }

        self.repository.delete_permission(name).await?;
        tracing::info!(permission = %name, "permission deleted");
        Ok(())
    }
}

fn plan_upsert(existing: Option<&Permission>, declared: &Permission) -> PermissionUpsert {
    let Some(existing) = existing else {
        return PermissionUpsert {
            outcome: UpsertOutcome::Created,
            permission: declared.clone(),
            warnings: Vec::new(),
        };
    };

    let mut warnings = Vec::new();
    if existing.resource() != declared.resource() {
        warnings.push(format!(
            "permission '{}' declares resource '{}' but stored resource '{}' is immutable",
            declared.name(),
            declared.resource(),
            existing.resource()
        ));
    }

    let declared_attributes = declared.attributes();
    if existing.attributes() == declared_attributes {
        return PermissionUpsert {
            outcome: UpsertOutcome::Unchanged,
            permission: existing.clone(),
            warnings,
        };
    }

    PermissionUpsert {
        outcome: UpsertOutcome::Updated,
        permission: existing.with_attributes(declared_attributes),
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rolegate_core::{AppError, RejectionReason};
    use rolegate_domain::{Permission, PermissionAttributes};

    use super::{PermissionRegistry, UpsertOutcome};
    use crate::AdministrationLock;
    use crate::test_support::{FakeRbacStore, permission, permission_name, role_with};

    fn registry(store: &Arc<FakeRbacStore>) -> PermissionRegistry {
        PermissionRegistry::new(store.clone(), AdministrationLock::new())
    }

    #[tokio::test]
    async fn upsert_creates_then_reports_unchanged() {
        let store = Arc::new(FakeRbacStore::default());
        let registry = registry(&store);
        let declared = permission("billing.invoice.create");

        let first = registry.upsert(&declared).await;
        let second = registry.upsert(&declared).await;

        assert!(matches!(first, Ok(ref result) if result.outcome == UpsertOutcome::Created));
        assert!(matches!(second, Ok(ref result) if result.outcome == UpsertOutcome::Unchanged));
        assert_eq!(store.permission_count().await, 1);
    }

    #[tokio::test]
    async fn upsert_updates_mutable_attributes_only() {
        let store = Arc::new(FakeRbacStore::default());
        store.seed_permission(permission("reports.generate")).await;
        let registry = registry(&store);

        let Ok(declared) = Permission::new(
            permission_name("reports.generate"),
            Some("analytics".to_owned()),
            PermissionAttributes {
                description: Some("Generate reports".to_owned()),
                category: Some("reports".to_owned()),
                active: false,
            },
        ) else {
            panic!("declared permission should be valid");
        };

        let Ok(result) = registry.upsert(&declared).await else {
            panic!("upsert should succeed");
        };

        assert_eq!(result.outcome, UpsertOutcome::Updated);
        assert_eq!(result.permission.resource(), "reports");
        assert!(!result.permission.is_active());
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("immutable"));
    }

    #[tokio::test]
    async fn preview_does_not_write() {
        let store = Arc::new(FakeRbacStore::default());
        let registry = registry(&store);

        let result = registry.preview_upsert(&permission("projects.view")).await;

        assert!(matches!(result, Ok(ref value) if value.outcome == UpsertOutcome::Created));
        assert_eq!(store.permission_count().await, 0);
    }

    #[tokio::test]
    async fn find_by_names_separates_missing_and_inactive() {
        let store = Arc::new(FakeRbacStore::default());
        store.seed_permission(permission("projects.view")).await;
        store
            .seed_permission(permission("reports.generate").with_attributes(
                PermissionAttributes {
                    description: None,
                    category: None,
                    active: false,
                },
            ))
            .await;
        let registry = registry(&store);

        let names = vec![
            permission_name("projects.view"),
            permission_name("reports.generate"),
            permission_name("billing.invoice.send"),
        ];
        let Ok(lookup) = registry.find_by_names(&names).await else {
            panic!("lookup should succeed");
        };

        assert_eq!(lookup.active.len(), 1);
        assert_eq!(lookup.inactive, vec![permission_name("reports.generate")]);
        assert_eq!(lookup.missing, vec![permission_name("billing.invoice.send")]);
        assert!(!lookup.is_complete());
    }

    #[tokio::test]
    async fn create_rejects_duplicate_names() {
        let store = Arc::new(FakeRbacStore::default());
        store.seed_permission(permission("projects.view")).await;

        let result = registry(&store).create(permission("projects.view")).await;

        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn delete_is_rejected_while_referenced() {
        let store = Arc::new(FakeRbacStore::default());
        store.seed_permission(permission("projects.view")).await;
        store
            .seed_role(role_with("viewer", false, &["projects.view"]))
            .await;

        let result = registry(&store)
            .delete(&permission_name("projects.view"))
            .await;

        assert!(matches!(
            result,
            Err(AppError::Rejected(RejectionReason::PermissionInUse, _))
        ));
        assert_eq!(store.permission_count().await, 1);
    }

    #[tokio::test]
    async fn delete_removes_unreferenced_permission() {
        let store = Arc::new(FakeRbacStore::default());
        store.seed_permission(permission("projects.view")).await;

        let result = registry(&store)
            .delete(&permission_name("projects.view"))
            .await;

        assert!(result.is_ok());
        assert_eq!(store.permission_count().await, 0);
    }
}
