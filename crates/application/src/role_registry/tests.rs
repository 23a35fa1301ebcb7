use std::sync::Arc;

use rolegate_core::{AppError, RejectionReason};
use rolegate_domain::RoleSpec;

use super::{RoleRegistry, RoleUpsertOutcome};
use crate::test_support::{
    FakeRbacStore, inactive_permission, permission, policy, role_attributes, role_name, role_with,
    user_bound_to,
};
use crate::{AdministrationLock, PermissionRegistry};

fn registry(store: &Arc<FakeRbacStore>) -> RoleRegistry {
    let lock = AdministrationLock::new();
    RoleRegistry::new(
        store.clone(),
        store.clone(),
        PermissionRegistry::new(store.clone(), lock.clone()),
        policy(),
        lock,
    )
}

fn spec(name: &str, is_system: bool, permissions: &[&str]) -> RoleSpec {
    RoleSpec {
        name: role_name(name),
        is_system,
        attributes: role_attributes(name, permissions),
    }
}

async fn seeded_store(permissions: &[&str]) -> Arc<FakeRbacStore> {
    let store = Arc::new(FakeRbacStore::default());
    for name in permissions {
        store.seed_permission(permission(name)).await;
    }
    store
}

#[tokio::test]
async fn upsert_creates_then_is_unchanged() {
    let store = seeded_store(&["lab.session.view", "lab.session.create"]).await;
    let registry = registry(&store);
    let declared = spec("lab_technician", false, &["lab.session.view", "lab.session.create"]);

    let first = registry.upsert(&declared, false).await;
    let writes_after_first = store.write_count().await;
    let second = registry.upsert(&declared, false).await;

    assert!(matches!(
        first,
        Ok(ref result) if matches!(result.outcome, RoleUpsertOutcome::Created(_))
    ));
    assert!(matches!(
        second,
        Ok(ref result) if matches!(result.outcome, RoleUpsertOutcome::Unchanged(_))
    ));
    assert_eq!(store.write_count().await, writes_after_first);
}

#[tokio::test]
async fn upsert_replaces_permission_set_wholesale() {
    let store = seeded_store(&["projects.view", "projects.create", "projects.update"]).await;
    store
        .seed_role(role_with("manager", false, &["projects.view", "projects.create"]))
        .await;

    let result = registry(&store)
        .upsert(&spec("manager", false, &["projects.update"]), false)
        .await;

    assert!(matches!(
        result,
        Ok(ref value) if matches!(value.outcome, RoleUpsertOutcome::Updated(_))
    ));
    let Some(stored) = store.stored_role("manager").await else {
        panic!("role should be stored");
    };
    assert_eq!(stored.permissions().len(), 1);
    assert_eq!(stored.permissions()[0].as_str(), "projects.update");
}

#[tokio::test]
async fn upsert_rejects_inactive_reference() {
    let store = seeded_store(&["projects.view"]).await;
    store
        .seed_permission(inactive_permission("reports.generate"))
        .await;

    let result = registry(&store)
        .upsert(
            &spec("manager", false, &["projects.view", "reports.generate"]),
            false,
        )
        .await;

    assert!(matches!(
        result,
        Ok(ref value) if matches!(
            value.outcome,
            RoleUpsertOutcome::Rejected {
                reason: RejectionReason::InactivePermissionReference,
                ..
            }
        )
    ));
    assert!(store.stored_role("manager").await.is_none());
}

#[tokio::test]
async fn upsert_rejects_unknown_reference() {
    let store = seeded_store(&[]).await;

    let result = registry(&store)
        .upsert(&spec("manager", false, &["projects.view"]), false)
        .await;

    assert!(matches!(
        result,
        Ok(ref value) if matches!(
            value.outcome,
            RoleUpsertOutcome::Rejected {
                reason: RejectionReason::UnknownPermissionReference,
                ..
            }
        )
    ));
}

#[tokio::test]
async fn system_role_update_requires_force() {
    let store = seeded_store(&["projects.view", "projects.delete"]).await;
    store
        .seed_role(role_with("admin", true, &["projects.view"]))
        .await;
    let registry = registry(&store);
    let declared = spec("admin", true, &["projects.view", "projects.delete"]);

    let without_force = registry.upsert(&declared, false).await;
    let with_force = registry.upsert(&declared, true).await;

    assert!(matches!(
        without_force,
        Ok(ref value) if matches!(
            value.outcome,
            RoleUpsertOutcome::Rejected {
                reason: RejectionReason::SystemRoleProtected,
                ..
            }
        )
    ));
    assert!(matches!(
        with_force,
        Ok(ref value) if matches!(value.outcome, RoleUpsertOutcome::Updated(_))
    ));
}

#[tokio::test]
async fn differing_system_flag_is_ignored_with_warning() {
    let store = seeded_store(&["projects.view"]).await;
    store
        .seed_role(role_with("manager", false, &["projects.view"]))
        .await;

    let Ok(result) = registry(&store)
        .upsert(&spec("manager", true, &["projects.view"]), false)
        .await
    else {
        panic!("upsert should succeed");
    };

    assert!(matches!(result.outcome, RoleUpsertOutcome::Unchanged(_)));
    assert_eq!(result.warnings.len(), 1);
    let Some(stored) = store.stored_role("manager").await else {
        panic!("role should be stored");
    };
    assert!(!stored.is_system());
}

#[tokio::test]
async fn deactivating_admin_role_is_rejected() {
    let store = seeded_store(&["projects.view"]).await;
    store
        .seed_role(role_with("admin", true, &["projects.view"]))
        .await;
    let mut declared = spec("admin", true, &["projects.view"]);
    declared.attributes.active = false;

    let result = registry(&store).upsert(&declared, true).await;

    assert!(matches!(
        result,
        Ok(ref value) if matches!(
            value.outcome,
            RoleUpsertOutcome::Rejected {
                reason: RejectionReason::AdminFloorViolation,
                ..
            }
        )
    ));
}

#[tokio::test]
async fn delete_system_role_is_always_rejected() {
    let store = seeded_store(&[]).await;
    store.seed_role(role_with("admin", true, &[])).await;

    let result = registry(&store).delete_role(&role_name("admin")).await;

    assert!(matches!(
        result,
        Err(AppError::Rejected(RejectionReason::SystemRoleProtected, _))
    ));
    assert!(store.stored_role("admin").await.is_some());
}

#[tokio::test]
async fn delete_role_in_use_is_rejected() {
    let store = seeded_store(&[]).await;
    let role = role_with("assistant", false, &[]);
    store.seed_role(role.clone()).await;
    store.seed_user(user_bound_to(&role, false)).await;

    let result = registry(&store).delete_role(&role_name("assistant")).await;

    assert!(matches!(
        result,
        Err(AppError::Rejected(RejectionReason::RoleInUse, _))
    ));
}

#[tokio::test]
async fn delete_unbound_custom_role_succeeds() {
    let store = seeded_store(&[]).await;
    store.seed_role(role_with("assistant", false, &[])).await;

    let result = registry(&store).delete_role(&role_name("assistant")).await;

    assert!(result.is_ok());
    assert!(store.stored_role("assistant").await.is_none());
}

#[tokio::test]
async fn create_role_forces_custom_flag_and_rejects_duplicates() {
    let store = seeded_store(&["projects.view"]).await;
    let registry = registry(&store);

    let created = registry
        .create_role(spec("auditor", true, &["projects.view"]))
        .await;
    let duplicate = registry
        .create_role(spec("auditor", false, &["projects.view"]))
        .await;

    assert!(matches!(created, Ok(ref role) if !role.is_system()));
    assert!(matches!(duplicate, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn create_role_surfaces_reference_rejection() {
    let store = seeded_store(&[]).await;

    let result = registry(&store)
        .create_role(spec("auditor", false, &["projects.view"]))
        .await;

    assert!(matches!(
        result,
        Err(AppError::Rejected(RejectionReason::UnknownPermissionReference, _))
    ));
}

#[tokio::test]
async fn list_reports_user_counts() {
    let store = seeded_store(&[]).await;
    let admin = role_with("admin", true, &[]);
    let user = role_with("user", true, &[]);
    store.seed_role(admin.clone()).await;
    store.seed_role(user.clone()).await;
    store.seed_user(user_bound_to(&admin, true)).await;
    store.seed_user(user_bound_to(&user, true)).await;
    store.seed_user(user_bound_to(&user, false)).await;

    let Ok(summaries) = registry(&store).list().await else {
        panic!("list should succeed");
    };

    let counts: Vec<(String, u64)> = summaries
        .iter()
        .map(|summary| (summary.role.name().to_string(), summary.user_count))
        .collect();
    assert_eq!(
        counts,
        vec![("admin".to_owned(), 1), ("user".to_owned(), 2)]
    );
}
