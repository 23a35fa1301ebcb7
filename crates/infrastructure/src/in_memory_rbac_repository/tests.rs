use rolegate_application::{
    AuthorizationRepository, PermissionRepository, RoleBindingRepository, RoleRepository,
};
use rolegate_core::{AppError, RejectionReason};
use rolegate_domain::{
    Permission, PermissionAttributes, PermissionName, Role, RoleAttributes, RoleBinding, RoleId,
    RoleName, UserAccount, UserId,
};

use super::InMemoryRbacRepository;

fn permission_name(value: &str) -> PermissionName {
    let Ok(name) = PermissionName::new(value) else {
        panic!("permission name '{value}' should be valid");
    };
    name
}

fn role_name(value: &str) -> RoleName {
    let Ok(name) = RoleName::new(value) else {
        panic!("role name '{value}' should be valid");
    };
    name
}

fn permission(name: &str, active: bool) -> Permission {
    let Ok(permission) = Permission::new(
        permission_name(name),
        None,
        PermissionAttributes {
            description: None,
            category: None,
            active,
        },
    ) else {
        panic!("permission '{name}' should be valid");
    };
    permission
}

fn role(name: &str, priority: i32, grants: &[&str]) -> Role {
    let Ok(role) = Role::new(
        RoleId::new(),
        role_name(name),
        false,
        RoleAttributes {
            display_name: name.to_owned(),
            description: None,
            permissions: grants.iter().map(|grant| permission_name(grant)).collect(),
            active: true,
            priority,
        },
    ) else {
        panic!("role '{name}' should be valid");
    };
    role
}

fn user(role: &Role) -> UserAccount {
    let Ok(account) = UserAccount::new(UserId::new(), "Dana", true, RoleBinding::to_role(role))
    else {
        panic!("account should be valid");
    };
    account
}

#[tokio::test]
async fn duplicate_inserts_conflict() {
    let repository = InMemoryRbacRepository::new();
    let viewer = role("viewer", 10, &[]);

    assert!(
        repository
            .insert_permission(permission("projects.view", true))
            .await
            .is_ok()
    );
    assert!(matches!(
        repository
            .insert_permission(permission("projects.view", true))
            .await,
        Err(AppError::Conflict(_))
    ));

    assert!(repository.insert_role(viewer.clone()).await.is_ok());
    assert!(matches!(
        repository.insert_role(viewer).await,
        Err(AppError::Conflict(_))
    ));
}

#[tokio::test]
async fn roles_are_listed_by_priority_then_name() {
    let repository = InMemoryRbacRepository::new();
    for candidate in [role("zeta", 5, &[]), role("alpha", 5, &[]), role("admin", 1, &[])] {
        assert!(repository.insert_role(candidate).await.is_ok());
    }

    let Ok(roles) = repository.list_roles().await else {
        panic!("listing should succeed");
    };
    let names: Vec<&str> = roles.iter().map(|role| role.name().as_str()).collect();

    assert_eq!(names, vec!["admin", "alpha", "zeta"]);
}

#[tokio::test]
async fn bound_roles_and_referenced_permissions_cannot_be_deleted() {
    let repository = InMemoryRbacRepository::new();
    let viewer = role("viewer", 10, &["projects.view"]);
    assert!(
        repository
            .insert_permission(permission("projects.view", true))
            .await
            .is_ok()
    );
    assert!(repository.insert_role(viewer.clone()).await.is_ok());
    assert!(repository.insert_user(user(&viewer)).await.is_ok());

    assert!(matches!(
        repository.delete_role(viewer.name()).await,
        Err(AppError::Rejected(RejectionReason::RoleInUse, _))
    ));
    assert!(matches!(
        repository
            .delete_permission(&permission_name("projects.view"))
            .await,
        Err(AppError::Rejected(RejectionReason::PermissionInUse, _))
    ));
}

#[tokio::test]
async fn subject_grants_skip_inactive_and_dangling_permissions() {
    let repository = InMemoryRbacRepository::new();
    let analyst = role(
        "analyst",
        10,
        &["projects.view", "reports.generate", "billing.invoice.view"],
    );
    assert!(
        repository
            .insert_permission(permission("projects.view", true))
            .await
            .is_ok()
    );
    assert!(
        repository
            .insert_permission(permission("reports.generate", false))
            .await
            .is_ok()
    );
    assert!(repository.insert_role(analyst.clone()).await.is_ok());
    let account = user(&analyst);
    assert!(repository.insert_user(account.clone()).await.is_ok());

    let Ok(Some(grants)) = repository.find_subject_grants(account.user_id()).await else {
        panic!("grants should resolve");
    };

    assert!(grants.user_active);
    assert!(grants.role_active);
    assert_eq!(grants.permissions, vec![permission_name("projects.view")]);
}

#[tokio::test]
async fn stale_role_reference_resolves_to_no_grants() {
    let repository = InMemoryRbacRepository::new();
    let viewer = role("viewer", 10, &["projects.view"]);
    assert!(
        repository
            .insert_permission(permission("projects.view", true))
            .await
            .is_ok()
    );
    assert!(repository.insert_role(viewer.clone()).await.is_ok());

    let Ok(account) = UserAccount::new(
        UserId::new(),
        "Dana",
        true,
        RoleBinding::from_parts(viewer.name().clone(), RoleId::new()),
    ) else {
        panic!("account should be valid");
    };
    assert!(repository.insert_user(account.clone()).await.is_ok());

    let Ok(Some(grants)) = repository.find_subject_grants(account.user_id()).await else {
        panic!("grants should resolve");
    };

    assert!(!grants.role_active);
    assert!(grants.permissions.is_empty());
}

#[tokio::test]
async fn floor_guard_ignores_inactive_members() {
    let repository = InMemoryRbacRepository::new();
    let admin = role("admin", 1, &[]);
    let member = role("user", 100, &[]);
    assert!(repository.insert_role(admin.clone()).await.is_ok());
    assert!(repository.insert_role(member.clone()).await.is_ok());

    let first = user(&admin);
    let second = user(&admin);
    assert!(repository.insert_user(first.clone()).await.is_ok());
    assert!(repository.insert_user(second.clone()).await.is_ok());
    assert!(
        repository
            .set_user_active(first.user_id(), false, Some(admin.name()))
            .await
            .is_ok()
    );

    let demoted = repository
        .save_binding(
            second.user_id(),
            RoleBinding::to_role(&member),
            Some(admin.name()),
        )
        .await;
    let deleted = repository
        .delete_user(second.user_id(), Some(admin.name()))
        .await;

    assert!(matches!(
        demoted,
        Err(AppError::Rejected(RejectionReason::AdminFloorViolation, _))
    ));
    assert!(matches!(
        deleted,
        Err(AppError::Rejected(RejectionReason::AdminFloorViolation, _))
    ));
    assert!(
        repository
            .delete_user(first.user_id(), Some(admin.name()))
            .await
            .is_ok()
    );
    let Ok(counts) = repository.count_users_per_role().await else {
        panic!("counts should load");
    };
    assert_eq!(counts.get(admin.name()).copied(), Some(1));
}

#[tokio::test]
async fn subject_grants_name_the_referenced_role() {
    let repository = InMemoryRbacRepository::new();
    let admin = role("admin", 1, &[]);
    let member = role("user", 100, &[]);
    assert!(repository.insert_role(admin.clone()).await.is_ok());
    assert!(repository.insert_role(member.clone()).await.is_ok());

    let Ok(account) = UserAccount::new(
        UserId::new(),
        "Drift",
        true,
        RoleBinding::from_parts(admin.name().clone(), member.role_id()),
    ) else {
        panic!("account should be valid");
    };
    assert!(repository.insert_user(account.clone()).await.is_ok());

    let Ok(Some(grants)) = repository.find_subject_grants(account.user_id()).await else {
        panic!("grants should resolve");
    };

    assert_eq!(grants.role_name, role_name("user"));
}
