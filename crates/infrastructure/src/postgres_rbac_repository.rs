use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool, Postgres, Transaction};

use rolegate_application::{
    AuthorizationRepository, PermissionRepository, RoleBindingRepository, RoleRepository,
    SubjectGrants,
};
use rolegate_core::{AppError, AppResult};
use rolegate_domain::{
    Permission, PermissionAttributes, PermissionName, Role, RoleAttributes, RoleBinding, RoleId,
    RoleName, UserAccount, UserId,
};

mod bindings;
mod permissions;
mod roles;


/// PostgreSQL-backed RBAC store implementing every repository port.
#[derive(Clone)]
pub struct PostgresRbacRepository {
    pool: PgPool,
}

impl PostgresRbacRepository {
    /// Creates a repository with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn begin(&self) -> AppResult<Transaction<'static, Postgres>> {
        self.pool
            .begin()
            .await
            .map_err(|error| AppError::Internal(format!("failed to begin transaction: {error}")))
    }
}

async fn commit(transaction: Transaction<'_, Postgres>) -> AppResult<()> {
    transaction
        .commit()
        .await
        .map_err(|error| AppError::Internal(format!("failed to commit transaction: {error}")))
}

#[derive(Debug, FromRow)]
struct PermissionRow {
    name: String,
    resource: String,
    description: Option<String>,
    category: Option<String>,
    active: bool,
}

impl PermissionRow {
    fn into_permission(self) -> AppResult<Permission> {
        Permission::new(
            PermissionName::new(self.name)?,
            Some(self.resource),
            PermissionAttributes {
                description: self.description,
                category: self.category,
                active: self.active,
            },
        )
    }
}

#[derive(Debug, FromRow)]
struct RoleRow {
    id: uuid::Uuid,
    name: String,
    display_name: String,
    description: Option<String>,
    is_system: bool,
    active: bool,
    priority: i32,
}

#[derive(Debug, FromRow)]
struct RoleGrantRow {
    role_id: uuid::Uuid,
    permission_name: String,
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: uuid::Uuid,
    display_name: String,
    active: bool,
    role_name: String,
    role_id: uuid::Uuid,
}

impl UserRow {
    fn into_account(self) -> AppResult<UserAccount> {
        UserAccount::new(
            UserId::from_uuid(self.id),
            self.display_name,
            self.active,
            RoleBinding::from_parts(RoleName::new(self.role_name)?, RoleId::from_uuid(self.role_id)),
        )
    }
}

fn aggregate_roles(rows: Vec<RoleRow>, grants: Vec<RoleGrantRow>) -> AppResult<Vec<Role>> {
    let mut grants_by_role: HashMap<uuid::Uuid, Vec<PermissionName>> = HashMap::new();
    for grant in grants {
        grants_by_role
            .entry(grant.role_id)
            .or_default()
            .push(PermissionName::new(grant.permission_name)?);
    }

    rows.into_iter()
        .map(|row| {
            Role::new(
                RoleId::from_uuid(row.id),
                RoleName::new(row.name)?,
                row.is_system,
                RoleAttributes {
                    display_name: row.display_name,
                    description: row.description,
                    permissions: grants_by_role.remove(&row.id).unwrap_or_default(),
                    active: row.active,
                    priority: row.priority,
                },
            )
        })
        .collect()
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(
        error,
        sqlx::Error::Database(database_error) if database_error.code().as_deref() == Some("23505")
    )
}

#[async_trait]
impl PermissionRepository for PostgresRbacRepository {
    async fn list_permissions(&self) -> AppResult<Vec<Permission>> {
        self.list_permissions_impl().await
    }

    async fn find_permission(&self, name: &PermissionName) -> AppResult<Option<Permission>> {
        self.find_permission_impl(name).await
    }

    async fn find_permissions_by_names(
        &self,
        names: &[PermissionName],
    ) -> AppResult<Vec<Permission>> {
        self.find_permissions_by_names_impl(names).await
    }

    async fn insert_permission(&self, permission: Permission) -> AppResult<()> {
        self.insert_permission_impl(permission).await
    }

    async fn update_permission(&self, permission: Permission) -> AppResult<()> {
        self.update_permission_impl(permission).await
    }

    async fn delete_permission(&self, name: &PermissionName) -> AppResult<()> {
        self.delete_permission_impl(name).await
    }

    async fn count_roles_referencing(&self, name: &PermissionName) -> AppResult<u64> {
        self.count_roles_referencing_impl(name).await
    }
}

#[async_trait]
impl RoleRepository for PostgresRbacRepository {
    async fn list_roles(&self) -> AppResult<Vec<Role>> {
        self.list_roles_impl().await
    }

    async fn find_role(&self, name: &RoleName) -> AppResult<Option<Role>> {
        self.find_role_impl(name).await
    }

    async fn insert_role(&self, role: Role) -> AppResult<()> {
        self.insert_role_impl(role).await
    }

    async fn replace_role(&self, role: Role) -> AppResult<()> {
        self.replace_role_impl(role).await
    }

    async fn delete_role(&self, name: &RoleName) -> AppResult<()> {
        self.delete_role_impl(name).await
    }
}

#[async_trait]
impl RoleBindingRepository for PostgresRbacRepository {
    async fn find_user(&self, user_id: UserId) -> AppResult<Option<UserAccount>> {
        self.find_user_impl(user_id).await
    }

    async fn list_users(&self) -> AppResult<Vec<UserAccount>> {
        self.list_users_impl().await
    }

    async fn list_users_bound_to(&self, role_names: &[RoleName]) -> AppResult<Vec<UserAccount>> {
        self.list_users_bound_to_impl(role_names).await
    }

    async fn insert_user(&self, account: UserAccount) -> AppResult<()> {
        self.insert_user_impl(account).await
    }

    async fn save_binding(
        &self,
        user_id: UserId,
        binding: RoleBinding,
        floor: Option<&RoleName>,
    ) -> AppResult<()> {
        self.save_binding_impl(user_id, binding, floor).await
    }

    async fn set_user_active(
        &self,
        user_id: UserId,
        active: bool,
        floor: Option<&RoleName>,
    ) -> AppResult<()> {
        self.set_user_active_impl(user_id, active, floor).await
    }

    async fn delete_user(&self, user_id: UserId, floor: Option<&RoleName>) -> AppResult<()> {
        self.delete_user_impl(user_id, floor).await
    }

    async fn count_users_per_role(&self) -> AppResult<HashMap<RoleName, u64>> {
        self.count_users_per_role_impl().await
    }
}

#[async_trait]
impl AuthorizationRepository for PostgresRbacRepository {
    async fn find_subject_grants(&self, user_id: UserId) -> AppResult<Option<SubjectGrants>> {
        let Some(user) = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, display_name, active, role_name, role_id
            FROM rbac_users
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load user binding: {error}")))?
        else {
            return Ok(None);
        };

        let role = sqlx::query_as::<_, (String, bool)>(
            r#"
            SELECT name, active
            FROM rbac_roles
            WHERE id = $1
            "#,
        )
        .bind(user.role_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load bound role: {error}")))?;
        let (role_name, role_active) = role.unwrap_or((user.role_name, false));

        let permission_names = sqlx::query_scalar::<_, String>(
            r#"
            SELECT grants.permission_name
            FROM rbac_role_permissions AS grants
            INNER JOIN rbac_permissions AS permissions
                ON permissions.name = grants.permission_name
            WHERE grants.role_id = $1
                AND permissions.active = TRUE
            ORDER BY grants.position
            "#,
        )
        .bind(user.role_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load role grants: {error}")))?;

        Ok(Some(SubjectGrants {
            user_active: user.active,
            role_name: RoleName::new(role_name)?,
            role_active,
            permissions: permission_names
                .into_iter()
                .map(PermissionName::new)
                .collect::<AppResult<Vec<_>>>()?,
        }))
    }
}
