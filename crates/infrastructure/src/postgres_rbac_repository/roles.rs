use super::*;

use rolegate_core::RejectionReason;
use sqlx::{Postgres, Transaction};

impl PostgresRbacRepository {
    pub(super) async fn list_roles_impl(&self) -> AppResult<Vec<Role>> {
        let rows = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name, display_name, description, is_system, active, priority
            FROM rbac_roles
            ORDER BY priority, name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list roles: {error}")))?;

        let grants = sqlx::query_as::<_, RoleGrantRow>(
            r#"
            SELECT role_id, permission_name
            FROM rbac_role_permissions
            ORDER BY role_id, position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list role grants: {error}")))?;

        aggregate_roles(rows, grants)
    }

    pub(super) async fn find_role_impl(&self, name: &RoleName) -> AppResult<Option<Role>> {
        let Some(row) = sqlx::query_as::<_, RoleRow>(
            r#"
            SELECT id, name, display_name, description, is_system, active, priority
            FROM rbac_roles
            WHERE name = $1
            "#,
        )
        .bind(name.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find role: {error}")))?
        else {
            return Ok(None);
        };

        let grants = sqlx::query_as::<_, RoleGrantRow>(
            r#"
            SELECT role_id, permission_name
            FROM rbac_role_permissions
            WHERE role_id = $1
            ORDER BY position
            "#,
        )
        .bind(row.id)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to load role grants: {error}")))?;

        Ok(aggregate_roles(vec![row], grants)?.into_iter().next())
    }

    pub(super) async fn insert_role_impl(&self, role: Role) -> AppResult<()> {
        let mut transaction = self.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO rbac_roles (id, name, display_name, description, is_system, active, priority)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(role.role_id().as_uuid())
        .bind(role.name().as_str())
        .bind(role.display_name())
        .bind(role.description())
        .bind(role.is_system())
        .bind(role.is_active())
        .bind(role.priority())
        .execute(&mut *transaction)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                AppError::Conflict(format!("role '{}' already exists", role.name()))
            } else {
                AppError::Internal(format!("failed to insert role: {error}"))
            }
        })?;

        write_grants(&mut transaction, &role).await?;
        commit(transaction).await
    }

    pub(super) async fn replace_role_impl(&self, role: Role) -> AppResult<()> {
        let mut transaction = self.begin().await?;

        let result = sqlx::query(
            r#"
            UPDATE rbac_roles
            SET display_name = $2,
                description = $3,
                active = $4,
                priority = $5,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(role.role_id().as_uuid())
        .bind(role.display_name())
        .bind(role.description())
        .bind(role.is_active())
        .bind(role.priority())
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update role: {error}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "role '{}' does not exist",
                role.name()
            )));
        }

        sqlx::query(
            r#"
            DELETE FROM rbac_role_permissions
            WHERE role_id = $1
            "#,
        )
        .bind(role.role_id().as_uuid())
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to clear role grants: {error}")))?;

        write_grants(&mut transaction, &role).await?;
        commit(transaction).await
    }

    pub(super) async fn delete_role_impl(&self, name: &RoleName) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM rbac_roles
            WHERE name = $1
                AND NOT EXISTS (
                    SELECT 1
                    FROM rbac_users
                    WHERE role_name = $1
                )
            "#,
        )
        .bind(name.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete role: {error}")))?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        let bound_users = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM rbac_users
            WHERE role_name = $1
            "#,
        )
        .bind(name.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to count bound users: {error}")))?;

        if bound_users > 0 {
            return Err(AppError::Rejected(
                RejectionReason::RoleInUse,
                format!("role '{name}' is still bound to {bound_users} user(s)"),
            ));
        }

        Err(AppError::NotFound(format!("role '{name}' does not exist")))
    }
}

async fn write_grants(transaction: &mut Transaction<'_, Postgres>, role: &Role) -> AppResult<()> {
    for (position, permission) in role.permissions().iter().enumerate() {
        sqlx::query(
            r#"
            INSERT INTO rbac_role_permissions (role_id, permission_name, position)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(role.role_id().as_uuid())
        .bind(permission.as_str())
        .bind(i32::try_from(position).unwrap_or(i32::MAX))
        .execute(&mut **transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to persist role grants: {error}")))?;
    }

    Ok(())
}
