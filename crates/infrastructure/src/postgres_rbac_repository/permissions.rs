use super::*;

use rolegate_core::RejectionReason;

impl PostgresRbacRepository {
    pub(super) async fn list_permissions_impl(&self) -> AppResult<Vec<Permission>> {
        sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT name, resource, description, category, active
            FROM rbac_permissions
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list permissions: {error}")))?
        .into_iter()
        .map(PermissionRow::into_permission)
        .collect()
    }

    pub(super) async fn find_permission_impl(
        &self,
        name: &PermissionName,
    ) -> AppResult<Option<Permission>> {
        sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT name, resource, description, category, active
            FROM rbac_permissions
            WHERE name = $1
            "#,
        )
        .bind(name.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find permission: {error}")))?
        .map(PermissionRow::into_permission)
        .transpose()
    }

    pub(super) async fn find_permissions_by_names_impl(
        &self,
        names: &[PermissionName],
    ) -> AppResult<Vec<Permission>> {
        if names.is_empty() {
            return Ok(Vec::new());
        }

        let names: Vec<String> = names.iter().map(|name| name.as_str().to_owned()).collect();
        sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT name, resource, description, category, active
            FROM rbac_permissions
            WHERE name = ANY($1)
            "#,
        )
        .bind(names)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to resolve permissions: {error}")))?
        .into_iter()
        .map(PermissionRow::into_permission)
        .collect()
    }

    pub(super) async fn insert_permission_impl(&self, permission: Permission) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO rbac_permissions (name, resource, action, description, category, active)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(permission.name().as_str())
        .bind(permission.resource())
        .bind(permission.action().as_str())
        .bind(permission.description())
        .bind(permission.category())
        .bind(permission.is_active())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                AppError::Conflict(format!("permission '{}' already exists", permission.name()))
            } else {
                AppError::Internal(format!("failed to insert permission: {error}"))
            }
        })?;

        Ok(())
    }

    pub(super) async fn update_permission_impl(&self, permission: Permission) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE rbac_permissions
            SET description = $2,
                category = $3,
                active = $4,
                updated_at = now()
            WHERE name = $1
            "#,
        )
        .bind(permission.name().as_str())
        .bind(permission.description())
        .bind(permission.category())
        .bind(permission.is_active())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update permission: {error}")))?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "permission '{}' does not exist",
                permission.name()
            )));
        }

        Ok(())
    }

    pub(super) async fn delete_permission_impl(&self, name: &PermissionName) -> AppResult<()> {
        let result = sqlx::query(
            r#"
            DELETE FROM rbac_permissions
            WHERE name = $1
                AND NOT EXISTS (
                    SELECT 1
                    FROM rbac_role_permissions
                    WHERE permission_name = $1
                )
            "#,
        )
        .bind(name.as_str())
        .execute(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete permission: {error}")))?;

        if result.rows_affected() > 0 {
            return Ok(());
        }

        if self.count_roles_referencing_impl(name).await? > 0 {
            return Err(AppError::Rejected(
                RejectionReason::PermissionInUse,
                format!("permission '{name}' is still granted by a role"),
            ));
        }

        Err(AppError::NotFound(format!(
            "permission '{name}' does not exist"
        )))
    }

    pub(super) async fn count_roles_referencing_impl(
        &self,
        name: &PermissionName,
    ) -> AppResult<u64> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(DISTINCT role_id)
            FROM rbac_role_permissions
            WHERE permission_name = $1
            "#,
        )
        .bind(name.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(|error| {
            AppError::Internal(format!("failed to count permission references: {error}"))
        })?;

        Ok(u64::try_from(count).unwrap_or_default())
    }
}
