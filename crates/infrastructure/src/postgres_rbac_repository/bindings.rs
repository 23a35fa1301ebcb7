use super::*;

use rolegate_application::admin_floor_violation;

impl PostgresRbacRepository {
    pub(super) async fn find_user_impl(&self, user_id: UserId) -> AppResult<Option<UserAccount>> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, display_name, active, role_name, role_id
            FROM rbac_users
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to find user: {error}")))?
        .map(UserRow::into_account)
        .transpose()
    }

    pub(super) async fn list_users_impl(&self) -> AppResult<Vec<UserAccount>> {
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, display_name, active, role_name, role_id
            FROM rbac_users
            ORDER BY display_name, id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list users: {error}")))?
        .into_iter()
        .map(UserRow::into_account)
        .collect()
    }

    pub(super) async fn list_users_bound_to_impl(
        &self,
        role_names: &[RoleName],
    ) -> AppResult<Vec<UserAccount>> {
        if role_names.is_empty() {
            return Ok(Vec::new());
        }

        let role_names: Vec<String> = role_names
            .iter()
            .map(|name| name.as_str().to_owned())
            .collect();
        sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, display_name, active, role_name, role_id
            FROM rbac_users
            WHERE role_name = ANY($1)
            ORDER BY id
            "#,
        )
        .bind(role_names)
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to list bound users: {error}")))?
        .into_iter()
        .map(UserRow::into_account)
        .collect()
    }

    pub(super) async fn insert_user_impl(&self, account: UserAccount) -> AppResult<()> {
        sqlx::query(
            r#"
            INSERT INTO rbac_users (id, display_name, active, role_name, role_id)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(account.user_id().as_uuid())
        .bind(account.display_name())
        .bind(account.is_active())
        .bind(account.binding().role_name().as_str())
        .bind(account.binding().role_ref().as_uuid())
        .execute(&self.pool)
        .await
        .map_err(|error| {
            if is_unique_violation(&error) {
                AppError::Conflict(format!("user '{}' already exists", account.user_id()))
            } else {
                AppError::Internal(format!("failed to insert user: {error}"))
            }
        })?;

        Ok(())
    }

    pub(super) async fn save_binding_impl(
        &self,
        user_id: UserId,
        binding: RoleBinding,
        floor: Option<&RoleName>,
    ) -> AppResult<()> {
        let mut transaction = self.begin().await?;
        ensure_floor_survives(&mut transaction, user_id, floor).await?;

        let result = sqlx::query(
            r#"
            UPDATE rbac_users
            SET role_name = $2,
                role_id = $3,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(binding.role_name().as_str())
        .bind(binding.role_ref().as_uuid())
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to save role binding: {error}")))?;

        ensure_user_touched(result.rows_affected(), user_id)?;
        commit(transaction).await
    }

    pub(super) async fn set_user_active_impl(
        &self,
        user_id: UserId,
        active: bool,
        floor: Option<&RoleName>,
    ) -> AppResult<()> {
        let mut transaction = self.begin().await?;
        ensure_floor_survives(&mut transaction, user_id, floor).await?;

        let result = sqlx::query(
            r#"
            UPDATE rbac_users
            SET active = $2,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(active)
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to update user: {error}")))?;

        ensure_user_touched(result.rows_affected(), user_id)?;
        commit(transaction).await
    }

    pub(super) async fn delete_user_impl(
        &self,
        user_id: UserId,
        floor: Option<&RoleName>,
    ) -> AppResult<()> {
        let mut transaction = self.begin().await?;
        ensure_floor_survives(&mut transaction, user_id, floor).await?;

        let result = sqlx::query(
            r#"
            DELETE FROM rbac_users
            WHERE id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .execute(&mut *transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to delete user: {error}")))?;

        ensure_user_touched(result.rows_affected(), user_id)?;
        commit(transaction).await
    }

    pub(super) async fn count_users_per_role_impl(&self) -> AppResult<HashMap<RoleName, u64>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            r#"
            SELECT role_name, COUNT(*)
            FROM rbac_users
            GROUP BY role_name
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to count users per role: {error}")))?;

        rows.into_iter()
            .map(|(role_name, count)| {
                Ok((
                    RoleName::new(role_name)?,
                    u64::try_from(count).unwrap_or_default(),
                ))
            })
            .collect()
    }
}

/// Serializes floor-guarded writes from every process sharing the database.
const ADMIN_FLOOR_LOCK_KEY: i64 = 0x726f_6c65_6761_7465;

/// Refuses when `user_id` is the last active member of the floor role.
///
/// The advisory lock is held until the transaction ends, so the count and
/// the following write cannot interleave with another guarded write.
async fn ensure_floor_survives(
    transaction: &mut Transaction<'_, Postgres>,
    user_id: UserId,
    floor: Option<&RoleName>,
) -> AppResult<()> {
    let Some(role_name) = floor else {
        return Ok(());
    };

    sqlx::query("SELECT pg_advisory_xact_lock($1)")
        .bind(ADMIN_FLOOR_LOCK_KEY)
        .execute(&mut **transaction)
        .await
        .map_err(|error| AppError::Internal(format!("failed to take admin floor lock: {error}")))?;

    let (is_member, active_members) = sqlx::query_as::<_, (bool, i64)>(
        r#"
        SELECT
            EXISTS (
                SELECT 1
                FROM rbac_users
                WHERE id = $1
                    AND role_name = $2
                    AND active = TRUE
            ),
            (
                SELECT COUNT(*)
                FROM rbac_users
                WHERE role_name = $2
                    AND active = TRUE
            )
        "#,
    )
    .bind(user_id.as_uuid())
    .bind(role_name.as_str())
    .fetch_one(&mut **transaction)
    .await
    .map_err(|error| AppError::Internal(format!("failed to count active members: {error}")))?;

    if is_member && active_members <= 1 {
        return Err(admin_floor_violation(user_id, role_name));
    }

    Ok(())
}

fn ensure_user_touched(rows_affected: u64, user_id: UserId) -> AppResult<()> {
    if rows_affected == 0 {
        return Err(AppError::NotFound(format!("user '{user_id}' does not exist")));
    }

    Ok(())
}
