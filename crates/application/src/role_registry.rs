use std::sync::Arc;

use rolegate_core::{AppError, AppResult, RejectionReason};
use rolegate_domain::{Role, RoleAttributes, RoleId, RoleName, RoleSpec};

use crate::{
    AdministrationLock, PermissionLookup, PermissionRegistry, RbacPolicy, RoleBindingRepository,
    RoleRepository, RoleSummary,
};

#[cfg(test)]
mod tests;

/// Outcome of converging one role to a declared specification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoleUpsertOutcome {
    /// The role did not exist and was created.
    Created(Role),
    /// The role's attributes were replaced.
    Updated(Role),
    /// Stored and declared state already matched.
    Unchanged(Role),
    /// A protection or reference rule refused the change.
    Rejected {
        /// Machine-readable reason.
        reason: RejectionReason,
        /// Operator-facing detail.
        message: String,
    },
}

impl RoleUpsertOutcome {
    /// Returns the role written by this outcome, if any.
    #[must_use]
    pub fn changed_role(&self) -> Option<&Role> {
        match self {
            Self::Created(role) | Self::Updated(role) => Some(role),
            Self::Unchanged(_) | Self::Rejected { .. } => None,
        }
    }
}

/// Result of a role upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleUpsert {
    /// What happened to the stored role.
    pub outcome: RoleUpsertOutcome,
    /// Non-fatal mismatches, such as an ignored system flag.
    pub warnings: Vec<String>,
}

/// Application service over role records.
#[derive(Clone)]
pub struct RoleRegistry {
    repository: Arc<dyn RoleRepository>,
    bindings: Arc<dyn RoleBindingRepository>,
    permissions: PermissionRegistry,
    policy: RbacPolicy,
    lock: AdministrationLock,
}

impl RoleRegistry {
    /// Creates a registry from its collaborators.
    #[must_use]
    pub fn new(
        repository: Arc<dyn RoleRepository>,
        bindings: Arc<dyn RoleBindingRepository>,
        permissions: PermissionRegistry,
        policy: RbacPolicy,
        lock: AdministrationLock,
    ) -> Self {
        Self {
            repository,
            bindings,
            permissions,
            policy,
            lock,
        }
    }

    /// Converges one role to `spec`, resolving its references against live permissions.
    pub async fn upsert(&self, spec: &RoleSpec, force: bool) -> AppResult<RoleUpsert> {
        let _guard = self.lock.acquire().await;
        self.upsert_locked(spec, force).await
    }

    async fn upsert_locked(&self, spec: &RoleSpec, force: bool) -> AppResult<RoleUpsert> {
        let lookup = self
            .permissions
            .find_by_names(&spec.attributes.permissions)
            .await?;
        let existing = self.repository.find_role(&spec.name).await?;
        let planned = plan_role_upsert(existing.as_ref(), spec, force, &lookup, &self.policy)?;

        match &planned.outcome {
            RoleUpsertOutcome::Created(role) => {
                self.repository.insert_role(role.clone()).await?;
                tracing::info!(role = %role.name(), grants = role.permissions().len(), "role created");
            }
            RoleUpsertOutcome::Updated(role) => {
                self.repository.replace_role(role.clone()).await?;
                tracing::info!(role = %role.name(), grants = role.permissions().len(), "role updated");
            }
            RoleUpsertOutcome::Unchanged(_) => {}
            RoleUpsertOutcome::Rejected { reason, message } => {
                tracing::warn!(role = %spec.name, reason = %reason, "{message}");
            }
        }

        for warning in &planned.warnings {
            tracing::warn!(role = %spec.name, "{warning}");
        }

        Ok(planned)
    }

    /// Computes the upsert result against a caller-supplied permission view without writing.
    pub async fn preview_upsert(
        &self,
        spec: &RoleSpec,
        force: bool,
        lookup: &PermissionLookup,
    ) -> AppResult<RoleUpsert> {
        let existing = self.repository.find_role(&spec.name).await?;
        plan_role_upsert(existing.as_ref(), spec, force, lookup, &self.policy)
    }

    /// Lists roles with their bound user counts.
    pub async fn list(&self) -> AppResult<Vec<RoleSummary>> {
        let roles = self.repository.list_roles().await?;
        let counts = self.bindings.count_users_per_role().await?;

        Ok(roles
            .into_iter()
            .map(|role| RoleSummary {
                user_count: counts.get(role.name()).copied().unwrap_or_default(),
                role,
            })
            .collect())
    }

    /// Returns one role with its bound user count.
    pub async fn get(&self, name: &RoleName) -> AppResult<RoleSummary> {
        let role = self.find_existing(name).await?;
        let counts = self.bindings.count_users_per_role().await?;

        Ok(RoleSummary {
            user_count: counts.get(name).copied().unwrap_or_default(),
            role,
        })
    }

    /// Creates a custom role through the administrative path.
    ///
    /// Custom roles are never system roles regardless of the requested flag.
    pub async fn create_role(&self, spec: RoleSpec) -> AppResult<Role> {
        let spec = RoleSpec {
            is_system: false,
            ..spec
        };

        let _guard = self.lock.acquire().await;
        if self.repository.find_role(&spec.name).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "role '{}' already exists",
                spec.name
            )));
        }

        match self.upsert_locked(&spec, false).await?.outcome {
            RoleUpsertOutcome::Created(role) => Ok(role),
            RoleUpsertOutcome::Rejected { reason, message } => {
                Err(AppError::Rejected(reason, message))
            }
            RoleUpsertOutcome::Updated(_) | RoleUpsertOutcome::Unchanged(_) => Err(
                AppError::Conflict(format!("role '{}' already exists", spec.name)),
            ),
        }
    }

    /// Replaces a role's attributes through the administrative path.
    pub async fn update_role(
        &self,
        name: &RoleName,
        attributes: RoleAttributes,
        force: bool,
    ) -> AppResult<Role> {
        let _guard = self.lock.acquire().await;
        let existing = self.find_existing(name).await?;
        let spec = RoleSpec {
            name: name.clone(),
            is_system: existing.is_system(),
            attributes,
        };

        match self.upsert_locked(&spec, force).await?.outcome {
            RoleUpsertOutcome::Created(role)
            | RoleUpsertOutcome::Updated(role)
            | RoleUpsertOutcome::Unchanged(role) => Ok(role),
            RoleUpsertOutcome::Rejected { reason, message } => {
                Err(AppError::Rejected(reason, message))
            }
        }
    }

    /// Deletes a non-system role with no bound users.
    pub async fn delete_role(&self, name: &RoleName) -> AppResult<()> {
        let _guard = self.lock.acquire().await;

        let role = self.find_existing(name).await?;
        if role.is_system() {
            return Err(AppError::Rejected(
                RejectionReason::SystemRoleProtected,
                format!("system role '{name}' cannot be deleted"),
            ));
        }

        let bound_users = self
            .bindings
            .count_users_per_role()
            .await?
            .get(name)
            .copied()
            .unwrap_or_default();
        if bound_users > 0 {
            return Err(AppError::Rejected(
                RejectionReason::RoleInUse,
                format!("role '{name}' is still bound to {bound_users} user(s)"),
            ));
        }

        self.repository.delete_role(name).await?;
        tracing::info!(role = %name, "role deleted");
        Ok(())
    }

    async fn find_existing(&self, name: &RoleName) -> AppResult<Role> {
        self.repository
            .find_role(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("role '{name}' does not exist")))
    }
}

/// Decides the upsert outcome for one role.
///
/// Checks run in order: permission references, no-op detection, system
/// protection, then administrator role deactivation.
fn plan_role_upsert(
    existing: Option<&Role>,
    spec: &RoleSpec,
    force: bool,
    lookup: &PermissionLookup,
    policy: &RbacPolicy,
) -> AppResult<RoleUpsert> {
    let mut warnings = Vec::new();

    if !lookup.missing.is_empty() {
        return Ok(rejected(
            RejectionReason::UnknownPermissionReference,
            format!(
                "role '{}' references unknown permission(s): {}",
                spec.name,
                join_names(&lookup.missing)
            ),
        ));
    }
    if !lookup.inactive.is_empty() {
        return Ok(rejected(
            RejectionReason::InactivePermissionReference,
            format!(
                "role '{}' references inactive permission(s): {}",
                spec.name,
                join_names(&lookup.inactive)
            ),
        ));
    }

    let deactivates_admin = policy.is_admin_role(&spec.name) && !spec.attributes.active;

    let Some(existing) = existing else {
        if deactivates_admin {
            return Ok(admin_floor_rejection(&spec.name));
        }

        let role = Role::new(
            RoleId::new(),
            spec.name.clone(),
            spec.is_system,
            spec.attributes.clone(),
        )?;
        return Ok(RoleUpsert {
            outcome: RoleUpsertOutcome::Created(role),
            warnings,
        });
    };

    if existing.is_system() != spec.is_system {
        warnings.push(format!(
            "role '{}' declares isSystem={} but the stored flag {} is immutable",
            spec.name,
            spec.is_system,
            existing.is_system()
        ));
    }

    if !existing.differs_from(&spec.attributes) {
        return Ok(RoleUpsert {
            outcome: RoleUpsertOutcome::Unchanged(existing.clone()),
            warnings,
        });
    }

    if existing.is_system() && !force {
        return Ok(RoleUpsert {
            warnings,
            ..rejected(
                RejectionReason::SystemRoleProtected,
                format!(
                    "system role '{}' can only be updated with the force flag",
                    spec.name
                ),
            )
        });
    }

    if deactivates_admin {
        return Ok(RoleUpsert {
            warnings,
            ..admin_floor_rejection(&spec.name)
        });
    }

    Ok(RoleUpsert {
        outcome: RoleUpsertOutcome::Updated(existing.with_attributes(spec.attributes.clone())?),
        warnings,
    })
}

fn rejected(reason: RejectionReason, message: String) -> RoleUpsert {
    RoleUpsert {
        outcome: RoleUpsertOutcome::Rejected { reason, message },
        warnings: Vec::new(),
    }
}

fn admin_floor_rejection(name: &RoleName) -> RoleUpsert {
    rejected(
        RejectionReason::AdminFloorViolation,
        format!("administrator role '{name}' cannot be deactivated"),
    )
}

fn join_names<T: std::fmt::Display>(names: &[T]) -> String {
    names
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
