use std::sync::Arc;

use rolegate_core::{AppError, AppResult};
use rolegate_domain::{
    AllowBasis, Decision, PermissionRequirement, ResolvedPermissions, RoleName, UserId, authorize,
    authorize_with_ownership,
};

use crate::{AuthorizationRepository, PermissionCache, RbacPolicy, SubjectGrants};


/// Application service resolving an actor's permissions and evaluating requirements.
#[derive(Clone)]
pub struct AuthorizationService {
    repository: Arc<dyn AuthorizationRepository>,
    admin_role: RoleName,
    permission_cache: Option<Arc<dyn PermissionCache>>,
    permission_cache_ttl_seconds: u32,
}

impl AuthorizationService {
    /// Creates a new authorization service from a repository implementation.
    #[must_use]
    pub fn new(repository: Arc<dyn AuthorizationRepository>, policy: &RbacPolicy) -> Self {
        Self {
            repository,
            admin_role: policy.admin_role.clone(),
            permission_cache: None,
            permission_cache_ttl_seconds: 0,
        }
    }

    /// Configures optional resolution caching.
    #[must_use]
    pub fn with_permission_cache(
        mut self,
        permission_cache: Arc<dyn PermissionCache>,
        ttl_seconds: u32,
    ) -> Self {
        self.permission_cache = Some(permission_cache);
        self.permission_cache_ttl_seconds = ttl_seconds;
        self
    }

    /// Loads the permission set the actor currently holds.
    ///
    /// Unknown and deactivated accounts are unauthenticated. An inactive role
    /// grants nothing.
    pub async fn resolve_permissions(&self, user_id: UserId) -> AppResult<ResolvedPermissions> {
        let grants = self.load_grants(user_id).await?;

        if !grants.user_active {
            return Err(AppError::Unauthorized(format!(
                "user '{user_id}' is deactivated"
            )));
        }

        let is_admin = grants.role_active && grants.role_name == self.admin_role;
        let permissions = if grants.role_active {
            grants.permissions
        } else {
            Vec::new()
        };

        Ok(ResolvedPermissions::new(
            user_id,
            grants.role_name,
            permissions,
            is_admin,
        ))
    }

    /// Evaluates a requirement for the actor.
    pub async fn check(
        &self,
        user_id: UserId,
        requirement: &PermissionRequirement,
    ) -> AppResult<Decision> {
        let actor = self.resolve_permissions(user_id).await?;
        Ok(authorize(&actor, requirement))
    }

    /// Ensures the actor satisfies a requirement.
    pub async fn require(
        &self,
        user_id: UserId,
        requirement: &PermissionRequirement,
    ) -> AppResult<AllowBasis> {
        let decision = self.check(user_id, requirement).await?;
        log_denial(user_id, &decision);
        decision.into_result()
    }

    /// Ensures the actor satisfies a requirement and owns the resource.
    pub async fn require_owned<F>(
        &self,
        user_id: UserId,
        requirement: &PermissionRequirement,
        is_owner: F,
    ) -> AppResult<AllowBasis>
    where
        F: FnOnce(&UserId) -> bool + Send,
    {
        let actor = self.resolve_permissions(user_id).await?;
        let decision = authorize_with_ownership(&actor, requirement, is_owner);
        log_denial(user_id, &decision);
        decision.into_result()
    }

    /// Drops cached permission sets for the given users.
    pub async fn invalidate_users(&self, user_ids: &[UserId]) -> AppResult<()> {
        match &self.permission_cache {
            Some(cache) => cache.invalidate(user_ids).await,
            None => Ok(()),
        }
    }

    async fn load_grants(&self, user_id: UserId) -> AppResult<SubjectGrants> {
        if self.permission_cache_ttl_seconds > 0
            && let Some(cache) = &self.permission_cache
        {
            match cache.get_grants(user_id).await {
                Ok(Some(grants)) => return Ok(grants),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(user_id = %user_id, %error, "permission cache read failed");
                }
            }
        }

        let grants = self
            .repository
            .find_subject_grants(user_id)
            .await?
            .ok_or_else(|| AppError::Unauthorized(format!("user '{user_id}' is not known")))?;

        if self.permission_cache_ttl_seconds > 0
            && let Some(cache) = &self.permission_cache
            && let Err(error) = cache
                .set_grants(user_id, &grants, self.permission_cache_ttl_seconds)
                .await
        {
            tracing::warn!(user_id = %user_id, %error, "permission cache write failed");
        }

        Ok(grants)
    }
}

fn log_denial(user_id: UserId, decision: &Decision) {
    if let Decision::Deny(reason) = decision {
        tracing::debug!(user_id = %user_id, reason = %reason.code(), "authorization denied");
    }
}
