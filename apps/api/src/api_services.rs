use std::sync::Arc;

use rolegate_application::{
    AdministrationLock, AuthorizationRepository, AuthorizationService, PermissionCache,
    PermissionRegistry, PermissionRepository, RbacPolicy, ReconcileCancellation,
    ReconcileLeaseCoordinator, ReconcileOptions, ReconcileService, RoleBindingRepository,
    RoleBindingService, RoleRegistry, RoleRepository,
};
use rolegate_core::{AppError, AppResult};
use rolegate_domain::UserId;
use rolegate_infrastructure::{
    InMemoryPermissionCache, InMemoryRbacRepository, InMemoryReconcileLeaseCoordinator,
    PostgresRbacRepository, RedisPermissionCache, RedisReconcileLeaseCoordinator,
    load_declaration_file,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::api_config::{ApiConfig, BootstrapAdmin};
use crate::state::AppState;

const SEED_LEASE_SECONDS: u32 = 60;

/// Services sharing one store, one administration lock and one cache.
#[derive(Clone)]
pub struct RbacServices {
    pub permission_registry: PermissionRegistry,
    pub role_registry: RoleRegistry,
    pub role_binding_service: RoleBindingService,
    pub authorization_service: AuthorizationService,
}

impl RbacServices {
    pub fn build<R>(
        repository: Arc<R>,
        policy: &RbacPolicy,
        permission_cache: Option<Arc<dyn PermissionCache>>,
    ) -> Self
    where
        R: PermissionRepository
            + RoleRepository
            + RoleBindingRepository
            + AuthorizationRepository
            + 'static,
    {
        let lock = AdministrationLock::new();
        let permission_registry = PermissionRegistry::new(repository.clone(), lock.clone());
        let role_registry = RoleRegistry::new(
            repository.clone(),
            repository.clone(),
            permission_registry.clone(),
            policy.clone(),
            lock.clone(),
        );

        let mut role_binding_service =
            RoleBindingService::new(repository.clone(), repository.clone(), policy.clone(), lock);
        let mut authorization_service = AuthorizationService::new(repository, policy);
        if let Some(cache) = permission_cache {
            role_binding_service = role_binding_service.with_permission_cache(cache.clone());
            authorization_service = authorization_service
                .with_permission_cache(cache, policy.permission_cache_ttl_seconds);
        }

        Self {
            permission_registry,
            role_registry,
            role_binding_service,
            authorization_service,
        }
    }

    pub fn into_state(self, gateway_shared_secret: String) -> AppState {
        AppState {
            permission_registry: self.permission_registry,
            role_registry: self.role_registry,
            role_binding_service: self.role_binding_service,
            authorization_service: self.authorization_service,
            gateway_shared_secret,
        }
    }
}

pub async fn connect_database(database_url: &str) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    rolegate_infrastructure::MIGRATOR
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    Ok(pool)
}

pub fn redis_client(config: &ApiConfig) -> AppResult<Option<redis::Client>> {
    config
        .redis_url
        .as_deref()
        .map(|url| {
            redis::Client::open(url)
                .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))
        })
        .transpose()
}

pub fn build_services(
    config: &ApiConfig,
    pool: Option<PgPool>,
    redis_client: Option<&redis::Client>,
) -> RbacServices {
    let permission_cache: Option<Arc<dyn PermissionCache>> =
        if config.policy.permission_cache_ttl_seconds == 0 {
            None
        } else if let Some(client) = redis_client {
            Some(Arc::new(RedisPermissionCache::new(
                client.clone(),
                "rolegate:permissions",
            )))
        } else {
            Some(Arc::new(InMemoryPermissionCache::new()))
        };

    match pool {
        Some(pool) => {
            info!("using postgres rbac store");
            RbacServices::build(
                Arc::new(PostgresRbacRepository::new(pool)),
                &config.policy,
                permission_cache,
            )
        }
        None => {
            info!("DATABASE_URL not set, using in-memory rbac store");
            RbacServices::build(
                Arc::new(InMemoryRbacRepository::new()),
                &config.policy,
                permission_cache,
            )
        }
    }
}

/// Applies the configured declaration before serving requests.
pub async fn seed_declaration(
    services: &RbacServices,
    path: &str,
    redis_client: Option<&redis::Client>,
) -> AppResult<()> {
    let lease_coordinator: Arc<dyn ReconcileLeaseCoordinator> = match redis_client {
        Some(client) => Arc::new(RedisReconcileLeaseCoordinator::new(
            client.clone(),
            "rolegate:lease",
        )),
        None => Arc::new(InMemoryReconcileLeaseCoordinator::new()),
    };

    let document = load_declaration_file(path).await?;
    let report = ReconcileService::new(
        services.permission_registry.clone(),
        services.role_registry.clone(),
        services.role_binding_service.clone(),
        lease_coordinator,
    )
    .with_lease_settings("rolegate-api", SEED_LEASE_SECONDS)
    .reconcile(
        document,
        ReconcileOptions::default(),
        &ReconcileCancellation::new(),
    )
    .await?;

    for rejection in &report.rejected_roles {
        tracing::warn!(
            role = %rejection.role,
            reason = %rejection.reason,
            "{}",
            rejection.message
        );
    }

    info!(
        path,
        permissions_created = report.permissions.created,
        roles_created = report.roles.created,
        roles_updated = report.roles.updated,
        roles_rejected = report.rejected_roles.len(),
        "rbac declaration applied"
    );
    Ok(())
}

/// Binds the configured administrator when the account does not exist yet.
pub async fn ensure_bootstrap_admin(
    services: &RbacServices,
    admin: &BootstrapAdmin,
    policy: &RbacPolicy,
) -> AppResult<()> {
    if let Err(error) = services.role_binding_service.get_user(admin.user_id).await {
        if !matches!(error, AppError::NotFound(_)) {
            return Err(error);
        }

        bind_admin(services, admin.user_id, admin.display_name.as_str(), policy).await?;
        info!(user_id = %admin.user_id, "bootstrap administrator created");
    }

    Ok(())
}

async fn bind_admin(
    services: &RbacServices,
    user_id: UserId,
    display_name: &str,
    policy: &RbacPolicy,
) -> AppResult<()> {
    services
        .role_binding_service
        .bind_new_user(user_id, display_name)
        .await?;
    services
        .role_binding_service
        .assign_role(user_id, &policy.admin_role)
        .await?;
    Ok(())
}
