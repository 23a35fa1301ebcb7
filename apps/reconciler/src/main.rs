//! Rolegate reconciliation job.
//!
//! Prints the JSON report on stdout. Exits non-zero when the declaration is
//! rejected, when any role is rejected, or when the run was cancelled.

#![forbid(unsafe_code)]

mod reconciler_config;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use rolegate_application::{
    AdministrationLock, PermissionCache, PermissionRegistry, ReconcileCancellation,
    ReconcileLeaseCoordinator, ReconcileReport, ReconcileService, RoleBindingService,
    RoleRegistry,
};
use rolegate_core::{AppError, AppResult};
use rolegate_infrastructure::{
    InMemoryReconcileLeaseCoordinator, PostgresRbacRepository, RedisPermissionCache,
    RedisReconcileLeaseCoordinator, load_declaration_file,
};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};

use crate::reconciler_config::{ReconcilerArgs, init_tracing};

const EXIT_REJECTED: u8 = 2;
const EXIT_CANCELLED: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = ReconcilerArgs::parse();
    init_tracing();

    let cancellation = ReconcileCancellation::new();
    spawn_cancel_on_signal(cancellation.clone());

    match run(&args, &cancellation).await {
        Ok(report) => exit_code_for(&report),
        Err(error) => {
            error!(%error, "reconciliation failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    args: &ReconcilerArgs,
    cancellation: &ReconcileCancellation,
) -> AppResult<ReconcileReport> {
    let policy = args.policy()?;
    let document = load_declaration_file(&args.declaration).await?;

    let pool = connect_pool(args.database_url.as_str()).await?;
    let redis_client = args
        .redis_url
        .as_deref()
        .map(|url| {
            redis::Client::open(url)
                .map_err(|error| AppError::Validation(format!("invalid REDIS_URL: {error}")))
        })
        .transpose()?;

    let repository = Arc::new(PostgresRbacRepository::new(pool));
    let lock = AdministrationLock::new();
    let permissions = PermissionRegistry::new(repository.clone(), lock.clone());
    let roles = RoleRegistry::new(
        repository.clone(),
        repository.clone(),
        permissions.clone(),
        policy.clone(),
        lock.clone(),
    );
    let mut bindings =
        RoleBindingService::new(repository.clone(), repository, policy.clone(), lock);

    let lease_coordinator: Arc<dyn ReconcileLeaseCoordinator> = match &redis_client {
        Some(client) => {
            let cache: Arc<dyn PermissionCache> = Arc::new(RedisPermissionCache::new(
                client.clone(),
                "rolegate:permissions",
            ));
            bindings = bindings.with_permission_cache(cache);
            Arc::new(RedisReconcileLeaseCoordinator::new(
                client.clone(),
                "rolegate:lease",
            ))
        }
        None => {
            warn!("REDIS_URL not set, lease is process-local and api caches expire by ttl");
            Arc::new(InMemoryReconcileLeaseCoordinator::new())
        }
    };

    let report = ReconcileService::new(permissions, roles, bindings, lease_coordinator)
        .with_lease_settings(holder_id(), args.lease_seconds)
        .reconcile(document, args.options(), cancellation)
        .await?;

    let encoded = serde_json::to_string_pretty(&report)
        .map_err(|error| AppError::Internal(format!("failed to encode report: {error}")))?;
    println!("{encoded}");

    Ok(report)
}

fn exit_code_for(report: &ReconcileReport) -> ExitCode {
    if report.cancelled_before.is_some() {
        ExitCode::from(EXIT_CANCELLED)
    } else if report.has_rejections() {
        ExitCode::from(EXIT_REJECTED)
    } else {
        ExitCode::SUCCESS
    }
}

fn spawn_cancel_on_signal(cancellation: ReconcileCancellation) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("cancellation requested, finishing the current step");
                cancellation.cancel();
            }
            Err(error) => warn!(%error, "failed to listen for cancellation signal"),
        }
    });
}

async fn connect_pool(database_url: &str) -> AppResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    rolegate_infrastructure::MIGRATOR
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    Ok(pool)
}

fn holder_id() -> String {
    format!("rolegate-reconciler:{}", std::process::id())
}
