use std::path::PathBuf;

use clap::Parser;
use rolegate_application::{RbacPolicy, ReconcileOptions};
use rolegate_core::AppError;
use rolegate_domain::RoleName;
use tracing_subscriber::EnvFilter;

/// Converges stored permissions and roles to a declaration file.
#[derive(Debug, Clone, Parser)]
#[command(name = "rolegate-reconciler", version, about)]
pub struct ReconcilerArgs {
    /// Declaration file, YAML or JSON by extension.
    #[arg(long, env = "RBAC_DECLARATION_PATH")]
    pub declaration: PathBuf,

    /// Report what would change without writing.
    #[arg(long)]
    pub dry_run: bool,

    /// Allow updates to system roles.
    #[arg(long)]
    pub force: bool,

    /// Single-flight lease duration.
    #[arg(long, default_value_t = 300)]
    pub lease_seconds: u32,

    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// Enables the shared permission cache and the distributed lease.
    #[arg(long, env = "REDIS_URL", hide_env_values = true)]
    pub redis_url: Option<String>,

    #[arg(long, env = "RBAC_ADMIN_ROLE", default_value = "admin")]
    pub admin_role: String,

    #[arg(long, env = "RBAC_DEFAULT_ROLE", default_value = "user")]
    pub default_role: String,

    #[arg(long, env = "RBAC_PERMISSION_CACHE_TTL_SECONDS", default_value_t = 30)]
    pub permission_cache_ttl_seconds: u32,
}

impl ReconcilerArgs {
    pub fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            dry_run: self.dry_run,
            force: self.force,
        }
    }

    pub fn policy(&self) -> Result<RbacPolicy, AppError> {
        let admin_role = RoleName::new(self.admin_role.as_str())
            .map_err(|error| AppError::Validation(format!("invalid admin role: {error}")))?;
        let default_role = RoleName::new(self.default_role.as_str())
            .map_err(|error| AppError::Validation(format!("invalid default role: {error}")))?;

        Ok(RbacPolicy::new(admin_role, default_role)
            .with_permission_cache_ttl_seconds(self.permission_cache_ttl_seconds))
    }
}

/// Logs go to stderr so stdout carries only the report.
pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
