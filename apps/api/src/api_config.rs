use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use rolegate_application::RbacPolicy;
use rolegate_core::AppError;
use rolegate_domain::{RoleName, UserId};
use tracing_subscriber::EnvFilter;

const MIN_GATEWAY_SECRET_LENGTH: usize = 32;

/// Administrator account created at start-up when it does not exist yet.
#[derive(Debug, Clone)]
pub struct BootstrapAdmin {
    pub user_id: UserId,
    pub display_name: String,
}

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub database_url: Option<String>,
    pub redis_url: Option<String>,
    pub frontend_url: String,
    pub api_host: String,
    pub api_port: u16,
    pub gateway_shared_secret: String,
    pub declaration_path: Option<String>,
    pub bootstrap_admin: Option<BootstrapAdmin>,
    pub policy: RbacPolicy,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");

        let database_url = optional_env("DATABASE_URL");
        if migrate_only && database_url.is_none() {
            return Err(AppError::Validation(
                "DATABASE_URL is required to run migrations".to_owned(),
            ));
        }

        let gateway_shared_secret = required_env("GATEWAY_SHARED_SECRET")?;
        if gateway_shared_secret.len() < MIN_GATEWAY_SECRET_LENGTH {
            return Err(AppError::Validation(format!(
                "GATEWAY_SHARED_SECRET must be at least {MIN_GATEWAY_SECRET_LENGTH} characters"
            )));
        }

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);

        let bootstrap_admin = optional_env("RBAC_BOOTSTRAP_ADMIN_ID")
            .map(|value| {
                Ok::<_, AppError>(BootstrapAdmin {
                    user_id: UserId::from_str(value.as_str())?,
                    display_name: optional_env("RBAC_BOOTSTRAP_ADMIN_NAME")
                        .unwrap_or_else(|| "Administrator".to_owned()),
                })
            })
            .transpose()?;

        Ok(Self {
            migrate_only,
            database_url,
            redis_url: optional_env("REDIS_URL"),
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_owned()),
            api_host,
            api_port,
            gateway_shared_secret,
            declaration_path: optional_env("RBAC_DECLARATION_PATH"),
            bootstrap_admin,
            policy: load_policy()?,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

fn load_policy() -> Result<RbacPolicy, AppError> {
    let admin_role = RoleName::new(
        env::var("RBAC_ADMIN_ROLE").unwrap_or_else(|_| "admin".to_owned()),
    )
    .map_err(|error| AppError::Validation(format!("invalid RBAC_ADMIN_ROLE: {error}")))?;
    let default_role = RoleName::new(
        env::var("RBAC_DEFAULT_ROLE").unwrap_or_else(|_| "user".to_owned()),
    )
    .map_err(|error| AppError::Validation(format!("invalid RBAC_DEFAULT_ROLE: {error}")))?;

    let ttl_seconds = match optional_env("RBAC_PERMISSION_CACHE_TTL_SECONDS") {
        Some(value) => value.parse::<u32>().map_err(|error| {
            AppError::Validation(format!("invalid RBAC_PERMISSION_CACHE_TTL_SECONDS: {error}"))
        })?,
        None => 30,
    };

    Ok(RbacPolicy::new(admin_role, default_role).with_permission_cache_ttl_seconds(ttl_seconds))
}

pub fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

fn optional_env(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
}
