//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod declaration_file;
mod in_memory_permission_cache;
mod in_memory_rbac_repository;
mod in_memory_reconcile_lease_coordinator;
mod postgres_rbac_repository;
mod redis_permission_cache;
mod redis_reconcile_lease_coordinator;

pub use declaration_file::{DeclarationFormat, load_declaration_file, parse_declaration};
pub use in_memory_permission_cache::InMemoryPermissionCache;
pub use in_memory_rbac_repository::InMemoryRbacRepository;
pub use in_memory_reconcile_lease_coordinator::InMemoryReconcileLeaseCoordinator;
pub use postgres_rbac_repository::PostgresRbacRepository;
pub use redis_permission_cache::RedisPermissionCache;
pub use redis_reconcile_lease_coordinator::RedisReconcileLeaseCoordinator;

/// Embedded SQL migrations for the RBAC schema.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");
