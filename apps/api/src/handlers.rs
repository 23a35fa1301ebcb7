pub mod authorization;
pub mod health;
pub mod permissions;
pub mod roles;
pub mod users;
