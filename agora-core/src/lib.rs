//! Forum permission resolution and caching engine
//!
//! Resolves tri-state permissions from group memberships, per-user overrides
//! and a forum hierarchy, materializes forum resolutions per (forum, user),
//! and answers authorization questions per resource or in bulk.

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod repository;
pub mod service;
pub mod transaction;

#[cfg(test)]
pub mod test_helpers;

pub use config::Config;
pub use error::{Error, Result};
pub use service::{PermissionService, Stores};
pub use transaction::UnitOfWork;
