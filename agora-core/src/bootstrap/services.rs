//! Service initialization and dependency injection

use std::sync::Arc;

use sqlx::PgPool;
use tracing::info;

use crate::{
    repository::{ForumRepository, GroupRepository, ParsedPermissionRepository, UserRepository},
    service::{AuthorizedQuery, PermissionService, Stores},
    Config,
};

/// Container for all initialized services
#[derive(Clone, Debug)]
pub struct Services {
    pub permissions: PermissionService,
    /// SQL-side bulk authorization
    pub authorized_query: AuthorizedQuery,
}

/// Every store backed by PostgreSQL
pub fn postgres_stores(pool: &PgPool) -> Stores {
    Stores {
        groups: Arc::new(GroupRepository::new(pool.clone())),
        users: Arc::new(UserRepository::new(pool.clone())),
        forums: Arc::new(ForumRepository::new(pool.clone())),
        parsed: Arc::new(ParsedPermissionRepository::new(pool.clone())),
    }
}

pub fn init_services(pool: PgPool, config: &Config) -> Services {
    let permissions = PermissionService::new(postgres_stores(&pool), config.permissions.clone());
    let authorized_query = AuthorizedQuery::new(pool, permissions.clone());

    info!("Permission services initialized");
    Services {
        permissions,
        authorized_query,
    }
}
