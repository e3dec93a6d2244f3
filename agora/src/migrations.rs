use anyhow::Result;
use sqlx::PgPool;
use tracing::{error, info};

/// Apply every pending migration under `migrations/`
pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    info!("Running database migrations...");
    sqlx::migrate!("../migrations")
        .run(pool)
        .await
        .map_err(|e| {
            error!("Failed to run migrations: {}", e);
            anyhow::anyhow!("Migration failed: {e}")
        })?;
    info!("Migrations completed");
    Ok(())
}

/// Versions known to this binary that the database has not applied yet
pub async fn pending_migrations(pool: &PgPool) -> Result<Vec<i64>> {
    let migrator = sqlx::migrate!("../migrations");
    // The bookkeeping table does not exist before the first run
    let applied: Vec<(i64,)> = sqlx::query_as("SELECT version FROM _sqlx_migrations")
        .fetch_all(pool)
        .await
        .unwrap_or_default();
    let applied: std::collections::HashSet<i64> = applied.into_iter().map(|(v,)| v).collect();

    Ok(migrator
        .migrations
        .iter()
        .map(|m| m.version)
        .filter(|version| !applied.contains(version))
        .collect())
}
