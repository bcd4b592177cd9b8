//! Schema migrations, applied before the connection manager starts
//!
//! SQL lives in `userbase-server/migrations/` and is embedded at compile time.
//! sqlx records applied versions in `_sqlx_migrations` and holds an advisory
//! lock for the duration of a run, so replicas starting together are safe.

use sqlx::migrate::{Migrate, MigrateError, Migrator};
use sqlx::PgPool;

use super::pool::create_pool_with_options;

pub static MIGRATOR: Migrator = sqlx::migrate!();

#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    #[error("migration database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("migration failed: {0}")]
    Migrate(#[from] MigrateError),
}

/// Result of a migration run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    Applied(usize),
    NoChange,
}

/// Open a single-connection pool on `database_url`, migrate, close it.
pub async fn run_url(database_url: &str) -> Result<MigrationOutcome, MigrationError> {
    let pool = create_pool_with_options(database_url, 1).await?;
    let outcome = run(&pool).await;
    pool.close().await;
    outcome
}

/// Apply every embedded migration the database has not seen yet.
pub async fn run(pool: &PgPool) -> Result<MigrationOutcome, MigrationError> {
    let applied = {
        let mut conn = pool.acquire().await?;
        conn.ensure_migrations_table().await?;
        conn.list_applied_migrations()
            .await?
            .into_iter()
            .map(|m| m.version)
            .collect::<Vec<_>>()
    };

    // Another replica may apply some of these first; the count is informational
    let pending = pending_count(&MIGRATOR, &applied);
    if pending == 0 {
        tracing::info!("schema up to date");
        return Ok(MigrationOutcome::NoChange);
    }

    tracing::info!(pending, "applying migrations");
    MIGRATOR.run(pool).await?;
    tracing::info!(applied = pending, "migrations applied");
    Ok(MigrationOutcome::Applied(pending))
}

fn pending_count(migrator: &Migrator, applied: &[i64]) -> usize {
    migrator
        .iter()
        .filter(|m| !m.migration_type.is_down_migration())
        .filter(|m| !applied.contains(&m.version))
        .count()
}
