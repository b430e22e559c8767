use diesel::r2d2::{ConnectionManager, Pool, PooledConnection};
use diesel::PgConnection;
use log::info;

use crate::config::KpiConfig;
use crate::kpi::error::KpiError;

pub type DbPool = Pool<ConnectionManager<PgConnection>>;
pub type DbConnection = PooledConnection<ConnectionManager<PgConnection>>;

pub fn create_pool(config: &KpiConfig) -> Result<DbPool, KpiError> {
    let database_url = config
        .database_url
        .as_deref()
        .ok_or_else(|| KpiError::Config("database_url is not set".to_string()))?;
    let manager = ConnectionManager::<PgConnection>::new(database_url);
    let pool = Pool::builder()
        .max_size(config.max_connections)
        .build(manager)?;
    info!(
        "Database pool ready ({} connections max)",
        config.max_connections
    );
    Ok(pool)
}

pub fn run_migrations(pool: &DbPool) -> Result<(), KpiError> {
    use diesel_migrations::{embed_migrations, EmbeddedMigrations, MigrationHarness};

    const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

    let mut conn = pool.get()?;
    let applied = conn
        .run_pending_migrations(MIGRATIONS)
        .map_err(|e| KpiError::Database(format!("Migration error: {e}")))?;
    info!("Applied {} KPI migrations", applied.len());
    Ok(())
}
