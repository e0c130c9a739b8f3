use rocket_db_pools::{deadpool_redis, sqlx, Database};
use rocket_db_pools::sqlx::{migrate::Migrator, PgPool};

#[derive(Database)]
#[database("linkdock_db")]
pub struct LinkdockDb(sqlx::PgPool);

#[derive(Database)]
#[database("linkdock_kv")]
pub struct LinkdockKv(deadpool_redis::Pool);

pub static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run database migrations.
///
/// Idempotent: migrations that have already been applied are skipped.
pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
    log::info!("checking database migration state");
    MIGRATOR.run(pool).await?;
    log::info!("database migrations up to date");
    Ok(())
}
