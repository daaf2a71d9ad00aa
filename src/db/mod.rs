pub mod models;

use std::{str::FromStr, time::Duration};

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    // Samplers and the uploader write concurrently; WAL plus a busy timeout
    // lets SQLite queue writers instead of failing with SQLITE_BUSY.
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await?;
    Ok(pool)
}

pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Fresh file-backed database under the system temp dir, migrated.
#[cfg(test)]
pub(crate) async fn test_pool() -> SqlitePool {
    let path = std::env::temp_dir().join(format!("sensor_collector_{}.db", uuid::Uuid::new_v4()));
    let pool = create_pool(&format!("sqlite://{}", path.display()))
        .await
        .unwrap();
    run_migrations(&pool).await.unwrap();
    pool
}
