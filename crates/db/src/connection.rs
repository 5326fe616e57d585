use std::time::Duration;

use huddle_core::config::DatabaseConfig;
use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

pub async fn connect_with_config(config: &DatabaseConfig) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(&config.url, config.max_connections, config.timeout_secs).await
}

/// `:memory:` is accepted as shorthand for an in-memory SQLite database.
///
/// In-memory databases live inside a single connection, so those pools are
/// pinned to one connection that is never recycled.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let url = if database_url.trim() == ":memory:" { "sqlite::memory:" } else { database_url };
    let in_memory = url.contains(":memory:");

    let mut options = SqlitePoolOptions::new();
    if in_memory {
        options = options.max_connections(1).idle_timeout(None).max_lifetime(None);
    } else {
        options = options.max_connections(max_connections.max(1));
    }

    options
        .acquire_timeout(Duration::from_secs(timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 5000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(url)
        .await
}
