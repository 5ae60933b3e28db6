use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};

pub type DbPool = sqlx::SqlitePool;
pub type DbTransaction = Transaction<'static, Sqlite>;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    let timeout = Duration::from_secs(timeout_secs.max(1));
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(timeout);

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(timeout)
        .connect_with(options)
        .await
}

/// Opens a transaction that holds the database write lock from its first
/// statement. Competing writers wait on the busy timeout.
pub async fn begin_immediate(pool: &DbPool) -> Result<DbTransaction, sqlx::Error> {
    pool.begin_with("BEGIN IMMEDIATE").await
}

pub async fn table_exists(pool: &DbPool, table: &str) -> Result<bool, sqlx::Error> {
    let exists: i64 = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
    )
    .bind(table)
    .fetch_one(pool)
    .await?;
    Ok(exists == 1)
}
