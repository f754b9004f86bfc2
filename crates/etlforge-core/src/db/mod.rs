//! Database access utilities

pub mod migrate;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;

use crate::{Error, Result};

/// Open a connection pool for the given `sqlite://` URI, creating the
/// database file if it doesn't exist, and run pending migrations.
pub async fn connect(db_uri: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(db_uri)
        .map_err(|e| Error::config(format!("invalid db_uri {db_uri}: {e}")))?
        .create_if_missing(true);

    // An in-memory database is private to the connection that opened
    // it, so a pool of more than one connection would see a fresh,
    // unmigrated database on every other checkout.
    let max_connections = if db_uri.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(Error::Database)?;

    migrate::Migrator::new(pool.clone()).migrate().await?;

    Ok(pool)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn connect_creates_and_migrates_in_memory_db() {
        let pool = connect("sqlite::memory:").await.unwrap();
        let row: (i64,) = sqlx::query_as("SELECT count(*) FROM status")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(row.0, 0);
    }
}
