//! Database migration system
//!
//! Runs idempotently on startup: tracks applied migrations in
//! `_migrations` and applies anything new in order.

use sqlx::{Row, SqlitePool};
use tracing::{error, info};

use crate::{Error, Result};

/// A single applied migration record.
#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub name: String,
    pub applied_at: chrono::DateTime<chrono::Utc>,
}

/// Owns the `_migrations` bookkeeping table and the schema migrations.
pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    async fn init_migration_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_applied_migrations(&self) -> Result<Vec<Migration>> {
        let rows = sqlx::query(r#"SELECT version, name, applied_at FROM _migrations ORDER BY version"#)
            .fetch_all(&self.pool)
            .await?;

        let migrations = rows
            .into_iter()
            .map(|row| Migration {
                version: row.get("version"),
                name: row.get("name"),
                applied_at: row.get("applied_at"),
            })
            .collect();

        Ok(migrations)
    }

    async fn record_migration(&self, version: i64, name: &str) -> Result<()> {
        sqlx::query(r#"INSERT OR IGNORE INTO _migrations (version, name) VALUES (?, ?)"#)
            .bind(version)
            .bind(name)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// Run all pending migrations in version order.
    pub async fn migrate(&self) -> Result<()> {
        info!("initializing migration table");
        self.init_migration_table().await?;

        let applied = self.get_applied_migrations().await?;
        info!(count = applied.len(), "found applied migrations");

        let migrations: Vec<(i64, &str, &str)> = vec![(
            1,
            "initial_schema",
            include_str!("../../migrations/001_initial_schema.sql"),
        )];

        for (version, name, sql) in migrations {
            if applied.iter().any(|m| m.version == version) {
                info!(version, name, "migration already applied, skipping");
                continue;
            }

            info!(version, name, "applying migration");
            sqlx::raw_sql(sql).execute(&self.pool).await.map_err(|e| {
                error!(version, name, error = %e, "migration failed");
                Error::Database(e)
            })?;

            self.record_migration(version, name).await?;
            info!(version, name, "migration applied");
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::sqlite::SqlitePoolOptions;

    #[tokio::test]
    async fn migrate_creates_expected_tables() {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();

        let migrator = Migrator::new(pool.clone());
        migrator.migrate().await.unwrap();

        for table in ["status", "job_history", "log", "_migrations"] {
            let row: (i64,) = sqlx::query_as(
                "SELECT count(*) FROM sqlite_master WHERE type='table' AND name = ?",
            )
            .bind(table)
            .fetch_one(&pool)
            .await
            .unwrap();
            assert_eq!(row.0, 1, "expected table {table} to exist");
        }
    }

    #[tokio::test]
    async fn migrate_is_idempotent() {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();

        let migrator = Migrator::new(pool.clone());
        migrator.migrate().await.unwrap();
        migrator.migrate().await.unwrap();

        let applied = migrator.get_applied_migrations().await.unwrap();
        assert_eq!(applied.len(), 1);
    }
}
