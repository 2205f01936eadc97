//! SQLite-based state store

use crate::core::Progress;
use crate::persistence::StateStore;
use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;

const ACTIVE_TARGET_KEY: &str = "active_target";

/// SQLite state store
pub struct SqliteStateStore {
    pool: SqlitePool,
}

impl SqliteStateStore {
    /// Open (creating if needed) a database file
    pub async fn open(db_path: &Path) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);
        Self::connect(options).await
    }

    /// Private in-memory database
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect(options).await
    }

    /// Create store with default path
    pub async fn with_default_path() -> Result<Self> {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
        let db_dir = data_dir.join("flatpak-pipeline");
        std::fs::create_dir_all(&db_dir)
            .with_context(|| format!("Failed to create {}", db_dir.display()))?;

        Self::open(&db_dir.join("state.db")).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self> {
        // One connection keeps in-memory databases shared and writes serialized
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .context("Failed to connect to database")?;

        let store = Self { pool };
        store.init().await?;

        Ok(store)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS progress (
                target TEXT PRIMARY KEY,
                initialized INTEGER NOT NULL DEFAULT 0,
                dependencies_updated INTEGER NOT NULL DEFAULT 0,
                dependencies_built INTEGER NOT NULL DEFAULT 0,
                application_built INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS settings (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait::async_trait]
impl StateStore for SqliteStateStore {
    async fn load_progress(&self, target: &str) -> Result<Option<Progress>> {
        let row = sqlx::query(
            r#"
            SELECT initialized, dependencies_updated, dependencies_built, application_built
            FROM progress
            WHERE target = ?1
            "#,
        )
        .bind(target)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load progress")?;

        Ok(row.map(|row| Progress {
            initialized: row.get("initialized"),
            dependencies_updated: row.get("dependencies_updated"),
            dependencies_built: row.get("dependencies_built"),
            application_built: row.get("application_built"),
        }))
    }

    async fn save_progress(&self, target: &str, progress: &Progress) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO progress
            (target, initialized, dependencies_updated, dependencies_built, application_built, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(target)
        .bind(progress.initialized)
        .bind(progress.dependencies_updated)
        .bind(progress.dependencies_built)
        .bind(progress.application_built)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to save progress")?;

        Ok(())
    }

    async fn active_target(&self) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM settings WHERE key = ?1")
            .bind(ACTIVE_TARGET_KEY)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to load active target")?;

        Ok(row.map(|row| row.get("value")))
    }

    async fn set_active_target(&self, target: Option<&str>) -> Result<()> {
        match target {
            Some(target) => {
                sqlx::query("INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)")
                    .bind(ACTIVE_TARGET_KEY)
                    .bind(target)
                    .execute(&self.pool)
                    .await
            }
            None => {
                sqlx::query("DELETE FROM settings WHERE key = ?1")
                    .bind(ACTIVE_TARGET_KEY)
                    .execute(&self.pool)
                    .await
            }
        }
        .context("Failed to save active target")?;

        Ok(())
    }
}
