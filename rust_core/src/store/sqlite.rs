//! SQLite-backed stores
//!
//! Single-file database holding the `tracked_players` and `player_statuses`
//! relations. The schema is created on startup if missing; statements rely
//! on SQLite upsert semantics (`INSERT OR IGNORE` / `INSERT OR REPLACE`) so
//! adds stay idempotent without read-modify-write races.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

use super::{StatusStore, SubscriptionStore};
use crate::models::PlayerStatus;

/// Create a SQLite connection pool, creating the database file if missing.
pub async fn create_pool(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("Invalid database URL: {database_url}"))?
        .create_if_missing(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect_with(options)
        .await
        .context("Failed to create database connection pool")?;

    info!("Database pool created: {}", database_url);
    Ok(pool)
}

/// Create the tracker tables if they do not exist yet.
pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS tracked_players (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            player_nickname TEXT NOT NULL,
            UNIQUE(user_id, player_nickname)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS player_statuses (
            player_nickname TEXT PRIMARY KEY,
            last_status TEXT,
            last_checked TIMESTAMP DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

// ============================================================================
// Subscription Store
// ============================================================================

#[derive(Debug, Clone)]
pub struct SqliteSubscriptionStore {
    pool: SqlitePool,
}

impl SqliteSubscriptionStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SubscriptionStore for SqliteSubscriptionStore {
    async fn add(&self, user_id: i64, nickname: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT OR IGNORE INTO tracked_players (user_id, player_nickname) VALUES (?, ?)",
        )
        .bind(user_id)
        .bind(nickname)
        .execute(&self.pool)
        .await
        .context("Failed to add subscription")?;

        Ok(result.rows_affected() > 0)
    }

    async fn remove(&self, user_id: i64, nickname: &str) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM tracked_players WHERE user_id = ? AND player_nickname = ?",
        )
        .bind(user_id)
        .bind(nickname)
        .execute(&self.pool)
        .await
        .context("Failed to remove subscription")?;

        Ok(result.rows_affected() > 0)
    }

    async fn subscriptions_for_user(&self, user_id: i64) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT player_nickname FROM tracked_players WHERE user_id = ? ORDER BY id",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list subscriptions")?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("player_nickname").map_err(Into::into))
            .collect()
    }

    async fn distinct_players(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            "SELECT DISTINCT player_nickname FROM tracked_players ORDER BY player_nickname",
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list tracked players")?;

        rows.iter()
            .map(|row| row.try_get::<String, _>("player_nickname").map_err(Into::into))
            .collect()
    }

    async fn users_tracking(&self, nickname: &str) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT user_id FROM tracked_players WHERE player_nickname = ? ORDER BY id",
        )
        .bind(nickname)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list subscribers")?;

        rows.iter()
            .map(|row| row.try_get::<i64, _>("user_id").map_err(Into::into))
            .collect()
    }
}

// ============================================================================
// Status Store
// ============================================================================

#[derive(Debug, Clone)]
pub struct SqliteStatusStore {
    pool: SqlitePool,
}

impl SqliteStatusStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StatusStore for SqliteStatusStore {
    async fn get(&self, nickname: &str) -> Result<Option<String>> {
        let row = sqlx::query_scalar::<_, Option<String>>(
            "SELECT last_status FROM player_statuses WHERE player_nickname = ?",
        )
        .bind(nickname)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read player status")?;

        Ok(row.flatten())
    }

    async fn get_record(&self, nickname: &str) -> Result<Option<PlayerStatus>> {
        let row = sqlx::query(
            "SELECT player_nickname, last_status, last_checked
             FROM player_statuses WHERE player_nickname = ?",
        )
        .bind(nickname)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to read player status record")?;

        let Some(row) = row else {
            return Ok(None);
        };

        Ok(Some(PlayerStatus {
            player_nickname: row.try_get("player_nickname")?,
            last_status: row.try_get::<Option<String>, _>("last_status")?.unwrap_or_default(),
            last_checked: row.try_get::<DateTime<Utc>, _>("last_checked")?,
        }))
    }

    async fn set(&self, nickname: &str, status: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO player_statuses (player_nickname, last_status, last_checked)
             VALUES (?, ?, ?)",
        )
        .bind(nickname)
        .bind(status)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .context("Failed to update player status")?;

        Ok(())
    }
}
