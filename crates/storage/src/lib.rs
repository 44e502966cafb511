use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Row, Sqlite,
};
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
    str::FromStr,
    sync::Mutex,
};

/// Key under which the dark-mode flag is persisted.
pub const DARK_MODE_KEY: &str = "darkMode";

/// Durable boolean key/value store for client preferences.
#[async_trait]
pub trait PreferenceStore: Send + Sync {
    async fn get_bool(&self, key: &str) -> Result<Option<bool>>;
    async fn set_bool(&self, key: &str, value: bool) -> Result<()>;
}

#[derive(Clone)]
pub struct Storage {
    pool: Pool<Sqlite>,
}

#[derive(Debug, Clone)]
pub struct StoredPreference {
    pub key: String,
    pub value: String,
    pub updated_at: DateTime<Utc>,
}

impl Storage {
    pub async fn new(database_url: &str) -> Result<Self> {
        ensure_sqlite_parent_dir_exists(database_url)?;

        let connect_options = SqliteConnectOptions::from_str(database_url)
            .with_context(|| format!("invalid sqlite url '{database_url}'"))?
            .create_if_missing(true);

        // Every in-memory connection is its own database, so pin the pool to one.
        let pool_options = if is_memory_url(database_url) {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(2)
        };

        let pool = pool_options
            .connect_with(connect_options)
            .await
            .with_context(|| format!("failed to open preferences database '{database_url}'"))?;
        let storage = Self { pool };
        storage.ensure_preferences_table().await?;
        Ok(storage)
    }

    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    pub async fn health_check(&self) -> Result<()> {
        let _: i64 = sqlx::query_scalar("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .context("sqlite ping failed")?;
        Ok(())
    }

    async fn ensure_preferences_table(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS preferences (
                key        TEXT PRIMARY KEY NOT NULL,
                value      TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("failed to ensure preferences table exists")?;
        Ok(())
    }

    pub async fn get_preference(&self, key: &str) -> Result<Option<StoredPreference>> {
        let row = sqlx::query("SELECT key, value, updated_at FROM preferences WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("failed to read preference '{key}'"))?;

        let Some(row) = row else {
            return Ok(None);
        };

        let updated_at: String = row.try_get("updated_at")?;
        let updated_at = DateTime::parse_from_rfc3339(&updated_at)
            .map(|value| value.with_timezone(&Utc))
            .with_context(|| format!("corrupt timestamp for preference '{key}'"))?;

        Ok(Some(StoredPreference {
            key: row.try_get("key")?,
            value: row.try_get("value")?,
            updated_at,
        }))
    }

    pub async fn put_preference(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT INTO preferences (key, value, updated_at) VALUES (?, ?, ?)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .with_context(|| format!("failed to write preference '{key}'"))?;
        Ok(())
    }
}

#[async_trait]
impl PreferenceStore for Storage {
    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        Ok(self
            .get_preference(key)
            .await?
            .map(|preference| parse_bool_flag(&preference.value)))
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        self.put_preference(key, if value { "true" } else { "false" })
            .await
    }
}

/// Process-local store used when no durable database is available.
#[derive(Default)]
pub struct MemoryPreferenceStore {
    values: Mutex<HashMap<String, bool>>,
}

impl MemoryPreferenceStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PreferenceStore for MemoryPreferenceStore {
    async fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        let values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("preference map lock poisoned"))?;
        Ok(values.get(key).copied())
    }

    async fn set_bool(&self, key: &str, value: bool) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|_| anyhow::anyhow!("preference map lock poisoned"))?;
        values.insert(key.to_string(), value);
        Ok(())
    }
}

/// Only the literal `true` enables a flag; anything else reads as false.
fn parse_bool_flag(raw: &str) -> bool {
    raw.trim() == "true"
}

fn is_memory_url(database_url: &str) -> bool {
    database_url.starts_with("sqlite::memory:") || database_url.contains("mode=memory")
}

/// Builds a sqlite url for a file path, normalizing Windows separators.
pub fn sqlite_url_for_path(path: &Path) -> String {
    format!("sqlite://{}", path.to_string_lossy().replace('\\', "/"))
}

fn ensure_sqlite_parent_dir_exists(database_url: &str) -> Result<()> {
    let Some(path) = sqlite_path(database_url) else {
        return Ok(());
    };

    let Some(parent) = path.parent() else {
        return Ok(());
    };

    fs::create_dir_all(parent).with_context(|| {
        format!(
            "failed to create parent directory '{}' for database url '{database_url}'",
            parent.display()
        )
    })?;

    Ok(())
}

fn sqlite_path(database_url: &str) -> Option<PathBuf> {
    if is_memory_url(database_url) || !database_url.starts_with("sqlite:") {
        return None;
    }

    let path = database_url
        .trim_start_matches("sqlite://")
        .trim_start_matches("sqlite:")
        .split('?')
        .next()
        .unwrap_or_default();

    if path.is_empty() {
        return None;
    }

    Some(Path::new(path).to_path_buf())
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
