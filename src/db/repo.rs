use super::model::ProfileRow;
use crate::credentials::{CredentialStore, StoredProfile};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use tracing::instrument;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let options = SqliteConnectOptions::from_str(&normalized)
        .with_context(|| format!("invalid database url {}", normalized))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .context("failed to open profile database")?;
    sqlx::query("PRAGMA journal_mode=WAL;")
        .execute(&pool)
        .await?;
    Ok(pool)
}

/// Expand a leading `~/` in a file-backed SQLite URL and make sure the
/// parent directory exists. In-memory and non-sqlite URLs pass through.
fn prepare_sqlite_url(url: &str) -> String {
    let Some(rest) = url.strip_prefix("sqlite:") else {
        return url.to_string();
    };
    if rest.starts_with(":memory") {
        return url.to_string();
    }

    let rest = rest.strip_prefix("//").unwrap_or(rest);
    let (path, query) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path.is_empty() {
        return url.to_string();
    }

    let path = match (path.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(tail), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), tail),
        _ => path.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    match query {
        Some(q) => format!("sqlite://{}?{}", path, q),
        None => format!("sqlite://{}", path),
    }
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn upsert_profile(pool: &Pool, user_id: &str, base_url: &str, access_token: &str) -> Result<()> {
    sqlx::query(
        "INSERT INTO profiles (user_id, canvas_base_url, canvas_access_token, updated_at) \
         VALUES (?, ?, ?, CURRENT_TIMESTAMP) \
         ON CONFLICT(user_id) DO UPDATE SET \
           canvas_base_url = excluded.canvas_base_url, \
           canvas_access_token = excluded.canvas_access_token, \
           updated_at = CURRENT_TIMESTAMP",
    )
    .bind(user_id)
    .bind(base_url)
    .bind(access_token)
    .execute(pool)
    .await?;
    Ok(())
}

#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn get_profile(pool: &Pool, user_id: &str) -> Result<Option<ProfileRow>> {
    let row = sqlx::query(
        "SELECT user_id, canvas_base_url, canvas_access_token, updated_at FROM profiles WHERE user_id = ?",
    )
    .bind(user_id)
    .fetch_optional(pool)
    .await?;
    Ok(row.map(|row| ProfileRow {
        user_id: row.get("user_id"),
        canvas_base_url: row.get("canvas_base_url"),
        canvas_access_token: row.get("canvas_access_token"),
        updated_at: row.get("updated_at"),
    }))
}

/// Returns whether a profile was removed.
#[instrument(skip_all, fields(user_id = %user_id))]
pub async fn delete_profile(pool: &Pool, user_id: &str) -> Result<bool> {
    let res = sqlx::query("DELETE FROM profiles WHERE user_id = ?")
        .bind(user_id)
        .execute(pool)
        .await?;
    Ok(res.rows_affected() > 0)
}

/// `CredentialStore` backed by the local `profiles` table.
#[derive(Debug, Clone)]
pub struct SqliteProfileStore {
    pool: Pool,
}

impl SqliteProfileStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CredentialStore for SqliteProfileStore {
    async fn load_profile(&self, user_id: &str) -> Result<Option<StoredProfile>> {
        let row = get_profile(&self.pool, user_id)
            .await
            .context("failed to load canvas profile")?;
        Ok(row.map(ProfileRow::into_stored))
    }
}
