//! Database operations for Sharecast
//!
//! SQLite holds two things: the per-user platform connections (OAuth tokens)
//! and the share history (one row per share, one row per platform outcome).

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use secrecy::ExposeSecret;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;

use crate::error::{DbError, Result};
use crate::types::{MediaKind, PlatformConnection, PlatformKind, PlatformOutcome, ShareResults};

/// Path value selecting a private in-memory database
pub const MEMORY_PATH: &str = ":memory:";

/// Where platform connections live
///
/// The dispatch loop and the connection routes only see this trait, so a
/// store other than SQLite can be plugged in.
#[async_trait]
pub trait ConnectionStore: Send + Sync {
    /// All connections of one user, keyed by platform
    async fn user_connections(&self, user_id: &str) -> Result<HashMap<PlatformKind, PlatformConnection>>;

    /// Insert or replace the connection for `(user_id, connection.platform)`
    async fn save_connection(&self, user_id: &str, connection: &PlatformConnection) -> Result<()>;

    /// Remove a connection; `false` when there was none
    async fn delete_connection(&self, user_id: &str, platform: PlatformKind) -> Result<bool>;
}

/// A recorded share and its per-platform outcomes
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShareRecord {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub media_kind: MediaKind,
    pub created_at: DateTime<Utc>,
    pub results: ShareResults,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if needed) the database at `db_path` and run migrations
    ///
    /// `":memory:"` opens a private in-memory database on a single pooled
    /// connection, since every SQLite connection to `:memory:` is its own
    /// database.
    pub async fn new(db_path: &str) -> Result<Self> {
        let pool = if db_path == MEMORY_PATH {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
                .map_err(DbError::SqlxError)?
        } else {
            let expanded_path = shellexpand::tilde(db_path).to_string();
            let path = Path::new(&expanded_path);

            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .foreign_keys(true);

            SqlitePoolOptions::new()
                .connect_with(options)
                .await
                .map_err(DbError::SqlxError)?
        };

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        Ok(Self { pool })
    }

    pub async fn in_memory() -> Result<Self> {
        Self::new(MEMORY_PATH).await
    }

    /// Record a share and all of its outcomes in one transaction
    pub async fn record_share(&self, share: &ShareRecord) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(DbError::SqlxError)?;

        sqlx::query(
            r#"
            INSERT INTO shares (id, user_id, title, media_kind, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&share.id)
        .bind(&share.user_id)
        .bind(&share.title)
        .bind(share.media_kind.as_str())
        .bind(share.created_at.timestamp())
        .execute(&mut *tx)
        .await
        .map_err(DbError::SqlxError)?;

        for (platform, outcome) in &share.results {
            let (post_id, post_url, error) = match outcome {
                PlatformOutcome::Posted { post_id, post_url } => (Some(post_id.as_str()), Some(post_url.as_str()), None),
                PlatformOutcome::Failed { error } => (None, None, Some(error.as_str())),
            };

            sqlx::query(
                r#"
                INSERT INTO share_results (share_id, platform, success, post_id, post_url, error)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&share.id)
            .bind(platform.as_str())
            .bind(outcome.is_success())
            .bind(post_id)
            .bind(post_url)
            .bind(error)
            .execute(&mut *tx)
            .await
            .map_err(DbError::SqlxError)?;
        }

        tx.commit().await.map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Most recent shares of a user, newest first
    pub async fn list_shares(&self, user_id: &str, limit: usize) -> Result<Vec<ShareRecord>> {
        let rows = sqlx::query(
            r#"
            SELECT id, user_id, title, media_kind, created_at
            FROM shares
            WHERE user_id = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let mut shares = Vec::with_capacity(rows.len());
        for row in rows {
            let mut share = share_from_row(&row)?;
            share.results = self.share_results(&share.id).await?;
            shares.push(share);
        }

        Ok(shares)
    }

    pub async fn get_share(&self, share_id: &str) -> Result<Option<ShareRecord>> {
        let row = sqlx::query(
            r#"
            SELECT id, user_id, title, media_kind, created_at
            FROM shares WHERE id = ?
            "#,
        )
        .bind(share_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        match row {
            Some(row) => {
                let mut share = share_from_row(&row)?;
                share.results = self.share_results(&share.id).await?;
                Ok(Some(share))
            }
            None => Ok(None),
        }
    }

    async fn share_results(&self, share_id: &str) -> Result<ShareResults> {
        let rows = sqlx::query(
            r#"
            SELECT platform, success, post_id, post_url, error
            FROM share_results WHERE share_id = ?
            "#,
        )
        .bind(share_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        let mut results = ShareResults::new();
        for row in rows {
            let platform = parse_platform(&row)?;
            let success: bool = row.try_get("success").map_err(DbError::SqlxError)?;
            let outcome = if success {
                PlatformOutcome::Posted {
                    post_id: row.try_get::<Option<String>, _>("post_id").map_err(DbError::SqlxError)?.unwrap_or_default(),
                    post_url: row.try_get::<Option<String>, _>("post_url").map_err(DbError::SqlxError)?.unwrap_or_default(),
                }
            } else {
                PlatformOutcome::Failed {
                    error: row.try_get::<Option<String>, _>("error").map_err(DbError::SqlxError)?.unwrap_or_default(),
                }
            };
            results.insert(platform, outcome);
        }

        Ok(results)
    }
}

#[async_trait]
impl ConnectionStore for Database {
    async fn user_connections(&self, user_id: &str) -> Result<HashMap<PlatformKind, PlatformConnection>> {
        let rows = sqlx::query(
            r#"
            SELECT platform, access_token, refresh_token, expires_at, account_id,
                   username, profile_picture_url, scopes
            FROM platform_connections
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|row| connection_from_row(row).map(|c| (c.platform, c)))
            .collect()
    }

    async fn save_connection(&self, user_id: &str, connection: &PlatformConnection) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO platform_connections (
                user_id, platform, access_token, refresh_token, expires_at, account_id,
                username, profile_picture_url, scopes, updated_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, platform) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                expires_at = excluded.expires_at,
                account_id = excluded.account_id,
                username = excluded.username,
                profile_picture_url = excluded.profile_picture_url,
                scopes = excluded.scopes,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(user_id)
        .bind(connection.platform.as_str())
        .bind(connection.access_token.expose_secret())
        .bind(connection.refresh_token.as_ref().map(|t| t.expose_secret()))
        .bind(connection.expires_at.map(|t| t.timestamp()))
        .bind(connection.account_id.as_deref())
        .bind(&connection.username)
        .bind(connection.profile_picture_url.as_deref())
        .bind(connection.scopes.join(" "))
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    async fn delete_connection(&self, user_id: &str, platform: PlatformKind) -> Result<bool> {
        let result = sqlx::query("DELETE FROM platform_connections WHERE user_id = ? AND platform = ?")
            .bind(user_id)
            .bind(platform.as_str())
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        Ok(result.rows_affected() > 0)
    }
}

fn parse_platform(row: &SqliteRow) -> Result<PlatformKind> {
    let name: String = row.try_get("platform").map_err(DbError::SqlxError)?;
    PlatformKind::from_str(&name)
        .map_err(|_| DbError::CorruptRow(format!("unknown platform '{}'", name)).into())
}

fn timestamp(secs: i64, column: &str) -> Result<DateTime<Utc>> {
    DateTime::<Utc>::from_timestamp(secs, 0)
        .ok_or_else(|| DbError::CorruptRow(format!("{} out of range: {}", column, secs)).into())
}

fn connection_from_row(row: &SqliteRow) -> Result<PlatformConnection> {
    let platform = parse_platform(row)?;
    let access_token: String = row.try_get("access_token").map_err(DbError::SqlxError)?;
    let username: String = row.try_get("username").map_err(DbError::SqlxError)?;

    let mut connection = PlatformConnection::new(platform, access_token, username);
    connection.refresh_token = row
        .try_get::<Option<String>, _>("refresh_token")
        .map_err(DbError::SqlxError)?
        .map(Into::into);
    connection.expires_at = row
        .try_get::<Option<i64>, _>("expires_at")
        .map_err(DbError::SqlxError)?
        .map(|secs| timestamp(secs, "expires_at"))
        .transpose()?;
    connection.account_id = row.try_get("account_id").map_err(DbError::SqlxError)?;
    connection.profile_picture_url = row.try_get("profile_picture_url").map_err(DbError::SqlxError)?;
    connection.scopes = row
        .try_get::<String, _>("scopes")
        .map_err(DbError::SqlxError)?
        .split_whitespace()
        .map(str::to_string)
        .collect();

    Ok(connection)
}

fn share_from_row(row: &SqliteRow) -> Result<ShareRecord> {
    let media_kind: String = row.try_get("media_kind").map_err(DbError::SqlxError)?;
    let created_at: i64 = row.try_get("created_at").map_err(DbError::SqlxError)?;

    Ok(ShareRecord {
        id: row.try_get("id").map_err(DbError::SqlxError)?,
        user_id: row.try_get("user_id").map_err(DbError::SqlxError)?,
        title: row.try_get("title").map_err(DbError::SqlxError)?,
        media_kind: MediaKind::from_str(&media_kind)
            .map_err(|_| DbError::CorruptRow(format!("unknown media kind '{}'", media_kind)))?,
        created_at: timestamp(created_at, "created_at")?,
        results: ShareResults::new(),
    })
}
