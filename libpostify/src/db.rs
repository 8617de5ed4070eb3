//! SQLite persistence for Postify

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqliteRow};
use sqlx::Row;
use std::path::Path;

use crate::error::{DbError, Result};
use crate::identity::SessionStore;
use crate::store::ContentStore;
use crate::types::{PlatformKind, Post, PostResult, PostStatus, SocialAccount, User};

/// A result row joined with the account it targeted
#[derive(Debug, Clone)]
pub struct ResultWithAccount {
    pub result: PostResult,
    pub account: SocialAccount,
}

#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the database file and run migrations
    pub async fn new(db_path: &str) -> Result<Self> {
        let expanded_path = shellexpand::tilde(db_path).to_string();
        let path = Path::new(&expanded_path);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(DbError::IoError)?;
        }

        // Forward slashes keep the URL valid on Windows; mode=rwc creates the file
        let db_url = format!("sqlite://{}?mode=rwc", expanded_path.replace('\\', "/"));

        let pool = SqlitePool::connect(&db_url)
            .await
            .map_err(DbError::SqlxError)?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(DbError::MigrationError)?;

        tracing::debug!("Database ready at {}", expanded_path);
        Ok(Self { pool })
    }

    // ------------------------------------------------------------------
    // Users
    // ------------------------------------------------------------------

    pub async fn create_user(&self, user: &User) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password_hash)
        .bind(user.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_user(&self, user_id: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, email, password_hash, created_at FROM users WHERE id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.as_ref().map(user_from_row))
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let row = sqlx::query(
            "SELECT id, username, email, password_hash, created_at FROM users WHERE username = ?",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(row.as_ref().map(user_from_row))
    }

    pub async fn update_user_password(&self, user_id: &str, password_hash: &str) -> Result<()> {
        sqlx::query("UPDATE users SET password_hash = ? WHERE id = ?")
            .bind(password_hash)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    pub async fn update_user_email(&self, user_id: &str, email: &str) -> Result<()> {
        sqlx::query("UPDATE users SET email = ? WHERE id = ?")
            .bind(email)
            .bind(user_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Posts
    // ------------------------------------------------------------------

    pub async fn create_post(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO posts (id, owner_id, title, content, image, generated_image_prompt,
                               status, scheduled_time, created_at, posted_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.owner_id)
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.image)
        .bind(&post.generated_image_prompt)
        .bind(post.status.as_str())
        .bind(post.scheduled_time)
        .bind(post.created_at)
        .bind(post.posted_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_POST))
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(post_from_row).transpose()
    }

    /// Posts of one owner, newest first
    pub async fn list_posts(&self, owner_id: &str) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "{} WHERE owner_id = ? ORDER BY created_at DESC, rowid DESC",
            SELECT_POST
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    pub async fn posts_with_status(&self, status: PostStatus) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "{} WHERE status = ? ORDER BY created_at ASC",
            SELECT_POST
        ))
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    /// Scheduled posts whose time has come, oldest schedule first
    pub async fn due_scheduled_posts(&self, now: i64) -> Result<Vec<Post>> {
        let rows = sqlx::query(&format!(
            "{} WHERE status = 'scheduled' AND scheduled_time IS NOT NULL AND scheduled_time <= ? \
             ORDER BY scheduled_time ASC",
            SELECT_POST
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(post_from_row).collect()
    }

    /// Write the user-editable columns. Status and `posted_at` are left to
    /// `set_post_status` so a stale copy cannot undo a publish.
    pub async fn update_post_details(&self, post: &Post) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE posts
            SET title = ?, content = ?, generated_image_prompt = ?, scheduled_time = ?
            WHERE id = ?
            "#,
        )
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.generated_image_prompt)
        .bind(post.scheduled_time)
        .bind(&post.id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn set_post_image(&self, post_id: &str, image: Option<&str>) -> Result<()> {
        sqlx::query("UPDATE posts SET image = ? WHERE id = ?")
            .bind(image)
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    /// Set the status; `posted_at` of `None` keeps the stored value
    pub async fn set_post_status(
        &self,
        post_id: &str,
        status: PostStatus,
        posted_at: Option<i64>,
    ) -> Result<bool> {
        let done = sqlx::query(
            "UPDATE posts SET status = ?, posted_at = COALESCE(?, posted_at) WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(posted_at)
        .bind(post_id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(done.rows_affected() > 0)
    }

    /// Delete a post and, through the foreign key, its result history
    pub async fn delete_post(&self, post_id: &str) -> Result<bool> {
        let done = sqlx::query("DELETE FROM posts WHERE id = ?")
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(done.rows_affected() > 0)
    }

    /// Number of posts pointing at a media reference
    pub async fn count_image_references(&self, reference: &str) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM posts WHERE image = ?")
            .bind(reference)
            .fetch_one(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Social accounts
    // ------------------------------------------------------------------

    pub async fn get_account(&self, account_id: &str) -> Result<Option<SocialAccount>> {
        let row = sqlx::query(&format!("{} WHERE id = ?", SELECT_ACCOUNT))
            .bind(account_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;

        row.as_ref().map(account_from_row).transpose()
    }

    pub async fn list_accounts(&self, owner_id: &str) -> Result<Vec<SocialAccount>> {
        let rows = sqlx::query(&format!(
            "{} WHERE owner_id = ? ORDER BY created_at ASC",
            SELECT_ACCOUNT
        ))
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter().map(account_from_row).collect()
    }

    pub async fn update_account(&self, account: &SocialAccount) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE social_accounts
            SET display_name = ?, token = ?, chat_id = ?, is_active = ?
            WHERE id = ?
            "#,
        )
        .bind(&account.display_name)
        .bind(&account.token)
        .bind(&account.chat_id)
        .bind(account.is_active)
        .bind(&account.id)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(())
    }

    pub async fn delete_account(&self, account_id: &str) -> Result<bool> {
        let done = sqlx::query("DELETE FROM social_accounts WHERE id = ?")
            .bind(account_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(done.rows_affected() > 0)
    }

    // ------------------------------------------------------------------
    // Results
    // ------------------------------------------------------------------

    /// Result history of a post in write order, with the targeted account
    pub async fn list_results(&self, post_id: &str) -> Result<Vec<ResultWithAccount>> {
        let rows = sqlx::query(
            r#"
            SELECT r.id AS result_id, r.post_id, r.account_id, r.success, r.error_message,
                   r.posted_at AS result_posted_at,
                   a.id, a.owner_id, a.platform, a.display_name, a.token, a.chat_id,
                   a.is_active, a.created_at
            FROM post_results r
            JOIN social_accounts a ON a.id = r.account_id
            WHERE r.post_id = ?
            ORDER BY r.id ASC
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        rows.iter()
            .map(|r| {
                Ok(ResultWithAccount {
                    result: PostResult {
                        id: Some(r.get("result_id")),
                        post_id: r.get("post_id"),
                        account_id: r.get("account_id"),
                        success: r.get::<i64, _>("success") != 0,
                        error_message: r.get("error_message"),
                        posted_at: r.get("result_posted_at"),
                    },
                    account: account_from_row(r)?,
                })
            })
            .collect()
    }
}

const SELECT_POST: &str = "SELECT id, owner_id, title, content, image, generated_image_prompt, \
     status, scheduled_time, created_at, posted_at FROM posts";

const SELECT_ACCOUNT: &str = "SELECT id, owner_id, platform, display_name, token, chat_id, \
     is_active, created_at FROM social_accounts";

fn user_from_row(r: &SqliteRow) -> User {
    User {
        id: r.get("id"),
        username: r.get("username"),
        email: r.get("email"),
        password_hash: r.get("password_hash"),
        created_at: r.get("created_at"),
    }
}

fn post_from_row(r: &SqliteRow) -> Result<Post> {
    let status: String = r.get("status");
    let status = status.parse::<PostStatus>().map_err(|e| DbError::CorruptRow {
        table: "posts",
        reason: e.to_string(),
    })?;

    Ok(Post {
        id: r.get("id"),
        owner_id: r.get("owner_id"),
        title: r.get("title"),
        content: r.get("content"),
        image: r.get("image"),
        generated_image_prompt: r.get("generated_image_prompt"),
        status,
        scheduled_time: r.get("scheduled_time"),
        created_at: r.get("created_at"),
        posted_at: r.get("posted_at"),
    })
}

fn account_from_row(r: &SqliteRow) -> Result<SocialAccount> {
    let platform: String = r.get("platform");
    let platform = platform
        .parse::<PlatformKind>()
        .map_err(|e| DbError::CorruptRow {
            table: "social_accounts",
            reason: e.to_string(),
        })?;

    Ok(SocialAccount {
        id: r.get("id"),
        owner_id: r.get("owner_id"),
        platform,
        display_name: r.get("display_name"),
        token: r.get("token"),
        chat_id: r.get("chat_id"),
        is_active: r.get::<i64, _>("is_active") != 0,
        created_at: r.get("created_at"),
    })
}

#[async_trait]
impl ContentStore for Database {
    async fn get_post(&self, post_id: &str) -> Result<Option<Post>> {
        Database::get_post(self, post_id).await
    }

    async fn set_post_status(
        &self,
        post_id: &str,
        status: PostStatus,
        posted_at: Option<i64>,
    ) -> Result<bool> {
        Database::set_post_status(self, post_id, status, posted_at).await
    }

    async fn claim_publish(&self, post_id: &str, now: i64, stale_before: i64) -> Result<bool> {
        let done = sqlx::query(
            r#"
            UPDATE posts SET publish_claimed_at = ?
            WHERE id = ? AND (publish_claimed_at IS NULL OR publish_claimed_at < ?)
            "#,
        )
        .bind(now)
        .bind(post_id)
        .bind(stale_before)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;
        Ok(done.rows_affected() == 1)
    }

    async fn release_publish(&self, post_id: &str) -> Result<()> {
        sqlx::query("UPDATE posts SET publish_claimed_at = NULL WHERE id = ?")
            .bind(post_id)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    async fn find_account(
        &self,
        owner_id: &str,
        platform: PlatformKind,
    ) -> Result<Option<SocialAccount>> {
        let row = sqlx::query(&format!(
            "{} WHERE owner_id = ? AND platform = ?",
            SELECT_ACCOUNT
        ))
        .bind(owner_id)
        .bind(platform.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        row.as_ref().map(account_from_row).transpose()
    }

    async fn create_account(&self, account: &SocialAccount) -> Result<SocialAccount> {
        sqlx::query(
            r#"
            INSERT INTO social_accounts
                (id, owner_id, platform, display_name, token, chat_id, is_active, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (owner_id, platform) DO NOTHING
            "#,
        )
        .bind(&account.id)
        .bind(&account.owner_id)
        .bind(account.platform.as_str())
        .bind(&account.display_name)
        .bind(&account.token)
        .bind(&account.chat_id)
        .bind(account.is_active)
        .bind(account.created_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        self.find_account(&account.owner_id, account.platform)
            .await?
            .ok_or_else(|| {
                DbError::CorruptRow {
                    table: "social_accounts",
                    reason: format!(
                        "account for {}/{} vanished after insert",
                        account.owner_id, account.platform
                    ),
                }
                .into()
            })
    }

    async fn append_result(&self, result: &PostResult) -> Result<i64> {
        let done = sqlx::query(
            r#"
            INSERT INTO post_results (post_id, account_id, success, error_message, posted_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&result.post_id)
        .bind(&result.account_id)
        .bind(result.success)
        .bind(&result.error_message)
        .bind(result.posted_at)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(done.last_insert_rowid())
    }

    async fn prune_results(&self, post_id: &str, keep_last: usize) -> Result<u64> {
        let done = sqlx::query(
            r#"
            DELETE FROM post_results
            WHERE post_id = ?
              AND id NOT IN (
                SELECT id FROM post_results WHERE post_id = ? ORDER BY id DESC LIMIT ?
              )
            "#,
        )
        .bind(post_id)
        .bind(post_id)
        .bind(keep_last as i64)
        .execute(&self.pool)
        .await
        .map_err(DbError::SqlxError)?;

        Ok(done.rows_affected())
    }
}

#[async_trait]
impl SessionStore for Database {
    async fn insert(&self, token: &str, user_id: &str) -> Result<()> {
        sqlx::query("INSERT INTO sessions (token, user_id, created_at) VALUES (?, ?, ?)")
            .bind(token)
            .bind(user_id)
            .bind(chrono::Utc::now().timestamp())
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    async fn get(&self, token: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT user_id FROM sessions WHERE token = ?")
            .bind(token)
            .fetch_optional(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(row.map(|r| r.get("user_id")))
    }

    async fn remove(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token = ?")
            .bind(token)
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        sqlx::query("DELETE FROM sessions")
            .execute(&self.pool)
            .await
            .map_err(DbError::SqlxError)?;
        Ok(())
    }
}
