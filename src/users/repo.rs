use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::model::User;
use crate::error::{AppError, Result};

impl User {
    pub async fn find_by_id(db: &PgPool, id: Uuid) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, fullname, avatar, cover_image,
                   password_hash, refresh_token, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Look a user up by email or username; either may be absent.
    pub async fn find_by_login(
        db: &PgPool,
        email: Option<&str>,
        username: Option<&str>,
    ) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, fullname, avatar, cover_image,
                   password_hash, refresh_token, created_at, updated_at
            FROM users
            WHERE email = $1 OR username = $2
            LIMIT 1
            "#,
        )
        .bind(email)
        .bind(username)
        .fetch_optional(db)
        .await
    }

    pub async fn exists_by_username_or_email(
        db: &PgPool,
        username: &str,
        email: &str,
    ) -> sqlx::Result<bool> {
        sqlx::query_scalar::<_, bool>(
            r#"SELECT EXISTS(SELECT 1 FROM users WHERE username = $1 OR email = $2)"#,
        )
        .bind(username)
        .bind(email)
        .fetch_one(db)
        .await
    }

    /// Insert or update this user. Always runs [`User::before_save`] first,
    /// so a modified password is hashed before it reaches the database.
    pub async fn save(&mut self, db: &PgPool) -> Result<()> {
        let rehashed = self.before_save()?;
        if self.password_hash.is_empty() {
            return Err(AppError::Validation("password is required".into()));
        }
        self.updated_at = OffsetDateTime::now_utc();

        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, fullname, avatar, cover_image,
                               password_hash, refresh_token, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                email = EXCLUDED.email,
                fullname = EXCLUDED.fullname,
                avatar = EXCLUDED.avatar,
                cover_image = EXCLUDED.cover_image,
                password_hash = EXCLUDED.password_hash,
                refresh_token = EXCLUDED.refresh_token,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(self.id)
        .bind(&self.username)
        .bind(&self.email)
        .bind(&self.fullname)
        .bind(&self.avatar)
        .bind(&self.cover_image)
        .bind(&self.password_hash)
        .bind(&self.refresh_token)
        .bind(self.created_at)
        .bind(self.updated_at)
        .execute(db)
        .await?;

        debug!(user_id = %self.id, rehashed, "user saved");
        Ok(())
    }
}
