use super::Store;
use crate::error::Result;
use sqlx::Row;
use tracing::instrument;

#[derive(Debug, Clone)]
pub struct StoredUser {
    pub username: String,
    pub password_hash: String,
    pub admin: bool,
}

impl Store {
    pub async fn count_users(&self) -> Result<i64> {
        let n = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(n)
    }

    pub async fn find_user(&self, username: &str) -> Result<Option<StoredUser>> {
        let row = sqlx::query("SELECT username, password_hash, admin FROM users WHERE username = $1")
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(StoredUser {
            username: row.try_get("username")?,
            password_hash: row.try_get("password_hash")?,
            admin: row.try_get("admin")?,
        }))
    }

    #[instrument(skip(self, password_hash), fields(repo = "store", operation = "insert_user"))]
    pub async fn insert_user(
        &self,
        username: &str,
        password_hash: &str,
        admin: bool,
        created_at: i64,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO users (username, password_hash, admin, created_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(username)
        .bind(password_hash)
        .bind(admin)
        .bind(created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn insert_session(&self, token: &str, username: &str, expires_at: i64) -> Result<()> {
        sqlx::query("INSERT INTO sessions (token, username, expires_at) VALUES ($1, $2, $3)")
            .bind(token)
            .bind(username)
            .bind(expires_at)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Session owner and expiry for `token`, if any.
    pub async fn find_session(&self, token: &str) -> Result<Option<(String, i64)>> {
        let row = sqlx::query("SELECT username, expires_at FROM sessions WHERE token = $1")
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some((row.try_get("username")?, row.try_get("expires_at")?)))
    }

    pub async fn delete_session(&self, token: &str) -> Result<()> {
        sqlx::query("DELETE FROM sessions WHERE token = $1")
            .bind(token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    #[instrument(skip(self), fields(repo = "store", operation = "prune_sessions"))]
    pub async fn prune_sessions(&self, now_ms: i64) -> Result<u64> {
        let r = sqlx::query("DELETE FROM sessions WHERE expires_at < $1")
            .bind(now_ms)
            .execute(&self.pool)
            .await?;
        Ok(r.rows_affected())
    }
}
