use sqlx::SqlitePool;

use super::models::Session;
use super::now_timestamp;
use crate::error::Result;

/// Create a new session.
pub async fn create_session(
    pool: &SqlitePool,
    user_id: i64,
    token: &str,
    expires_at: &str,
) -> Result<Session> {
    let session = sqlx::query_as(
        r"
        INSERT INTO sessions (user_id, token, created_at, expires_at)
        VALUES (?, ?, ?, ?)
        RETURNING id, token, user_id, created_at, expires_at
        ",
    )
    .bind(user_id)
    .bind(token)
    .bind(now_timestamp())
    .bind(expires_at)
    .fetch_one(pool)
    .await?;

    Ok(session)
}

/// Get a session by token, expired or not.
pub async fn get_session_by_token(pool: &SqlitePool, token: &str) -> Result<Option<Session>> {
    let session = sqlx::query_as(
        "SELECT id, token, user_id, created_at, expires_at FROM sessions WHERE token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    Ok(session)
}

/// Delete a session.
pub async fn delete_session(pool: &SqlitePool, token: &str) -> Result<()> {
    sqlx::query("DELETE FROM sessions WHERE token = ?")
        .bind(token)
        .execute(pool)
        .await?;
    Ok(())
}

/// Delete expired sessions.
pub async fn delete_expired_sessions(pool: &SqlitePool) -> Result<u64> {
    let result = sqlx::query("DELETE FROM sessions WHERE expires_at < ?")
        .bind(now_timestamp())
        .execute(pool)
        .await?;
    Ok(result.rows_affected())
}
