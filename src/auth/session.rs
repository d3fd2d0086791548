use std::time::Duration;

use axum::http::{header, HeaderMap};
use chrono::{SecondsFormat, Utc};
use rand::{distributions::Alphanumeric, thread_rng, Rng};
use tracing::debug;

use crate::db::{
    create_session, delete_session, get_session_by_token, now_timestamp, Database, Filter,
    Session, User, UserColumn,
};
use crate::error::{ForumError, Result};

/// Name of the cookie carrying the opaque session token.
pub const SESSION_COOKIE: &str = "session";

/// Generate a cryptographically secure random session token.
pub fn generate_session_token() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(64)
        .map(char::from)
        .collect()
}

/// Value of cookie `name` in the request's `Cookie` headers.
#[must_use]
pub fn cookie_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .find_map(|cookie| {
            let (key, value) = cookie.trim().split_once('=')?;
            (key == name).then_some(value)
        })
}

/// `Set-Cookie` value for a cookie readable only by the server.
#[must_use]
pub fn server_cookie(name: &str, value: &str, max_age: Duration, secure: bool) -> String {
    let secure = if secure { "; Secure" } else { "" };
    format!(
        "{name}={value}; HttpOnly{secure}; SameSite=Lax; Path=/; Max-Age={}",
        max_age.as_secs()
    )
}

/// `Set-Cookie` value that removes cookie `name`.
#[must_use]
pub fn clear_cookie(name: &str, secure: bool) -> String {
    server_cookie(name, "", Duration::ZERO, secure)
}

/// Start a session for `user`, returning the new token.
pub async fn start_session(db: &Database, user: &User, ttl: Duration) -> Result<Session> {
    let ttl = chrono::Duration::from_std(ttl)
        .map_err(|e| ForumError::Internal(anyhow::anyhow!("session ttl out of range: {e}")))?;
    let expires_at = (Utc::now() + ttl).to_rfc3339_opts(SecondsFormat::Micros, true);
    let token = generate_session_token();

    let session = create_session(db.pool(), user.id, &token, &expires_at).await?;
    debug!(user_id = user.id, "Session started");
    Ok(session)
}

/// Resolve a session token to its user. Unknown tokens resolve to `None`;
/// expired sessions are deleted and also resolve to `None`.
pub async fn resolve_session(db: &Database, token: &str) -> Result<Option<User>> {
    let Some(session) = get_session_by_token(db.pool(), token).await? else {
        return Ok(None);
    };

    if session.expires_at < now_timestamp() {
        debug!(session_id = session.id, "Session expired");
        delete_session(db.pool(), token).await?;
        return Ok(None);
    }

    match db
        .users()
        .find_one(None, &[Filter::eq(UserColumn::Id, session.user_id)])
        .await
    {
        Ok(user) => Ok(Some(user)),
        Err(ForumError::NotFound) => Ok(None),
        Err(e) => Err(e),
    }
}

/// End the session identified by `token`. Unknown tokens are ignored.
pub async fn end_session(db: &Database, token: &str) -> Result<()> {
    delete_session(db.pool(), token).await
}
