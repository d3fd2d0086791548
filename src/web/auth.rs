use std::time::Duration;

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap};
use axum::response::{AppendHeaders, IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;
use tracing::{info, warn};

use super::AppState;
use crate::auth::{
    clear_cookie, cookie_value, end_session, generate_oauth_state, server_cookie, start_session,
    state_matches, OAUTH_STATE_COOKIE, SESSION_COOKIE,
};
use crate::error::{ForumError, Result};

/// How long a login attempt may take between `/login` and the callback.
const OAUTH_STATE_TTL: Duration = Duration::from_secs(600);

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", get(login))
        .route("/oauth2callback", get(oauth_callback))
        .route("/logout", get(logout))
}

/// GET /login - Send the browser to the identity provider.
async fn login(State(state): State<AppState>) -> Response {
    let oauth_state = generate_oauth_state();
    let url = state.identity.authorize_url(&oauth_state);
    let cookie = server_cookie(
        OAUTH_STATE_COOKIE,
        &oauth_state,
        OAUTH_STATE_TTL,
        state.config.cookie_secure,
    );

    (AppendHeaders([(header::SET_COOKIE, cookie)]), Redirect::to(&url)).into_response()
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// GET /oauth2callback - Finish login: verify state, exchange the code,
/// create the user on first login and start a session.
async fn oauth_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Result<Response> {
    if let Some(error) = params.error {
        warn!(error = %error, "Identity provider refused login");
        return Err(ForumError::Forbidden);
    }

    let expected = cookie_value(&headers, OAUTH_STATE_COOKIE).unwrap_or_default();
    let returned = params.state.unwrap_or_default();
    if expected.is_empty() || !state_matches(expected, &returned) {
        return Err(ForumError::BadRequest("login state mismatch".to_string()));
    }
    let code = params
        .code
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ForumError::BadRequest("missing authorization code".to_string()))?;

    let identity = state.identity.exchange(&code).await?;

    let users = state.db.users();
    let mut user = users
        .upsert_by_email(None, &identity.email, &identity.name)
        .await?;
    if !user.is_admin && state.config.is_admin_email(&user.email) {
        user = users.update_admin(None, &user, true).await?;
    }

    let session = start_session(&state.db, &user, state.config.session_ttl).await?;
    info!(user_id = user.id, email = %user.email, "User logged in");

    let secure = state.config.cookie_secure;
    Ok((
        AppendHeaders([
            (
                header::SET_COOKIE,
                server_cookie(SESSION_COOKIE, &session.token, state.config.session_ttl, secure),
            ),
            (header::SET_COOKIE, clear_cookie(OAUTH_STATE_COOKIE, secure)),
        ]),
        Redirect::to("/"),
    )
        .into_response())
}

/// GET /logout - End the session and clear its cookie.
async fn logout(State(state): State<AppState>, headers: HeaderMap) -> Result<Response> {
    if let Some(token) = cookie_value(&headers, SESSION_COOKIE) {
        end_session(&state.db, token).await?;
    }

    Ok((
        AppendHeaders([(
            header::SET_COOKIE,
            clear_cookie(SESSION_COOKIE, state.config.cookie_secure),
        )]),
        Redirect::to("/"),
    )
        .into_response())
}
