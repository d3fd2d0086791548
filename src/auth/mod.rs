pub mod cleanup;
pub mod csrf;
pub mod provider;
pub mod session;

pub use csrf::{generate_oauth_state, state_matches, OAUTH_STATE_COOKIE};
pub use provider::{Identity, IdentityProvider, OAuthProvider};
pub use session::{
    clear_cookie, cookie_value, end_session, generate_session_token, resolve_session,
    server_cookie, start_session, SESSION_COOKIE,
};
