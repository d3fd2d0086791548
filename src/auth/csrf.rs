use rand::{distributions::Alphanumeric, thread_rng, Rng};
use subtle::ConstantTimeEq;

/// Cookie holding the OAuth `state` between `/login` and the callback.
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// Generate the anti-forgery `state` value for an OAuth redirect.
pub fn generate_oauth_state() -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(32)
        .map(char::from)
        .collect()
}

/// Constant-time comparison of the returned `state` against the cookie.
#[must_use]
pub fn state_matches(expected: &str, returned: &str) -> bool {
    expected.as_bytes().ct_eq(returned.as_bytes()).into()
}
