//! Identity provider used by the login flow.
//!
//! The forum only needs an email address and a display name from the
//! provider; everything else about the exchange stays behind
//! [`IdentityProvider`].

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::OAuthSettings;

/// Who the provider says the visitor is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub email: String,
    pub name: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Where to send the browser to start a login, carrying `state` back.
    fn authorize_url(&self, state: &str) -> String;

    /// Trade the callback's authorization code for the visitor's identity.
    async fn exchange(&self, code: &str) -> Result<Identity>;
}

/// OAuth2 authorization-code flow against configurable endpoints.
pub struct OAuthProvider {
    client: Client,
    settings: OAuthSettings,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
    name: Option<String>,
}

impl OAuthProvider {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(settings: OAuthSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self { client, settings })
    }
}

#[async_trait]
impl IdentityProvider for OAuthProvider {
    fn authorize_url(&self, state: &str) -> String {
        let Ok(mut url) = Url::parse(&self.settings.authorize_url) else {
            // Validated at startup.
            return self.settings.authorize_url.clone();
        };
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.settings.client_id)
            .append_pair("redirect_uri", &self.settings.redirect_url)
            .append_pair("scope", "openid profile email")
            .append_pair("state", state);
        url.into()
    }

    async fn exchange(&self, code: &str) -> Result<Identity> {
        let token: TokenResponse = self
            .client
            .post(&self.settings.token_url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", self.settings.redirect_url.as_str()),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
            ])
            .send()
            .await
            .context("Token request failed")?
            .error_for_status()
            .context("Token endpoint returned an error")?
            .json()
            .await
            .context("Failed to parse token response")?;

        let info: UserInfo = self
            .client
            .get(&self.settings.userinfo_url)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .context("Userinfo request failed")?
            .error_for_status()
            .context("Userinfo endpoint returned an error")?
            .json()
            .await
            .context("Failed to parse userinfo response")?;

        let Some(email) = info.email.filter(|e| !e.trim().is_empty()) else {
            bail!("Identity provider did not return an email address");
        };
        let name = info
            .name
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| email.split('@').next().unwrap_or(&email).to_string());

        debug!(email = %email, "Identity provider exchange complete");
        Ok(Identity { email, name })
    }
}
