use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Database
    pub database_path: PathBuf,

    // Web Server
    pub web_host: String,
    pub web_port: u16,

    // Sessions
    pub session_ttl: Duration,
    pub session_cleanup_interval: Duration,
    pub cookie_secure: bool,

    // Users whose email is listed here are promoted to admin on login
    pub admin_emails: Vec<String>,

    // OAuth2 identity provider
    pub oauth: OAuthSettings,
}

/// Endpoints and credentials for the OAuth2 authorization-code flow.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
    pub authorize_url: String,
    pub token_url: String,
    pub userinfo_url: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Database
            database_path: PathBuf::from(env_or_default("DATABASE_PATH", "./data/forum.sqlite")),

            // Web Server
            web_host: env_or_default("WEB_HOST", "0.0.0.0"),
            web_port: parse_env_u16("WEB_PORT", 8000)?,

            // Sessions
            session_ttl: Duration::from_secs(parse_env_u64("SESSION_TTL_SECS", 2_592_000)?),
            session_cleanup_interval: Duration::from_secs(parse_env_u64(
                "SESSION_CLEANUP_INTERVAL_SECS",
                3600,
            )?),
            cookie_secure: parse_env_bool("COOKIE_SECURE", false)?,

            admin_emails: parse_email_list(&env_or_default("ADMIN_EMAILS", "")),

            // OAuth2
            oauth: OAuthSettings {
                client_id: required_env("OAUTH_CLIENT_ID")?,
                client_secret: required_env("OAUTH_CLIENT_SECRET")?,
                redirect_url: env_or_default(
                    "OAUTH_REDIRECT_URL",
                    "http://localhost:8000/oauth2callback",
                ),
                authorize_url: required_env("OAUTH_AUTHORIZE_URL")?,
                token_url: required_env("OAUTH_TOKEN_URL")?,
                userinfo_url: required_env("OAUTH_USERINFO_URL")?,
            },
        })
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.session_ttl.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "SESSION_TTL_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.session_cleanup_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                name: "SESSION_CLEANUP_INTERVAL_SECS".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        for (name, value) in [
            ("OAUTH_REDIRECT_URL", &self.oauth.redirect_url),
            ("OAUTH_AUTHORIZE_URL", &self.oauth.authorize_url),
            ("OAUTH_TOKEN_URL", &self.oauth.token_url),
            ("OAUTH_USERINFO_URL", &self.oauth.userinfo_url),
        ] {
            if let Err(e) = url::Url::parse(value) {
                return Err(ConfigError::InvalidValue {
                    name: name.to_string(),
                    message: format!("not a valid URL: {e}"),
                });
            }
        }
        Ok(())
    }

    /// Defaults suitable for tests: no env access, placeholder OAuth endpoints.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            database_path: PathBuf::from("./data/test.sqlite"),
            web_host: "127.0.0.1".to_string(),
            web_port: 0,
            session_ttl: Duration::from_secs(3600),
            session_cleanup_interval: Duration::from_secs(3600),
            cookie_secure: false,
            admin_emails: Vec::new(),
            oauth: OAuthSettings {
                client_id: "test-client".to_string(),
                client_secret: "test-secret".to_string(),
                redirect_url: "http://localhost:8000/oauth2callback".to_string(),
                authorize_url: "https://id.example.com/authorize".to_string(),
                token_url: "https://id.example.com/oauth/token".to_string(),
                userinfo_url: "https://id.example.com/userinfo".to_string(),
            },
        }
    }

    /// Whether the given (already lowercased) email is configured as an admin.
    #[must_use]
    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.iter().any(|e| e == email)
    }
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(name.to_string()))
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_u16(name: &str, default: u16) -> Result<u16, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

fn parse_email_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|e| e.trim().to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_email_list() {
        assert_eq!(
            parse_email_list(" Admin@Example.com, ,mod@example.com "),
            vec!["admin@example.com", "mod@example.com"]
        );
        assert!(parse_email_list("").is_empty());
    }

    #[test]
    fn test_parse_bool() {
        assert!(parse_env_bool("NONEXISTENT_VAR", true).unwrap());
        assert!(!parse_env_bool("NONEXISTENT_VAR", false).unwrap());
    }
}
