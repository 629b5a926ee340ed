// SPDX-License-Identifier: MPL-2.0

use std::env;
use thiserror::Error;

pub const APP_ID: &str = "skyref";
pub const USER_AGENT: &str = concat!("skyref/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_PDS: &str = "https://bsky.social";
pub const DEFAULT_APPVIEW: &str = "https://public.api.bsky.app";

pub const WEB_PROFILE_PREFIX: &str = "https://bsky.app/profile/";
pub const POST_COLLECTION: &str = "app.bsky.feed.post";

pub const USERNAME_VAR: &str = "BSKY_USERNAME";
pub const PASSWORD_VAR: &str = "BSKY_PASSWORD";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} is not set (export it or add it to .env)")]
    Missing(&'static str),
}

/// Login identifier and app password for the timeline.
#[derive(Clone)]
pub struct Credentials {
    pub identifier: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Read `BSKY_USERNAME` / `BSKY_PASSWORD`, loading `.env` first if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_values(env::var(USERNAME_VAR).ok(), env::var(PASSWORD_VAR).ok())
    }

    fn from_values(
        identifier: Option<String>,
        password: Option<String>,
    ) -> Result<Self, ConfigError> {
        let identifier = identifier
            .filter(|v| !v.trim().is_empty())
            .ok_or(ConfigError::Missing(USERNAME_VAR))?;
        let password = password
            .filter(|v| !v.is_empty())
            .ok_or(ConfigError::Missing(PASSWORD_VAR))?;

        Ok(Self {
            identifier: identifier.trim().trim_start_matches('@').to_string(),
            password,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_from_values() {
        let creds = Credentials::from_values(
            Some("@alice.bsky.social ".to_string()),
            Some("app-pass".to_string()),
        )
        .unwrap();
        assert_eq!(creds.identifier, "alice.bsky.social");
        assert_eq!(creds.password, "app-pass");
    }

    #[test]
    fn test_credentials_missing_username() {
        let err = Credentials::from_values(None, Some("x".to_string())).unwrap_err();
        assert_eq!(err, ConfigError::Missing(USERNAME_VAR));
        let err = Credentials::from_values(Some("  ".to_string()), Some("x".to_string()))
            .unwrap_err();
        assert_eq!(err, ConfigError::Missing(USERNAME_VAR));
    }

    #[test]
    fn test_credentials_missing_password() {
        let err = Credentials::from_values(Some("alice".to_string()), None).unwrap_err();
        assert_eq!(err, ConfigError::Missing(PASSWORD_VAR));
    }

    #[test]
    fn test_debug_redacts_password() {
        let creds =
            Credentials::from_values(Some("alice".to_string()), Some("hunter2".to_string()))
                .unwrap();
        assert!(!format!("{creds:?}").contains("hunter2"));
    }
}
