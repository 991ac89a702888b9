//! Auth state and configuration.

use anyhow::{Result, anyhow};
use std::{fmt, str::FromStr, sync::Arc};

use super::session::SessionKey;
use crate::api::email::EmailSender;

const DEFAULT_EMAIL_TOKEN_TTL_SECONDS: i64 = 10 * 60;
const DEFAULT_API_TOKEN_TTL_SECONDS: i64 = 12 * 60 * 60;
const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// Deployment environment; only `Development` relaxes the `Secure` cookie flag.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    #[must_use]
    pub const fn is_development(self) -> bool {
        matches!(self, Self::Development)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Environment {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "staging" => Ok(Self::Staging),
            "production" | "prod" => Ok(Self::Production),
            other => Err(anyhow!("unknown environment: {other}")),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    environment: Environment,
    email_token_ttl_seconds: i64,
    api_token_ttl_seconds: i64,
    session_ttl_seconds: i64,
}

impl AuthConfig {
    #[must_use]
    pub fn new(environment: Environment) -> Self {
        Self {
            environment,
            email_token_ttl_seconds: DEFAULT_EMAIL_TOKEN_TTL_SECONDS,
            api_token_ttl_seconds: DEFAULT_API_TOKEN_TTL_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_email_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.email_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_api_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.api_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn environment(&self) -> Environment {
        self.environment
    }

    #[must_use]
    pub fn email_token_ttl_seconds(&self) -> i64 {
        self.email_token_ttl_seconds
    }

    #[must_use]
    pub fn api_token_ttl_seconds(&self) -> i64 {
        self.api_token_ttl_seconds
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(crate) fn session_cookie_secure(&self) -> bool {
        !self.environment.is_development()
    }
}

pub struct AuthState {
    config: AuthConfig,
    session_key: SessionKey,
    email_sender: Arc<dyn EmailSender>,
}

impl AuthState {
    pub fn new(
        config: AuthConfig,
        session_key: SessionKey,
        email_sender: Arc<dyn EmailSender>,
    ) -> Self {
        Self {
            config,
            session_key,
            email_sender,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }

    pub(crate) fn email_sender(&self) -> &dyn EmailSender {
        self.email_sender.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::{AuthConfig, Environment};

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new(Environment::Production);

        assert_eq!(
            config.email_token_ttl_seconds(),
            super::DEFAULT_EMAIL_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.api_token_ttl_seconds(),
            super::DEFAULT_API_TOKEN_TTL_SECONDS
        );
        assert_eq!(config.session_ttl_seconds(), 604_800);
        assert!(config.session_cookie_secure());

        let config = config
            .with_email_token_ttl_seconds(120)
            .with_api_token_ttl_seconds(3600)
            .with_session_ttl_seconds(60);

        assert_eq!(config.email_token_ttl_seconds(), 120);
        assert_eq!(config.api_token_ttl_seconds(), 3600);
        assert_eq!(config.session_ttl_seconds(), 60);
    }

    #[test]
    fn development_cookies_are_not_secure() {
        let config = AuthConfig::new(Environment::Development);
        assert!(!config.session_cookie_secure());
        assert!(AuthConfig::new(Environment::Staging).session_cookie_secure());
    }

    #[test]
    fn environment_parses_aliases() {
        assert_eq!("dev".parse::<Environment>().ok(), Some(Environment::Development));
        assert_eq!(
            " Production ".parse::<Environment>().ok(),
            Some(Environment::Production)
        );
        assert_eq!("staging".parse::<Environment>().ok(), Some(Environment::Staging));
        assert!("qa".parse::<Environment>().is_err());
    }
}
