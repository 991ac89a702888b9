//! Email-token login, cookie session and outbound email flags.

use anyhow::{Result, bail};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

use crate::api::handlers::auth::Environment;

pub const ARG_COOKIE_SECRET: &str = "cookie-secret";
pub const ARG_ENVIRONMENT: &str = "environment";
pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_EMAIL_FROM: &str = "email-from";
pub const ARG_SENDGRID_API_KEY: &str = "sendgrid-api-key";
pub const ARG_EMAIL_TOKEN_TTL_SECONDS: &str = "email-token-ttl-seconds";
pub const ARG_API_TOKEN_TTL_SECONDS: &str = "api-token-ttl-seconds";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";

#[derive(Debug)]
pub struct Options {
    pub cookie_secret: SecretString,
    pub environment: Environment,
    pub frontend_base_url: String,
    pub email_from: String,
    pub sendgrid_api_key: Option<SecretString>,
    pub email_token_ttl_seconds: i64,
    pub api_token_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
}

impl Options {
    /// Parse auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a required value is missing or a TTL is not positive.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let get_non_empty = |id: &str| {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|value| !value.trim().is_empty())
        };

        let Some(cookie_secret) = get_non_empty(ARG_COOKIE_SECRET) else {
            bail!("missing required argument: --{ARG_COOKIE_SECRET}");
        };

        let environment: Environment = get_non_empty(ARG_ENVIRONMENT)
            .as_deref()
            .unwrap_or("production")
            .parse()?;

        let sendgrid_api_key = get_non_empty(ARG_SENDGRID_API_KEY).map(SecretString::from);
        if sendgrid_api_key.is_none() && !environment.is_development() {
            bail!(
                "missing required argument: --{ARG_SENDGRID_API_KEY} (only optional in development)"
            );
        }

        let ttl = |id: &str, default: i64| -> Result<i64> {
            let seconds = matches.get_one::<i64>(id).copied().unwrap_or(default);
            if seconds <= 0 {
                bail!("--{id} must be greater than zero");
            }
            Ok(seconds)
        };

        Ok(Self {
            cookie_secret: SecretString::from(cookie_secret),
            environment,
            frontend_base_url: get_non_empty(ARG_FRONTEND_BASE_URL)
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            email_from: get_non_empty(ARG_EMAIL_FROM)
                .unwrap_or_else(|| "noreply@rocco.app".to_string()),
            sendgrid_api_key,
            email_token_ttl_seconds: ttl(ARG_EMAIL_TOKEN_TTL_SECONDS, 600)?,
            api_token_ttl_seconds: ttl(ARG_API_TOKEN_TTL_SECONDS, 43_200)?,
            session_ttl_seconds: ttl(ARG_SESSION_TTL_SECONDS, 604_800)?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_session_args(command);
    with_email_args(command)
}

fn with_session_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_COOKIE_SECRET)
                .long(ARG_COOKIE_SECRET)
                .help("Secret used to sign session cookies (at least 32 bytes)")
                .env("ROCCO_COOKIE_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_ENVIRONMENT)
                .long(ARG_ENVIRONMENT)
                .help("Deployment environment; development drops the Secure cookie flag")
                .env("ROCCO_ENVIRONMENT")
                .default_value("production")
                .value_parser(["development", "staging", "production"]),
        )
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL allowed by CORS")
                .env("ROCCO_FRONTEND_BASE_URL")
                .default_value("http://localhost:3000"),
        )
        .arg(
            Arg::new(ARG_API_TOKEN_TTL_SECONDS)
                .long(ARG_API_TOKEN_TTL_SECONDS)
                .help("API token TTL in seconds")
                .env("ROCCO_API_TOKEN_TTL_SECONDS")
                .default_value("43200")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session cookie TTL in seconds")
                .env("ROCCO_SESSION_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
}

fn with_email_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_EMAIL_FROM)
                .long(ARG_EMAIL_FROM)
                .help("Sender address for login codes")
                .env("ROCCO_EMAIL_FROM")
                .default_value("noreply@rocco.app"),
        )
        .arg(
            Arg::new(ARG_SENDGRID_API_KEY)
                .long(ARG_SENDGRID_API_KEY)
                .help("SendGrid API key; without it codes are only logged (development)")
                .env("ROCCO_SENDGRID_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_EMAIL_TOKEN_TTL_SECONDS)
                .long(ARG_EMAIL_TOKEN_TTL_SECONDS)
                .help("Email login code TTL in seconds")
                .env("ROCCO_EMAIL_TOKEN_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64)),
        )
}
