//! External identity provider and cache bridge flags.

use anyhow::{Result, bail};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_REDIS_URL: &str = "redis-url";
pub const ARG_IDENTITY_URL: &str = "identity-url";
pub const ARG_IDENTITY_API_KEY: &str = "identity-api-key";
pub const ARG_IDENTITY_CACHE_TTL_SECONDS: &str = "identity-cache-ttl-seconds";
pub const ARG_USER_CACHE_TTL_SECONDS: &str = "user-cache-ttl-seconds";

#[derive(Debug)]
pub struct Options {
    pub redis_url: String,
    pub identity_url: String,
    pub identity_api_key: SecretString,
    pub identity_cache_ttl_seconds: u64,
    pub user_cache_ttl_seconds: u64,
}

impl Options {
    /// Parse identity arguments from matches.
    ///
    /// # Errors
    /// Returns an error if a required value is missing or a TTL is zero.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let required = |id: &str| -> Result<String> {
            match matches.get_one::<String>(id) {
                Some(value) if !value.trim().is_empty() => Ok(value.clone()),
                _ => bail!("missing required argument: --{id}"),
            }
        };

        let ttl = |id: &str, default: u64| -> Result<u64> {
            let seconds = matches.get_one::<u64>(id).copied().unwrap_or(default);
            if seconds == 0 {
                bail!("--{id} must be greater than zero");
            }
            Ok(seconds)
        };

        Ok(Self {
            redis_url: required(ARG_REDIS_URL)?,
            identity_url: required(ARG_IDENTITY_URL)?,
            identity_api_key: SecretString::from(required(ARG_IDENTITY_API_KEY)?),
            identity_cache_ttl_seconds: ttl(ARG_IDENTITY_CACHE_TTL_SECONDS, 300)?,
            user_cache_ttl_seconds: ttl(ARG_USER_CACHE_TTL_SECONDS, 60)?,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_REDIS_URL)
                .long(ARG_REDIS_URL)
                .help("Redis URL for the identity cache (memory:// keeps it in process)")
                .env("ROCCO_REDIS_URL"),
        )
        .arg(
            Arg::new(ARG_IDENTITY_URL)
                .long(ARG_IDENTITY_URL)
                .help("Base URL of the external identity provider")
                .env("ROCCO_IDENTITY_URL"),
        )
        .arg(
            Arg::new(ARG_IDENTITY_API_KEY)
                .long(ARG_IDENTITY_API_KEY)
                .help("API key sent to the identity provider")
                .env("ROCCO_IDENTITY_API_KEY")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_IDENTITY_CACHE_TTL_SECONDS)
                .long(ARG_IDENTITY_CACHE_TTL_SECONDS)
                .help("How long a verified bearer token stays cached")
                .env("ROCCO_IDENTITY_CACHE_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_USER_CACHE_TTL_SECONDS)
                .long(ARG_USER_CACHE_TTL_SECONDS)
                .help("How long a resolved local user stays cached")
                .env("ROCCO_USER_CACHE_TTL_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64)),
        )
}
