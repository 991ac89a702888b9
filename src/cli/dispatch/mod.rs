//! Maps validated CLI matches to the action the binary runs.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{ARG_DSN, ARG_PORT, auth, identity};
use anyhow::{Context, Result};

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>(ARG_DSN)
        .cloned()
        .context("missing required argument: --dsn")?;

    let auth_opts = auth::Options::parse(matches)?;
    let identity_opts = identity::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        redis_url: identity_opts.redis_url,
        cookie_secret: auth_opts.cookie_secret,
        environment: auth_opts.environment,
        frontend_base_url: auth_opts.frontend_base_url,
        email_from: auth_opts.email_from,
        sendgrid_api_key: auth_opts.sendgrid_api_key,
        identity_url: identity_opts.identity_url,
        identity_api_key: identity_opts.identity_api_key,
        email_token_ttl_seconds: auth_opts.email_token_ttl_seconds,
        api_token_ttl_seconds: auth_opts.api_token_ttl_seconds,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
        identity_cache_ttl_seconds: identity_opts.identity_cache_ttl_seconds,
        user_cache_ttl_seconds: identity_opts.user_cache_ttl_seconds,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::handlers::auth::Environment;
    use secrecy::ExposeSecret;

    const BASE_ENV: [(&str, Option<&str>); 7] = [
        ("ROCCO_DSN", Some("postgres://rocco@localhost:5432/rocco")),
        ("ROCCO_REDIS_URL", Some("redis://localhost:6379")),
        (
            "ROCCO_COOKIE_SECRET",
            Some("0123456789abcdef0123456789abcdef"),
        ),
        ("ROCCO_IDENTITY_URL", Some("https://id.rocco.app")),
        ("ROCCO_IDENTITY_API_KEY", Some("anon-key")),
        ("ROCCO_ENVIRONMENT", None),
        ("ROCCO_SENDGRID_API_KEY", None),
    ];

    fn dispatch(args: &[&str]) -> Result<Action> {
        let matches = crate::cli::commands::new().try_get_matches_from(args)?;
        handler(&matches)
    }

    fn error_text(result: Result<Action>) -> String {
        match result {
            Ok(action) => format!("unexpected action: {action:?}"),
            Err(err) => err.to_string(),
        }
    }

    #[test]
    fn production_requires_sendgrid_key() {
        temp_env::with_vars(BASE_ENV, || {
            let message = error_text(dispatch(&["rocco"]));
            assert!(message.contains("--sendgrid-api-key"), "{message}");
        });
    }

    #[test]
    fn development_builds_server_args() -> Result<()> {
        temp_env::with_vars(BASE_ENV, || {
            let Action::Server(args) = dispatch(&[
                "rocco",
                "--environment",
                "development",
                "--port",
                "3001",
                "--user-cache-ttl-seconds",
                "30",
            ])?;
            assert_eq!(args.port, 3001);
            assert_eq!(args.environment, Environment::Development);
            assert!(args.sendgrid_api_key.is_none());
            assert_eq!(args.redis_url, "redis://localhost:6379");
            assert_eq!(args.identity_api_key.expose_secret(), "anon-key");
            assert_eq!(args.email_token_ttl_seconds, 600);
            assert_eq!(args.api_token_ttl_seconds, 43_200);
            assert_eq!(args.session_ttl_seconds, 604_800);
            assert_eq!(args.identity_cache_ttl_seconds, 300);
            assert_eq!(args.user_cache_ttl_seconds, 30);
            assert_eq!(args.email_from, "noreply@rocco.app");
            Ok(())
        })
    }

    #[test]
    fn missing_cookie_secret_fails() {
        temp_env::with_vars(BASE_ENV, || {
            temp_env::with_vars([("ROCCO_COOKIE_SECRET", None::<&str>)], || {
                let message = error_text(dispatch(&["rocco", "--sendgrid-api-key", "sg-key"]));
                assert!(message.contains("--cookie-secret"), "{message}");
            });
        });
    }

    #[test]
    fn missing_identity_url_fails() {
        temp_env::with_vars(BASE_ENV, || {
            temp_env::with_vars([("ROCCO_IDENTITY_URL", None::<&str>)], || {
                let message = error_text(dispatch(&["rocco", "--sendgrid-api-key", "sg-key"]));
                assert!(message.contains("--identity-url"), "{message}");
            });
        });
    }

    #[test]
    fn zero_ttl_fails() {
        temp_env::with_vars(BASE_ENV, || {
            let message = error_text(dispatch(&[
                "rocco",
                "--sendgrid-api-key",
                "sg-key",
                "--session-ttl-seconds",
                "0",
            ]));
            assert!(message.contains("--session-ttl-seconds"), "{message}");
        });
    }
}
