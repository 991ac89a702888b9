use crate::{
    api::{self, ServiceSettings, handlers::auth},
    cli::telemetry,
    identity::BridgeConfig,
};
use anyhow::Result;
use secrecy::SecretString;
use tracing::{debug, info};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub redis_url: String,
    pub cookie_secret: SecretString,
    pub environment: auth::Environment,
    pub frontend_base_url: String,
    pub email_from: String,
    pub sendgrid_api_key: Option<SecretString>,
    pub identity_url: String,
    pub identity_api_key: SecretString,
    pub email_token_ttl_seconds: i64,
    pub api_token_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
    pub identity_cache_ttl_seconds: u64,
    pub user_cache_ttl_seconds: u64,
}

impl From<Args> for ServiceSettings {
    fn from(args: Args) -> Self {
        let auth_config = auth::AuthConfig::new(args.environment)
            .with_email_token_ttl_seconds(args.email_token_ttl_seconds)
            .with_api_token_ttl_seconds(args.api_token_ttl_seconds)
            .with_session_ttl_seconds(args.session_ttl_seconds);

        let bridge_config = BridgeConfig::new()
            .with_identity_ttl_seconds(args.identity_cache_ttl_seconds)
            .with_user_ttl_seconds(args.user_cache_ttl_seconds);

        Self {
            dsn: args.dsn,
            redis_url: args.redis_url,
            cookie_secret: args.cookie_secret,
            frontend_base_url: args.frontend_base_url,
            email_from: args.email_from,
            sendgrid_api_key: args.sendgrid_api_key,
            identity_url: args.identity_url,
            identity_api_key: args.identity_api_key,
            auth_config,
            bridge_config,
        }
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if a dependency cannot be reached or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let port = args.port;
    info!(environment = %args.environment, "starting rocco");
    debug!(
        email_token_ttl_seconds = args.email_token_ttl_seconds,
        api_token_ttl_seconds = args.api_token_ttl_seconds,
        session_ttl_seconds = args.session_ttl_seconds,
        "auth settings"
    );

    let result = api::new(port, ServiceSettings::from(args)).await;

    telemetry::shutdown_tracer();

    result
}
