use crate::{
    api::handlers::{auth, health, root},
    identity::{
        BridgeConfig, IdentityBridge, MemoryCache, PgUserDirectory, RedisCache, SupabaseProvider,
        cache::Cache,
    },
};
use anyhow::{Context, Result, anyhow};
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{
        HeaderName, HeaderValue, Method, Request,
        header::{AUTHORIZATION, CONTENT_TYPE},
    },
    routing::{get, options},
};
use secrecy::SecretString;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tokio::{
    net::TcpListener,
    signal::{
        ctrl_c,
        unix::{SignalKind, signal},
    },
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::PropagateRequestIdLayer,
    set_header::SetRequestHeaderLayer,
    trace::TraceLayer,
};
use tracing::{Span, error, info, info_span, warn};
use ulid::Ulid;
use url::Url;
use utoipa_axum::router::OpenApiRouter;

pub mod email;
pub mod handlers;
// OpenAPI router wiring and route registration live in openapi.rs.
mod openapi;

pub use openapi::openapi;

/// `--redis-url` value that selects the in-process cache.
pub const MEMORY_CACHE_URL: &str = "memory://";

/// Build the API router with all documented routes registered.
#[must_use]
pub fn router() -> OpenApiRouter {
    openapi::api_router()
}

/// Everything needed to connect the shared services at start.
#[derive(Debug)]
pub struct ServiceSettings {
    pub dsn: String,
    pub redis_url: String,
    pub cookie_secret: SecretString,
    pub frontend_base_url: String,
    pub email_from: String,
    pub sendgrid_api_key: Option<SecretString>,
    pub identity_url: String,
    pub identity_api_key: SecretString,
    pub auth_config: auth::AuthConfig,
    pub bridge_config: BridgeConfig,
}

/// Shared, long-lived handles injected into every route.
#[derive(Clone)]
pub struct Services {
    pool: PgPool,
    auth_state: Arc<auth::AuthState>,
    bridge: Arc<IdentityBridge>,
}

impl Services {
    /// Connect the database, cache, email sender and identity provider.
    ///
    /// # Errors
    /// Returns an error if any dependency is misconfigured or unreachable.
    pub async fn connect(settings: ServiceSettings) -> Result<Self> {
        let session_key = auth::SessionKey::new(&settings.cookie_secret)?;

        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(5)
            .max_lifetime(Duration::from_secs(60 * 2))
            .test_before_acquire(true)
            .connect(&settings.dsn)
            .await
            .context("Failed to connect to database")?;

        let cache: Arc<dyn Cache> = if settings.redis_url == MEMORY_CACHE_URL {
            warn!("Using the in-process identity cache");
            Arc::new(MemoryCache::new())
        } else {
            Arc::new(
                RedisCache::connect(&settings.redis_url)
                    .await
                    .context("Failed to connect to Redis")?,
            )
        };

        let email_sender: Arc<dyn email::EmailSender> = match settings.sendgrid_api_key {
            Some(api_key) => Arc::new(email::SendGridSender::new(api_key, &settings.email_from)?),
            None if settings.auth_config.environment().is_development() => {
                warn!("No SendGrid API key; login codes are only logged");
                Arc::new(email::LogEmailSender)
            }
            None => return Err(anyhow!("SendGrid API key is required outside development")),
        };

        let provider = SupabaseProvider::new(&settings.identity_url, settings.identity_api_key)?;
        let bridge = IdentityBridge::new(
            settings.bridge_config,
            cache,
            Arc::new(provider),
            Arc::new(PgUserDirectory::new(pool.clone())),
        );

        let auth_state = auth::AuthState::new(settings.auth_config, session_key, email_sender);

        Ok(Self::from_parts(pool, Arc::new(auth_state), Arc::new(bridge)))
    }

    #[must_use]
    pub fn from_parts(
        pool: PgPool,
        auth_state: Arc<auth::AuthState>,
        bridge: Arc<IdentityBridge>,
    ) -> Self {
        Self {
            pool,
            auth_state,
            bridge,
        }
    }

    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Close the database pool; in-flight queries finish first.
    pub async fn shutdown(&self) {
        self.pool.close().await;
        info!("Database pool closed");
    }
}

/// Build the full application: documented routes, extras and middleware.
///
/// # Errors
/// Returns an error if the frontend base URL is invalid.
pub fn app(services: &Services, frontend_base_url: &str) -> Result<Router> {
    let cors = CorsLayer::new()
        .allow_headers([CONTENT_TYPE, AUTHORIZATION])
        .allow_methods([Method::GET, Method::POST])
        .allow_origin(AllowOrigin::exact(frontend_origin(frontend_base_url)?))
        .allow_credentials(true);

    // Documented routes come from openapi.rs; `/` and preflight-only
    // `OPTIONS /health` are added here and stay out of the document.
    let (router, _openapi) = router().split_for_parts();
    Ok(router
        .route("/", get(root::root))
        .route("/health", options(health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(cors)
                .layer(Extension(services.auth_state.clone()))
                .layer(Extension(services.bridge.clone()))
                .layer(Extension(services.pool.clone())),
        ))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, settings: ServiceSettings) -> Result<()> {
    let frontend_base_url = settings.frontend_base_url.clone();
    let services = Services::connect(settings).await?;
    let app = app(&services, &frontend_base_url)?;

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    let served = axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await;

    services.shutdown().await;
    served?;
    info!("Gracefully shutdown");

    Ok(())
}

async fn shutdown_signal() {
    let interrupt = async {
        if let Err(err) = ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {err}");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(err) => {
                error!("Failed to install SIGTERM handler: {err}");
                std::future::pending::<()>().await;
            }
        }
    };

    tokio::select! {
        () = interrupt => {},
        () = terminate => {},
    }
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}

fn frontend_origin(frontend_base_url: &str) -> Result<HeaderValue> {
    let parsed = Url::parse(frontend_base_url)
        .with_context(|| format!("Invalid frontend base URL: {frontend_base_url}"))?;
    let host = parsed.host_str().ok_or_else(|| {
        anyhow!("Frontend base URL must include a valid host: {frontend_base_url}")
    })?;
    let port = parsed
        .port()
        .map_or_else(String::new, |port| format!(":{port}"));
    let origin = format!("{}://{}{}", parsed.scheme(), host, port);
    HeaderValue::from_str(&origin).context("Failed to build frontend origin header")
}
