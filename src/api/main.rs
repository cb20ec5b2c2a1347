mod app_middleware;
mod routes;

use actix_cors::Cors;
use actix_governor::GovernorConfigBuilder;
use actix_web::{web, App, HttpServer};
use app_middleware::{
    CorrelationIdMiddleware, MetricsMiddleware, RequestLogger, SecurityHeaders,
    SentryContextMiddleware, TracingMiddleware,
};
use std::sync::Arc;
use ward::service::auth_service::CreateUserInput;
use ward::service::{
    AuthenticationService, LockoutAccountant, MasterKeyCoordinator, OAuthBridge,
    OAuthProviderRegistry, SessionManager, TwoFactorCore, VerificationTokenService, WebAuthnCore,
};
use ward::storage::cache_ceremony::CachedCeremonyStore;
use ward::storage::postgres::{
    PgCredentialSetStore, PgLoginAttemptStore, PgMasterKeyStore, PgSessionStore,
    PgSingleUseTokenStore, PgTwoFactorStore, PgUserStore,
};
use ward::storage::{CeremonyStore, UserStore};
use ward::{CacheManager, Config, Database, EncryptionManager, JwtManager, Metrics};

/// How long a WebAuthn ceremony or OAuth CSRF state survives in the cache
/// between the begin/initiate call and the matching finish/callback.
const CEREMONY_TTL_SECS: u64 = 300;

pub struct AppState {
    pub db: Database,
    pub auth: Arc<AuthenticationService>,
    pub oauth_providers: Arc<OAuthProviderRegistry>,
    pub oauth_state: Arc<dyn CeremonyStore>,
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    ward::load_env();

    let config = Config::from_env();
    config.validate().expect("invalid configuration");

    // Initialize OpenTelemetry tracing
    let tracer_provider =
        ward::tracing::init_tracer().expect("Failed to initialize OpenTelemetry");

    // Register provider globally (must be done before creating subscriber)
    opentelemetry::global::set_tracer_provider(tracer_provider.clone());

    let subscriber = ward::tracing::create_tracing_subscriber();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    tracing::info!(
        endpoint = %config.observability.otel_endpoint.clone().unwrap_or_else(|| "http://localhost:4317".to_string()),
        "OpenTelemetry distributed tracing initialized"
    );

    // Initialize Sentry for error tracking
    let _guard = init_sentry(&config);

    tracing::info!("Connecting to database...");
    let db = Database::connect(&config.database.url)
        .await
        .expect("Failed to connect to database");

    tracing::info!("Running migrations...");
    db.run_migrations().await.expect("Failed to run migrations");

    let users: Arc<dyn UserStore> = Arc::new(PgUserStore::new(db.pool.clone()));
    let sessions_store = Arc::new(PgSessionStore::new(db.pool.clone()));
    let login_attempts = Arc::new(PgLoginAttemptStore::new(db.pool.clone()));
    let master_keys_store = Arc::new(PgMasterKeyStore::new(db.pool.clone()));
    let two_factor_store = Arc::new(PgTwoFactorStore::new(db.pool.clone()));
    let credential_sets = Arc::new(PgCredentialSetStore::new(db.pool.clone()));
    let single_use_tokens = Arc::new(PgSingleUseTokenStore::new(db.pool.clone()));

    // Initialize cache manager. If Redis is unavailable the application
    // still starts, but ceremonies/OAuth state/sessions lose their cache.
    let cache = CacheManager::new().await.unwrap_or_else(|e| {
        tracing::error!(
            "Failed to initialize cache manager: {}. Application will continue without caching.",
            e
        );
        panic!("Cache manager initialization failed. Please ensure Redis is running or set CACHE_ENABLED=false in environment.");
    });

    let ceremonies: Arc<dyn CeremonyStore> =
        Arc::new(CachedCeremonyStore::new(cache, CEREMONY_TTL_SECS));

    let jwt = Arc::new(JwtManager::new(
        config.jwt.secret.clone(),
        config.jwt.access_ttl_minutes,
        config.jwt.refresh_ttl_hours,
    ));
    let encryption = EncryptionManager::new();

    let lockout = LockoutAccountant::new(login_attempts, config.lockout.clone());
    let session_manager = SessionManager::new(sessions_store, users.clone(), jwt.clone());
    let master_key_coordinator = MasterKeyCoordinator::new(master_keys_store);
    let oauth_bridge = OAuthBridge::new(users.clone());
    let token_service = VerificationTokenService::new(single_use_tokens, config.tokens.clone());
    let two_factor_core =
        TwoFactorCore::new(two_factor_store, encryption, config.totp.clone());

    let webauthn = match WebAuthnCore::new(
        &config.webauthn,
        credential_sets,
        ceremonies.clone(),
        users.clone(),
    ) {
        Ok(core) => Some(core),
        Err(e) => {
            tracing::warn!(error = %e, "WebAuthn relying party not configured, passkey endpoints disabled");
            None
        }
    };

    // Per-provider config errors are skipped (and logged) inside `new`
    // itself; this only fails for reasons unrelated to provider config.
    let oauth_providers = Arc::new(
        OAuthProviderRegistry::new(&config.oauth).expect("failed to build OAuth provider registry"),
    );

    let auth = Arc::new(AuthenticationService::new(
        users.clone(),
        lockout,
        session_manager,
        master_key_coordinator,
        oauth_bridge,
        token_service,
        two_factor_core,
        webauthn,
        config.tokens.clone(),
    ));

    // Seed default admin if env vars are set
    if let Some(admin) = &config.admin {
        if let Err(e) = seed_default_admin(&users, &auth, admin).await {
            tracing::warn!("Failed to seed default admin: {}", e);
        }
    }

    let state = Arc::new(AppState {
        db,
        auth,
        oauth_providers,
        oauth_state: ceremonies,
    });

    // Initialize metrics
    let metrics = Arc::new(Metrics::new().expect("Failed to create metrics registry"));

    let host = config.api.host.clone();
    let port = config.api.port;
    tracing::info!("Starting Ward API server at http://{}:{}", host, port);
    tracing::info!("Rate limiting: 100 requests/minute per IP globally");
    tracing::info!("Metrics endpoint: http://{}:{}/metrics", host, port);

    let cors_allowed_origins = config.api.cors_allowed_origins.clone();

    let server = HttpServer::new(move || {
        let mut cors = Cors::default()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        cors = match &cors_allowed_origins {
            Some(origins) => origins.iter().fold(cors, |c, origin| c.allowed_origin(origin)),
            None => cors.allow_any_origin(),
        };

        // Global API rate limiter: 100 requests per minute per IP
        let governor_conf = GovernorConfigBuilder::default()
            .requests_per_second(2) // ~120 per minute
            .burst_size(20) // Allow bursts of 20 requests
            .finish()
            .expect("static governor config is always valid");

        App::new()
            .wrap(cors)
            .wrap(sentry_actix::Sentry::new()) // Error tracking with Sentry
            .wrap(SecurityHeaders) // Add security headers
            .wrap(CorrelationIdMiddleware) // Generate/extract correlation ID
            .wrap(TracingMiddleware) // OpenTelemetry distributed tracing
            .wrap(SentryContextMiddleware) // Enrich Sentry events with context
            .wrap(RequestLogger) // Structured request logging with correlation IDs
            .wrap(MetricsMiddleware::new(metrics.clone())) // Collect Prometheus metrics
            .wrap(actix_governor::Governor::new(&governor_conf)) // Apply rate limiting
            .app_data(web::Data::new(state.clone()))
            .app_data(web::Data::new(metrics.clone()))
            .configure(routes::configure)
    })
    .bind((host.as_str(), port))?
    .run();

    let result = server.await;

    tracing::info!("Shutting down OpenTelemetry tracer provider");
    ward::tracing::shutdown_tracer_provider(tracer_provider);

    result
}

/// Configures Sentry with environment, release, and sampling rates scaled
/// down outside local/dev. No-op client if `SENTRY_DSN` isn't set.
fn init_sentry(config: &ward::Config) -> sentry::ClientInitGuard {
    let sentry_dsn = config.observability.sentry_dsn.clone();

    if sentry_dsn.is_none() {
        tracing::info!("Sentry DSN not configured - error tracking disabled");
        return sentry::init(sentry::ClientOptions::default());
    }

    let environment = config.app_env.clone();
    let release = format!("ward@{}", env!("CARGO_PKG_VERSION"));

    let (error_sample_rate, traces_sample_rate) = match environment.as_str() {
        "production" | "prod" => (1.0, 0.1),
        "staging" => (1.0, 0.5),
        _ => (1.0, 1.0),
    };

    let guard = sentry::init((
        sentry_dsn,
        sentry::ClientOptions {
            release: Some(release.into()),
            environment: Some(environment.clone().into()),
            sample_rate: error_sample_rate,
            traces_sample_rate,
            attach_stacktrace: true,
            send_default_pii: false,
            before_send: Some(Arc::new(|event| Some(event))),
            ..Default::default()
        },
    ));

    tracing::info!(environment = %environment, "Sentry error tracking initialized");

    guard
}

/// Seeds a default admin user from `ADMIN_USERNAME`/`ADMIN_PASSWORD` if
/// configured and no such user exists yet.
async fn seed_default_admin(
    users: &Arc<dyn UserStore>,
    auth: &AuthenticationService,
    admin: &ward::common::config::AdminConfig,
) -> ward::Result<()> {
    if users.get_by_username(&admin.email).await?.is_some() {
        tracing::debug!("Default admin user already exists");
        return Ok(());
    }

    let email = if admin.email.contains('@') {
        admin.email.clone()
    } else {
        format!("{}@local", admin.email)
    };

    tracing::info!(username = %admin.email, "Creating default admin user");

    auth.create_user(CreateUserInput {
        username: admin.email.clone(),
        email,
        password: admin.password.clone(),
        role: "admin".to_string(),
    })
    .await?;

    tracing::info!("Default admin user created successfully");
    Ok(())
}
