use account_service::config::Config;
use account_service::crypto::LoginCodeHasher;
use account_service::models::Provider;
use account_service::observability::metrics::init_metrics_exporter;
use account_service::redis::{RedisCodeCache, RedisEventNotifier};
use account_service::repositories::{PgAccountRepository, PgIdentityStore};
use account_service::services::identity_service::{ProviderRegistry, UserinfoProvider};
use account_service::services::mail_client::HttpMailClient;
use account_service::services::profile_client::HttpProfileClient;
use account_service::services::token_service::TokenIssuer;
use account_service::services::{AccountService, AccountSettings, Collaborators, Deadline};
use chrono::Utc;
use common::secret::ExposeSecret;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Upper bound for one purge sweep.
const PURGE_SWEEP_DEADLINE: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "account_service=debug,account_lifecycle=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting account lifecycle service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Configuration loaded successfully");

    init_metrics_exporter(&config.metrics_bind_address).map_err(|e| {
        error!("Failed to initialize metrics: {}", e);
        e
    })?;

    // Initialize database connection pool
    info!("Connecting to database...");
    let db_pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .map_err(|e| {
            error!("Failed to connect to database: {}", e);
            e
        })?;

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| {
            error!("Failed to run migrations: {}", e);
            e
        })?;

    info!("Database connection established");

    let code_cache = RedisCodeCache::connect(&config.redis_url)
        .await
        .map_err(|e| {
            error!("Failed to connect code cache: {}", e);
            e
        })?;
    let events = RedisEventNotifier::connect(&config.redis_url, &config.lifecycle_event_stream)
        .await
        .map_err(|e| {
            error!("Failed to connect lifecycle event stream: {}", e);
            e
        })?;

    info!("Redis connections established");

    let mut providers = ProviderRegistry::new();
    for provider in Provider::ALL {
        if let Some(url) = config.provider_userinfo_urls.get(&provider) {
            providers = providers.with_provider(
                provider,
                Arc::new(UserinfoProvider::new(provider, url.clone())?),
            );
            info!(provider = provider.as_str(), "Identity provider configured");
        }
    }

    let collaborators = Collaborators {
        accounts: Arc::new(PgAccountRepository::new(db_pool.clone())),
        identities: Arc::new(PgIdentityStore::new(db_pool)),
        profiles: Arc::new(HttpProfileClient::new(config.profile_service_url.clone())?),
        events: Arc::new(events),
        mail: Arc::new(HttpMailClient::new(config.mail_service_url.clone())?),
        code_cache: Arc::new(code_cache),
    };

    let service = Arc::new(AccountService::new(
        collaborators,
        providers,
        Arc::new(TokenIssuer::from_config(&config)?),
        Arc::new(LoginCodeHasher::new(
            config.login_code_hash_key.expose_secret(),
        )),
        AccountSettings::from_config(&config),
    ));

    let cancel_token = CancellationToken::new();
    let sweeper = tokio::spawn(run_purge_sweeper(
        Arc::clone(&service),
        config.purge_interval,
        cancel_token.clone(),
    ));

    info!("Account lifecycle service ready");

    shutdown_signal().await;

    cancel_token.cancel();
    if let Err(e) = sweeper.await {
        warn!("Purge sweeper did not shut down cleanly: {}", e);
    }

    info!("Account lifecycle service shutdown complete");

    Ok(())
}

/// Periodically hard-delete archived accounts past their retention period.
async fn run_purge_sweeper(
    service: Arc<AccountService>,
    interval: Duration,
    cancel_token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            () = cancel_token.cancelled() => {
                info!("Purge sweeper: Shutting down");
                break;
            }
            _ = ticker.tick() => {
                let deadline = Deadline::after(PURGE_SWEEP_DEADLINE);
                if let Err(e) = service.purge_expired(Utc::now(), deadline).await {
                    warn!(error = %e, "Purge sweeper: Sweep failed, will retry");
                }
            }
        }
    }
}

/// Listens for shutdown signals (SIGTERM, SIGINT).
async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Received SIGINT, starting graceful shutdown..."),
            Err(e) => error!("Failed to listen for SIGINT: {}", e),
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received SIGTERM, starting graceful shutdown...");
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
