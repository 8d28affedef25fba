use axum::routing::get;
use identity_service::{
    build_router,
    config::{EmailConfig, IdentityConfig, StorageConfig},
    services::{
        create_rate_limiter, BackgroundQueue, Clock, DiskStorage, EmailProvider, NoneEmail,
        NoneGeolocation, NoneStorage, PgStore, SmtpEmailService, SnowflakeGenerator,
        StorageProvider, SystemClock,
    },
    AppState, Collaborators,
};
use service_core::error::AppError;
use service_core::observability::{logging::init_tracing, metrics::init_metrics};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Fail fast on invalid configuration
    let config = IdentityConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );
    let metrics = init_metrics().map_err(AppError::ConfigError)?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting identity service"
    );

    let store = PgStore::connect(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout,
    )
    .await?;
    store.run_migrations().await?;
    tracing::info!("Database initialized successfully");

    let ids = SnowflakeGenerator::new(config.machine_id)
        .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e)))?;

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let rate_limiter = create_rate_limiter(&config.rate_limit, clock.clone()).await?;
    tracing::info!(provider = ?config.rate_limit, "Rate limiter initialized");

    let email: Arc<dyn EmailProvider> = match &config.email {
        EmailConfig::None => {
            tracing::warn!("Email disabled, notifications will only be logged");
            Arc::new(NoneEmail)
        }
        EmailConfig::Smtp(smtp) => Arc::new(SmtpEmailService::new(smtp)?),
    };
    let storage: Arc<dyn StorageProvider> = match &config.storage {
        StorageConfig::None => Arc::new(NoneStorage),
        StorageConfig::Disk { path } => Arc::new(DiskStorage::new(path.clone())),
    };

    let (background, worker) = BackgroundQueue::start(config.background_queue_capacity);

    let state = AppState::new(
        config.http.clone(),
        Collaborators {
            store: Arc::new(store),
            clock,
            ids: Arc::new(ids),
            rate_limiter,
            email,
            storage,
            geolocation: Arc::new(NoneGeolocation),
            background,
            totp_issuer: config.totp_issuer.clone(),
        },
    );

    let app = build_router(state)?.route(
        "/metrics",
        get(move || {
            let metrics = metrics.clone();
            async move { metrics.render() }
        }),
    );

    let addr = config.common.socket_addr();

    let service_span = tracing::info_span!(
        "service",
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
    );
    let _guard = service_span.enter();

    tracing::info!(address = %addr, "Listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    // The router held the last queue handles, so the worker drains and exits
    if let Err(e) = worker.await {
        tracing::warn!(error = %e, "Background worker did not shut down cleanly");
    }

    tracing::info!("Service shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, starting graceful shutdown");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        },
    }
}
