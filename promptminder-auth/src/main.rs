use promptminder_auth::{
    build_router,
    config::AuthConfig,
    services::{
        Database, EmailProvider, EmailService, HostedAuthProvider, LoggingEmailService,
        MemoryStore, SupabaseAuthClient, SystemClock,
    },
    AppState, Backends,
};
use service_core::error::AppError;
use service_core::observability::init_tracing;
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;

const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();

    // Load configuration - fail fast if invalid
    let config = AuthConfig::from_env()?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    )?;

    tracing::info!(
        service = %config.service_name,
        version = %config.service_version,
        environment = ?config.environment,
        "Starting authentication service"
    );

    let email: Arc<dyn EmailProvider> = match &config.smtp {
        Some(smtp) => {
            tracing::info!(host = %smtp.host, "SMTP email service initialized");
            Arc::new(EmailService::new(smtp)?)
        }
        None => {
            tracing::warn!("SMTP not configured; invitation emails will only be logged");
            Arc::new(LoggingEmailService)
        }
    };

    let hosted: Option<Arc<dyn HostedAuthProvider>> = match &config.hosted {
        Some(provider) => {
            let client = SupabaseAuthClient::new(provider)
                .map_err(|e| AppError::ConfigError(anyhow::anyhow!(e.to_string())))?;
            tracing::info!(url = %provider.url, "Hosted auth provider initialized");
            Some(Arc::new(client))
        }
        None => {
            tracing::warn!("Hosted auth provider not configured; sign-in, magic link and reset are disabled");
            None
        }
    };

    let clock = Arc::new(SystemClock);

    let backends = match &config.database.url {
        Some(url) => {
            let db = Database::connect(url, config.database.max_connections).await?;
            Backends::from_store(db, email, hosted, clock)
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using in-memory store");
            Backends::from_store(MemoryStore::new(), email, hosted, clock)
        }
    };

    let state = AppState::new(config.clone(), backends);

    let sessions = state.sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
        loop {
            interval.tick().await;
            sessions.purge_expired().await;
        }
    });

    let app = build_router(state)?;

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
            Ok(mut sig) => {
                sig.recv().await;
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
