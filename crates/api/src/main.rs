use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use brandlens_core::collaborators::{AnalysisProvider, Notifier};
use brandlens_events::{DispatchConfig, EmailConfig, EmailDelivery, HttpDispatcher, LogNotifier};
use brandlens_pipeline::store::{PgDirectory, PgJobStore, PgLockStore};
use brandlens_pipeline::{Collaborators, Pipeline, PipelineConfig};
use brandlens_provider::{HttpAnalysisProvider, ProviderConfig, UnconfiguredProvider};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use brandlens_api::background::run_retention;
use brandlens_api::config::ServerConfig;
use brandlens_api::router::build_app_router;
use brandlens_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "brandlens_api=debug,brandlens_pipeline=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    let pipeline_config = PipelineConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");
    tracing::info!(?pipeline_config, "Loaded pipeline configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = brandlens_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    brandlens_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    brandlens_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- Collaborators ---
    let dispatch_config = DispatchConfig::from_env();
    tracing::info!(
        publish_url = ?dispatch_config.publish_url,
        destination = %dispatch_config.destination_url(),
        "Dispatcher configured"
    );
    let dispatcher =
        HttpDispatcher::new(dispatch_config).expect("Failed to build dispatcher HTTP client");

    let provider: Arc<dyn AnalysisProvider> = match ProviderConfig::from_env() {
        Some(provider_config) => Arc::new(
            HttpAnalysisProvider::new(provider_config)
                .expect("Failed to build analysis provider HTTP client"),
        ),
        None => {
            tracing::warn!("ANALYSIS_PROVIDER_URL not set, every pair will fail");
            Arc::new(UnconfiguredProvider)
        }
    };

    let notifier: Arc<dyn Notifier> = match EmailConfig::from_env().map(EmailDelivery::new) {
        Some(Ok(mailer)) => Arc::new(mailer),
        Some(Err(e)) => {
            tracing::error!(error = %e, "Invalid SMTP settings, run notifications will only be logged");
            Arc::new(LogNotifier)
        }
        None => {
            tracing::warn!("SMTP not configured, run notifications will only be logged");
            Arc::new(LogNotifier)
        }
    };

    let pipeline = Pipeline::new(
        Collaborators {
            store: Arc::new(PgJobStore::new(pool.clone())),
            locks: Arc::new(PgLockStore::new(pool.clone())),
            provider,
            dispatcher: Arc::new(dispatcher),
            notifier,
            directory: Arc::new(PgDirectory::new(pool.clone())),
        },
        pipeline_config,
    );

    // --- Background jobs ---
    let retention_cancel = CancellationToken::new();
    let retention_handle = tokio::spawn(run_retention::run(
        pipeline.store.clone(),
        config.run_retention_days,
        retention_cancel.clone(),
    ));

    // --- App state ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        pipeline,
    };
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    retention_cancel.cancel();
    let _ = tokio::time::timeout(Duration::from_secs(5), retention_handle).await;
    tracing::info!("Run retention job stopped");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for SIGINT or SIGTERM to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
