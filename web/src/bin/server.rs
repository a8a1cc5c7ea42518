//! Admission control HTTP server.
//!
//! Reads configuration from the environment (and `.env`), connects to
//! `PostgreSQL`, applies migrations and serves the participation request API
//! until Ctrl+C or SIGTERM.

use admission_core::environment::SystemClock;
use admission_postgres::{PostgresDirectory, PostgresRequestStore};
use admission_runtime::metrics::install_recorder;
use admission_runtime::{AdmissionController, AdmissionEnvironment};
use admission_web::{AppState, Config, build_router};
use anyhow::Context;
use sqlx::postgres::PgPoolOptions;
use std::future::IntoFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.server.log_level)
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!(
        address = %config.bind_address(),
        max_connections = config.postgres.max_connections,
        max_retries = config.admission.conflict_max_retries,
        "Starting admission server"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.postgres.max_connections)
        .min_connections(config.postgres.min_connections)
        .acquire_timeout(Duration::from_secs(config.postgres.connect_timeout))
        .connect(&config.postgres.url)
        .await
        .context("Failed to connect to PostgreSQL")?;
    info!("Database connected");

    let store = PostgresRequestStore::new(pool.clone());
    if config.postgres.run_migrations {
        store.migrate().await.context("Failed to run migrations")?;
    }

    let directory = Arc::new(PostgresDirectory::new(pool));
    let store = Arc::new(store);
    let controller = AdmissionController::new(AdmissionEnvironment::new(
        Arc::new(SystemClock::new()),
        directory.clone(),
        directory,
        store.clone(),
    ))
    .with_retry_policy(config.retry_policy());

    let metrics = install_recorder().context("Failed to install metrics recorder")?;
    let app = build_router(AppState::new(controller, store).with_metrics(metrics));

    let addr = config.bind_address();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(address = %addr, "Server listening");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                stop_rx.await.ok();
            })
            .into_future(),
    );

    tokio::select! {
        result = &mut server => {
            result.context("Server task failed")??;
            return Ok(());
        }
        () = shutdown_signal() => {}
    }

    stop_tx.send(()).ok();
    let grace = Duration::from_secs(config.server.shutdown_timeout);
    match tokio::time::timeout(grace, server).await {
        Ok(result) => result.context("Server task failed")??,
        Err(_) => warn!(timeout_secs = grace.as_secs(), "Shutdown timed out, dropping connections"),
    }

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
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
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("Received Ctrl+C signal, shutting down gracefully...");
        },
        () = terminate => {
            info!("Received SIGTERM signal, shutting down gracefully...");
        },
    }
}
