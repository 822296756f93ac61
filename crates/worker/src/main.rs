use std::sync::Arc;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use fleetwatch_events::{EventStream, MemoryStream, PgEventStream};
use fleetwatch_pipeline::{AlertConsumer, HealthMonitor, MemoryStore, PgStore, RandomProbe, Store};
use fleetwatch_worker::config::{LogFormat, Storage, WorkerConfig};
use fleetwatch_worker::seed::register_seed_devices;

const DEFAULT_LOG_FILTER: &str =
    "fleetwatch_worker=debug,fleetwatch_pipeline=debug,fleetwatch_events=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;

    // --- Tracing ---
    init_tracing(config.log_format);
    tracing::info!(
        interval_secs = config.health_check_interval_secs,
        stream = %config.alert_stream_name,
        consumer = %config.consumer_name,
        "Loaded worker configuration"
    );

    // --- Storage ---
    let (store, stream) = connect(&config.storage).await?;

    let seeded = register_seed_devices(&*store, &config.seed_devices)
        .await
        .context("Failed to register seed devices")?;
    if seeded > 0 {
        tracing::info!(seeded, "Seed devices registered");
    }

    // --- Loops ---
    let cancel = CancellationToken::new();

    let probe = Arc::new(RandomProbe::new(config.health_down_probability));
    let monitor = HealthMonitor::new(
        Arc::clone(&store),
        Arc::clone(&stream),
        probe,
        config.monitor_config(),
    );
    let monitor_cancel = cancel.clone();
    let monitor_handle = tokio::spawn(async move {
        monitor.run(monitor_cancel).await;
    });

    let mut consumer = AlertConsumer::new(store, stream, config.consumer_config());
    let consumer_cancel = cancel.clone();
    let consumer_handle = tokio::spawn(async move {
        consumer.run(consumer_cancel).await;
    });

    tracing::info!("Worker started (health monitor, alert consumer)");

    // --- Shutdown ---
    shutdown_signal().await;
    cancel.cancel();

    for (name, handle) in [
        ("health monitor", monitor_handle),
        ("alert consumer", consumer_handle),
    ] {
        match tokio::time::timeout(config.shutdown_timeout(), handle).await {
            Ok(Ok(())) => tracing::info!(task = name, "Stopped"),
            Ok(Err(e)) => tracing::error!(task = name, error = %e, "Task failed"),
            Err(_) => tracing::warn!(task = name, "Did not stop within the shutdown timeout"),
        }
    }

    tracing::info!("Graceful shutdown complete");
    Ok(())
}

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

/// Build the store and stream for the configured backend.
///
/// For Postgres this also checks connectivity and applies migrations.
async fn connect(storage: &Storage) -> anyhow::Result<(Arc<dyn Store>, Arc<dyn EventStream>)> {
    match storage {
        Storage::Memory => {
            tracing::warn!("Using in-memory storage; nothing survives a restart");
            let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
            let stream: Arc<dyn EventStream> = Arc::new(MemoryStream::new());
            Ok((store, stream))
        }
        Storage::Postgres { database_url } => {
            let pool = fleetwatch_db::create_pool(database_url)
                .await
                .context("Failed to connect to database")?;
            tracing::info!("Database connection pool created");

            fleetwatch_db::health_check(&pool)
                .await
                .context("Database health check failed")?;
            tracing::info!("Database health check passed");

            fleetwatch_db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;
            tracing::info!("Database migrations applied");

            let store: Arc<dyn Store> = Arc::new(PgStore::new(pool.clone()));
            let stream: Arc<dyn EventStream> = Arc::new(PgEventStream::new(pool));
            Ok((store, stream))
        }
    }
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
///
/// If a handler cannot be installed the error is logged and that signal is
/// never reported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
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
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
