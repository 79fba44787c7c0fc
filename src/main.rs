use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crisis_core::app_state::{build_app_state, build_crisis_service};
use crisis_core::core::config::app_config::AppConfig;
use crisis_core::routes::app_router;
use crisis_core::scheduler::spawn_background_tasks;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let config = Arc::new(AppConfig::from_env()?);

    std::fs::create_dir_all(&config.log_dir)
        .with_context(|| format!("Failed to create log directory {:?}", config.log_dir))?;
    let file_appender = tracing_appender::rolling::daily(&config.log_dir, "crisis-core.log");
    let (file_writer, _guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .with(fmt::layer().with_ansi(false).with_writer(file_writer))
        .init();

    info!(bind_addr = %config.bind_addr, data_dir = ?config.data_dir, "Starting crisis engine");

    let service = build_crisis_service(&config)?;
    let restored = service
        .rebuild_open_index()
        .context("Failed to rebuild open alert index")?;
    info!(restored, "Open alerts restored");

    spawn_background_tasks(&service);

    let app = app_router().with_state(build_app_state(config.clone(), service.clone()));
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    info!("Listening on {}", config.bind_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await;

    service.shutdown().await;

    if let Err(e) = served {
        error!(error = %e, "Server exited with error");
        return Err(e.into());
    }

    info!("Shutdown complete");
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
            Ok(mut sig) => {
                sig.recv().await;
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
        _ = ctrl_c => warn!("Received Ctrl+C, shutting down..."),
        _ = terminate => warn!("Received terminate signal, shutting down..."),
    }
}
