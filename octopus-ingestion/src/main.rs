use anyhow::{Context, Result};
use octopus_ingestion::{config::AppConfig, metrics_server, observability, IngestionCycle};

/// Wait for shutdown signal (SIGTERM or Ctrl+C)
async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, shutting down after the current cycle");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down after the current cycle");
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env file is fine; the environment may be set by the container.
    dotenvy::dotenv().ok();
    observability::init_tracing();

    tracing::info!("Starting Octopus Energy Consumption Metrics Container");
    let cfg = AppConfig::load().context("invalid configuration")?;
    cfg.log_settings();

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(metrics_cfg.bind_addr).context("failed to install metrics recorder")?;
    }

    let cycle = IngestionCycle::from_config(&cfg);
    let cycles = cycle.run(shutdown_signal()).await;
    tracing::info!(cycles, "stopped");

    Ok(())
}
