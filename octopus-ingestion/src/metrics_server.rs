use std::net::SocketAddr;

use axum::{routing::get, Router};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

static PROM_HANDLE: OnceCell<PrometheusHandle> = OnceCell::new();

/// Install the Prometheus recorder and serve `/metrics` on `addr`.
pub fn init(addr: SocketAddr) -> Result<(), BuildError> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    // Ignore error if the handle was already set; this should only be called once.
    let _ = PROM_HANDLE.set(handle);
    describe();

    tokio::spawn(async move {
        let app = Router::new().route("/metrics", get(metrics_handler));

        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                tracing::info!(%addr, "serving Prometheus metrics");
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    tracing::error!(error = %e, "metrics server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, %addr, "failed to bind metrics listener");
            }
        }
    });

    Ok(())
}

fn describe() {
    metrics::describe_counter!("ingest_cycles_total", "Completed poll cycles");
    metrics::describe_counter!("ingest_task_failures_total", "Failed fetch tasks, by task");
    metrics::describe_counter!("octopus_readings_total", "Consumption readings fetched, by meter");
    metrics::describe_counter!("influxdb_points_written_total", "Points accepted by InfluxDB");
    metrics::describe_counter!("influxdb_write_retry_total", "Retried InfluxDB write requests");
    metrics::describe_counter!("influxdb_sink_errors_total", "InfluxDB batches dropped after retries");
}

async fn metrics_handler() -> String {
    PROM_HANDLE.get().map(PrometheusHandle::render).unwrap_or_default()
}
