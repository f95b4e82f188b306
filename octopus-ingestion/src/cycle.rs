use std::{future::Future, sync::Arc, time::Duration};

use octopus_client::{
    domain::{MeterKind, MeterReading},
    OctopusClient,
};

use crate::config::{AppConfig, MeterConfig, APP_NAME};
use crate::pipeline::{Pipeline, PipelineError};
use crate::sinks::{InfluxDbSink, SinkError, WriteSession};
use crate::sources::{ConsumptionSource, TariffAgreement, TariffSource};
use crate::transform::{ConsumptionMapping, TariffMapping};

/// Outcome of one poll: points written per task and the flush result.
#[derive(Debug)]
pub struct CycleReport {
    pub tariff: Result<usize, PipelineError>,
    pub electricity: Result<usize, PipelineError>,
    pub gas: Result<usize, PipelineError>,
    pub flush: Result<usize, SinkError>,
}

impl CycleReport {
    pub fn failed_tasks(&self) -> usize {
        [&self.tariff, &self.electricity, &self.gas]
            .iter()
            .filter(|r| r.is_err())
            .count()
    }

    pub fn is_success(&self) -> bool {
        self.failed_tasks() == 0 && self.flush.is_ok()
    }
}

pub struct IngestionCycle {
    client: Arc<OctopusClient>,
    sink: InfluxDbSink,
    electricity: MeterConfig,
    gas: MeterConfig,
    account_number: Option<String>,
    page_size: u32,
    interval: Duration,
}

impl IngestionCycle {
    pub fn new(config: &AppConfig, client: OctopusClient, sink: InfluxDbSink) -> Self {
        Self {
            client: Arc::new(client),
            sink,
            electricity: config.meter(MeterKind::Electricity).clone(),
            gas: config.meter(MeterKind::Gas).clone(),
            account_number: config.octopus.account_number.clone(),
            page_size: config.octopus.page_size,
            interval: config.loop_interval,
        }
    }

    /// Client and sink built from the configuration, with the `app` tag on
    /// every point.
    pub fn from_config(config: &AppConfig) -> Self {
        let client = OctopusClient::new(config.octopus.api_key.clone())
            .with_rest_base_url(config.octopus.rest_base_url.clone())
            .with_graphql_url(config.octopus.graphql_url.clone());
        let sink = InfluxDbSink::new(&config.influxdb, &config.sink).with_default_tag("app", APP_NAME);

        Self::new(config, client, sink)
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// One full poll. Never fails as a whole: task and flush errors are
    /// logged and returned in the report.
    pub async fn run_once(&self) -> CycleReport {
        let session = self.sink.open_session();

        tracing::info!("Polling data from octopus API");
        let (tariff, electricity, gas) = tokio::join!(
            self.run_tariff(&session),
            self.run_consumption(&self.electricity, &session),
            self.run_consumption(&self.gas, &session),
        );

        for (task, outcome) in [("tariff", &tariff), ("electricity", &electricity), ("gas", &gas)] {
            match outcome {
                Ok(points) => tracing::debug!(task, points, "task finished"),
                Err(e) => {
                    tracing::error!(task, error = %e, "task failed");
                    metrics::counter!("ingest_task_failures_total", "task" => task).increment(1);
                }
            }
        }

        let flush = session.close().await;
        match &flush {
            Ok(points) => tracing::info!(points, "Octopus API response submitted to InfluxDB successfully"),
            Err(e) => tracing::error!(error = %e, "Error submitting data to InfluxDB"),
        }
        metrics::counter!("ingest_cycles_total").increment(1);

        CycleReport {
            tariff,
            electricity,
            gas,
            flush,
        }
    }

    /// Poll forever, sleeping `interval` between cycles, until `shutdown`
    /// resolves. A cycle in progress always completes; shutdown is only
    /// observed while sleeping. Returns the number of completed cycles.
    pub async fn run<F>(&self, shutdown: F) -> u64
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut cycles: u64 = 0;

        loop {
            self.run_once().await;
            cycles += 1;

            tracing::info!(seconds = self.interval.as_secs_f64(), "Sleeping");
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!(cycles, "shutdown requested, stopping poll loop");
                    return cycles;
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
        }
    }

    async fn run_tariff(&self, session: &WriteSession) -> Result<usize, PipelineError> {
        let Some(account_number) = &self.account_number else {
            tracing::debug!("no account number configured, skipping tariff fetch");
            return Ok(0);
        };

        let pipeline: Pipeline<_, TariffAgreement, _> = Pipeline::new(
            "tariff",
            TariffSource::new(self.client.clone(), account_number.clone()),
            TariffMapping,
        );
        pipeline.run(session).await
    }

    async fn run_consumption(&self, meter: &MeterConfig, session: &WriteSession) -> Result<usize, PipelineError> {
        let pipeline: Pipeline<_, MeterReading, _> = Pipeline::new(
            meter.kind.as_str(),
            ConsumptionSource::new(self.client.clone(), meter.clone(), self.page_size),
            ConsumptionMapping::new(meter.kind, meter.cost_rate),
        );
        pipeline.run(session).await
    }
}
