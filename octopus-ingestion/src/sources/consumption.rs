use std::sync::Arc;

use octopus_client::{domain::MeterReading, OctopusClient};

use crate::config::MeterConfig;
use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// First page of consumption readings for one meter.
pub struct ConsumptionSource {
    client: Arc<OctopusClient>,
    meter: MeterConfig,
    page_size: u32,
}

impl ConsumptionSource {
    pub fn new(client: Arc<OctopusClient>, meter: MeterConfig, page_size: u32) -> Self {
        Self {
            client,
            meter,
            page_size,
        }
    }
}

#[async_trait::async_trait]
impl Source<MeterReading> for ConsumptionSource {
    async fn stream(&self) -> EnvelopeStream<MeterReading> {
        let client = self.client.clone();
        let meter = self.meter.clone();
        let page_size = self.page_size;

        let s = async_stream::try_stream! {
            let readings = client
                .fetch_consumption(meter.kind, &meter.meter_point, &meter.serial, page_size)
                .await
                .map_err(PipelineError::from)?;

            tracing::debug!(meter = %meter.kind, readings = readings.len(), "fetched consumption");
            metrics::counter!("octopus_readings_total", "meter" => meter.kind.as_str())
                .increment(readings.len() as u64);

            for reading in readings {
                yield Envelope::new(reading);
            }
        };

        Box::pin(s)
    }
}
