use serde::Deserialize;

use super::{read_json, ApiError, OctopusClient};
use crate::domain::{MeterKind, MeterReading};

#[derive(Deserialize)]
struct ConsumptionPage {
    results: Vec<MeterReading>,
}

impl OctopusClient {
    /// Fetch the first page of consumption readings for one meter.
    ///
    /// Later pages are never requested; `page_size` bounds how far back the
    /// readings go.
    pub async fn fetch_consumption(
        &self,
        kind: MeterKind,
        meter_point: &str,
        serial: &str,
        page_size: u32,
    ) -> Result<Vec<MeterReading>, ApiError> {
        let url = format!(
            "{}/{kind}-meter-points/{meter_point}/meters/{serial}/consumption",
            self.rest_base_url
        );
        tracing::debug!(meter = %kind, page_size, "requesting consumption page");

        let response = self
            .http
            .get(&url)
            .query(&[("page_size", page_size)])
            .basic_auth(&self.api_key, None::<&str>)
            .send()
            .await
            .map_err(|source| ApiError::Transport {
                url: url.clone(),
                source,
            })?;

        let page: ConsumptionPage = read_json(&url, response).await?;
        Ok(page.results)
    }
}
