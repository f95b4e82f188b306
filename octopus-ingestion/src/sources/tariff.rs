use std::sync::Arc;

use octopus_client::{
    domain::{MeterKind, Tariff},
    OctopusClient,
};
use time::OffsetDateTime;

use crate::pipeline::{Envelope, EnvelopeStream, PipelineError, Source};

/// One agreement's tariff, stamped with the time its account fetch completed.
#[derive(Debug, Clone)]
pub struct TariffAgreement {
    pub kind: MeterKind,
    pub account_number: String,
    pub tariff: Tariff,
    /// Taken once the token exchange and account query have both returned.
    pub fetched_at: OffsetDateTime,
}

/// Tariffs of every gas and electricity agreement on the account.
pub struct TariffSource {
    client: Arc<OctopusClient>,
    account_number: String,
}

impl TariffSource {
    pub fn new(client: Arc<OctopusClient>, account_number: impl Into<String>) -> Self {
        Self {
            client,
            account_number: account_number.into(),
        }
    }
}

#[async_trait::async_trait]
impl Source<TariffAgreement> for TariffSource {
    async fn stream(&self) -> EnvelopeStream<TariffAgreement> {
        let client = self.client.clone();
        let account_number = self.account_number.clone();

        let s = async_stream::try_stream! {
            let tariffs = client
                .fetch_tariffs(&account_number)
                .await
                .map_err(PipelineError::from)?;
            let fetched_at = OffsetDateTime::now_utc();

            for kind in [MeterKind::Gas, MeterKind::Electricity] {
                for tariff in tariffs.for_kind(kind) {
                    yield Envelope::new(TariffAgreement {
                        kind,
                        account_number: account_number.clone(),
                        tariff: tariff.clone(),
                        fetched_at,
                    });
                }
            }
        };

        Box::pin(s)
    }
}
