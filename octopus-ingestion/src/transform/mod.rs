use octopus_client::domain::{MeterKind, MeterReading};

use crate::pipeline::{Envelope, PipelineError, Transform};
use crate::sinks::Point;
use crate::sources::TariffAgreement;

/// Cost of a reading in pounds, given a rate in pence per unit.
pub fn cost_price(consumption: f64, rate: f64) -> f64 {
    consumption * rate / 100.0
}

/// Points for one consumption reading.
///
/// Always a `<kind>{consumption}` point at the interval end; when a cost rate
/// is configured, also a `<kind>_cost{price}` point at the same timestamp.
pub fn consumption_points(kind: MeterKind, reading: &MeterReading, cost_rate: Option<f64>) -> Vec<Point> {
    let ts = reading.interval_end;
    let mut points = vec![Point::new(kind.as_str(), ts).float_field("consumption", reading.consumption)];

    if let Some(rate) = cost_rate {
        points.push(
            Point::new(format!("{kind}_cost"), ts).float_field("price", cost_price(reading.consumption, rate)),
        );
    }

    points
}

/// The `<kind>_tariff` point for one agreement, or `None` when the tariff
/// carries no fields at all.
pub fn tariff_point(agreement: &TariffAgreement) -> Option<Point> {
    let tariff = &agreement.tariff;
    if tariff.is_empty() {
        return None;
    }

    let mut point = Point::new(format!("{}_tariff", agreement.kind), agreement.fetched_at);
    let strings = [
        ("displayName", &tariff.display_name),
        ("fullName", &tariff.full_name),
        ("productCode", &tariff.product_code),
        ("tariffCode", &tariff.tariff_code),
    ];
    for (key, value) in strings {
        if let Some(value) = value {
            point = point.string_field(key, value.as_str());
        }
    }
    point = point.string_field("account", agreement.account_number.as_str());

    if let Some(rate) = tariff.unit_rate {
        point = point.float_field("unitRate", rate);
    }
    if let Some(charge) = tariff.standing_charge {
        point = point.float_field("standingCharge", charge);
    }

    Some(point)
}

pub struct ConsumptionMapping {
    kind: MeterKind,
    cost_rate: Option<f64>,
}

impl ConsumptionMapping {
    pub fn new(kind: MeterKind, cost_rate: Option<f64>) -> Self {
        Self { kind, cost_rate }
    }
}

#[async_trait::async_trait]
impl Transform<MeterReading> for ConsumptionMapping {
    async fn apply(&self, input: Envelope<MeterReading>) -> Result<Vec<Point>, PipelineError> {
        let reading = &input.payload;
        if !reading.consumption.is_finite() {
            return Err(PipelineError::Transform(format!(
                "non-finite consumption at {}",
                reading.interval_end
            )));
        }
        Ok(consumption_points(self.kind, reading, self.cost_rate))
    }
}

#[derive(Clone, Default)]
pub struct TariffMapping;

#[async_trait::async_trait]
impl Transform<TariffAgreement> for TariffMapping {
    async fn apply(&self, input: Envelope<TariffAgreement>) -> Result<Vec<Point>, PipelineError> {
        match tariff_point(&input.payload) {
            Some(point) => Ok(vec![point]),
            None => {
                tracing::debug!(
                    meter = %input.payload.kind,
                    "agreement has no standard tariff details, skipping"
                );
                Ok(Vec::new())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::FieldValue;
    use octopus_client::domain::Tariff;
    use time::macros::datetime;

    fn reading(consumption: f64) -> MeterReading {
        MeterReading {
            interval_start: Some(datetime!(2023-12-31 23:30:00 UTC)),
            interval_end: datetime!(2024-01-01 00:00:00 UTC),
            consumption,
        }
    }

    #[test]
    fn consumption_with_cost_rate_emits_cost_point() {
        let points = consumption_points(MeterKind::Electricity, &reading(2.5), Some(30.0));
        assert_eq!(points.len(), 2);

        let usage = &points[0];
        assert_eq!(usage.measurement(), "electricity");
        assert_eq!(usage.field("consumption"), Some(&FieldValue::Float(2.5)));
        assert_eq!(usage.timestamp_nanos(), 1_704_067_200_000_000_000);

        let cost = &points[1];
        assert_eq!(cost.measurement(), "electricity_cost");
        assert_eq!(cost.field("price"), Some(&FieldValue::Float(0.75)));
        assert_eq!(cost.timestamp(), usage.timestamp());
    }

    #[test]
    fn consumption_without_cost_rate_emits_only_usage() {
        let points = consumption_points(MeterKind::Gas, &reading(1.2), None);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].measurement(), "gas");
        assert!(points[0].field("price").is_none());
    }

    #[test]
    fn gas_cost_uses_its_own_rate() {
        let points = consumption_points(MeterKind::Gas, &reading(10.0), Some(7.0));
        assert_eq!(points[1].measurement(), "gas_cost");
        assert_eq!(points[1].field("price").and_then(FieldValue::as_f64), Some(0.7));
    }

    #[test]
    fn cost_price_is_consumption_times_rate_over_100() {
        assert_eq!(cost_price(2.5, 30.0), 0.75);
        assert_eq!(cost_price(0.0, 30.0), 0.0);
        assert_eq!(cost_price(4.0, 0.0), 0.0);
    }

    fn agreement(kind: MeterKind, tariff: Tariff) -> TariffAgreement {
        TariffAgreement {
            kind,
            account_number: "A-1234ABCD".to_string(),
            tariff,
            fetched_at: datetime!(2024-03-01 12:00:00 UTC),
        }
    }

    #[test]
    fn tariff_point_carries_strings_and_float_rates() {
        let tariff = Tariff {
            display_name: Some("Flexible Octopus".to_string()),
            full_name: Some("Flexible Octopus December 2023 v1".to_string()),
            product_code: Some("VAR-22-11-01".to_string()),
            tariff_code: Some("E-1R-VAR-22-11-01-C".to_string()),
            standing_charge: Some(45.0),
            unit_rate: Some(28.5),
        };

        let point = tariff_point(&agreement(MeterKind::Electricity, tariff)).unwrap();
        assert_eq!(point.measurement(), "electricity_tariff");
        assert_eq!(point.timestamp(), datetime!(2024-03-01 12:00:00 UTC));
        assert_eq!(point.field("unitRate"), Some(&FieldValue::Float(28.5)));
        assert_eq!(point.field("standingCharge"), Some(&FieldValue::Float(45.0)));
        assert_eq!(point.field("account").and_then(FieldValue::as_str), Some("A-1234ABCD"));
        assert_eq!(point.field("displayName").and_then(FieldValue::as_str), Some("Flexible Octopus"));
        assert_eq!(point.field("tariffCode").and_then(FieldValue::as_str), Some("E-1R-VAR-22-11-01-C"));
        assert_eq!(point.fields().len(), 7);
    }

    #[test]
    fn partial_tariff_omits_missing_fields() {
        let tariff = Tariff {
            tariff_code: Some("G-1R-VAR-22-11-01-C".to_string()),
            unit_rate: Some(7.42),
            ..Tariff::default()
        };

        let point = tariff_point(&agreement(MeterKind::Gas, tariff)).unwrap();
        assert_eq!(point.measurement(), "gas_tariff");
        assert!(point.field("displayName").is_none());
        assert!(point.field("standingCharge").is_none());
        assert_eq!(point.field("unitRate"), Some(&FieldValue::Float(7.42)));
    }

    #[test]
    fn empty_tariff_emits_no_point() {
        assert!(tariff_point(&agreement(MeterKind::Electricity, Tariff::default())).is_none());
    }

    #[tokio::test]
    async fn consumption_mapping_rejects_non_finite_values() {
        let mapping = ConsumptionMapping::new(MeterKind::Electricity, Some(30.0));

        let ok = mapping.apply(Envelope::new(reading(2.5))).await.unwrap();
        assert_eq!(ok.len(), 2);

        let err = mapping.apply(Envelope::new(reading(f64::NAN))).await;
        assert!(matches!(err, Err(PipelineError::Transform(_))));
    }
}
