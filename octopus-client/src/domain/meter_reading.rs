use std::fmt;

use serde::Deserialize;
use time::OffsetDateTime;

use super::numeric;

/// Supply type of a meter.
///
/// The lowercase name doubles as the REST path prefix
/// (`electricity-meter-points`) and as the measurement name of the points
/// written for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeterKind {
    Electricity,
    Gas,
}

impl MeterKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Electricity => "electricity",
            Self::Gas => "gas",
        }
    }
}

impl fmt::Display for MeterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One half-hourly (or daily, for some gas meters) consumption record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MeterReading {
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub interval_start: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub interval_end: OffsetDateTime,
    #[serde(deserialize_with = "numeric::f64_lenient")]
    pub consumption: f64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn reading_deserializes_api_record() {
        let json = r#"{
            "consumption": 0.245,
            "interval_start": "2024-01-01T00:00:00Z",
            "interval_end": "2024-01-01T00:30:00Z"
        }"#;

        let reading: MeterReading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.consumption, 0.245);
        assert_eq!(reading.interval_start, Some(datetime!(2024-01-01 00:00:00 UTC)));
        assert_eq!(reading.interval_end, datetime!(2024-01-01 00:30:00 UTC));
    }

    #[test]
    fn reading_keeps_offset_of_interval_end() {
        let json = r#"{"consumption": "1.5", "interval_end": "2024-06-01T01:00:00+01:00"}"#;

        let reading: MeterReading = serde_json::from_str(json).unwrap();
        assert_eq!(reading.consumption, 1.5);
        assert!(reading.interval_start.is_none());
        assert_eq!(reading.interval_end, datetime!(2024-06-01 00:00:00 UTC));
    }

    #[test]
    fn reading_without_interval_end_is_rejected() {
        let json = r#"{"consumption": 1.0}"#;
        assert!(serde_json::from_str::<MeterReading>(json).is_err());
    }

    #[test]
    fn meter_kind_names() {
        assert_eq!(MeterKind::Electricity.to_string(), "electricity");
        assert_eq!(MeterKind::Gas.as_str(), "gas");
    }
}
