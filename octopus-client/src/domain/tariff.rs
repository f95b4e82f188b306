use serde::Deserialize;

use super::{numeric, MeterKind};

/// Tariff details attached to an account agreement.
///
/// Every field is optional: electricity agreements on non-standard tariffs
/// come back as an empty object.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tariff {
    pub display_name: Option<String>,
    pub full_name: Option<String>,
    pub product_code: Option<String>,
    pub tariff_code: Option<String>,
    #[serde(default, deserialize_with = "numeric::opt_f64_lenient")]
    pub standing_charge: Option<f64>,
    #[serde(default, deserialize_with = "numeric::opt_f64_lenient")]
    pub unit_rate: Option<f64>,
}

impl Tariff {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AccountTariffs {
    pub account_number: String,
    pub electricity: Vec<Tariff>,
    pub gas: Vec<Tariff>,
}

impl AccountTariffs {
    pub fn for_kind(&self, kind: MeterKind) -> &[Tariff] {
        match kind {
            MeterKind::Electricity => &self.electricity,
            MeterKind::Gas => &self.gas,
        }
    }
}
