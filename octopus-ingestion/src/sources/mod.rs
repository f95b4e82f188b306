pub mod consumption;
pub mod tariff;

pub use consumption::ConsumptionSource;
pub use tariff::{TariffAgreement, TariffSource};
