pub mod meter_reading;
pub mod numeric;
pub mod tariff;

pub use meter_reading::{MeterKind, MeterReading};
pub use tariff::{AccountTariffs, Tariff};
