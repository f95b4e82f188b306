pub mod influxdb;
pub mod line_protocol;

pub use influxdb::{InfluxDbSink, SinkError, WriteSession};
pub use line_protocol::{FieldValue, Point};
