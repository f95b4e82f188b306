pub mod config;
pub mod cycle;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use cycle::{CycleReport, IngestionCycle};
pub use pipeline::{Envelope, Pipeline};
