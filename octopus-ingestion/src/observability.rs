use tracing_subscriber::EnvFilter;

/// `RUST_LOG` wins when set; otherwise info for this crate and the API client.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("octopus_ingestion=info,octopus_client=info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
