//! Shared start-up for the server and the command-line tools.

use anyhow::{Context, Result};
use std::sync::Arc;

use hybrid_qa::{HybridQa, QaConfig};

/// Install the fmt subscriber; `RUST_LOG` overrides the default `info` filter.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();
}

/// Configuration from the process environment, validated.
pub fn load_config() -> Result<QaConfig> {
    let config = QaConfig::from_env().context("Failed to read configuration from environment")?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

pub fn build_pipeline(config: &QaConfig) -> Result<Arc<HybridQa>> {
    let qa = HybridQa::from_config(config).context("Failed to build question answering pipeline")?;
    Ok(Arc::new(qa))
}
