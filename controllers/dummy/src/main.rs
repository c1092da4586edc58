//! Dummy Controller
//!
//! Controller for the `Dummy` CRD (`interview.com/v1alpha1`):
//! - echoes `spec.message` into `status.specEcho`
//! - runs one nginx Pod per Dummy and tracks it in `status.podStatus`
//! - deletes the Pod before releasing the Dummy's finalizer

mod backoff;
mod config;
mod controller;
mod error;
mod finalizer;
mod health;
mod metrics;
mod pod_builder;
mod reconciler;
#[cfg(test)]
mod reconciler_test;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::{ControllerConfig, LogFormat};
use crate::error::ControllerError;
use controller::Controller;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Text => registry.with(fmt::layer()).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    let config = ControllerConfig::from_env()?;
    init_logging(config.log_format);

    info!("Starting Dummy Controller");

    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed, keeping it");
    }

    info!("Configuration:");
    info!("  Namespace: {}", config.namespace.as_deref().unwrap_or("all namespaces"));
    info!("  Concurrency: {}", config.concurrency);
    info!("  Debounce: {:?}", config.debounce);
    info!("  Readiness poll: {:?}", config.readiness_poll_interval);
    info!("  Max conflict retries: {}", config.max_conflict_retries);
    info!(
        "  Backoff: {}m to {}m",
        config.backoff_min_minutes, config.backoff_max_minutes
    );
    info!("  Health address: {}", config.health_addr);

    let controller = Controller::new(&config).await?;
    controller.run().await?;

    info!("Dummy Controller stopped");
    Ok(())
}
