//! Main controller implementation.
//!
//! This module contains the `Controller` struct that wires the Kubernetes
//! client, the reconciler, the Dummy watcher and the health server together,
//! and shuts them down on SIGINT/SIGTERM.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::health;
use crate::metrics::Metrics;
use crate::reconciler::{Reconciler, ReconcilerConfig};
use crate::watcher::{Context, Watcher};
use kube::Client;
use kube_store::KubeObjectStore;
use std::sync::Arc;
use tokio::task::{JoinError, JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Main controller for Dummy resources.
pub struct Controller {
    dummy_watcher: JoinHandle<Result<(), ControllerError>>,
    health_server: JoinHandle<Result<(), ControllerError>>,
    shutdown: CancellationToken,
}

fn joined(
    result: Result<Result<(), ControllerError>, JoinError>,
    task: &str,
) -> Result<(), ControllerError> {
    result
        .map_err(|e| ControllerError::Watch(format!("{task} panicked: {e}")))?
        .map_err(|e| ControllerError::Watch(format!("{task} error: {e}")))
}

/// Resolves on SIGINT, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

impl Controller {
    /// Creates a new controller instance and starts its tasks.
    pub async fn new(config: &ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Dummy Controller");

        let kube_client = Client::try_default().await?;
        let store = KubeObjectStore::new(kube_client.clone());

        let reconciler = Arc::new(Reconciler::new(
            Box::new(store),
            ReconcilerConfig {
                readiness_poll_interval: config.readiness_poll_interval,
                max_conflict_retries: config.max_conflict_retries,
                backoff_min_minutes: config.backoff_min_minutes,
                backoff_max_minutes: config.backoff_max_minutes,
            },
        ));
        let metrics = Arc::new(Metrics::new()?);
        let shutdown = CancellationToken::new();

        let context = Arc::new(Context {
            reconciler,
            metrics: Arc::clone(&metrics),
            shutdown: shutdown.clone(),
        });
        let watcher = Watcher::new(
            kube_client,
            config.namespace.clone(),
            config.debounce,
            config.concurrency,
            context,
        );

        info!("Starting Dummy watcher");
        let dummy_watcher = tokio::spawn(async move { watcher.watch_dummies().await });

        info!("Starting health server");
        let health_server = tokio::spawn(health::serve(config.health_addr, metrics, shutdown.clone()));

        Ok(Self {
            dummy_watcher,
            health_server,
            shutdown,
        })
    }

    /// Runs until a shutdown signal arrives or a task exits.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Dummy Controller running");

        tokio::select! {
            result = &mut self.dummy_watcher => {
                error!("Dummy watcher exited unexpectedly");
                self.shutdown.cancel();
                joined(result, "Dummy watcher")?;
                joined(self.health_server.await, "Health server")?;
            }
            result = &mut self.health_server => {
                error!("Health server exited unexpectedly");
                self.shutdown.cancel();
                joined(result, "Health server")?;
                joined(self.dummy_watcher.await, "Dummy watcher")?;
            }
            () = shutdown_signal() => {
                info!("Shutdown signal received, draining in-flight reconciles");
                self.shutdown.cancel();
                joined(self.dummy_watcher.await, "Dummy watcher")?;
                joined(self.health_server.await, "Health server")?;
            }
        }

        Ok(())
    }
}
