//! Prometheus metrics for reconcile passes.

use crate::error::ReconcileError;
use crate::reconciler::Outcome;
use prometheus::{Encoder, Histogram, HistogramOpts, IntCounterVec, Opts, Registry, TextEncoder};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Metrics shared between the watcher and the health server
pub struct Metrics {
    registry: Registry,
    reconciles: IntCounterVec,
    errors: IntCounterVec,
    duration: Histogram,
    ready: AtomicBool,
}

impl Metrics {
    /// Creates and registers all collectors.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let reconciles = IntCounterVec::new(
            Opts::new("dummy_reconcile_total", "Reconcile passes by outcome"),
            &["outcome"],
        )?;
        let errors = IntCounterVec::new(
            Opts::new("dummy_reconcile_errors_total", "Failed reconcile passes by error kind"),
            &["kind"],
        )?;
        let duration = Histogram::with_opts(HistogramOpts::new(
            "dummy_reconcile_duration_seconds",
            "Duration of reconcile passes",
        ))?;

        registry.register(Box::new(reconciles.clone()))?;
        registry.register(Box::new(errors.clone()))?;
        registry.register(Box::new(duration.clone()))?;

        Ok(Self {
            registry,
            reconciles,
            errors,
            duration,
            ready: AtomicBool::new(false),
        })
    }

    /// Records the result of one pass
    pub fn observe(&self, result: &Result<Outcome, ReconcileError>, elapsed: Duration) {
        let outcome = match result {
            Ok(Outcome::Done) => "done",
            Ok(Outcome::Requeue(_)) => "requeue",
            Err(err) if err.is_cancelled() => "cancelled",
            Err(err) => {
                self.errors.with_label_values(&[err.kind()]).inc();
                "error"
            }
        };
        self.reconciles.with_label_values(&[outcome]).inc();
        self.duration.observe(elapsed.as_secs_f64());
    }

    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Prometheus text exposition of every registered collector
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}
