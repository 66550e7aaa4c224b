use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics_influx_core::{ReporterError, Result, Sender};
use metrics_influx_registry::MetricRegistry;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::reporter::{ReportOutcome, Reporter};

/// Runs a [`Reporter`] against a registry on a fixed period.
///
/// Cycles share one mutex, so a slow cycle delays the next tick instead of
/// overlapping it.
pub struct ScheduledReporter<S> {
    reporter: Arc<Mutex<Reporter<S>>>,
    registry: MetricRegistry,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl<S> ScheduledReporter<S>
where
    S: Sender + Send + 'static,
{
    /// Must be called from within a tokio runtime. The first cycle runs one
    /// `period` after start.
    pub fn start(reporter: Reporter<S>, registry: MetricRegistry, period: Duration) -> Result<Self> {
        if period.is_zero() {
            return Err(ReporterError::InvalidArgument(
                "report period must be greater than zero".to_string(),
            ));
        }

        let reporter = Arc::new(Mutex::new(reporter));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(run_schedule(
            reporter.clone(),
            registry.clone(),
            period,
            shutdown_rx,
        ));
        info!(period = ?period, "scheduled reporter started");

        Ok(Self {
            reporter,
            registry,
            shutdown_tx,
            task,
        })
    }

    pub async fn report_now(&self) -> ReportOutcome {
        let mut reporter = self.reporter.lock().await;
        reporter.report_registry(&self.registry, Utc::now())
    }

    /// Stops the ticker, runs one last cycle and hands the reporter back.
    pub async fn stop(self) -> Result<Reporter<S>> {
        let _ = self.shutdown_tx.send(true);
        self.task
            .await
            .map_err(|e| ReporterError::Internal(format!("report task failed: {e}")))?;

        let mut reporter = Arc::try_unwrap(self.reporter)
            .map_err(|_| ReporterError::Internal("reporter still shared after stop".to_string()))?
            .into_inner();
        let outcome = reporter.report_registry(&self.registry, Utc::now());
        info!(outcome = ?outcome, "scheduled reporter stopped");
        Ok(reporter)
    }
}

async fn run_schedule<S: Sender>(
    reporter: Arc<Mutex<Reporter<S>>>,
    registry: MetricRegistry,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let mut reporter = reporter.lock().await;
                let outcome = reporter.report_registry(&registry, Utc::now());
                debug!(outcome = ?outcome, "scheduled report");
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    break;
                }
            }
        }
    }
}
