use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use metrics_influx_core::Result;
use metrics_influx_registry::{Counter, Histogram, Meter, MetricRegistry, Timer};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Synthetic service traffic feeding one metric of each kind.
pub struct Workload {
    requests: Arc<Counter>,
    latency: Arc<Timer>,
    payload: Arc<Histogram>,
    errors: Arc<Meter>,
    depth: Arc<AtomicI64>,
}

impl Workload {
    pub fn install(registry: &MetricRegistry) -> Result<Self> {
        let depth = Arc::new(AtomicI64::new(0));
        let gauge_depth = depth.clone();
        registry.gauge("queue.depth", move || gauge_depth.load(Ordering::Relaxed))?;

        Ok(Self {
            requests: registry.counter("http.requests")?,
            latency: registry.timer("http.latency")?,
            payload: registry.histogram("http.payload_bytes")?,
            errors: registry.meter("http.errors")?,
            depth,
        })
    }

    /// One simulated request. Values cycle through fixed patterns so runs are repeatable.
    pub fn step(&self, i: u64) {
        self.requests.inc();
        self.latency
            .update(Duration::from_micros(2_000 + (i * 7_919) % 48_000));
        self.payload.update(256 + ((i * 131) % 4_096) as i64);
        if i % 17 == 0 {
            self.errors.mark();
        }
        self.depth.store((i % 32) as i64, Ordering::Relaxed);
    }

    pub fn spawn(self, every: Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            let mut i = 0u64;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        self.step(i);
                        i += 1;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                }
            }
        })
    }
}
