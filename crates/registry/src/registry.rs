use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use metrics_influx_core::error::{ReporterError, Result};
use metrics_influx_core::FieldValue;
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::counter::Counter;
use crate::filter::{AllMetrics, MetricFilter};
use crate::gauge::Gauge;
use crate::histogram::Histogram;
use crate::meter::Meter;
use crate::metric::{Metric, MetricKind};
use crate::timer::Timer;

/// Named collection of metrics shared between the instrumented code and the reporter.
#[derive(Debug, Clone)]
pub struct MetricRegistry {
    metrics: Arc<Mutex<BTreeMap<String, Metric>>>,
    clock: Arc<dyn Clock>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock::default()))
    }
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Meters and timers created through this registry read time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            metrics: Arc::new(Mutex::new(BTreeMap::new())),
            clock,
        }
    }

    pub fn counter(&self, name: &str) -> Result<Arc<Counter>> {
        match self.get_or_insert(name, MetricKind::Counter, || Counter::new().into())? {
            Metric::Counter(c) => Ok(c),
            other => Err(kind_mismatch(name, MetricKind::Counter, other.kind())),
        }
    }

    pub fn histogram(&self, name: &str) -> Result<Arc<Histogram>> {
        match self.get_or_insert(name, MetricKind::Histogram, || Histogram::new().into())? {
            Metric::Histogram(h) => Ok(h),
            other => Err(kind_mismatch(name, MetricKind::Histogram, other.kind())),
        }
    }

    pub fn meter(&self, name: &str) -> Result<Arc<Meter>> {
        let clock = self.clock.clone();
        match self.get_or_insert(name, MetricKind::Meter, || Meter::with_clock(clock).into())? {
            Metric::Meter(m) => Ok(m),
            other => Err(kind_mismatch(name, MetricKind::Meter, other.kind())),
        }
    }

    pub fn timer(&self, name: &str) -> Result<Arc<Timer>> {
        let clock = self.clock.clone();
        match self.get_or_insert(name, MetricKind::Timer, || Timer::with_clock(clock).into())? {
            Metric::Timer(t) => Ok(t),
            other => Err(kind_mismatch(name, MetricKind::Timer, other.kind())),
        }
    }

    /// Registers `read` under `name`, or returns the gauge already there.
    pub fn gauge<F, T>(&self, name: &str, read: F) -> Result<Arc<Gauge>>
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Into<FieldValue>,
    {
        match self.get_or_insert(name, MetricKind::Gauge, || Gauge::new(read).into())? {
            Metric::Gauge(g) => Ok(g),
            other => Err(kind_mismatch(name, MetricKind::Gauge, other.kind())),
        }
    }

    pub fn register(&self, name: &str, metric: impl Into<Metric>) -> Result<Metric> {
        validate_name(name)?;
        let metric = metric.into();
        let mut metrics = self.lock();
        if metrics.contains_key(name) {
            return Err(ReporterError::Registry(format!(
                "a metric named {name} already exists"
            )));
        }
        debug!(metric = %name, kind = %metric.kind(), "registered metric");
        metrics.insert(name.to_string(), metric.clone());
        Ok(metric)
    }

    pub fn remove(&self, name: &str) -> bool {
        self.lock().remove(name).is_some()
    }

    pub fn get(&self, name: &str) -> Option<Metric> {
        self.lock().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.snapshot_filtered(&AllMetrics)
    }

    pub fn snapshot_filtered(&self, filter: &dyn MetricFilter) -> RegistrySnapshot {
        let metrics = self.lock();
        let mut snapshot = RegistrySnapshot::default();
        for (name, metric) in metrics.iter() {
            if filter.matches(name, metric) {
                snapshot.insert(name.clone(), metric.clone());
            }
        }
        snapshot
    }

    fn get_or_insert(
        &self,
        name: &str,
        kind: MetricKind,
        create: impl FnOnce() -> Metric,
    ) -> Result<Metric> {
        validate_name(name)?;
        let mut metrics = self.lock();
        if let Some(existing) = metrics.get(name) {
            return Ok(existing.clone());
        }
        let metric = create();
        debug!(metric = %name, kind = %kind, "registered metric");
        metrics.insert(name.to_string(), metric.clone());
        Ok(metric)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Metric>> {
        self.metrics.lock().expect("registry mutex poisoned")
    }
}

fn validate_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(ReporterError::InvalidArgument(
            "metric name cannot be empty".to_string(),
        ));
    }
    Ok(())
}

fn kind_mismatch(name: &str, wanted: MetricKind, found: MetricKind) -> ReporterError {
    ReporterError::Registry(format!(
        "metric {name} is registered as a {found}, not a {wanted}"
    ))
}

/// Point-in-time view of the registry, one name-sorted map per category.
///
/// Holds shared handles, so values are read when a reporter extracts fields.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    pub gauges: BTreeMap<String, Arc<Gauge>>,
    pub counters: BTreeMap<String, Arc<Counter>>,
    pub histograms: BTreeMap<String, Arc<Histogram>>,
    pub meters: BTreeMap<String, Arc<Meter>>,
    pub timers: BTreeMap<String, Arc<Timer>>,
}

impl RegistrySnapshot {
    pub fn insert(&mut self, name: String, metric: Metric) {
        match metric {
            Metric::Gauge(g) => {
                self.gauges.insert(name, g);
            }
            Metric::Counter(c) => {
                self.counters.insert(name, c);
            }
            Metric::Histogram(h) => {
                self.histograms.insert(name, h);
            }
            Metric::Meter(m) => {
                self.meters.insert(name, m);
            }
            Metric::Timer(t) => {
                self.timers.insert(name, t);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.gauges.len()
            + self.counters.len()
            + self.histograms.len()
            + self.meters.len()
            + self.timers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Counting;

    #[test]
    fn get_or_create_returns_same_handle() {
        let registry = MetricRegistry::new();
        let a = registry.counter("requests").unwrap();
        let b = registry.counter("requests").unwrap();
        a.inc();
        assert_eq!(b.count(), 1);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn rejects_kind_conflicts() {
        let registry = MetricRegistry::new();
        registry.counter("requests").unwrap();
        let err = registry.timer("requests").unwrap_err();
        assert!(err.to_string().contains("registered as a counter"));
    }

    #[test]
    fn register_rejects_duplicates_and_empty_names() {
        let registry = MetricRegistry::new();
        registry.register("depth", Gauge::new(|| 1)).unwrap();
        assert!(registry.register("depth", Counter::new()).is_err());
        assert!(registry.counter("  ").is_err());
    }

    #[test]
    fn snapshot_sorts_by_name_within_category() {
        let registry = MetricRegistry::new();
        registry.counter("zeta").unwrap();
        registry.counter("alpha").unwrap();
        registry.gauge("mid", || 1.5).unwrap();
        registry.timer("latency").unwrap();

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 4);
        let counters: Vec<_> = snapshot.counters.keys().cloned().collect();
        assert_eq!(counters, vec!["alpha".to_string(), "zeta".to_string()]);
        assert_eq!(snapshot.gauges.len(), 1);
        assert_eq!(snapshot.timers.len(), 1);
    }

    #[test]
    fn snapshot_filtered_drops_rejected_metrics() {
        let registry = MetricRegistry::new();
        registry.counter("http.requests").unwrap();
        registry.counter("db.queries").unwrap();

        let snapshot =
            registry.snapshot_filtered(&|name: &str, _: &Metric| name.starts_with("http."));
        assert_eq!(snapshot.len(), 1);
        assert!(snapshot.counters.contains_key("http.requests"));
    }

    #[test]
    fn remove_and_names() {
        let registry = MetricRegistry::new();
        registry.meter("b").unwrap();
        registry.histogram("a").unwrap();
        assert_eq!(registry.names(), vec!["a".to_string(), "b".to_string()]);
        assert!(registry.remove("a"));
        assert!(!registry.remove("a"));
        assert_eq!(registry.names(), vec!["b".to_string()]);
    }
}
