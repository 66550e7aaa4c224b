use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics_influx_core::{Fields, Point};
use metrics_influx_registry::{AllMetrics, Counting, Metric, MetricFilter, RegistrySnapshot};

use crate::fields::{self, Units};
use crate::idle::PreviousValues;

/// Per-reporter knobs that shape every cycle.
#[derive(Clone)]
pub struct ReportSettings {
    pub units: Units,
    pub skip_idle_metrics: bool,
    pub filter: Arc<dyn MetricFilter>,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            units: Units::default(),
            skip_idle_metrics: false,
            filter: Arc::new(AllMetrics),
        }
    }
}

impl fmt::Debug for ReportSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportSettings")
            .field("units", &self.units)
            .field("skip_idle_metrics", &self.skip_idle_metrics)
            .finish_non_exhaustive()
    }
}

/// Output of one cycle: the points to send and the idle table to commit.
#[derive(Debug, Clone, PartialEq)]
pub struct Cycle {
    pub points: Vec<Point>,
    pub previous: PreviousValues,
    /// Metered metrics left out because their count did not move.
    pub skipped: usize,
    /// Metrics rejected by the filter.
    pub filtered: usize,
}

/// Builds the points for one cycle without touching `previous`.
///
/// Categories are emitted gauge, counter, histogram, meter, timer, each in
/// name order. Only meters and timers are subject to idle suppression.
pub fn build_cycle(
    snapshot: &RegistrySnapshot,
    settings: &ReportSettings,
    previous: &PreviousValues,
    now: DateTime<Utc>,
) -> Cycle {
    let mut cycle = Cycle {
        points: Vec::with_capacity(snapshot.len()),
        previous: previous.clone(),
        skipped: 0,
        filtered: 0,
    };
    let units = &settings.units;

    for (name, gauge) in &snapshot.gauges {
        if cycle.admit(settings, name, || Metric::Gauge(gauge.clone())) {
            cycle.push(name, now, fields::gauge_fields(gauge));
        }
    }

    for (name, counter) in &snapshot.counters {
        if cycle.admit(settings, name, || Metric::Counter(counter.clone())) {
            cycle.push(name, now, fields::counter_fields(counter));
        }
    }

    for (name, histogram) in &snapshot.histograms {
        if cycle.admit(settings, name, || Metric::Histogram(histogram.clone())) {
            cycle.push(name, now, fields::histogram_fields(histogram));
        }
    }

    for (name, meter) in &snapshot.meters {
        if cycle.admit(settings, name, || Metric::Meter(meter.clone()))
            && !cycle.skip_idle(settings, name, meter.count())
        {
            cycle.push(name, now, fields::meter_fields(meter, units));
        }
    }

    for (name, timer) in &snapshot.timers {
        if cycle.admit(settings, name, || Metric::Timer(timer.clone()))
            && !cycle.skip_idle(settings, name, timer.count())
        {
            cycle.push(name, now, fields::timer_fields(timer, units));
        }
    }

    cycle
}

impl Cycle {
    fn admit(
        &mut self,
        settings: &ReportSettings,
        name: &str,
        metric: impl FnOnce() -> Metric,
    ) -> bool {
        let admitted = settings.filter.matches(name, &metric());
        if !admitted {
            self.filtered += 1;
        }
        admitted
    }

    fn skip_idle(&mut self, settings: &ReportSettings, name: &str, count: i64) -> bool {
        let skip = self
            .previous
            .can_skip(name, count, settings.skip_idle_metrics);
        if skip {
            self.skipped += 1;
        }
        skip
    }

    fn push(&mut self, name: &str, now: DateTime<Utc>, fields: Fields) {
        self.points.push(Point::new(name, now, fields));
    }
}
