use std::any::Any;
use std::collections::BTreeMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics_influx_core::config::ReporterConfig;
use metrics_influx_core::{ReporterError, Result, Sender, TimeUnit};
use metrics_influx_registry::{GlobFilter, MetricFilter, MetricRegistry, RegistrySnapshot};
use tracing::{debug, warn};

use crate::cycle::{ReportSettings, build_cycle};
use crate::idle::PreviousValues;

/// What a call to [`Reporter::report`] did with the cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportOutcome {
    Written { points: usize, skipped: usize },
    NothingToWrite { skipped: usize },
    Discarded,
}

#[derive(Debug)]
pub struct ReporterBuilder {
    tags: BTreeMap<String, String>,
    settings: ReportSettings,
}

impl Default for ReporterBuilder {
    fn default() -> Self {
        Self {
            tags: BTreeMap::new(),
            settings: ReportSettings::default(),
        }
    }
}

impl ReporterBuilder {
    /// Builder preloaded from file/environment configuration.
    pub fn from_config(cfg: &ReporterConfig) -> Result<Self> {
        let mut builder = Self::default()
            .tags(cfg.tags.clone())
            .convert_rates_to(cfg.rate_unit)
            .convert_durations_to(cfg.duration_unit)
            .skip_idle_metrics(cfg.skip_idle_metrics);
        let globs = GlobFilter::new(&cfg.include, &cfg.exclude)?;
        if !globs.is_pass_through() {
            builder = builder.filter(globs);
        }
        Ok(builder)
    }

    /// Tags common to every point, handed to the sender once at build time.
    pub fn tags(mut self, tags: BTreeMap<String, String>) -> Self {
        self.tags = tags;
        self
    }

    pub fn convert_rates_to(mut self, unit: TimeUnit) -> Self {
        self.settings.units.rate = unit;
        self
    }

    pub fn convert_durations_to(mut self, unit: TimeUnit) -> Self {
        self.settings.units.duration = unit;
        self
    }

    pub fn filter(mut self, filter: impl MetricFilter + 'static) -> Self {
        self.settings.filter = Arc::new(filter);
        self
    }

    /// Leave meters and timers out of a cycle when their count has not moved.
    pub fn skip_idle_metrics(mut self, skip: bool) -> Self {
        self.settings.skip_idle_metrics = skip;
        self
    }

    pub fn build<S: Sender>(self, mut sender: S) -> Reporter<S> {
        sender.set_tags(&self.tags);
        Reporter {
            sender,
            settings: self.settings,
            previous: PreviousValues::new(),
        }
    }
}

/// Turns registry snapshots into points and pushes them through a [`Sender`].
///
/// A failing cycle is logged and dropped; it never reaches the caller.
#[derive(Debug)]
pub struct Reporter<S> {
    sender: S,
    settings: ReportSettings,
    previous: PreviousValues,
}

impl Reporter<()> {
    pub fn builder() -> ReporterBuilder {
        ReporterBuilder::default()
    }
}

impl<S: Sender> Reporter<S> {
    /// Runs one cycle. Sender errors and panics raised while reading metrics
    /// both discard the cycle and leave the idle table untouched.
    pub fn report(&mut self, snapshot: &RegistrySnapshot, now: DateTime<Utc>) -> ReportOutcome {
        let result = panic::catch_unwind(AssertUnwindSafe(|| self.run_cycle(snapshot, now)))
            .unwrap_or_else(|payload| {
                Err(ReporterError::Internal(format!(
                    "metric read panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });
        match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "unable to report to InfluxDB, discarding data");
                ReportOutcome::Discarded
            }
        }
    }

    pub fn report_registry(&mut self, registry: &MetricRegistry, now: DateTime<Utc>) -> ReportOutcome {
        self.report(&registry.snapshot(), now)
    }

    fn run_cycle(&mut self, snapshot: &RegistrySnapshot, now: DateTime<Utc>) -> Result<ReportOutcome> {
        self.sender.flush()?;

        let cycle = build_cycle(snapshot, &self.settings, &self.previous, now);
        let points = cycle.points.len();
        for point in cycle.points {
            self.sender.append_points(point)?;
        }

        let outcome = if self.sender.has_series_data() {
            self.sender.write_data()?;
            ReportOutcome::Written {
                points,
                skipped: cycle.skipped,
            }
        } else {
            ReportOutcome::NothingToWrite {
                skipped: cycle.skipped,
            }
        };

        self.previous = cycle.previous;
        debug!(
            points,
            skipped = cycle.skipped,
            filtered = cycle.filtered,
            "report cycle complete"
        );
        Ok(outcome)
    }

    pub fn settings(&self) -> &ReportSettings {
        &self.settings
    }

    pub fn previous_values(&self) -> &PreviousValues {
        &self.previous
    }

    pub fn sender(&self) -> &S {
        &self.sender
    }

    pub fn sender_mut(&mut self) -> &mut S {
        &mut self.sender
    }

    pub fn into_sender(self) -> S {
        self.sender
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use metrics_influx_core::FieldValue;
    use metrics_influx_registry::Metric;
    use testkit::{RecordingSender, SenderCall, fixed_now};

    use super::*;

    fn skipping(sender: RecordingSender) -> Reporter<RecordingSender> {
        Reporter::builder().skip_idle_metrics(true).build(sender)
    }

    #[test]
    fn build_sets_tags_once() {
        let mut tags = BTreeMap::new();
        tags.insert("host".to_string(), "web-1".to_string());
        let reporter = Reporter::builder().tags(tags.clone()).build(RecordingSender::new());

        assert_eq!(reporter.sender().calls(), &[SenderCall::SetTags(tags)]);
    }

    #[test]
    fn one_point_per_metric_when_not_skipping() {
        let registry = testkit::sample_registry();
        let mut reporter = Reporter::builder().build(RecordingSender::new());

        for _ in 0..3 {
            let outcome = reporter.report_registry(&registry, fixed_now());
            assert_eq!(
                outcome,
                ReportOutcome::Written {
                    points: registry.len(),
                    skipped: 0
                }
            );
        }
        assert_eq!(reporter.sender().written().len(), 3 * registry.len());
    }

    #[test]
    fn cycle_calls_sender_in_order() {
        let registry = MetricRegistry::new();
        registry.counter("requests").unwrap().inc();
        let mut reporter = Reporter::builder().build(RecordingSender::new());
        reporter.report_registry(&registry, fixed_now());

        let calls = reporter.sender().calls();
        assert!(matches!(calls[0], SenderCall::SetTags(_)));
        assert_eq!(calls[1], SenderCall::Flush);
        assert!(matches!(&calls[2], SenderCall::Append(p) if p.measurement == "requests"));
        assert_eq!(calls[3], SenderCall::HasSeriesData(true));
        assert_eq!(calls[4], SenderCall::Write);
        assert_eq!(calls.len(), 5);
    }

    #[test]
    fn skips_idle_meters_and_timers_after_first_cycle() {
        let registry = MetricRegistry::new();
        let meter = registry.meter("errors").unwrap();
        let timer = registry.timer("latency").unwrap();
        meter.mark();
        timer.update(Duration::from_millis(3));
        let mut reporter = skipping(RecordingSender::new());

        let first = reporter.report_registry(&registry, fixed_now());
        assert_eq!(first, ReportOutcome::Written { points: 2, skipped: 0 });

        let second = reporter.report_registry(&registry, fixed_now());
        assert_eq!(second, ReportOutcome::NothingToWrite { skipped: 2 });

        meter.mark();
        let third = reporter.report_registry(&registry, fixed_now());
        assert_eq!(third, ReportOutcome::Written { points: 1, skipped: 1 });
        let last = reporter.sender().written().last().cloned().unwrap();
        assert_eq!(last.measurement, "errors");
        assert_eq!(last.field("count"), Some(&FieldValue::Integer(2)));
    }

    #[test]
    fn never_skips_metrics_with_zero_count_on_first_sight() {
        let registry = MetricRegistry::new();
        registry.meter("idle").unwrap();
        let mut reporter = skipping(RecordingSender::new());

        assert_eq!(
            reporter.report_registry(&registry, fixed_now()),
            ReportOutcome::Written { points: 1, skipped: 0 }
        );
        assert_eq!(reporter.previous_values().get("idle"), Some(0));
    }

    #[test]
    fn counters_and_histograms_are_never_skipped() {
        let registry = MetricRegistry::new();
        registry.counter("requests").unwrap().inc();
        registry.histogram("sizes").unwrap().update(10);
        let mut reporter = skipping(RecordingSender::new());

        for _ in 0..3 {
            assert_eq!(
                reporter.report_registry(&registry, fixed_now()),
                ReportOutcome::Written { points: 2, skipped: 0 }
            );
        }
    }

    #[test]
    fn flush_failure_discards_whole_cycle() {
        let registry = testkit::sample_registry();
        let mut reporter = skipping(RecordingSender::new().fail_flush(true));

        assert_eq!(
            reporter.report_registry(&registry, fixed_now()),
            ReportOutcome::Discarded
        );
        let calls = reporter.sender().calls();
        assert!(!calls.iter().any(|c| matches!(c, SenderCall::Append(_))));
        assert!(!calls.contains(&SenderCall::Write));
        assert!(reporter.previous_values().is_empty());
    }

    #[test]
    fn append_failure_stops_cycle_before_write() {
        let registry = testkit::sample_registry();
        let mut reporter = Reporter::builder().build(RecordingSender::new().fail_append(true));

        assert_eq!(
            reporter.report_registry(&registry, fixed_now()),
            ReportOutcome::Discarded
        );
        let appends = reporter
            .sender()
            .calls()
            .iter()
            .filter(|c| matches!(c, SenderCall::Append(_)))
            .count();
        assert_eq!(appends, 1);
        assert!(!reporter.sender().calls().contains(&SenderCall::Write));
    }

    #[test]
    fn write_failure_does_not_commit_idle_table() {
        let registry = MetricRegistry::new();
        registry.meter("errors").unwrap().mark();
        let mut reporter = skipping(RecordingSender::new().fail_write(true));

        assert_eq!(
            reporter.report_registry(&registry, fixed_now()),
            ReportOutcome::Discarded
        );
        assert!(reporter.previous_values().is_empty());

        reporter.sender_mut().set_fail_write(false);
        assert_eq!(
            reporter.report_registry(&registry, fixed_now()),
            ReportOutcome::Written { points: 1, skipped: 0 }
        );
    }

    #[test]
    fn no_write_when_sender_reports_nothing_buffered() {
        let registry = testkit::sample_registry();
        let mut reporter = Reporter::builder()
            .build(RecordingSender::new().series_data_override(Some(false)));

        let outcome = reporter.report_registry(&registry, fixed_now());
        assert_eq!(outcome, ReportOutcome::NothingToWrite { skipped: 0 });
        assert!(!reporter.sender().calls().contains(&SenderCall::Write));
    }

    #[test]
    fn panicking_gauge_discards_cycle_and_reporter_recovers() {
        let registry = MetricRegistry::new();
        let first_read = Arc::new(AtomicBool::new(true));
        let flag = first_read.clone();
        registry
            .gauge("flaky", move || {
                if flag.swap(false, Ordering::SeqCst) {
                    panic!("gauge read failed");
                }
                1
            })
            .unwrap();
        registry.meter("events").unwrap().mark();
        let mut reporter = skipping(RecordingSender::new());

        assert_eq!(
            reporter.report_registry(&registry, fixed_now()),
            ReportOutcome::Discarded
        );
        assert!(reporter.previous_values().is_empty());
        assert!(!reporter.sender().calls().contains(&SenderCall::Write));

        assert_eq!(
            reporter.report_registry(&registry, fixed_now()),
            ReportOutcome::Written { points: 2, skipped: 0 }
        );
        assert_eq!(reporter.previous_values().get("events"), Some(1));
    }

    #[test]
    fn regression_is_treated_as_idle() {
        let registry = MetricRegistry::new();
        let meter = registry.meter("events").unwrap();
        meter.mark_n(10);
        let mut reporter = skipping(RecordingSender::new());
        reporter.report_registry(&registry, fixed_now());

        registry.remove("events");
        registry.meter("events").unwrap().mark_n(7);
        assert_eq!(
            reporter.report_registry(&registry, fixed_now()),
            ReportOutcome::NothingToWrite { skipped: 1 }
        );
        assert_eq!(reporter.previous_values().get("events"), Some(10));
    }

    #[test]
    fn filter_limits_reported_metrics() {
        let registry = testkit::sample_registry();
        let mut reporter = Reporter::builder()
            .filter(|name: &str, metric: &Metric| {
                name.starts_with("http.") && !matches!(metric, Metric::Gauge(_))
            })
            .build(RecordingSender::new());

        reporter.report_registry(&registry, fixed_now());
        let written = reporter.sender().written();
        assert!(!written.is_empty());
        assert!(written.iter().all(|p| p.measurement.starts_with("http.")));
    }

    #[test]
    fn from_config_applies_units_and_globs() {
        let cfg = ReporterConfig {
            rate_unit: TimeUnit::Minutes,
            duration_unit: TimeUnit::Seconds,
            skip_idle_metrics: true,
            exclude: vec!["queue.*".to_string()],
            ..ReporterConfig::default()
        };
        let reporter = ReporterBuilder::from_config(&cfg)
            .unwrap()
            .build(RecordingSender::new());

        assert_eq!(reporter.settings().units.rate, TimeUnit::Minutes);
        assert_eq!(reporter.settings().units.duration, TimeUnit::Seconds);
        assert!(reporter.settings().skip_idle_metrics);

        let registry = testkit::sample_registry();
        let mut reporter = reporter;
        reporter.report_registry(&registry, fixed_now());
        assert!(
            reporter
                .sender()
                .written()
                .iter()
                .all(|p| !p.measurement.starts_with("queue."))
        );
    }

    #[test]
    fn from_config_rejects_bad_globs() {
        let cfg = ReporterConfig {
            include: vec!["[bad".to_string()],
            ..ReporterConfig::default()
        };
        assert!(ReporterBuilder::from_config(&cfg).is_err());
    }
}
