use std::cell::RefCell;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use metrics_influx_core::{Point, ReporterError, Result, Sender};
use metrics_influx_registry::{Clock, ManualClock, MetricRegistry};

pub fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 2, 1, 0, 0, 0).unwrap()
}

/// A registry with one metric per category, all with non-zero activity.
pub fn sample_registry() -> MetricRegistry {
    sample_registry_with_clock(Arc::new(ManualClock::new()))
}

pub fn sample_registry_with_clock(clock: Arc<dyn Clock>) -> MetricRegistry {
    let registry = MetricRegistry::with_clock(clock);

    registry.gauge("queue.depth", || 5).unwrap();
    registry.counter("http.requests").unwrap().inc_by(42);

    let sizes = registry.histogram("http.payload_bytes").unwrap();
    for size in [128, 256, 512, 1024, 2048] {
        sizes.update(size);
    }

    registry.meter("http.errors").unwrap().mark_n(3);

    let latency = registry.timer("http.latency").unwrap();
    for ms in [12, 15, 20, 35, 80] {
        latency.update(Duration::from_millis(ms));
    }

    registry
}

#[derive(Debug, Clone, PartialEq)]
pub enum SenderCall {
    SetTags(BTreeMap<String, String>),
    Flush,
    Append(Point),
    HasSeriesData(bool),
    Write,
}

/// Sender that records every call and can be told to fail.
#[derive(Debug, Default)]
pub struct RecordingSender {
    calls: RefCell<Vec<SenderCall>>,
    pending: Vec<Point>,
    written: Vec<Point>,
    fail_flush: bool,
    fail_append: bool,
    fail_write: bool,
    series_data_override: Option<bool>,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_flush(mut self, fail: bool) -> Self {
        self.fail_flush = fail;
        self
    }

    pub fn fail_append(mut self, fail: bool) -> Self {
        self.fail_append = fail;
        self
    }

    pub fn fail_write(mut self, fail: bool) -> Self {
        self.fail_write = fail;
        self
    }

    /// Forces `has_series_data` to answer this instead of looking at the buffer.
    pub fn series_data_override(mut self, answer: Option<bool>) -> Self {
        self.series_data_override = answer;
        self
    }

    pub fn set_fail_write(&mut self, fail: bool) {
        self.fail_write = fail;
    }

    pub fn calls(&self) -> Vec<SenderCall> {
        self.calls.borrow().clone()
    }

    /// Points that made it through a successful `write_data`.
    pub fn written(&self) -> &[Point] {
        &self.written
    }

    fn record(&self, call: SenderCall) {
        self.calls.borrow_mut().push(call);
    }
}

impl Sender for RecordingSender {
    fn set_tags(&mut self, tags: &BTreeMap<String, String>) {
        self.record(SenderCall::SetTags(tags.clone()));
    }

    fn flush(&mut self) -> Result<()> {
        self.record(SenderCall::Flush);
        if self.fail_flush {
            return Err(ReporterError::Sender("injected flush failure".to_string()));
        }
        self.pending.clear();
        Ok(())
    }

    fn append_points(&mut self, point: Point) -> Result<()> {
        self.record(SenderCall::Append(point.clone()));
        if self.fail_append {
            return Err(ReporterError::Sender("injected append failure".to_string()));
        }
        self.pending.push(point);
        Ok(())
    }

    fn has_series_data(&self) -> bool {
        let answer = self
            .series_data_override
            .unwrap_or(!self.pending.is_empty());
        self.record(SenderCall::HasSeriesData(answer));
        answer
    }

    fn write_data(&mut self) -> Result<()> {
        self.record(SenderCall::Write);
        if self.fail_write {
            return Err(ReporterError::Sender("injected write failure".to_string()));
        }
        self.written.append(&mut self.pending);
        Ok(())
    }
}
