use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::histogram::Histogram;
use crate::meter::Meter;
use crate::metric::{Counting, Metered, Sampling};
use crate::snapshot::Snapshot;

/// Histogram of durations (nanoseconds) plus a meter of call rate.
#[derive(Debug)]
pub struct Timer {
    clock: Arc<dyn Clock>,
    histogram: Histogram,
    meter: Meter,
}

impl Default for Timer {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock::default()))
    }
}

impl Timer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            meter: Meter::with_clock(clock.clone()),
            histogram: Histogram::new(),
            clock,
        }
    }

    pub fn update(&self, elapsed: Duration) {
        let nanos = i64::try_from(elapsed.as_nanos()).unwrap_or(i64::MAX);
        self.histogram.update(nanos);
        self.meter.mark();
    }

    pub fn time<T>(&self, f: impl FnOnce() -> T) -> T {
        let ctx = self.start();
        let out = f();
        ctx.stop();
        out
    }

    pub fn start(&self) -> TimerContext<'_> {
        TimerContext {
            timer: self,
            start: self.clock.tick(),
            stopped: false,
        }
    }
}

impl Counting for Timer {
    fn count(&self) -> i64 {
        self.histogram.count()
    }
}

impl Metered for Timer {
    fn one_minute_rate(&self) -> f64 {
        self.meter.one_minute_rate()
    }

    fn five_minute_rate(&self) -> f64 {
        self.meter.five_minute_rate()
    }

    fn fifteen_minute_rate(&self) -> f64 {
        self.meter.fifteen_minute_rate()
    }

    fn mean_rate(&self) -> f64 {
        self.meter.mean_rate()
    }
}

impl Sampling for Timer {
    fn snapshot(&self) -> Snapshot {
        self.histogram.snapshot()
    }
}

/// In-flight timing; recorded on `stop` or when dropped.
#[derive(Debug)]
pub struct TimerContext<'a> {
    timer: &'a Timer,
    start: u64,
    stopped: bool,
}

impl TimerContext<'_> {
    pub fn stop(mut self) -> Duration {
        self.record()
    }

    fn record(&mut self) -> Duration {
        self.stopped = true;
        let elapsed = Duration::from_nanos(self.timer.clock.tick().saturating_sub(self.start));
        self.timer.update(elapsed);
        elapsed
    }
}

impl Drop for TimerContext<'_> {
    fn drop(&mut self) {
        if !self.stopped {
            self.record();
        }
    }
}
