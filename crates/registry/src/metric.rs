use std::fmt;
use std::sync::Arc;

use crate::counter::Counter;
use crate::gauge::Gauge;
use crate::histogram::Histogram;
use crate::meter::Meter;
use crate::snapshot::Snapshot;
use crate::timer::Timer;

/// Anything with a count that advances as events are recorded.
pub trait Counting {
    fn count(&self) -> i64;
}

/// Event rates in events per second.
pub trait Metered: Counting {
    fn one_minute_rate(&self) -> f64;
    fn five_minute_rate(&self) -> f64;
    fn fifteen_minute_rate(&self) -> f64;
    fn mean_rate(&self) -> f64;
}

pub trait Sampling {
    fn snapshot(&self) -> Snapshot;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MetricKind {
    Gauge,
    Counter,
    Histogram,
    Meter,
    Timer,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Gauge => "gauge",
            Self::Counter => "counter",
            Self::Histogram => "histogram",
            Self::Meter => "meter",
            Self::Timer => "timer",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub enum Metric {
    Gauge(Arc<Gauge>),
    Counter(Arc<Counter>),
    Histogram(Arc<Histogram>),
    Meter(Arc<Meter>),
    Timer(Arc<Timer>),
}

impl Metric {
    pub fn kind(&self) -> MetricKind {
        match self {
            Self::Gauge(_) => MetricKind::Gauge,
            Self::Counter(_) => MetricKind::Counter,
            Self::Histogram(_) => MetricKind::Histogram,
            Self::Meter(_) => MetricKind::Meter,
            Self::Timer(_) => MetricKind::Timer,
        }
    }
}

impl From<Gauge> for Metric {
    fn from(g: Gauge) -> Self {
        Self::Gauge(Arc::new(g))
    }
}

impl From<Counter> for Metric {
    fn from(c: Counter) -> Self {
        Self::Counter(Arc::new(c))
    }
}

impl From<Histogram> for Metric {
    fn from(h: Histogram) -> Self {
        Self::Histogram(Arc::new(h))
    }
}

impl From<Meter> for Metric {
    fn from(m: Meter) -> Self {
        Self::Meter(Arc::new(m))
    }
}

impl From<Timer> for Metric {
    fn from(t: Timer) -> Self {
        Self::Timer(Arc::new(t))
    }
}
