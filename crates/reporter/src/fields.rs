use metrics_influx_core::{Fields, TimeUnit};
use metrics_influx_registry::{
    Counter, Counting, Gauge, Histogram, Meter, Metered, Sampling, Snapshot, Timer,
};

/// Units rates and durations are converted to before reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Units {
    pub rate: TimeUnit,
    pub duration: TimeUnit,
}

impl Default for Units {
    fn default() -> Self {
        Self {
            rate: TimeUnit::Seconds,
            duration: TimeUnit::Milliseconds,
        }
    }
}

impl Units {
    pub fn rate(&self, per_second: f64) -> f64 {
        self.rate.convert_rate(per_second)
    }

    pub fn duration(&self, nanos: f64) -> f64 {
        self.duration.convert_duration(nanos)
    }
}

pub fn gauge_fields(gauge: &Gauge) -> Fields {
    let mut fields = Fields::new();
    fields.insert("value".into(), gauge.value());
    fields
}

pub fn counter_fields(counter: &Counter) -> Fields {
    let mut fields = Fields::new();
    fields.insert("count".into(), counter.count().into());
    fields
}

pub fn histogram_fields(histogram: &Histogram) -> Fields {
    let snapshot = histogram.snapshot();
    let mut fields = Fields::new();
    fields.insert("count".into(), histogram.count().into());
    fields.insert("min".into(), snapshot.min().into());
    fields.insert("max".into(), snapshot.max().into());
    fields.insert("mean".into(), snapshot.mean().into());
    fields.insert("stddev".into(), snapshot.std_dev().into());
    for (key, value) in percentiles(&snapshot) {
        fields.insert(key.into(), value.into());
    }
    fields
}

pub fn meter_fields(meter: &Meter, units: &Units) -> Fields {
    let mut fields = Fields::new();
    fields.insert("count".into(), meter.count().into());
    insert_rates(&mut fields, meter, units);
    fields
}

pub fn timer_fields(timer: &Timer, units: &Units) -> Fields {
    let snapshot = timer.snapshot();
    let mut fields = Fields::new();
    fields.insert("count".into(), timer.count().into());
    fields.insert("min".into(), units.duration(snapshot.min() as f64).into());
    fields.insert("max".into(), units.duration(snapshot.max() as f64).into());
    fields.insert("mean".into(), units.duration(snapshot.mean()).into());
    fields.insert("stddev".into(), units.duration(snapshot.std_dev()).into());
    for (key, value) in percentiles(&snapshot) {
        fields.insert(key.into(), units.duration(value).into());
    }
    insert_rates(&mut fields, timer, units);
    fields
}

fn percentiles(snapshot: &Snapshot) -> [(&'static str, f64); 6] {
    [
        ("p50", snapshot.median()),
        ("p75", snapshot.p75()),
        ("p95", snapshot.p95()),
        ("p98", snapshot.p98()),
        ("p99", snapshot.p99()),
        ("p999", snapshot.p999()),
    ]
}

fn insert_rates(fields: &mut Fields, metered: &impl Metered, units: &Units) {
    fields.insert("m1_rate".into(), units.rate(metered.one_minute_rate()).into());
    fields.insert("m5_rate".into(), units.rate(metered.five_minute_rate()).into());
    fields.insert("m15_rate".into(), units.rate(metered.fifteen_minute_rate()).into());
    fields.insert("mean_rate".into(), units.rate(metered.mean_rate()).into());
}
