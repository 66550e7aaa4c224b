use std::fmt;

use metrics_influx_core::FieldValue;

/// Reads its value from a callback each time it is reported.
pub struct Gauge {
    read: Box<dyn Fn() -> FieldValue + Send + Sync>,
}

impl Gauge {
    pub fn new<F, T>(read: F) -> Self
    where
        F: Fn() -> T + Send + Sync + 'static,
        T: Into<FieldValue>,
    {
        Self {
            read: Box::new(move || read().into()),
        }
    }

    pub fn value(&self) -> FieldValue {
        (self.read)()
    }
}

impl fmt::Debug for Gauge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gauge").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicI64, Ordering};

    use super::*;

    #[test]
    fn reads_live_value() {
        let depth = Arc::new(AtomicI64::new(3));
        let source = Arc::clone(&depth);
        let gauge = Gauge::new(move || source.load(Ordering::Relaxed));

        assert_eq!(gauge.value(), FieldValue::Integer(3));
        depth.store(9, Ordering::Relaxed);
        assert_eq!(gauge.value(), FieldValue::Integer(9));
    }

    #[test]
    fn accepts_non_numeric_values() {
        let gauge = Gauge::new(|| "leader");
        assert_eq!(gauge.value(), FieldValue::String("leader".into()));
    }
}
