use std::collections::BTreeMap;

use tracing::warn;

/// Last observed count per metric name, used to suppress idle metrics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreviousValues {
    counts: BTreeMap<String, i64>,
}

impl PreviousValues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<i64> {
        self.counts.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.counts.is_empty()
    }

    /// Progress since the last recorded count: `-1` when there is none, and
    /// `0` when the count went backwards.
    pub fn delta(&self, name: &str, count: i64) -> i64 {
        let Some(previous) = self.get(name) else {
            return -1;
        };
        if count < previous {
            warn!(metric = %name, previous, count, "non-monotonic value observed for metric");
            return 0;
        }
        count - previous
    }

    /// Returns true when the metric should be left out of this cycle.
    ///
    /// The stored count only moves for metrics that made progress, so a
    /// metric observed for the first time is never idle.
    pub fn can_skip(&mut self, name: &str, count: i64, skip_idle: bool) -> bool {
        let idle = self.delta(name, count) == 0;
        if skip_idle && !idle {
            self.counts.insert(name.to_string(), count);
        }
        skip_idle && idle
    }
}

#[cfg(test)]
mod tests {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    use super::*;

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for CapturedLogs {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn first_observation_is_never_idle() {
        let mut prev = PreviousValues::new();
        assert_eq!(prev.delta("requests", 0), -1);
        assert!(!prev.can_skip("requests", 0, true));
        assert_eq!(prev.get("requests"), Some(0));
    }

    #[test]
    fn skips_only_when_count_is_unchanged() {
        let mut prev = PreviousValues::new();
        assert!(!prev.can_skip("requests", 10, true));
        assert!(prev.can_skip("requests", 10, true));
        assert!(!prev.can_skip("requests", 12, true));
        assert_eq!(prev.get("requests"), Some(12));
    }

    #[test]
    fn regression_counts_as_idle_and_keeps_previous() {
        let mut prev = PreviousValues::new();
        assert!(!prev.can_skip("requests", 10, true));
        assert_eq!(prev.delta("requests", 7), 0);
        assert!(prev.can_skip("requests", 7, true));
        assert_eq!(prev.get("requests"), Some(10));
    }

    #[test]
    fn disabled_suppression_never_skips_or_records() {
        let mut prev = PreviousValues::new();
        assert!(!prev.can_skip("requests", 10, false));
        assert!(!prev.can_skip("requests", 10, false));
        assert!(prev.is_empty());
    }

    #[test]
    fn regression_logs_a_warning() {
        let logs = CapturedLogs::default();
        let writer = logs.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .without_time()
            .finish();

        let delta = tracing::subscriber::with_default(subscriber, || {
            let mut prev = PreviousValues::new();
            prev.can_skip("events", 10, true);
            prev.delta("events", 7)
        });

        assert_eq!(delta, 0);
        let out = logs.contents();
        let line = out
            .lines()
            .find(|line| line.contains("non-monotonic value observed for metric"))
            .unwrap();
        assert!(line.contains("WARN"));
        assert!(line.contains("metric=events"));
        assert!(line.contains("previous=10"));
        assert!(line.contains("count=7"));
    }
}
