use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::metric::{Counting, Sampling};
use crate::snapshot::Snapshot;

pub const DEFAULT_WINDOW: usize = 1028;

/// Distribution of values over the most recent `window` updates.
#[derive(Debug)]
pub struct Histogram {
    count: AtomicI64,
    window: usize,
    samples: Mutex<VecDeque<i64>>,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::with_window(DEFAULT_WINDOW)
    }
}

impl Histogram {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_window(window: usize) -> Self {
        let window = window.max(1);
        Self {
            count: AtomicI64::new(0),
            window,
            samples: Mutex::new(VecDeque::with_capacity(window)),
        }
    }

    pub fn update(&self, value: i64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        let mut samples = self.samples.lock().expect("histogram mutex poisoned");
        if samples.len() == self.window {
            samples.pop_front();
        }
        samples.push_back(value);
    }
}

impl Counting for Histogram {
    /// Total updates ever recorded, not the number of samples retained.
    fn count(&self) -> i64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Sampling for Histogram {
    fn snapshot(&self) -> Snapshot {
        let samples = self.samples.lock().expect("histogram mutex poisoned");
        Snapshot::new(samples.iter().copied().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_count_and_samples() {
        let h = Histogram::new();
        for v in [10, 20, 30] {
            h.update(v);
        }
        assert_eq!(h.count(), 3);
        let s = h.snapshot();
        assert_eq!(s.values(), &[10, 20, 30]);
        assert_eq!(s.mean(), 20.0);
    }

    #[test]
    fn window_keeps_most_recent_samples() {
        let h = Histogram::with_window(3);
        for v in 1..=5 {
            h.update(v);
        }
        assert_eq!(h.count(), 5);
        assert_eq!(h.snapshot().values(), &[3, 4, 5]);
    }
}
