use std::sync::{Arc, Mutex};

use crate::clock::{Clock, SystemClock};
use crate::metric::{Counting, Metered};

const TICK_INTERVAL_NANOS: u64 = 5_000_000_000;
const SECONDS_PER_MINUTE: f64 = 60.0;

/// Exponentially-weighted moving average ticked every five seconds.
#[derive(Debug)]
struct Ewma {
    alpha: f64,
    uncounted: i64,
    rate: f64,
    initialized: bool,
}

impl Ewma {
    fn over_minutes(minutes: f64) -> Self {
        let interval_secs = TICK_INTERVAL_NANOS as f64 / 1e9;
        Self {
            alpha: 1.0 - (-interval_secs / SECONDS_PER_MINUTE / minutes).exp(),
            uncounted: 0,
            rate: 0.0,
            initialized: false,
        }
    }

    fn update(&mut self, n: i64) {
        self.uncounted += n;
    }

    fn tick(&mut self) {
        let count = std::mem::take(&mut self.uncounted);
        let instant_rate = count as f64 / TICK_INTERVAL_NANOS as f64;
        if self.initialized {
            self.rate += self.alpha * (instant_rate - self.rate);
        } else {
            self.rate = instant_rate;
            self.initialized = true;
        }
    }

    fn rate_per_second(&self) -> f64 {
        self.rate * 1e9
    }
}

#[derive(Debug)]
struct MeterState {
    count: i64,
    last_tick: u64,
    m1: Ewma,
    m5: Ewma,
    m15: Ewma,
}

impl MeterState {
    /// Applies every whole tick interval that elapsed since the last one.
    fn catch_up(&mut self, now: u64) {
        let age = now.saturating_sub(self.last_tick);
        if age <= TICK_INTERVAL_NANOS {
            return;
        }
        self.last_tick = now - age % TICK_INTERVAL_NANOS;
        for _ in 0..age / TICK_INTERVAL_NANOS {
            self.m1.tick();
            self.m5.tick();
            self.m15.tick();
        }
    }
}

/// Event count plus 1, 5 and 15 minute moving-average rates.
#[derive(Debug)]
pub struct Meter {
    clock: Arc<dyn Clock>,
    start_time: u64,
    state: Mutex<MeterState>,
}

impl Default for Meter {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock::default()))
    }
}

impl Meter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        let start_time = clock.tick();
        Self {
            clock,
            start_time,
            state: Mutex::new(MeterState {
                count: 0,
                last_tick: start_time,
                m1: Ewma::over_minutes(1.0),
                m5: Ewma::over_minutes(5.0),
                m15: Ewma::over_minutes(15.0),
            }),
        }
    }

    pub fn mark(&self) {
        self.mark_n(1);
    }

    pub fn mark_n(&self, n: i64) {
        let mut state = self.ticked_state();
        state.count += n;
        state.m1.update(n);
        state.m5.update(n);
        state.m15.update(n);
    }

    fn ticked_state(&self) -> std::sync::MutexGuard<'_, MeterState> {
        let now = self.clock.tick();
        let mut state = self.state.lock().expect("meter mutex poisoned");
        state.catch_up(now);
        state
    }
}

impl Counting for Meter {
    fn count(&self) -> i64 {
        self.state.lock().expect("meter mutex poisoned").count
    }
}

impl Metered for Meter {
    fn one_minute_rate(&self) -> f64 {
        self.ticked_state().m1.rate_per_second()
    }

    fn five_minute_rate(&self) -> f64 {
        self.ticked_state().m5.rate_per_second()
    }

    fn fifteen_minute_rate(&self) -> f64 {
        self.ticked_state().m15.rate_per_second()
    }

    fn mean_rate(&self) -> f64 {
        let count = self.count();
        if count == 0 {
            return 0.0;
        }
        let elapsed = self.clock.tick().saturating_sub(self.start_time);
        if elapsed == 0 {
            return 0.0;
        }
        count as f64 / elapsed as f64 * 1e9
    }
}
