pub mod clock;
pub mod counter;
pub mod filter;
pub mod gauge;
pub mod histogram;
pub mod meter;
pub mod metric;
pub mod registry;
pub mod snapshot;
pub mod timer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use counter::Counter;
pub use filter::{AllMetrics, GlobFilter, MetricFilter};
pub use gauge::Gauge;
pub use histogram::Histogram;
pub use meter::Meter;
pub use metric::{Counting, Metered, Metric, MetricKind, Sampling};
pub use registry::{MetricRegistry, RegistrySnapshot};
pub use snapshot::Snapshot;
pub use timer::{Timer, TimerContext};
