pub mod cycle;
pub mod fields;
pub mod idle;
pub mod reporter;
pub mod schedule;
pub mod senders;

pub use cycle::{Cycle, ReportSettings, build_cycle};
pub use fields::Units;
pub use idle::PreviousValues;
pub use reporter::{ReportOutcome, Reporter, ReporterBuilder};
pub use schedule::ScheduledReporter;
pub use senders::{JsonLinesSender, MemorySender};
