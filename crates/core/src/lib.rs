pub mod config;
pub mod error;
pub mod model;
pub mod sender;
pub mod time;

pub use error::{ReporterError, Result};
pub use model::point::{FieldValue, Fields, Point};
pub use sender::Sender;
pub use time::TimeUnit;
