use std::collections::BTreeMap;

use crate::error::Result;
use crate::model::point::Point;

/// Destination that owns buffering, tagging and transmission of points.
///
/// The reporter drives one cycle as `flush`, any number of `append_points`,
/// then `write_data` if `has_series_data` says there is something buffered.
pub trait Sender {
    /// Common tags applied to every point this sender transmits. Called once.
    fn set_tags(&mut self, tags: &BTreeMap<String, String>);

    /// Drops whatever a previous cycle left behind.
    fn flush(&mut self) -> Result<()>;

    fn append_points(&mut self, point: Point) -> Result<()>;

    fn has_series_data(&self) -> bool;

    fn write_data(&mut self) -> Result<()>;
}

impl<S: Sender + ?Sized> Sender for Box<S> {
    fn set_tags(&mut self, tags: &BTreeMap<String, String>) {
        (**self).set_tags(tags)
    }

    fn flush(&mut self) -> Result<()> {
        (**self).flush()
    }

    fn append_points(&mut self, point: Point) -> Result<()> {
        (**self).append_points(point)
    }

    fn has_series_data(&self) -> bool {
        (**self).has_series_data()
    }

    fn write_data(&mut self) -> Result<()> {
        (**self).write_data()
    }
}
