use std::collections::BTreeMap;

use metrics_influx_core::{Point, Result, Sender};

/// Keeps every written batch in memory.
#[derive(Debug, Default)]
pub struct MemorySender {
    tags: BTreeMap<String, String>,
    pending: Vec<Point>,
    batches: Vec<Vec<Point>>,
}

impl MemorySender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.tags
    }

    pub fn pending(&self) -> &[Point] {
        &self.pending
    }

    pub fn batches(&self) -> &[Vec<Point>] {
        &self.batches
    }

    pub fn take_batches(&mut self) -> Vec<Vec<Point>> {
        std::mem::take(&mut self.batches)
    }
}

impl Sender for MemorySender {
    fn set_tags(&mut self, tags: &BTreeMap<String, String>) {
        self.tags = tags.clone();
    }

    fn flush(&mut self) -> Result<()> {
        self.pending.clear();
        Ok(())
    }

    fn append_points(&mut self, point: Point) -> Result<()> {
        self.pending.push(point);
        Ok(())
    }

    fn has_series_data(&self) -> bool {
        !self.pending.is_empty()
    }

    fn write_data(&mut self) -> Result<()> {
        let batch = std::mem::take(&mut self.pending);
        self.batches.push(batch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use metrics_influx_registry::MetricRegistry;
    use testkit::fixed_now;

    use super::*;
    use crate::reporter::Reporter;

    #[test]
    fn collects_one_batch_per_written_cycle() {
        let registry = MetricRegistry::new();
        registry.counter("requests").unwrap().inc();
        registry.gauge("depth", || 2).unwrap();

        let mut tags = BTreeMap::new();
        tags.insert("env".to_string(), "test".to_string());
        let mut reporter = Reporter::builder().tags(tags).build(MemorySender::new());
        reporter.report_registry(&registry, fixed_now());
        reporter.report_registry(&registry, fixed_now());

        let sender = reporter.into_sender();
        assert_eq!(sender.tags()["env"], "test");
        assert_eq!(sender.batches().len(), 2);
        assert_eq!(sender.batches()[0].len(), 2);
        assert!(sender.pending().is_empty());
    }

    #[test]
    fn flush_drops_stale_points() {
        let mut sender = MemorySender::new();
        sender
            .append_points(Point::new("stale", fixed_now(), Default::default()))
            .unwrap();
        sender.flush().unwrap();
        assert!(!sender.has_series_data());
    }
}
