use std::collections::BTreeMap;
use std::io::Write;

use metrics_influx_core::{FieldValue, Point, ReporterError, Result, Sender};
use tracing::debug;

/// Writes each point as one JSON object per line, with common tags merged in.
#[derive(Debug)]
pub struct JsonLinesSender<W> {
    out: W,
    tags: BTreeMap<String, String>,
    pending: Vec<Point>,
}

impl<W: Write> JsonLinesSender<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            tags: BTreeMap::new(),
            pending: Vec::new(),
        }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Merges the common tags and drops float fields JSON cannot represent.
    fn prepare(&self, mut point: Point) -> Point {
        point.fields.retain(|key, value| match value {
            FieldValue::Float(v) if !v.is_finite() => {
                debug!(
                    measurement = %point.measurement,
                    field = %key,
                    value = %v,
                    "dropping non-finite field"
                );
                false
            }
            _ => true,
        });
        if self.tags.is_empty() {
            return point;
        }
        let mut tags = self.tags.clone();
        if let Some(own) = point.tags.take() {
            tags.extend(own);
        }
        point.tags = Some(tags);
        point
    }
}

impl<W: Write> Sender for JsonLinesSender<W> {
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
        for point in std::mem::take(&mut self.pending) {
            let point = self.prepare(point);
            serde_json::to_writer(&mut self.out, &point)
                .map_err(|e| ReporterError::Sender(format!("failed encoding point: {e}")))?;
            self.out
                .write_all(b"\n")
                .map_err(|e| ReporterError::Io(format!("failed writing point: {e}")))?;
        }
        self.out
            .flush()
            .map_err(|e| ReporterError::Io(format!("failed flushing output: {e}")))
    }
}
