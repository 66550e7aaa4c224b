use glob::Pattern;
use metrics_influx_core::error::{ReporterError, Result};

use crate::metric::Metric;

/// Decides whether a metric takes part in a report cycle.
pub trait MetricFilter: Send + Sync {
    fn matches(&self, name: &str, metric: &Metric) -> bool;
}

impl<F> MetricFilter for F
where
    F: Fn(&str, &Metric) -> bool + Send + Sync,
{
    fn matches(&self, name: &str, metric: &Metric) -> bool {
        self(name, metric)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AllMetrics;

impl MetricFilter for AllMetrics {
    fn matches(&self, _name: &str, _metric: &Metric) -> bool {
        true
    }
}

/// Name-based filter. Empty `include` admits every name; `exclude` always wins.
#[derive(Debug, Clone, Default)]
pub struct GlobFilter {
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

impl GlobFilter {
    pub fn new<I, E>(include: I, exclude: E) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
        E: IntoIterator,
        E::Item: AsRef<str>,
    {
        Ok(Self {
            include: compile(include)?,
            exclude: compile(exclude)?,
        })
    }

    pub fn is_pass_through(&self) -> bool {
        self.include.is_empty() && self.exclude.is_empty()
    }

    pub fn matches_name(&self, name: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| p.matches(name));
        included && !self.exclude.iter().any(|p| p.matches(name))
    }
}

impl MetricFilter for GlobFilter {
    fn matches(&self, name: &str, _metric: &Metric) -> bool {
        self.matches_name(name)
    }
}

fn compile<I>(patterns: I) -> Result<Vec<Pattern>>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    patterns
        .into_iter()
        .map(|raw| {
            let raw = raw.as_ref();
            Pattern::new(raw)
                .map_err(|e| ReporterError::InvalidArgument(format!("bad filter glob {raw}: {e}")))
        })
        .collect()
}
