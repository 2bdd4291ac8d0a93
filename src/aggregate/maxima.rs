// Suite-wide maxima: the longest runtime and the largest value per column across several
// aggregation runs, so their charts can share axis ranges.

use serde::Serialize;
use std::collections::BTreeMap;

use super::{Aggregate, AggregateColumn};
use crate::models::MetricFamily;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SuiteMaxima {
    pub runtime_secs: f64,
    /// `<family>/<metric>` for host columns, `<family>/<stat>-<metric>` for statistics.
    pub values: BTreeMap<String, f64>,
}

impl SuiteMaxima {
    pub fn collect<'a>(runs: impl IntoIterator<Item = &'a Aggregate>) -> Self {
        let mut maxima = Self::default();
        for run in runs {
            maxima.observe(run);
        }
        maxima
    }

    pub fn observe(&mut self, run: &Aggregate) {
        self.runtime_secs = self.runtime_secs.max(run.runtime_secs());
        for (family, table) in run.tables() {
            for (column, values) in table.columns() {
                let Some(peak) = values.iter().copied().filter(|v| !v.is_nan()).reduce(f64::max)
                else {
                    continue;
                };
                let key = match column {
                    AggregateColumn::Host { metric, .. } => Self::host_key(family, metric),
                    AggregateColumn::Stat { stat, metric } => {
                        format!("{}/{}-{}", family.short(), stat, metric)
                    }
                };
                let entry = self.values.entry(key).or_insert(peak);
                *entry = entry.max(peak);
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.values.get(key).copied()
    }

    pub fn host_key(family: MetricFamily, metric: &str) -> String {
        format!("{}/{}", family.short(), metric)
    }
}
