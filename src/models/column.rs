// Two-level column key: (metric family, sub-metric), e.g. ("total cpu usage", "usr").

use std::fmt;

/// Label used for both levels of the capture time axis column.
pub const EPOCH: &str = "epoch";

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ColumnKey {
    pub family: String,
    pub metric: String,
}

impl ColumnKey {
    pub fn new(family: impl Into<String>, metric: impl Into<String>) -> Self {
        Self {
            family: family.into(),
            metric: metric.into(),
        }
    }

    pub fn epoch() -> Self {
        Self::new(EPOCH, EPOCH)
    }

    pub fn is_epoch(&self) -> bool {
        self.family == EPOCH && self.metric == EPOCH
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.family, self.metric)
    }
}
