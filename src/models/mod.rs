// Domain models shared by the parser, frames and aggregator

mod column;
mod family;

pub use column::{ColumnKey, EPOCH};
pub use family::{Device, MetricFamily};
