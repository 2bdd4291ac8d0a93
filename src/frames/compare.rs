// Comparison frame: two or three family totals from one capture, charted as stacked panels.

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use tracing::instrument;

use crate::capture::HostCapture;
use crate::charts::{Chart, ChartKind, Output, Panel, Series, TickGranularity, XAxis};
use crate::error::{Result, SheeError};
use crate::models::MetricFamily;
use crate::parser::ParseOptions;
use crate::partition::{self, WindowPrompt};
use crate::table::SampleTable;

/// Every non-cpu column is divided by this one factor, whatever its family.
const COMPARISON_DIVISOR: f64 = 1024.0 * 1024.0;

const OUTPUT_DIR: &str = "comparison";

#[derive(Debug, Clone)]
pub struct ComparisonFrame {
    labels: Vec<String>,
    host: String,
    output_stem: PathBuf,
    table: SampleTable,
}

impl ComparisonFrame {
    pub fn open(
        path: &Path,
        output_dir: &Path,
        options: &ParseOptions,
        labels: &[&str],
        window: Option<&mut dyn WindowPrompt>,
    ) -> Result<Self> {
        let capture = HostCapture::from_file(path, output_dir, options)?;
        Self::derive(&capture, labels, window)
    }

    /// `labels` are outer header labels such as `total cpu usage` or `net/total`.
    #[instrument(skip(capture, window), fields(host = %capture.id()))]
    pub fn derive(
        capture: &HostCapture,
        labels: &[&str],
        window: Option<&mut dyn WindowPrompt>,
    ) -> Result<Self> {
        if !(2..=3).contains(&labels.len()) {
            return Err(SheeError::InvalidComparison {
                requested: labels.len(),
            });
        }
        let mut table = capture.table().select(labels, capture.id())?;
        table.divide_where(COMPARISON_DIVISOR, |key| {
            MetricFamily::of_label(&key.family) != Some(MetricFamily::Cpu)
        });
        if let Some(prompt) = window {
            table = partition::partition(table, prompt)?;
        }
        Ok(Self {
            labels: labels.iter().map(|l| l.to_string()).collect(),
            host: capture.id().to_string(),
            output_stem: capture.output_stem().to_path_buf(),
            table,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn table(&self) -> &SampleTable {
        &self.table
    }

    pub fn epoch(&self) -> &[NaiveDateTime] {
        self.table.epoch()
    }

    pub fn name(&self) -> String {
        comparison_name(&self.labels)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.output_stem.join(OUTPUT_DIR)
    }

    pub fn output_path(&self, suffix: &str) -> PathBuf {
        self.output_dir()
            .join(format!("{}-{}-{}.png", self.host, self.name(), suffix))
    }

    /// One panel per requested family, top to bottom in request order.
    pub fn panel_chart(&self, output: Output, ticks: TickGranularity) -> Chart {
        let panels = self
            .labels
            .iter()
            .map(|label| Panel {
                title: label.clone(),
                y_label: unit_label(label).to_string(),
                y_max: None,
                series: self
                    .table
                    .columns()
                    .filter(|(key, _)| key.family == *label)
                    .map(|(key, values)| Series {
                        label: key.metric.clone(),
                        values: values.to_vec(),
                    })
                    .collect(),
            })
            .collect();
        Chart {
            kind: ChartKind::Panels,
            title: self.labels.join(" / "),
            x: XAxis::Time(self.table.epoch().to_vec()),
            ticks,
            panels,
            path: (output == Output::Persist).then(|| self.output_path("subplots")),
        }
    }
}

/// Labels stripped of spaces and slashes, joined by `-`: `totalcpuusage-nettotal`.
pub fn comparison_name<S: AsRef<str>>(labels: &[S]) -> String {
    labels
        .iter()
        .map(|l| l.as_ref().replace([' ', '/'], ""))
        .collect::<Vec<_>>()
        .join("-")
}

fn unit_label(label: &str) -> &'static str {
    match MetricFamily::of_label(label) {
        Some(MetricFamily::Cpu) => "percentage",
        Some(MetricFamily::Network) => "bandwidth [MB/s]",
        Some(MetricFamily::Disk) => "disk [MB]",
        Some(MetricFamily::Memory) | None => "memory usage [MB]",
    }
}
