// Metric frames: one host capture narrowed to one family and device scope, in display units.

mod compare;

pub use compare::{ComparisonFrame, comparison_name};

use chrono::NaiveDateTime;
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

use crate::capture::HostCapture;
use crate::charts::{Chart, ChartKind, Output, Panel, Series, TickGranularity, XAxis};
use crate::error::{Result, SheeError};
use crate::models::{Device, MetricFamily};
use crate::parser::ParseOptions;
use crate::partition::{self, WindowPrompt};
use crate::table::SampleTable;

#[derive(Debug, Clone)]
pub struct MetricFrame {
    family: MetricFamily,
    device: Option<Device>,
    host: String,
    output_stem: PathBuf,
    table: SampleTable,
}

impl MetricFrame {
    /// Parses `path` and scopes it in one go.
    pub fn open(
        path: &Path,
        output_dir: &Path,
        options: &ParseOptions,
        family: MetricFamily,
        device: Option<Device>,
        window: Option<&mut dyn WindowPrompt>,
    ) -> Result<Self> {
        let capture = HostCapture::from_file(path, output_dir, options)?;
        Self::derive(&capture, family, device, window)
    }

    /// Scopes an already parsed capture: selects the family's total (or device) column group,
    /// converts it to display units and applies the time window when one is given.
    #[instrument(skip(capture, window), fields(host = %capture.id(), family = %family))]
    pub fn derive(
        capture: &HostCapture,
        family: MetricFamily,
        device: Option<Device>,
        window: Option<&mut dyn WindowPrompt>,
    ) -> Result<Self> {
        let label = column_group(family, device, capture)?;
        let mut table = capture
            .table()
            .select(&[label.as_str()], &capture.scoped_id(device))?;

        let divisor = family.unit_divisor();
        if divisor != 1.0 {
            table.divide_where(divisor, |_| true);
        }
        if let Some(prompt) = window {
            table = partition::partition(table, prompt)?;
        }

        Ok(Self {
            family,
            device,
            host: capture.id().to_string(),
            output_stem: capture.output_stem().to_path_buf(),
            table,
        })
    }

    /// Like `derive` for one device, but a device the capture does not report is `None`
    /// instead of an error.
    pub fn probe(
        capture: &HostCapture,
        device: Device,
        window: Option<&mut dyn WindowPrompt>,
    ) -> Result<Option<Self>> {
        let family = device.family();
        let present = family
            .device_label(device)
            .is_some_and(|label| capture.table().has_family(&label));
        if !present {
            debug!(host = %capture.id(), %device, "no such device, enumeration ends");
            return Ok(None);
        }
        Self::derive(capture, family, Some(device), window).map(Some)
    }

    /// Frames for every device of `family`, probing from the first index until one is missing.
    pub fn enumerate(
        capture: &HostCapture,
        family: MetricFamily,
        mut window: Option<&mut dyn WindowPrompt>,
    ) -> Result<Vec<Self>> {
        let mut frames = Vec::new();
        let mut next = family.first_device();
        while let Some(device) = next {
            match Self::probe(capture, device, partition::reborrow(&mut window))? {
                Some(frame) => frames.push(frame),
                None => break,
            }
            next = device.next();
        }
        Ok(frames)
    }

    pub fn family(&self) -> MetricFamily {
        self.family
    }

    pub fn device(&self) -> Option<Device> {
        self.device
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn table(&self) -> &SampleTable {
        &self.table
    }

    pub fn epoch(&self) -> &[NaiveDateTime] {
        self.table.epoch()
    }

    /// Sub-metric labels in capture order.
    pub fn sub_metrics(&self) -> Vec<&str> {
        self.table.keys().iter().map(|k| k.metric.as_str()).collect()
    }

    pub fn values(&self, metric: &str) -> Option<&[f64]> {
        self.table
            .columns()
            .find(|(key, _)| key.metric == metric)
            .map(|(_, values)| values)
    }

    /// Plot title and save-title prefix, e.g. ("Total CPU Usage", "total-cpu-")
    /// or ("ETH1 Usage", "network-eth1-").
    pub fn titles(&self) -> (String, String) {
        match self.device {
            Some(device) => (
                format!("{} Usage", device.to_string().to_uppercase()),
                format!("{}-{}-", self.family.name(), device),
            ),
            None => (
                format!("Total {} Usage", self.family.name().to_uppercase()),
                format!("total-{}-", self.family.name()),
            ),
        }
    }

    /// `<output>/<host>/<family>[/<device>]`
    pub fn output_dir(&self) -> PathBuf {
        let dir = self.output_stem.join(self.family.name());
        match self.device {
            Some(device) => dir.join(device.to_string()),
            None => dir,
        }
    }

    /// Image path for a view, e.g. `.../cpu/node1-total-cpu-line.png`.
    pub fn output_path(&self, suffix: &str) -> PathBuf {
        let (_, save_title) = self.titles();
        self.output_dir()
            .join(format!("{}-{}{}.png", self.host, save_title, suffix))
    }

    /// Every sub-metric on one time axis.
    pub fn line_chart(&self, output: Output) -> Chart {
        let series = self
            .table
            .columns()
            .map(|(key, values)| series(&key.metric, values))
            .collect();
        self.chart(ChartKind::Line, vec![self.panel(series)], output, "line")
    }

    /// Stacked areas of the chosen sub-metrics.
    pub fn stacked_chart(&self, metrics: &[&str], output: Output) -> Result<Chart> {
        let mut picked = Vec::with_capacity(metrics.len());
        for metric in metrics {
            let values = self.values(metric).ok_or_else(|| {
                SheeError::unknown_column(&self.scoped_id(), format!("{}/{}", self.family, metric))
            })?;
            picked.push(series(metric, values));
        }
        let suffix = format!("{}-stacked", metrics.join("-"));
        Ok(self.chart(
            ChartKind::StackedArea,
            vec![self.panel(picked)],
            output,
            &suffix,
        ))
    }

    /// Stacked view of the family's usual subset, limited to the sub-metrics this frame has.
    pub fn default_stacked_chart(&self, output: Output) -> Option<Chart> {
        let present: Vec<&str> = self
            .family
            .stacked_metrics()
            .iter()
            .copied()
            .filter(|m| self.values(m).is_some())
            .collect();
        if present.is_empty() {
            return None;
        }
        self.stacked_chart(&present, output).ok()
    }

    /// One panel per sub-metric.
    pub fn panel_chart(&self, output: Output) -> Chart {
        let y_max = self.family.is_percentage().then_some(100.0);
        let panels = self
            .table
            .columns()
            .map(|(key, values)| Panel {
                title: key.metric.clone(),
                y_label: self.family.unit_label().to_string(),
                y_max,
                series: vec![series(&key.metric, values)],
            })
            .collect();
        self.chart(ChartKind::Panels, panels, output, "subplots")
    }

    fn scoped_id(&self) -> String {
        match self.device {
            Some(device) => format!("{}-{}", self.host, device),
            None => self.host.clone(),
        }
    }

    fn panel(&self, series: Vec<Series>) -> Panel {
        Panel {
            title: self.titles().0,
            y_label: self.family.unit_label().to_string(),
            y_max: None,
            series,
        }
    }

    fn chart(&self, kind: ChartKind, panels: Vec<Panel>, output: Output, suffix: &str) -> Chart {
        Chart {
            kind,
            title: self.titles().0,
            x: XAxis::Time(self.table.epoch().to_vec()),
            ticks: TickGranularity::Minutes,
            panels,
            path: (output == Output::Persist).then(|| self.output_path(suffix)),
        }
    }
}

/// Outer label of the column group a frame reads.
fn column_group(
    family: MetricFamily,
    device: Option<Device>,
    capture: &HostCapture,
) -> Result<String> {
    match device {
        None => Ok(family.total_label().to_string()),
        Some(device) => family.device_label(device).ok_or_else(|| {
            SheeError::unknown_column(capture.id(), format!("{} device {}", family, device))
        }),
    }
}

fn series(label: &str, values: &[f64]) -> Series {
    Series {
        label: label.to_string(),
        values: values.to_vec(),
    }
}
