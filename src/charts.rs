// Chart descriptors handed to the presentation layer, and the sink it implements.
// The core never draws: it fills in series, titles and the output path a renderer must use.

use chrono::NaiveDateTime;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::table::format_value;

/// Show the chart to the operator, or persist it at its deterministic path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Output {
    Interactive,
    #[default]
    Persist,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartKind {
    Line,
    StackedArea,
    Panels,
}

/// Tick spacing on the time axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TickGranularity {
    #[default]
    Minutes,
    Seconds,
}

#[derive(Debug, Clone, PartialEq)]
pub enum XAxis {
    Time(Vec<NaiveDateTime>),
    /// Seconds since the first shared sample.
    Elapsed(Vec<f64>),
}

impl XAxis {
    pub fn len(&self) -> usize {
        match self {
            XAxis::Time(t) => t.len(),
            XAxis::Elapsed(e) => e.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn label(&self, idx: usize) -> String {
        match self {
            XAxis::Time(t) => t[idx].format("%Y-%m-%d %H:%M:%S").to_string(),
            XAxis::Elapsed(e) => e[idx].to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub label: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Panel {
    pub title: String,
    pub y_label: String,
    /// Shared upper bound so runs of one suite are drawn on the same scale.
    pub y_max: Option<f64>,
    pub series: Vec<Series>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub kind: ChartKind,
    pub title: String,
    pub x: XAxis,
    pub ticks: TickGranularity,
    pub panels: Vec<Panel>,
    /// Image path when persisting; `None` for interactive charts.
    pub path: Option<PathBuf>,
}

impl Chart {
    pub fn series(&self) -> impl Iterator<Item = &Series> {
        self.panels.iter().flat_map(|p| p.series.iter())
    }
}

pub trait ChartSink {
    fn render(&mut self, chart: &Chart) -> anyhow::Result<()>;
}

/// Headless sink: persisted charts become a CSV of their series next to the image path
/// (see [`series_path`]), interactive charts are only logged.
#[derive(Debug, Default)]
pub struct DataExportSink {
    written: Vec<PathBuf>,
}

impl DataExportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }
}

impl ChartSink for DataExportSink {
    fn render(&mut self, chart: &Chart) -> anyhow::Result<()> {
        let Some(path) = &chart.path else {
            info!(
                title = %chart.title,
                panels = chart.panels.len(),
                samples = chart.x.len(),
                "chart ready"
            );
            return Ok(());
        };
        let target = series_path(path);
        write_series(chart, &target)?;
        info!(path = %target.display(), "chart data written");
        self.written.push(target);
        Ok(())
    }
}

/// `<dir>/<stem>.png` -> `<dir>/<stem>-series.csv`; `<stem>.csv` belongs to aggregate exports.
pub fn series_path(image: &Path) -> PathBuf {
    let stem = image
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    image.with_file_name(format!("{}-series.csv", stem))
}

fn write_series(chart: &Chart, target: &Path) -> anyhow::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = csv::Writer::from_writer(BufWriter::new(File::create(target)?));

    let mut header = vec!["x".to_string()];
    for panel in &chart.panels {
        for series in &panel.series {
            if chart.panels.len() > 1 {
                header.push(format!("{}:{}", panel.title, series.label));
            } else {
                header.push(series.label.clone());
            }
        }
    }
    out.write_record(&header)?;

    for row in 0..chart.x.len() {
        let mut record = vec![chart.x.label(row)];
        record.extend(
            chart
                .series()
                .map(|s| s.values.get(row).copied().map_or_else(String::new, format_value)),
        );
        out.write_record(&record)?;
    }
    out.flush()?;
    Ok(())
}
