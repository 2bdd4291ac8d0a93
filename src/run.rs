// Batch driver: evaluates every capture in the input directory, then aggregates.
// One failing file or aggregation unit is logged and skipped; the batch goes on.

use anyhow::Context;
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::aggregate::{self, Aggregate, SuiteMaxima};
use crate::capture::HostCapture;
use crate::charts::{ChartSink, Output, TickGranularity};
use crate::config::AppConfig;
use crate::frames::{ComparisonFrame, MetricFrame};
use crate::models::{Device, MetricFamily};
use crate::parser::ParseOptions;
use crate::partition::{ConsolePrompt, FixedWindow, WindowPrompt, reborrow};

const MAXIMA_FILE: &str = "suite-maxima.json";

/// Which evaluations run for each capture. An evaluation runs when its own flag is set,
/// or when nothing at all was chosen.
#[derive(Debug, Clone, Default)]
pub struct Selection {
    pub cpu: bool,
    pub network: bool,
    pub memory: bool,
    pub disk: bool,
    pub core: Option<u32>,
    pub interface: Option<u32>,
    pub disk_letter: Option<char>,
    /// Outer labels to compare (2 or 3).
    pub comparison: Vec<String>,
}

impl Selection {
    pub fn nothing_chosen(&self) -> bool {
        !(self.cpu || self.network || self.memory || self.disk)
            && self.core.is_none()
            && self.interface.is_none()
            && self.disk_letter.is_none()
            && self.comparison.is_empty()
    }

    pub fn runs_total(&self, family: MetricFamily) -> bool {
        let flag = match family {
            MetricFamily::Cpu => self.cpu,
            MetricFamily::Network => self.network,
            MetricFamily::Memory => self.memory,
            MetricFamily::Disk => self.disk,
        };
        flag || self.nothing_chosen()
    }

    pub fn runs_devices(&self, family: MetricFamily) -> bool {
        family.first_device().is_some()
            && (self.device(family).is_some() || self.nothing_chosen())
    }

    /// The single device asked for, if any.
    pub fn device(&self, family: MetricFamily) -> Option<Device> {
        match family {
            MetricFamily::Cpu => self.core.map(Device::Core),
            MetricFamily::Network => self.interface.map(Device::Interface),
            MetricFamily::Disk => self.disk_letter.map(Device::Disk),
            MetricFamily::Memory => None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum WindowMode {
    #[default]
    Off,
    /// Ask on the console for every table.
    Interactive,
    /// Same `HH:MM:SS` window for every table.
    Fixed { start: String, end: String },
}

impl WindowMode {
    pub fn prompt(&self) -> Option<Box<dyn WindowPrompt>> {
        match self {
            WindowMode::Off => None,
            WindowMode::Interactive => Some(Box::new(ConsolePrompt::stdio())),
            WindowMode::Fixed { start, end } => Some(Box::new(FixedWindow::new(start, end))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub input_dir: PathBuf,
    /// Evaluate only this file name inside `input_dir`.
    pub file: Option<String>,
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub file_extension: String,
    pub parse: ParseOptions,
    pub selection: Selection,
    pub output: Output,
    pub ticks: TickGranularity,
    pub window: WindowMode,
    /// Skip per-file evaluation (aggregate only).
    pub skip_frames: bool,
    pub aggregate: bool,
    /// Aggregate each immediate sub-directory of `input_dir` as one run of a suite.
    pub suite: bool,
    pub save_csv: bool,
    pub aggregation_dir: String,
    /// Re-render the charts of an aggregate saved by a previous run (any of its csv files)
    /// instead of evaluating captures.
    pub saved_aggregate: Option<PathBuf>,
}

impl RunOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            input_dir: config.input.dir.clone(),
            file: None,
            output_dir: config.output_dir(),
            file_prefix: config.input.file_prefix.clone(),
            file_extension: config.input.file_extension.clone(),
            parse: config.parse_options(),
            selection: Selection::default(),
            output: if config.output.interactive {
                Output::Interactive
            } else {
                Output::Persist
            },
            ticks: TickGranularity::Minutes,
            window: WindowMode::Off,
            skip_frames: false,
            aggregate: false,
            suite: false,
            save_csv: config.aggregation.save_csv,
            aggregation_dir: config.aggregation.dir_name.clone(),
            saved_aggregate: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub files_evaluated: usize,
    pub files_failed: usize,
    pub charts: usize,
    /// Host lists of the aggregation runs that completed.
    pub aggregates: Vec<Vec<String>>,
    pub aggregation_failures: usize,
    pub exported: Vec<PathBuf>,
    pub maxima: Option<SuiteMaxima>,
}

/// Regular file named `<prefix>...<.extension>`.
pub fn is_capture_file(path: &Path, prefix: &str, extension: &str) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    path.is_file() && name.starts_with(prefix) && name.ends_with(&format!(".{}", extension))
}

/// Capture files of `dir`, sorted by name. `only` restricts the listing to one file name.
pub fn list_captures(
    dir: &Path,
    prefix: &str,
    extension: &str,
    only: Option<&str>,
) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("input dir {}", dir.display()))? {
        let path = entry?.path();
        if let Some(only) = only
            && path.file_name().and_then(|n| n.to_str()) != Some(only)
        {
            continue;
        }
        if is_capture_file(&path, prefix, extension) {
            files.push(path);
        } else {
            debug!(path = %path.display(), "not a capture file, skipped");
        }
    }
    files.sort();
    Ok(files)
}

/// Renders every selected view of one capture and returns the number of charts produced.
#[instrument(skip(opts, sink, window), fields(file = %path.display()))]
pub fn evaluate_file(
    path: &Path,
    opts: &RunOptions,
    sink: &mut dyn ChartSink,
    mut window: Option<&mut dyn WindowPrompt>,
) -> anyhow::Result<usize> {
    let capture = HostCapture::from_file(path, &opts.output_dir, &opts.parse)?;
    let selection = &opts.selection;
    let mut charts = 0;

    for family in MetricFamily::ALL {
        if selection.runs_total(family) {
            let frame = MetricFrame::derive(&capture, family, None, reborrow(&mut window))?;
            charts += render_frame(&frame, opts.output, sink)?;
        }
        if !selection.runs_devices(family) {
            continue;
        }
        let frames = match selection.device(family) {
            Some(device) => {
                let frame = MetricFrame::probe(&capture, device, reborrow(&mut window))?;
                if frame.is_none() {
                    warn!(host = %capture.id(), %device, "selected device not in capture");
                }
                frame.into_iter().collect()
            }
            None => MetricFrame::enumerate(&capture, family, reborrow(&mut window))?,
        };
        for frame in &frames {
            charts += render_frame(frame, opts.output, sink)?;
        }
    }

    if !selection.comparison.is_empty() {
        let labels: Vec<&str> = selection.comparison.iter().map(String::as_str).collect();
        let frame = ComparisonFrame::derive(&capture, &labels, reborrow(&mut window))?;
        sink.render(&frame.panel_chart(opts.output, opts.ticks))?;
        charts += 1;
    }
    Ok(charts)
}

fn render_frame(frame: &MetricFrame, output: Output, sink: &mut dyn ChartSink) -> anyhow::Result<usize> {
    sink.render(&frame.line_chart(output))?;
    sink.render(&frame.panel_chart(output))?;
    let mut rendered = 2;
    if let Some(stacked) = frame.default_stacked_chart(output) {
        sink.render(&stacked)?;
        rendered += 1;
    }
    Ok(rendered)
}

/// Parses every capture in `dir` and aggregates them. Unreadable captures are left out.
#[instrument(skip(opts, window), fields(dir = %dir.display()))]
pub fn aggregate_dir(
    dir: &Path,
    opts: &RunOptions,
    window: Option<&mut dyn WindowPrompt>,
) -> anyhow::Result<Aggregate> {
    let aggregation_root = opts.output_dir.join(&opts.aggregation_dir);
    let mut captures = Vec::new();
    for path in list_captures(dir, &opts.file_prefix, &opts.file_extension, None)? {
        match HostCapture::from_file(&path, &aggregation_root, &opts.parse) {
            Ok(capture) => captures.push(capture),
            Err(e) => warn!(path = %path.display(), error = %e, "capture left out of aggregation"),
        }
    }
    Ok(aggregate::aggregate(captures, window)?)
}

/// Where one aggregation unit writes: `<output>/<dir_name>` or, in suite mode,
/// `<output>/<run>/<dir_name>`.
fn aggregation_output(opts: &RunOptions, run: Option<&Path>) -> PathBuf {
    match run.and_then(|r| r.file_name()) {
        Some(name) => opts.output_dir.join(name).join(&opts.aggregation_dir),
        None => opts.output_dir.join(&opts.aggregation_dir),
    }
}

fn publish_aggregate(
    aggregate: &Aggregate,
    dir: &Path,
    opts: &RunOptions,
    maxima: Option<&SuiteMaxima>,
    sink: &mut dyn ChartSink,
    summary: &mut RunSummary,
) -> anyhow::Result<()> {
    if opts.save_csv {
        summary.exported.extend(aggregate.write_csv(dir)?);
    }
    for family in MetricFamily::ALL {
        if let Some(chart) = aggregate.chart(family, opts.output, dir, maxima) {
            sink.render(&chart)?;
            summary.charts += 1;
        }
    }
    summary.aggregates.push(aggregate.hosts().to_vec());
    info!(
        hosts = %aggregate.file_stem(),
        date = ?aggregate.date(),
        "aggregation published"
    );
    Ok(())
}

fn suite_runs(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut runs = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("suite dir {}", dir.display()))? {
        let path = entry?.path();
        if path.is_dir() {
            runs.push(path);
        }
    }
    runs.sort();
    Ok(runs)
}

fn write_maxima(maxima: &SuiteMaxima, dir: &Path) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(dir)?;
    let path = dir.join(MAXIMA_FILE);
    serde_json::to_writer_pretty(BufWriter::new(File::create(&path)?), maxima)?;
    Ok(path)
}

/// Whole batch: per-file evaluation, then aggregation of the directory or of every suite run.
/// With `saved_aggregate` set only that aggregate's charts are rendered.
pub fn run(opts: &RunOptions, sink: &mut dyn ChartSink) -> anyhow::Result<RunSummary> {
    let mut summary = RunSummary::default();
    if let Some(saved) = &opts.saved_aggregate {
        let aggregate = Aggregate::read_csv(saved)?;
        publish_aggregate(
            &aggregate,
            &aggregation_output(opts, None),
            opts,
            None,
            sink,
            &mut summary,
        )?;
        return Ok(summary);
    }
    anyhow::ensure!(
        opts.input_dir.is_dir(),
        "input directory {} does not exist",
        opts.input_dir.display()
    );

    let mut prompt = opts.window.prompt();
    let mut window: Option<&mut dyn WindowPrompt> = match prompt.as_mut() {
        Some(prompt) => Some(prompt.as_mut()),
        None => None,
    };

    if !opts.skip_frames {
        let files = list_captures(
            &opts.input_dir,
            &opts.file_prefix,
            &opts.file_extension,
            opts.file.as_deref(),
        )?;
        anyhow::ensure!(
            !files.is_empty() || opts.file.is_none(),
            "capture {} not found in {}",
            opts.file.as_deref().unwrap_or_default(),
            opts.input_dir.display()
        );
        for path in files {
            let started = Instant::now();
            match evaluate_file(&path, opts, sink, reborrow(&mut window)) {
                Ok(charts) => {
                    summary.files_evaluated += 1;
                    summary.charts += charts;
                    info!(
                        file = %path.display(),
                        charts,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "analysis completed"
                    );
                }
                Err(e) => {
                    summary.files_failed += 1;
                    warn!(file = %path.display(), error = %e, "evaluation failed");
                }
            }
        }
    }

    if !opts.aggregate {
        return Ok(summary);
    }

    if !opts.suite {
        match aggregate_dir(&opts.input_dir, opts, reborrow(&mut window)) {
            Ok(aggregate) => {
                let dir = aggregation_output(opts, None);
                if let Err(e) =
                    publish_aggregate(&aggregate, &dir, opts, None, sink, &mut summary)
                {
                    summary.aggregation_failures += 1;
                    warn!(dir = %dir.display(), error = %e, "aggregation not published");
                }
            }
            Err(e) => {
                summary.aggregation_failures += 1;
                warn!(dir = %opts.input_dir.display(), error = %e, "aggregation failed");
            }
        }
        return Ok(summary);
    }

    let mut runs = Vec::new();
    for dir in suite_runs(&opts.input_dir)? {
        match aggregate_dir(&dir, opts, reborrow(&mut window)) {
            Ok(aggregate) => runs.push((dir, aggregate)),
            Err(e) => {
                summary.aggregation_failures += 1;
                warn!(dir = %dir.display(), error = %e, "aggregation failed");
            }
        }
    }
    let maxima = SuiteMaxima::collect(runs.iter().map(|(_, a)| a));
    match write_maxima(&maxima, &aggregation_output(opts, None)) {
        Ok(path) => info!(path = %path.display(), runs = runs.len(), "suite maxima written"),
        Err(e) => warn!(error = %e, "suite maxima not written"),
    }
    for (dir, aggregate) in &runs {
        let out = aggregation_output(opts, Some(dir));
        if let Err(e) =
            publish_aggregate(aggregate, &out, opts, Some(&maxima), sink, &mut summary)
        {
            summary.aggregation_failures += 1;
            warn!(dir = %out.display(), error = %e, "aggregation not published");
        }
    }
    summary.maxima = Some(maxima);
    Ok(summary)
}
