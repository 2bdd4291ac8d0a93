// Aggregator: merges several host captures onto one time axis and derives
// per-family cross-host statistics (avg/std for every family, sum/cumsum except cpu).

mod export;
mod maxima;
pub mod stats;

pub use maxima::SuiteMaxima;

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use tracing::{debug, info, instrument, warn};

use crate::capture::HostCapture;
use crate::charts::{Chart, ChartKind, Output, Panel, Series, TickGranularity, XAxis};
use crate::error::{Result, SheeError};
use crate::models::{ColumnKey, MetricFamily};
use crate::partition::{self, Partitionable, WindowPrompt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Statistic {
    Mean,
    StdDev,
    Sum,
    CumSum,
}

impl Statistic {
    pub fn prefix(self) -> &'static str {
        match self {
            Statistic::Mean => "avg",
            Statistic::StdDev => "std",
            Statistic::Sum => "sum",
            Statistic::CumSum => "cumsum",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "avg" => Some(Statistic::Mean),
            "std" => Some(Statistic::StdDev),
            "sum" => Some(Statistic::Sum),
            "cumsum" => Some(Statistic::CumSum),
            _ => None,
        }
    }

    /// Statistics computed for a family, in column order.
    pub fn for_family(family: MetricFamily) -> &'static [Statistic] {
        if family.sums_across_hosts() {
            &[
                Statistic::Mean,
                Statistic::StdDev,
                Statistic::Sum,
                Statistic::CumSum,
            ]
        } else {
            &[Statistic::Mean, Statistic::StdDev]
        }
    }
}

impl fmt::Display for Statistic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Column of a statistics table: one host's series, or a statistic across hosts.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AggregateColumn {
    Host { host: String, metric: String },
    Stat { stat: Statistic, metric: String },
}

impl AggregateColumn {
    pub fn metric(&self) -> &str {
        match self {
            AggregateColumn::Host { metric, .. } | AggregateColumn::Stat { metric, .. } => metric,
        }
    }

    /// Host id or statistic prefix.
    pub fn group(&self) -> &str {
        match self {
            AggregateColumn::Host { host, .. } => host,
            AggregateColumn::Stat { stat, .. } => stat.prefix(),
        }
    }
}

impl fmt::Display for AggregateColumn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.group(), self.metric())
    }
}

/// Host-namespaced columns left-joined onto the union of every host's timestamps.
#[derive(Debug, Clone)]
pub struct JoinedTable {
    epoch: Vec<NaiveDateTime>,
    keys: Vec<(String, ColumnKey)>,
    columns: Vec<Vec<f64>>,
}

impl JoinedTable {
    /// Outer union of the captures' time axes, each host's columns filled in where it has a
    /// sample and NaN elsewhere.
    pub fn join(captures: &[HostCapture]) -> Self {
        let epoch: Vec<NaiveDateTime> = captures
            .iter()
            .flat_map(|c| c.table().epoch().iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut keys = Vec::new();
        let mut columns = Vec::new();
        for capture in captures {
            let table = capture.table();
            let rows: Vec<usize> = table
                .epoch()
                .iter()
                .filter_map(|t| epoch.binary_search(t).ok())
                .collect();
            for (key, values) in table.columns() {
                let mut column = vec![f64::NAN; epoch.len()];
                for (&row, value) in rows.iter().zip(values) {
                    column[row] = *value;
                }
                keys.push((capture.id().to_string(), key.clone()));
                columns.push(column);
            }
        }
        Self {
            epoch,
            keys,
            columns,
        }
    }

    pub fn len(&self) -> usize {
        self.epoch.len()
    }

    pub fn is_empty(&self) -> bool {
        self.epoch.is_empty()
    }

    pub fn epoch(&self) -> &[NaiveDateTime] {
        &self.epoch
    }

    pub fn keys(&self) -> &[(String, ColumnKey)] {
        &self.keys
    }

    pub fn column(&self, host: &str, family: &str, metric: &str) -> Option<&[f64]> {
        self.keys
            .iter()
            .position(|(h, k)| h == host && k.family == family && k.metric == metric)
            .map(|idx| self.columns[idx].as_slice())
    }

    /// Removes join artifacts: any column whose key names the time axis.
    fn drop_epoch_columns(&mut self) {
        let keep: Vec<bool> = self.keys.iter().map(|(_, k)| !k.is_epoch()).collect();
        let mut flags = keep.iter();
        self.keys.retain(|_| *flags.next().unwrap_or(&true));
        let mut flags = keep.iter();
        self.columns.retain(|_| *flags.next().unwrap_or(&true));
    }
}

impl Partitionable for JoinedTable {
    fn time_bounds(&self) -> Option<(NaiveDateTime, NaiveDateTime)> {
        Some((*self.epoch.first()?, *self.epoch.last()?))
    }

    fn retain_between(&mut self, start: NaiveDateTime, end: NaiveDateTime) {
        let rows: Vec<usize> = (0..self.len())
            .filter(|&r| self.epoch[r] > start && self.epoch[r] < end)
            .collect();
        self.epoch = rows.iter().map(|&r| self.epoch[r]).collect();
        for column in &mut self.columns {
            *column = rows.iter().map(|&r| column[r]).collect();
        }
    }
}

/// One family's host columns and cross-host statistics on an elapsed-seconds axis.
#[derive(Debug, Clone, PartialEq)]
pub struct StatsTable {
    family: MetricFamily,
    elapsed_secs: Vec<f64>,
    columns: Vec<(AggregateColumn, Vec<f64>)>,
}

impl StatsTable {
    pub fn family(&self) -> MetricFamily {
        self.family
    }

    pub fn len(&self) -> usize {
        self.elapsed_secs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elapsed_secs.is_empty()
    }

    pub fn elapsed_secs(&self) -> &[f64] {
        &self.elapsed_secs
    }

    pub fn columns(&self) -> impl Iterator<Item = (&AggregateColumn, &[f64])> {
        self.columns.iter().map(|(c, v)| (c, v.as_slice()))
    }

    pub fn stat(&self, stat: Statistic, metric: &str) -> Option<&[f64]> {
        self.find(|c| matches!(c, AggregateColumn::Stat { stat: s, metric: m } if *s == stat && m == metric))
    }

    pub fn host(&self, host: &str, metric: &str) -> Option<&[f64]> {
        self.find(|c| matches!(c, AggregateColumn::Host { host: h, metric: m } if h == host && m == metric))
    }

    /// Sub-metrics in column order.
    pub fn metrics(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.columns
            .iter()
            .map(|(c, _)| c.metric())
            .filter(|m| seen.insert(*m))
            .collect()
    }

    fn find(&self, pred: impl Fn(&AggregateColumn) -> bool) -> Option<&[f64]> {
        self.columns
            .iter()
            .find(|(c, _)| pred(c))
            .map(|(_, v)| v.as_slice())
    }
}

/// Result of one aggregation run.
#[derive(Debug, Clone)]
pub struct Aggregate {
    started_at: Option<NaiveDateTime>,
    hosts: Vec<String>,
    tables: BTreeMap<MetricFamily, StatsTable>,
}

impl Aggregate {
    /// Time of the first merged sample; `None` when the window left no rows.
    pub fn started_at(&self) -> Option<NaiveDateTime> {
        self.started_at
    }

    /// Capture date.
    pub fn date(&self) -> Option<NaiveDate> {
        self.started_at.map(|t| t.date())
    }

    /// Participating hosts in input order.
    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    pub fn get(&self, family: MetricFamily) -> Option<&StatsTable> {
        self.tables.get(&family)
    }

    pub fn tables(&self) -> impl Iterator<Item = (MetricFamily, &StatsTable)> {
        self.tables.iter().map(|(f, t)| (*f, t))
    }

    /// Host ids joined by `-`; prefix of every exported file.
    pub fn file_stem(&self) -> String {
        self.hosts.join("-")
    }

    /// Length of the merged span in seconds.
    pub fn runtime_secs(&self) -> f64 {
        self.tables
            .values()
            .filter_map(|t| t.elapsed_secs.last().copied())
            .fold(0.0, f64::max)
    }

    /// One panel per sub-metric holding every host's series plus the average.
    /// `maxima` pins each panel's y range to the suite-wide maximum.
    pub fn chart(
        &self,
        family: MetricFamily,
        output: Output,
        dir: &Path,
        maxima: Option<&SuiteMaxima>,
    ) -> Option<Chart> {
        let table = self.get(family)?;
        let panels: Vec<Panel> = table
            .metrics()
            .into_iter()
            .map(|metric| {
                let mut series: Vec<Series> = self
                    .hosts
                    .iter()
                    .filter_map(|host| {
                        table.host(host, metric).map(|values| Series {
                            label: host.clone(),
                            values: values.to_vec(),
                        })
                    })
                    .collect();
                if let Some(avg) = table.stat(Statistic::Mean, metric) {
                    series.push(Series {
                        label: Statistic::Mean.prefix().to_string(),
                        values: avg.to_vec(),
                    });
                }
                Panel {
                    title: metric.to_string(),
                    y_label: family.aggregate_unit_label().to_string(),
                    y_max: maxima.and_then(|m| m.get(&SuiteMaxima::host_key(family, metric))),
                    series,
                }
            })
            .collect();

        Some(Chart {
            kind: ChartKind::Panels,
            title: format!("{} {}", self.file_stem(), family.name()),
            x: XAxis::Elapsed(table.elapsed_secs.clone()),
            ticks: TickGranularity::Seconds,
            panels,
            path: (output == Output::Persist)
                .then(|| dir.join(format!("{}_{}.png", self.file_stem(), family.short()))),
        })
    }
}

/// Greedy overlap filter: the first capture is always kept, every later one is kept iff one
/// of its timestamps already belongs to a kept capture. Order-dependent, not a transitive closure.
/// A capture whose host id is already kept is left out, since joined columns are keyed by host.
pub fn filter_overlapping(captures: Vec<HostCapture>) -> Result<Vec<HostCapture>> {
    let total = captures.len();
    let mut seen: HashSet<NaiveDateTime> = HashSet::new();
    let mut ids: HashSet<String> = HashSet::new();
    let mut accepted = Vec::with_capacity(total);
    for capture in captures {
        if ids.contains(capture.id()) {
            warn!(host = %capture.id(), "host id already aggregated, duplicate left out");
            continue;
        }
        let overlaps = accepted.is_empty()
            || capture.table().epoch().iter().any(|t| seen.contains(t));
        if overlaps {
            seen.extend(capture.table().epoch().iter().copied());
            ids.insert(capture.id().to_string());
            accepted.push(capture);
        } else {
            warn!(host = %capture.id(), "capture shares no timestamp with the others, left out");
        }
    }
    if accepted.is_empty() {
        return Err(SheeError::NoOverlap { captures: total });
    }
    Ok(accepted)
}

/// Runs the whole pipeline. Every capture must carry the four total column groups;
/// one missing group fails the run and no partial aggregate is returned.
#[instrument(skip_all, fields(captures = captures.len()))]
pub fn aggregate(
    captures: Vec<HostCapture>,
    window: Option<&mut dyn WindowPrompt>,
) -> Result<Aggregate> {
    let mut accepted = filter_overlapping(captures)?;

    let totals: Vec<&str> = MetricFamily::ALL.iter().map(|f| f.total_label()).collect();
    for capture in &mut accepted {
        capture.narrow_in_place(&totals)?;
    }
    let hosts: Vec<String> = accepted.iter().map(|c| c.id().to_string()).collect();

    let mut joined = JoinedTable::join(&accepted);
    joined.drop_epoch_columns();
    debug!(rows = joined.len(), columns = joined.keys().len(), "captures joined");

    if let Some(prompt) = window {
        joined = partition::partition(joined, prompt)?;
    }

    let started_at = joined.epoch.first().copied();
    let elapsed_secs: Vec<f64> = match started_at {
        Some(t0) => joined
            .epoch
            .iter()
            .map(|t| (*t - t0).num_milliseconds() as f64 / 1000.0)
            .collect(),
        None => Vec::new(),
    };

    let tables = MetricFamily::ALL
        .iter()
        .map(|&family| (family, family_stats(&joined, &hosts, family, &elapsed_secs)))
        .collect();

    info!(hosts = %hosts.join(","), rows = elapsed_secs.len(), "aggregation complete");
    Ok(Aggregate {
        started_at,
        hosts,
        tables,
    })
}

fn family_stats(
    joined: &JoinedTable,
    hosts: &[String],
    family: MetricFamily,
    elapsed_secs: &[f64],
) -> StatsTable {
    let label = family.total_label();
    let divisor = family.aggregate_divisor();

    let mut metrics: Vec<&str> = Vec::new();
    for (_, key) in joined.keys.iter().filter(|(_, k)| k.family == label) {
        if !metrics.contains(&key.metric.as_str()) {
            metrics.push(&key.metric);
        }
    }

    let mut host_columns = Vec::new();
    let mut stat_columns: BTreeMap<Statistic, Vec<(AggregateColumn, Vec<f64>)>> = BTreeMap::new();
    for metric in &metrics {
        let per_host: Vec<(String, Vec<f64>)> = hosts
            .iter()
            .filter_map(|host| {
                joined.column(host, label, metric).map(|values| {
                    (host.clone(), values.iter().map(|v| v / divisor).collect())
                })
            })
            .collect();

        let mut row = Vec::with_capacity(per_host.len());
        let mut by_stat: BTreeMap<Statistic, Vec<f64>> = BTreeMap::new();
        for r in 0..joined.len() {
            row.clear();
            row.extend(per_host.iter().map(|(_, values)| values[r]));
            by_stat.entry(Statistic::Mean).or_default().push(stats::mean(&row));
            by_stat
                .entry(Statistic::StdDev)
                .or_default()
                .push(stats::sample_std(&row));
            if family.sums_across_hosts() {
                by_stat.entry(Statistic::Sum).or_default().push(stats::sum(&row));
            }
        }
        if family.sums_across_hosts() {
            let total = by_stat.get(&Statistic::Sum).cloned().unwrap_or_default();
            by_stat.insert(Statistic::CumSum, stats::cumulative_sum(&total));
        }

        for (host, values) in per_host {
            host_columns.push((
                AggregateColumn::Host {
                    host,
                    metric: metric.to_string(),
                },
                values,
            ));
        }
        for stat in Statistic::for_family(family) {
            let values = by_stat.remove(stat).unwrap_or_default();
            stat_columns.entry(*stat).or_default().push((
                AggregateColumn::Stat {
                    stat: *stat,
                    metric: metric.to_string(),
                },
                values,
            ));
        }
    }

    let mut columns = host_columns;
    columns.extend(stat_columns.into_values().flatten());
    StatsTable {
        family,
        elapsed_secs: elapsed_secs.to_vec(),
        columns,
    }
}
