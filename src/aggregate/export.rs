// Flat-file export of aggregate tables: `<hosts>_<cpu|net|mem|dsk>.csv`, one per family.
// Files are written to a temp file in the target directory and renamed into place.

use std::collections::BTreeMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info, instrument};

use super::{Aggregate, AggregateColumn, Statistic, StatsTable};
use crate::error::{Result, SheeError};
use crate::models::MetricFamily;
use crate::table::format_value;

impl Aggregate {
    /// Writes every family table into `dir` and returns the written paths in family order.
    pub fn write_csv(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(dir).map_err(|e| export_error(dir, e))?;
        let mut written = Vec::with_capacity(4);
        for (family, table) in self.tables() {
            let path = dir.join(format!("{}_{}.csv", self.file_stem(), family.short()));
            persist_table(table, &path)?;
            info!(path = %path.display(), rows = table.len(), "aggregate exported");
            written.push(path);
        }
        Ok(written)
    }

    /// Loads an export back. `path` names any one of its family files; every sibling
    /// `<hosts>_<short>.csv` present is read. The export carries no capture time, so
    /// `started_at` is `None`.
    #[instrument(skip(path), fields(file = %path.display()))]
    pub fn read_csv(path: &Path) -> Result<Aggregate> {
        if !path.is_file() {
            return Err(import_error(path, "no such file"));
        }
        let stem = export_stem(path)
            .ok_or_else(|| import_error(path, "file name is not <hosts>_<cpu|net|mem|dsk>.csv"))?;
        let dir = path.parent().unwrap_or_else(|| Path::new("."));

        let mut hosts: Vec<String> = Vec::new();
        let mut tables = BTreeMap::new();
        for family in MetricFamily::ALL {
            let file = dir.join(format!("{}_{}.csv", stem, family.short()));
            if !file.is_file() {
                debug!(path = %file.display(), "family not exported, skipped");
                continue;
            }
            let table = load_table(&file, family)?;
            for (column, _) in table.columns() {
                if let AggregateColumn::Host { host, .. } = column
                    && !hosts.contains(host)
                {
                    hosts.push(host.clone());
                }
            }
            tables.insert(family, table);
        }
        info!(hosts = %hosts.join(","), families = tables.len(), "aggregate loaded");
        Ok(Aggregate {
            started_at: None,
            hosts,
            tables,
        })
    }
}

/// `dstat-a-dstat-b_net.csv` -> `dstat-a-dstat-b`.
fn export_stem(path: &Path) -> Option<&str> {
    let name = path.file_stem()?.to_str()?;
    let (stem, short) = name.rsplit_once('_')?;
    MetricFamily::ALL
        .iter()
        .any(|f| f.short() == short)
        .then_some(stem)
}

fn load_table(path: &Path, family: MetricFamily) -> Result<StatsTable> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .from_path(path)
        .map_err(|e| import_error(path, e))?;
    let rows: Vec<csv::StringRecord> = reader
        .records()
        .collect::<std::result::Result<_, _>>()
        .map_err(|e| import_error(path, e))?;
    if rows.len() < 3 {
        return Err(import_error(path, "expected three header rows"));
    }
    let (group, labels, metrics) = (&rows[0], &rows[1], &rows[2]);
    if group.get(0) != Some("elapsed") {
        return Err(import_error(path, "first column is not elapsed"));
    }

    let family_label = family.total_label();
    let mut columns = Vec::with_capacity(group.len().saturating_sub(1));
    for idx in 1..group.len() {
        let name = group.get(idx).unwrap_or_default();
        let label = labels.get(idx).unwrap_or_default();
        let metric = metrics.get(idx).unwrap_or_default().to_string();
        let column = if label.is_empty() {
            let stat = Statistic::from_prefix(name)
                .ok_or_else(|| import_error(path, format!("unknown statistic {name:?}")))?;
            AggregateColumn::Stat { stat, metric }
        } else if label == family_label {
            AggregateColumn::Host {
                host: name.to_string(),
                metric,
            }
        } else {
            return Err(import_error(
                path,
                format!("column {idx} belongs to {label:?}, expected {family_label:?}"),
            ));
        };
        columns.push((column, Vec::with_capacity(rows.len() - 3)));
    }

    let mut elapsed_secs = Vec::with_capacity(rows.len() - 3);
    for (line, record) in rows[3..].iter().enumerate() {
        let secs = record.get(0).unwrap_or_default();
        elapsed_secs.push(
            secs.parse::<f64>()
                .map_err(|_| import_error(path, format!("row {}: bad elapsed {secs:?}", line + 4)))?,
        );
        for (idx, (_, values)) in columns.iter_mut().enumerate() {
            let cell = record.get(idx + 1).unwrap_or_default();
            let value = if cell.is_empty() {
                f64::NAN
            } else {
                cell.parse::<f64>()
                    .map_err(|_| import_error(path, format!("row {}: bad value {cell:?}", line + 4)))?
            };
            values.push(value);
        }
    }

    Ok(StatsTable {
        family,
        elapsed_secs,
        columns,
    })
}

fn persist_table(table: &StatsTable, path: &Path) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| export_error(path, e))?;
    {
        let writer = BufWriter::new(tmp.as_file_mut());
        write_table(table, writer).map_err(|e| export_error(path, e))?;
    }
    tmp.persist(path).map_err(|e| export_error(path, e.error))?;
    Ok(())
}

/// Three header rows (host or statistic, family label, sub-metric), then one row per sample
/// keyed by elapsed seconds.
fn write_table<W: Write>(table: &StatsTable, writer: W) -> csv::Result<()> {
    let mut out = csv::Writer::from_writer(writer);
    let family_label = table.family().total_label();

    let mut group = vec!["elapsed".to_string()];
    let mut family = vec![String::new()];
    let mut metric = vec![String::new()];
    for (column, _) in table.columns() {
        group.push(column.group().to_string());
        family.push(match column {
            AggregateColumn::Host { .. } => family_label.to_string(),
            AggregateColumn::Stat { .. } => String::new(),
        });
        metric.push(column.metric().to_string());
    }
    out.write_record(&group)?;
    out.write_record(&family)?;
    out.write_record(&metric)?;

    for (row, secs) in table.elapsed_secs().iter().enumerate() {
        let mut record = vec![secs.to_string()];
        record.extend(table.columns().map(|(_, values)| format_value(values[row])));
        out.write_record(&record)?;
    }
    out.flush()?;
    Ok(())
}

fn export_error(path: &Path, e: impl std::fmt::Display) -> SheeError {
    SheeError::Export {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

fn import_error(path: &Path, e: impl std::fmt::Display) -> SheeError {
    SheeError::Import {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}
