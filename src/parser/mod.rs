// Raw dstat capture parser.
// Finds the two-row header, drops preamble / blank / repeated-header / garbled lines,
// resolves the sparse outer header and converts the epoch column to local display time.

mod header;

pub use header::{fill_sparse_header, is_placeholder};

use chrono::{DateTime, NaiveDateTime};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, instrument};

use crate::error::{Result, SheeError};
use crate::models::{ColumnKey, EPOCH};
use crate::table::SampleTable;

/// Captures are stored in UTC and displayed at UTC+1.
pub const DEFAULT_UTC_OFFSET_SECS: i64 = 3600;

#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Seconds added to every unix timestamp before it becomes a display time.
    pub utc_offset_secs: i64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            utc_offset_secs: DEFAULT_UTC_OFFSET_SECS,
        }
    }
}

/// Physical line layout found by the first scan.
#[derive(Debug)]
struct LineScan {
    outer: usize,
    inner: usize,
    skip: HashSet<usize>,
}

#[instrument(skip(options), fields(file = %path.display()))]
pub fn parse_file(path: &Path, options: &ParseOptions) -> Result<SampleTable> {
    let raw = std::fs::read_to_string(path).map_err(|source| SheeError::Open {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&raw, path, options)
}

/// Parses capture text; `origin` only names the source in errors and logs.
pub fn parse_str(raw: &str, origin: &Path, options: &ParseOptions) -> Result<SampleTable> {
    let scan = scan_lines(raw).ok_or_else(|| SheeError::TimeConversion {
        path: origin.to_path_buf(),
        reason: "no header row with an epoch column".into(),
    })?;

    // Feed the reader only the header pair and the kept data lines, remembering where each came from.
    let mut physical = Vec::new();
    let mut filtered = String::with_capacity(raw.len());
    for (idx, line) in raw.lines().enumerate() {
        if idx == scan.outer || idx == scan.inner || !scan.skip.contains(&idx) {
            physical.push(idx);
            filtered.push_str(line);
            filtered.push('\n');
        }
    }

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(filtered.as_bytes());
    let mut records = reader.records().zip(physical);

    let outer = match records.next() {
        Some((Ok(record), _)) => record.iter().map(str::to_string).collect::<Vec<_>>(),
        _ => {
            return Err(SheeError::ColumnNormalization {
                path: origin.to_path_buf(),
                reason: format!("unreadable header at line {}", scan.outer + 1),
            });
        }
    };
    let inner = match records.next() {
        Some((Ok(record), _)) => record.iter().map(str::to_string).collect::<Vec<_>>(),
        _ => {
            return Err(SheeError::ColumnNormalization {
                path: origin.to_path_buf(),
                reason: format!("missing sub-metric header at line {}", scan.inner + 1),
            });
        }
    };

    let keys = resolve_header(outer, inner).map_err(|reason| SheeError::ColumnNormalization {
        path: origin.to_path_buf(),
        reason,
    })?;
    let epoch_pos = keys
        .iter()
        .position(ColumnKey::is_epoch)
        .ok_or_else(|| SheeError::TimeConversion {
            path: origin.to_path_buf(),
            reason: "no (epoch, epoch) column".into(),
        })?;
    let width = keys.len();
    let value_keys: Vec<ColumnKey> = keys
        .into_iter()
        .enumerate()
        .filter(|(idx, _)| *idx != epoch_pos)
        .map(|(_, key)| key)
        .collect();

    let mut table = SampleTable::new(value_keys);
    let mut values = Vec::with_capacity(width.saturating_sub(1));
    let mut skipped = scan.skip.len();
    for (result, line) in records {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                debug!(line = line + 1, error = %e, "skipping unreadable line");
                skipped += 1;
                continue;
            }
        };
        if record.len() != width {
            debug!(
                line = line + 1,
                fields = record.len(),
                expected = width,
                "skipping line with wrong arity"
            );
            skipped += 1;
            continue;
        }

        let raw_epoch = record.get(epoch_pos).unwrap_or_default().trim();
        let at = raw_epoch
            .parse::<f64>()
            .ok()
            .and_then(|secs| epoch_to_datetime(secs, options.utc_offset_secs))
            .ok_or_else(|| SheeError::TimeConversion {
                path: origin.to_path_buf(),
                reason: format!("line {}: {:?} is not a unix timestamp", line + 1, raw_epoch),
            })?;

        values.clear();
        let mut garbled = false;
        for (idx, field) in record.iter().enumerate() {
            if idx == epoch_pos {
                continue;
            }
            match parse_cell(field) {
                Some(v) => values.push(v),
                None => {
                    garbled = true;
                    break;
                }
            }
        }
        if garbled {
            debug!(line = line + 1, "skipping line with non-numeric cells");
            skipped += 1;
            continue;
        }
        table.push_row(at, &values);
    }

    let duplicates = table.dedup_epochs();
    debug!(
        rows = table.len(),
        columns = table.keys().len(),
        skipped_lines = skipped,
        duplicate_rows = duplicates,
        "capture parsed"
    );
    Ok(table)
}

/// Locates the header pair and marks every other line that cannot be a data row.
fn scan_lines(raw: &str) -> Option<LineScan> {
    let mut outer = None;
    let mut skip = HashSet::new();
    for (idx, line) in raw.lines().enumerate() {
        match outer {
            None => {
                if has_epoch_token(line) {
                    outer = Some(idx);
                } else {
                    skip.insert(idx);
                }
            }
            Some(header) if idx == header + 1 => {}
            Some(_) => {
                if line.trim().is_empty() || !is_plain_number(first_field(line)) {
                    skip.insert(idx);
                }
            }
        }
    }
    let outer = outer?;
    Some(LineScan {
        outer,
        inner: outer + 1,
        skip,
    })
}

fn has_epoch_token(line: &str) -> bool {
    line.split(',').any(|field| unquote(field) == EPOCH)
}

fn first_field(line: &str) -> &str {
    unquote(line.split(',').next().unwrap_or_default())
}

fn unquote(field: &str) -> &str {
    field.trim().trim_matches('"').trim()
}

/// A pure non-negative integer or decimal token: `12`, `12.5`, `12.`.
fn is_plain_number(token: &str) -> bool {
    let mut digits = 0;
    let mut dots = 0;
    for c in token.chars() {
        match c {
            '0'..='9' => digits += 1,
            '.' => dots += 1,
            _ => return false,
        }
    }
    digits > 0 && dots <= 1 && !token.starts_with('.')
}

/// Empty cells are absent values; anything else must be a number.
fn parse_cell(field: &str) -> Option<f64> {
    let field = field.trim();
    if field.is_empty() {
        Some(f64::NAN)
    } else {
        field.parse::<f64>().ok()
    }
}

fn resolve_header(
    mut outer: Vec<String>,
    inner: Vec<String>,
) -> std::result::Result<Vec<ColumnKey>, String> {
    let width = inner.len();
    outer.resize(width, String::new());
    fill_sparse_header(&mut outer)
        .map_err(|idx| format!("column {} has no family label to inherit", idx + 1))?;

    let mut seen = HashSet::with_capacity(width);
    let mut keys = Vec::with_capacity(width);
    for (idx, (family, metric)) in outer.into_iter().zip(inner).enumerate() {
        let metric = metric.trim().to_string();
        if metric.is_empty() {
            return Err(format!("column {} has an empty sub-metric label", idx + 1));
        }
        let key = ColumnKey::new(family, metric);
        if !seen.insert(key.clone()) {
            return Err(format!("duplicate column {}", key));
        }
        keys.push(key);
    }
    Ok(keys)
}

fn epoch_to_datetime(secs: f64, offset_secs: i64) -> Option<NaiveDateTime> {
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    let whole = secs.trunc();
    let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
    let shifted = (whole as i64).checked_add(offset_secs)?;
    DateTime::from_timestamp(shifted, nanos).map(|dt| dt.naive_utc())
}
