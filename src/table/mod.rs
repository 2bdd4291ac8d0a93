// Sample table: capture time axis plus (family, metric) keyed value columns.
// Columns keep the order of the capture they came from; absent cells are NaN.

use chrono::NaiveDateTime;
use std::collections::HashSet;
use std::io::Write;

use crate::error::{Result, SheeError};
use crate::models::{ColumnKey, EPOCH};

const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

#[derive(Debug, Clone, PartialEq)]
pub struct SampleTable {
    epoch: Vec<NaiveDateTime>,
    keys: Vec<ColumnKey>,
    columns: Vec<Vec<f64>>,
}

impl SampleTable {
    /// Empty table with the given value columns; the epoch column is implicit.
    pub fn new(keys: Vec<ColumnKey>) -> Self {
        let columns = vec![Vec::new(); keys.len()];
        Self {
            epoch: Vec::new(),
            keys,
            columns,
        }
    }

    /// Appends one sample. `values` follows the order of `keys()`.
    pub fn push_row(&mut self, at: NaiveDateTime, values: &[f64]) {
        debug_assert_eq!(values.len(), self.keys.len());
        self.epoch.push(at);
        for (column, value) in self.columns.iter_mut().zip(values) {
            column.push(*value);
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

    pub fn keys(&self) -> &[ColumnKey] {
        &self.keys
    }

    pub fn first_time(&self) -> Option<NaiveDateTime> {
        self.epoch.first().copied()
    }

    pub fn last_time(&self) -> Option<NaiveDateTime> {
        self.epoch.last().copied()
    }

    pub fn columns(&self) -> impl Iterator<Item = (&ColumnKey, &[f64])> {
        self.keys
            .iter()
            .zip(self.columns.iter().map(Vec::as_slice))
    }

    pub fn column(&self, family: &str, metric: &str) -> Option<&[f64]> {
        self.columns()
            .find(|(key, _)| key.family == family && key.metric == metric)
            .map(|(_, values)| values)
    }

    /// Outer labels in first-seen order.
    pub fn families(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.keys
            .iter()
            .map(|k| k.family.as_str())
            .filter(|f| seen.insert(*f))
            .collect()
    }

    pub fn has_family(&self, family: &str) -> bool {
        family == EPOCH || self.keys.iter().any(|k| k.family == family)
    }

    /// Copies the time axis plus every column of the requested families, in request order.
    /// `origin` names the table in the error when a family is missing.
    pub fn select(&self, families: &[&str], origin: &str) -> Result<SampleTable> {
        let mut picked = Vec::new();
        for family in families.iter().filter(|f| **f != EPOCH) {
            let before = picked.len();
            picked.extend(
                self.keys
                    .iter()
                    .enumerate()
                    .filter(|(_, k)| k.family == *family)
                    .map(|(idx, _)| idx),
            );
            if picked.len() == before {
                return Err(SheeError::unknown_column(origin, *family));
            }
        }
        Ok(SampleTable {
            epoch: self.epoch.clone(),
            keys: picked.iter().map(|&idx| self.keys[idx].clone()).collect(),
            columns: picked.iter().map(|&idx| self.columns[idx].clone()).collect(),
        })
    }

    /// Divides every column matching `pred` by `divisor`.
    pub fn divide_where(&mut self, divisor: f64, pred: impl Fn(&ColumnKey) -> bool) {
        for (key, column) in self.keys.iter().zip(self.columns.iter_mut()) {
            if pred(key) {
                column.iter_mut().for_each(|v| *v /= divisor);
            }
        }
    }

    pub fn retain_rows(&mut self, mut keep: impl FnMut(NaiveDateTime) -> bool) {
        let rows: Vec<usize> = (0..self.len()).filter(|&r| keep(self.epoch[r])).collect();
        self.take_rows(&rows);
    }

    /// Keeps rows strictly after `start` and strictly before `end`.
    pub fn retain_between(&mut self, start: NaiveDateTime, end: NaiveDateTime) {
        self.retain_rows(|t| t > start && t < end);
    }

    /// Drops rows repeating an earlier timestamp (first occurrence wins), then orders rows by time.
    /// Returns the number of dropped rows.
    pub fn dedup_epochs(&mut self) -> usize {
        let mut seen = HashSet::with_capacity(self.len());
        let mut rows: Vec<usize> = (0..self.len())
            .filter(|&r| seen.insert(self.epoch[r]))
            .collect();
        let dropped = self.len() - rows.len();
        rows.sort_by_key(|&r| self.epoch[r]);
        self.take_rows(&rows);
        dropped
    }

    fn take_rows(&mut self, rows: &[usize]) {
        if rows.len() == self.len() && rows.iter().enumerate().all(|(i, r)| i == *r) {
            return;
        }
        self.epoch = rows.iter().map(|&r| self.epoch[r]).collect();
        for column in &mut self.columns {
            *column = rows.iter().map(|&r| column[r]).collect();
        }
    }

    /// Writes the table in the capture's own two-row header layout, with readable timestamps.
    pub fn write_csv<W: Write>(&self, writer: W) -> csv::Result<()> {
        let mut out = csv::WriterBuilder::new()
            .flexible(false)
            .from_writer(writer);

        let mut outer = vec![EPOCH.to_string()];
        let mut inner = vec![EPOCH.to_string()];
        let mut previous: Option<&str> = None;
        for key in &self.keys {
            if previous == Some(key.family.as_str()) {
                outer.push(String::new());
            } else {
                outer.push(key.family.clone());
                previous = Some(key.family.as_str());
            }
            inner.push(key.metric.clone());
        }
        out.write_record(&outer)?;
        out.write_record(&inner)?;

        for (row, at) in self.epoch.iter().enumerate() {
            let mut record = Vec::with_capacity(self.keys.len() + 1);
            record.push(at.format(TIME_FORMAT).to_string());
            record.extend(self.columns.iter().map(|c| format_value(c[row])));
            out.write_record(&record)?;
        }
        out.flush()?;
        Ok(())
    }
}

/// NaN is written as an empty cell.
pub(crate) fn format_value(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else {
        value.to_string()
    }
}
