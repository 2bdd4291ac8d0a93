// Host capture: one parsed capture plus the identity used for labels and output paths.

use std::path::{Path, PathBuf};
use tracing::{info, instrument};

use crate::error::Result;
use crate::models::Device;
use crate::parser::{self, ParseOptions};
use crate::table::SampleTable;

#[derive(Debug, Clone)]
pub struct HostCapture {
    id: String,
    output_stem: PathBuf,
    table: SampleTable,
}

impl HostCapture {
    /// Parses `path`; the host id is the file name without its extension and
    /// outputs land under `output_dir/<id>`.
    #[instrument(skip(options), fields(file = %path.display()))]
    pub fn from_file(path: &Path, output_dir: &Path, options: &ParseOptions) -> Result<Self> {
        let table = parser::parse_file(path, options)?;
        let id = host_id(path);
        info!(
            host = %id,
            rows = table.len(),
            columns = table.keys().len(),
            "capture loaded"
        );
        Ok(Self {
            output_stem: output_dir.join(&id),
            id,
            table,
        })
    }

    /// Wraps an already parsed table, e.g. to derive several frames without re-reading the file.
    pub fn from_table(id: impl Into<String>, output_dir: &Path, table: SampleTable) -> Self {
        let id = id.into();
        Self {
            output_stem: output_dir.join(&id),
            id,
            table,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn output_stem(&self) -> &Path {
        &self.output_stem
    }

    pub fn table(&self) -> &SampleTable {
        &self.table
    }

    /// Identity narrowed to one device, e.g. `dstat-node1-cpu3`.
    pub fn scoped_id(&self, device: Option<Device>) -> String {
        match device {
            Some(device) => format!("{}-{}", self.id, device),
            None => self.id.clone(),
        }
    }

    /// Replaces the table with the time axis plus `families`. Used by the aggregator,
    /// which owns its inputs; a missing family leaves the table untouched.
    pub(crate) fn narrow_in_place(&mut self, families: &[&str]) -> Result<()> {
        self.table = self.table.select(families, &self.id)?;
        Ok(())
    }
}

/// File name up to its last extension: `/data/dstat-node1.csv` -> `dstat-node1`.
pub fn host_id(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}
