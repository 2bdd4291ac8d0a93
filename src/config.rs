use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::parser::{DEFAULT_UTC_OFFSET_SECS, ParseOptions};

const MAX_UTC_OFFSET_SECS: i64 = 14 * 3600;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub input: InputConfig,
    pub output: OutputConfig,
    pub capture: CaptureConfig,
    pub aggregation: AggregationConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    pub dir: PathBuf,
    /// Only files whose name starts with this prefix are evaluated.
    pub file_prefix: String,
    pub file_extension: String,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("."),
            file_prefix: "dstat".into(),
            file_extension: "csv".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Root of every output tree. Empty means the current working directory.
    pub dir: PathBuf,
    /// Show charts instead of persisting them.
    pub interactive: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Offset added to capture timestamps (stored in UTC) for display.
    pub utc_offset_secs: i64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            utc_offset_secs: DEFAULT_UTC_OFFSET_SECS,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AggregationConfig {
    pub enabled: bool,
    /// Also export the per-family tables as flat files.
    pub save_csv: bool,
    /// Sub-directory of the output root where aggregation results go.
    pub dir_name: String,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            save_csv: false,
            dir_name: "aggregation".into(),
        }
    }
}

impl AppConfig {
    /// Reads `$SHEE_CONFIG`, else `shee.toml` when present, else the defaults.
    pub fn load() -> anyhow::Result<Self> {
        match std::env::var("SHEE_CONFIG") {
            Ok(path) => Self::load_from_path(Path::new(&path)),
            Err(_) => {
                let path = Path::new("shee.toml");
                if path.exists() {
                    Self::load_from_path(path)
                } else {
                    let config = Self::default();
                    config.validate()?;
                    Ok(config)
                }
            }
        }
    }

    pub fn load_from_path(path: &Path) -> anyhow::Result<Self> {
        let s = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("config {}: {}", path.display(), e))?;
        Self::load_from_str(&s)
    }

    /// Parse and validate config from a string (e.g. for tests).
    pub fn load_from_str(s: &str) -> anyhow::Result<Self> {
        let config: AppConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        anyhow::ensure!(
            !self.input.file_prefix.is_empty(),
            "input.file_prefix must be non-empty"
        );
        anyhow::ensure!(
            !self.input.file_extension.is_empty(),
            "input.file_extension must be non-empty"
        );
        anyhow::ensure!(
            !self.aggregation.dir_name.is_empty(),
            "aggregation.dir_name must be non-empty"
        );
        anyhow::ensure!(
            self.capture.utc_offset_secs.abs() <= MAX_UTC_OFFSET_SECS,
            "capture.utc_offset_secs must be within +/-{}, got {}",
            MAX_UTC_OFFSET_SECS,
            self.capture.utc_offset_secs
        );
        Ok(())
    }

    /// Output root; the working directory when unset.
    pub fn output_dir(&self) -> PathBuf {
        if self.output.dir.as_os_str().is_empty() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
        } else {
            self.output.dir.clone()
        }
    }

    pub fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            utc_offset_secs: self.capture.utc_offset_secs,
        }
    }
}
