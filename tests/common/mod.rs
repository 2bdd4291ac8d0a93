// Shared test helpers: dstat capture fixtures and a chart sink that records what it gets

#![allow(dead_code)]

use chrono::{DateTime, NaiveDateTime};
use shee::charts::{Chart, ChartSink};
use std::path::{Path, PathBuf};

/// 2017-03-09 09:11:12 UTC
pub const BASE_EPOCH: i64 = 1_489_050_672;

pub const KIB: f64 = 1024.0;
pub const MIB: f64 = KIB * KIB;
pub const GIB: f64 = MIB * KIB;

pub const CPU_METRICS: [&str; 6] = ["usr", "sys", "idl", "wai", "hiq", "siq"];
pub const NET_METRICS: [&str; 2] = ["recv", "send"];
pub const DSK_METRICS: [&str; 2] = ["read", "writ"];
pub const MEM_METRICS: [&str; 4] = ["used", "buff", "cach", "free"];

const PREAMBLE: &str = r#""Dstat 0.7.2 CSV output"
"Author:","Dag Wieers <dag@wieers.com>",,,,"URL:","http://dag.wieers.com/home-made/dstat/"
"Host:","node",,,,"User:","root"
"Cmdline:","dstat -tcdnm --output capture.csv",,,,"Date:","09 Mar 2017 10:11:12 CET"
"#;

/// Column groups of a capture, in dstat order: cpu, disk, network, memory.
pub fn layout(cores: u32, interfaces: u32, disks: &[char]) -> Vec<(String, Vec<&'static str>)> {
    let mut groups = vec![("total cpu usage".to_string(), CPU_METRICS.to_vec())];
    for n in 0..cores {
        groups.push((format!("cpu{} usage", n), CPU_METRICS.to_vec()));
    }
    groups.push(("dsk/total".to_string(), DSK_METRICS.to_vec()));
    for letter in disks {
        groups.push((format!("dsk/sd{}", letter), DSK_METRICS.to_vec()));
    }
    groups.push(("net/total".to_string(), NET_METRICS.to_vec()));
    for n in 0..interfaces {
        groups.push((format!("net/eth{}", n), NET_METRICS.to_vec()));
    }
    groups.push(("memory usage".to_string(), MEM_METRICS.to_vec()));
    groups
}

/// Raw value every standard fixture reports for a sub-metric.
pub fn standard_value(metric: &str) -> f64 {
    match metric {
        "usr" => 10.0,
        "sys" => 5.0,
        "idl" => 85.0,
        "recv" => MIB,
        "send" => 2.0 * MIB,
        "used" => 2.0 * GIB,
        "buff" => 256.0 * MIB,
        "cach" => GIB,
        "free" => 4.0 * GIB,
        "read" => 1000.0,
        "writ" => 3000.0,
        _ => 0.0,
    }
}

/// Header lines only: sparse outer row, then sub-metric row.
pub fn header(groups: &[(String, Vec<&str>)]) -> String {
    let mut outer = vec!["\"epoch\"".to_string()];
    let mut inner = vec!["\"epoch\"".to_string()];
    for (label, metrics) in groups {
        for (idx, metric) in metrics.iter().enumerate() {
            outer.push(if idx == 0 {
                format!("\"{}\"", label)
            } else {
                String::new()
            });
            inner.push(format!("\"{}\"", metric));
        }
    }
    format!("{}\n{}\n", outer.join(","), inner.join(","))
}

/// Full capture text with preamble, a blank line, the header and one row per epoch.
pub fn capture_with(
    epochs: &[i64],
    groups: &[(String, Vec<&str>)],
    value: impl Fn(i64, &str, &str) -> f64,
) -> String {
    let mut text = String::from(PREAMBLE);
    text.push('\n');
    text.push_str(&header(groups));
    for &epoch in epochs {
        let mut row = vec![epoch.to_string()];
        for (label, metrics) in groups {
            for metric in metrics {
                row.push(value(epoch, label, metric).to_string());
            }
        }
        text.push_str(&row.join(","));
        text.push('\n');
    }
    text
}

pub fn standard_capture(epochs: &[i64], cores: u32) -> String {
    capture_with(epochs, &layout(cores, 1, &['a']), |_, _, metric| {
        standard_value(metric)
    })
}

/// Epochs `BASE_EPOCH + from ..= BASE_EPOCH + to`.
pub fn epochs(from: i64, to: i64) -> Vec<i64> {
    (from..=to).map(|s| BASE_EPOCH + s).collect()
}

pub fn write_capture(dir: &Path, name: &str, text: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, text).expect("write capture fixture");
    path
}

/// Display time of a unix timestamp (UTC+1).
pub fn display_time(epoch: i64) -> NaiveDateTime {
    DateTime::from_timestamp(epoch + 3600, 0)
        .expect("valid timestamp")
        .naive_utc()
}

#[derive(Default)]
pub struct RecordingSink {
    pub charts: Vec<Chart>,
}

impl ChartSink for RecordingSink {
    fn render(&mut self, chart: &Chart) -> anyhow::Result<()> {
        self.charts.push(chart.clone());
        Ok(())
    }
}
