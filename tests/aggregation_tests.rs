// Aggregation tests: overlap filter, outer join, cross-host statistics, export, suite maxima

mod common;

use common::*;
use shee::aggregate::{
    Aggregate, AggregateColumn, Statistic, SuiteMaxima, aggregate, filter_overlapping,
};
use shee::capture::HostCapture;
use shee::charts::{ChartKind, Output, XAxis};
use shee::error::SheeError;
use shee::models::MetricFamily;
use shee::parser::{ParseOptions, parse_str};
use shee::partition::ScriptedPrompt;
use std::path::Path;
use tempfile::TempDir;

fn host(id: &str, stamps: &[i64], value: impl Fn(i64, &str, &str) -> f64) -> HostCapture {
    let text = capture_with(stamps, &layout(0, 0, &[]), value);
    let table = parse_str(&text, Path::new(id), &ParseOptions::default()).expect("parse fixture");
    HostCapture::from_table(id, Path::new("/out"), table)
}

fn plain(id: &str, from: i64, to: i64) -> HostCapture {
    host(id, &epochs(from, to), |_, _, m| standard_value(m))
}

/// Two samples: `first` at t0 and `second` at t0+1, for usr and (in MiB) recv.
fn two_samples(id: &str, first: f64, second: f64) -> HostCapture {
    host(id, &epochs(0, 1), move |epoch, _, metric| {
        let v = if epoch == BASE_EPOCH { first } else { second };
        match metric {
            "usr" => v,
            "recv" => v * MIB,
            other => standard_value(other),
        }
    })
}

fn ids(captures: &[HostCapture]) -> Vec<&str> {
    captures.iter().map(|c| c.id()).collect()
}

#[test]
fn statistics_across_two_hosts() {
    let agg = aggregate(
        vec![two_samples("dstat-a", 10.0, 20.0), two_samples("dstat-b", 30.0, 40.0)],
        None,
    )
    .unwrap();

    let cpu = agg.get(MetricFamily::Cpu).unwrap();
    assert_eq!(cpu.stat(Statistic::Mean, "usr").unwrap(), &[20.0, 30.0]);
    let std = cpu.stat(Statistic::StdDev, "usr").unwrap();
    assert!(std.iter().all(|s| (s - 200f64.sqrt()).abs() < 1e-9));
    assert!(cpu.stat(Statistic::Sum, "usr").is_none());
    assert!(cpu.stat(Statistic::CumSum, "usr").is_none());

    let net = agg.get(MetricFamily::Network).unwrap();
    assert_eq!(net.stat(Statistic::Mean, "recv").unwrap(), &[20.0, 30.0]);
    assert_eq!(net.stat(Statistic::Sum, "recv").unwrap(), &[40.0, 60.0]);
    assert_eq!(net.stat(Statistic::CumSum, "recv").unwrap(), &[40.0, 100.0]);
    assert_eq!(net.host("dstat-a", "recv").unwrap(), &[10.0, 20.0]);
}

#[test]
fn aggregate_units_and_time_base() {
    let agg = aggregate(vec![plain("dstat-a", 0, 4), plain("dstat-b", 0, 4)], None).unwrap();
    let mem = agg.get(MetricFamily::Memory).unwrap();
    assert_eq!(mem.host("dstat-b", "used").unwrap()[0], 2.0);
    let dsk = agg.get(MetricFamily::Disk).unwrap();
    assert_eq!(dsk.host("dstat-a", "read").unwrap()[0], 1000.0 / MIB);

    for (_, table) in agg.tables() {
        assert_eq!(table.elapsed_secs(), &[0.0, 1.0, 2.0, 3.0, 4.0]);
    }
    assert_eq!(agg.date().unwrap().to_string(), "2017-03-09");
    assert_eq!(agg.hosts(), &["dstat-a".to_string(), "dstat-b".to_string()]);
    assert_eq!(agg.file_stem(), "dstat-a-dstat-b");
    assert_eq!(agg.runtime_secs(), 4.0);
}

#[test]
fn family_tables_in_fixed_order() {
    let agg = aggregate(vec![plain("dstat-a", 0, 2)], None).unwrap();
    let families: Vec<MetricFamily> = agg.tables().map(|(f, _)| f).collect();
    assert_eq!(families, MetricFamily::ALL.to_vec());
}

#[test]
fn overlap_filter_keeps_connected_captures() {
    let a = plain("dstat-a", 0, 10);
    let b = plain("dstat-b", 5, 15);
    let c = plain("dstat-c", 100, 110);
    let kept = filter_overlapping(vec![a, b, c]).unwrap();
    assert_eq!(ids(&kept), vec!["dstat-a", "dstat-b"]);
}

#[test]
fn overlap_filter_is_order_dependent() {
    let a = plain("dstat-a", 0, 10);
    let b = plain("dstat-b", 5, 15);
    let c = plain("dstat-c", 100, 110);
    let kept = filter_overlapping(vec![c, a, b]).unwrap();
    assert_eq!(ids(&kept), vec!["dstat-c"]);
}

#[test]
fn overlap_filter_single_capture_is_accepted() {
    let kept = filter_overlapping(vec![plain("dstat-a", 0, 3)]).unwrap();
    assert_eq!(kept.len(), 1);
}

#[test]
fn repeated_host_id_is_left_out() {
    let first = host("dstat-a", &epochs(0, 3), |_, _, m| standard_value(m));
    let second = host("dstat-a", &epochs(0, 3), |_, _, m| {
        if m == "usr" { 90.0 } else { standard_value(m) }
    });
    let kept = filter_overlapping(vec![first, second, plain("dstat-b", 0, 3)]).unwrap();
    assert_eq!(ids(&kept), vec!["dstat-a", "dstat-b"]);

    let agg = aggregate(kept, None).unwrap();
    let cpu = agg.get(MetricFamily::Cpu).unwrap();
    assert_eq!(cpu.host("dstat-a", "usr").unwrap(), &[10.0; 4]);
    assert_eq!(cpu.stat(Statistic::Mean, "usr").unwrap(), &[10.0; 4]);
}

#[test]
fn no_captures_is_no_overlap() {
    let err = aggregate(Vec::new(), None).unwrap_err();
    assert!(matches!(err, SheeError::NoOverlap { captures: 0 }));
}

#[test]
fn join_covers_every_timestamp_once() {
    let agg = aggregate(vec![plain("dstat-a", 0, 10), plain("dstat-b", 5, 15)], None).unwrap();
    let cpu = agg.get(MetricFamily::Cpu).unwrap();
    let expected: Vec<f64> = (0..=15).map(|s| s as f64).collect();
    assert_eq!(cpu.elapsed_secs(), expected.as_slice());

    let a = cpu.host("dstat-a", "usr").unwrap();
    let b = cpu.host("dstat-b", "usr").unwrap();
    assert!(a[..=10].iter().all(|v| *v == 10.0));
    assert!(a[11..].iter().all(|v| v.is_nan()));
    assert!(b[..5].iter().all(|v| v.is_nan()));

    // absent cells are skipped, not zero-filled
    let avg = cpu.stat(Statistic::Mean, "usr").unwrap();
    assert!(avg.iter().all(|v| *v == 10.0));
    let std = cpu.stat(Statistic::StdDev, "usr").unwrap();
    assert!(std[0].is_nan());
    assert_eq!(std[7], 0.0);
}

#[test]
fn missing_total_column_fails_whole_run() {
    let groups = vec![
        ("total cpu usage".to_string(), vec!["usr"]),
        ("net/total".to_string(), vec!["recv"]),
        ("memory usage".to_string(), vec!["used"]),
    ];
    let text = capture_with(&epochs(0, 3), &groups, |_, _, m| standard_value(m));
    let table = parse_str(&text, Path::new("dstat-b"), &ParseOptions::default()).unwrap();
    let partial = HostCapture::from_table("dstat-b", Path::new("/out"), table);

    let err = aggregate(vec![plain("dstat-a", 0, 3), partial], None).unwrap_err();
    match err {
        SheeError::UnknownColumn { origin, column } => {
            assert_eq!(origin, "dstat-b");
            assert_eq!(column, "dsk/total");
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[test]
fn time_window_applies_before_statistics() {
    let mut prompt = ScriptedPrompt::new([("10:11:13", "10:11:17")]);
    let agg = aggregate(
        vec![plain("dstat-a", 0, 10), plain("dstat-b", 0, 10)],
        Some(&mut prompt),
    )
    .unwrap();
    let net = agg.get(MetricFamily::Network).unwrap();
    assert_eq!(net.elapsed_secs(), &[0.0, 1.0, 2.0]);
    assert_eq!(agg.started_at(), Some(display_time(BASE_EPOCH + 2)));
    assert_eq!(net.stat(Statistic::CumSum, "send").unwrap(), &[4.0, 8.0, 12.0]);
}

#[test]
fn column_layout_hosts_then_statistics() {
    let agg = aggregate(vec![plain("dstat-a", 0, 1), plain("dstat-b", 0, 1)], None).unwrap();
    let net = agg.get(MetricFamily::Network).unwrap();
    let labels: Vec<String> = net.columns().map(|(c, _)| c.to_string()).collect();
    assert_eq!(
        labels,
        vec![
            "dstat-a/recv",
            "dstat-b/recv",
            "dstat-a/send",
            "dstat-b/send",
            "avg/recv",
            "avg/send",
            "std/recv",
            "std/send",
            "sum/recv",
            "sum/send",
            "cumsum/recv",
            "cumsum/send",
        ]
    );
    assert_eq!(net.metrics(), vec!["recv", "send"]);
    assert!(matches!(
        net.columns().next().unwrap().0,
        AggregateColumn::Host { .. }
    ));
}

#[test]
fn export_writes_one_file_per_family() {
    let tmp = TempDir::new().unwrap();
    let agg = aggregate(vec![plain("dstat-a", 0, 2), plain("dstat-b", 0, 2)], None).unwrap();
    let written = agg.write_csv(tmp.path()).unwrap();

    let names: Vec<String> = written
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(
        names,
        vec![
            "dstat-a-dstat-b_cpu.csv",
            "dstat-a-dstat-b_net.csv",
            "dstat-a-dstat-b_mem.csv",
            "dstat-a-dstat-b_dsk.csv"
        ]
    );

    let text = std::fs::read_to_string(&written[0]).unwrap();
    let lines: Vec<&str> = text.lines().collect();
    assert!(lines[0].starts_with("elapsed,dstat-a,dstat-b,dstat-a,"));
    assert!(lines[1].starts_with(",total cpu usage,"));
    assert!(lines[2].starts_with(",usr,usr,sys,sys,"));
    assert_eq!(lines.len(), 6);
    assert!(lines[3].starts_with("0,10,10,"));

    // only the four exports, no stray temp files
    assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 4);
}

#[test]
fn export_into_a_file_path_fails() {
    let tmp = TempDir::new().unwrap();
    let blocker = tmp.path().join("blocker");
    std::fs::write(&blocker, "x").unwrap();
    let agg = aggregate(vec![plain("dstat-a", 0, 2)], None).unwrap();
    let err = agg.write_csv(&blocker).unwrap_err();
    assert!(matches!(err, SheeError::Export { .. }));
}

#[test]
fn saved_export_reads_back() {
    let tmp = TempDir::new().unwrap();
    let agg = aggregate(vec![plain("dstat-a", 0, 4), plain("dstat-b", 0, 4)], None).unwrap();
    let written = agg.write_csv(tmp.path()).unwrap();

    let loaded = Aggregate::read_csv(&written[1]).unwrap();
    assert_eq!(loaded.hosts(), agg.hosts());
    assert_eq!(loaded.file_stem(), "dstat-a-dstat-b");
    assert_eq!(loaded.runtime_secs(), 4.0);
    assert!(loaded.date().is_none());
    for family in MetricFamily::ALL {
        assert_eq!(loaded.get(family), agg.get(family), "{family:?}");
    }
}

#[test]
fn saved_export_keeps_absent_cells() {
    let tmp = TempDir::new().unwrap();
    let agg = aggregate(vec![plain("dstat-a", 0, 4), plain("dstat-b", 2, 6)], None).unwrap();
    let written = agg.write_csv(tmp.path()).unwrap();
    std::fs::remove_file(&written[3]).unwrap();

    let loaded = Aggregate::read_csv(&written[0]).unwrap();
    assert!(loaded.get(MetricFamily::Disk).is_none());
    let cpu = loaded.get(MetricFamily::Cpu).unwrap();
    let b = cpu.host("dstat-b", "usr").unwrap();
    assert!(b[..2].iter().all(|v| v.is_nan()));
    assert_eq!(b[2], 10.0);
    assert!(cpu.stat(Statistic::StdDev, "usr").unwrap()[0].is_nan());
    assert_eq!(cpu.elapsed_secs().len(), 7);
}

#[test]
fn unreadable_saved_export_is_import_error() {
    let tmp = TempDir::new().unwrap();
    let wrong_name = write_capture(tmp.path(), "dstat-a.csv", "elapsed\n");
    let err = Aggregate::read_csv(&wrong_name).unwrap_err();
    assert!(matches!(err, SheeError::Import { .. }));

    let no_elapsed = write_capture(tmp.path(), "dstat-a_cpu.csv", "x,dstat-a\n,total cpu usage\n,usr\n0,1\n");
    let err = Aggregate::read_csv(&no_elapsed).unwrap_err();
    assert!(err.to_string().contains("elapsed"));

    let bad_stat = write_capture(tmp.path(), "dstat-b_cpu.csv", "elapsed,median\n,\n,usr\n0,1\n");
    let err = Aggregate::read_csv(&bad_stat).unwrap_err();
    assert!(err.to_string().contains("median"));

    let err = Aggregate::read_csv(&tmp.path().join("dstat-z_net.csv")).unwrap_err();
    assert!(matches!(err, SheeError::Import { .. }));
}

#[test]
fn suite_maxima_span_runs() {
    let short = aggregate(vec![two_samples("dstat-a", 10.0, 20.0)], None).unwrap();
    let long = aggregate(
        vec![plain("dstat-a", 0, 30), plain("dstat-b", 0, 30)],
        None,
    )
    .unwrap();
    let maxima = SuiteMaxima::collect([&short, &long]);

    assert_eq!(maxima.runtime_secs, 30.0);
    assert_eq!(maxima.get("cpu/usr"), Some(20.0));
    assert_eq!(maxima.get("net/recv"), Some(20.0));
    assert_eq!(maxima.get("net/sum-send"), Some(4.0));
    assert_eq!(maxima.get("net/cumsum-send"), Some(124.0));

    let json = serde_json::to_value(&maxima).unwrap();
    assert_eq!(json["runtime_secs"], 30.0);
}

#[test]
fn aggregate_chart_panels_carry_hosts_and_average() {
    let agg = aggregate(vec![plain("dstat-a", 0, 3), plain("dstat-b", 0, 3)], None).unwrap();
    let maxima = SuiteMaxima::collect([&agg]);
    let chart = agg
        .chart(
            MetricFamily::Memory,
            Output::Persist,
            Path::new("/out/aggregation"),
            Some(&maxima),
        )
        .unwrap();

    assert_eq!(chart.kind, ChartKind::Panels);
    assert_eq!(chart.panels.len(), 4);
    let labels: Vec<&str> = chart.panels[0].series.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["dstat-a", "dstat-b", "avg"]);
    assert_eq!(chart.panels[0].y_max, Some(2.0));
    assert_eq!(chart.panels[0].y_label, "memory usage [GB]");
    assert!(matches!(chart.x, XAxis::Elapsed(_)));
    assert_eq!(
        chart.path.as_deref(),
        Some(Path::new("/out/aggregation/dstat-a-dstat-b_mem.png"))
    );
}
