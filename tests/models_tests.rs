// Model tests: family labels, device scopes, unit divisors, column keys

use shee::models::{ColumnKey, Device, MetricFamily};

#[test]
fn family_labels() {
    assert_eq!(MetricFamily::Cpu.total_label(), "total cpu usage");
    assert_eq!(MetricFamily::Network.total_label(), "net/total");
    assert_eq!(MetricFamily::Memory.total_label(), "memory usage");
    assert_eq!(MetricFamily::Disk.total_label(), "dsk/total");
    let shorts: Vec<&str> = MetricFamily::ALL.iter().map(|f| f.short()).collect();
    assert_eq!(shorts, vec!["cpu", "net", "mem", "dsk"]);
}

#[test]
fn device_labels_match_their_family_only() {
    assert_eq!(
        MetricFamily::Cpu.device_label(Device::Core(3)).as_deref(),
        Some("cpu3 usage")
    );
    assert_eq!(
        MetricFamily::Network.device_label(Device::Interface(1)).as_deref(),
        Some("net/eth1")
    );
    assert_eq!(
        MetricFamily::Disk.device_label(Device::Disk('c')).as_deref(),
        Some("dsk/sdc")
    );
    assert!(MetricFamily::Memory.device_label(Device::Core(0)).is_none());
    assert!(MetricFamily::Cpu.device_label(Device::Disk('a')).is_none());
}

#[test]
fn device_probing_order() {
    assert_eq!(MetricFamily::Cpu.first_device(), Some(Device::Core(0)));
    assert_eq!(MetricFamily::Disk.first_device(), Some(Device::Disk('a')));
    assert_eq!(MetricFamily::Memory.first_device(), None);
    assert_eq!(Device::Core(0).next(), Some(Device::Core(1)));
    assert_eq!(Device::Disk('a').next(), Some(Device::Disk('b')));
    assert_eq!(Device::Disk('z').next(), None);
    assert_eq!(Device::Interface(2).family(), MetricFamily::Network);
}

#[test]
fn family_of_outer_label() {
    assert_eq!(MetricFamily::of_label("cpu7 usage"), Some(MetricFamily::Cpu));
    assert_eq!(MetricFamily::of_label("total cpu usage"), Some(MetricFamily::Cpu));
    assert_eq!(MetricFamily::of_label("net/eth0"), Some(MetricFamily::Network));
    assert_eq!(MetricFamily::of_label("dsk/sdb"), Some(MetricFamily::Disk));
    assert_eq!(MetricFamily::of_label("memory usage"), Some(MetricFamily::Memory));
    assert_eq!(MetricFamily::of_label("load avg"), None);
}

#[test]
fn unit_divisors_round_trip() {
    let raw = 123_456_789.0;
    for family in MetricFamily::ALL {
        let shown = raw / family.unit_divisor();
        assert!((shown * family.unit_divisor() - raw).abs() < 1e-6);
        let aggregated = raw / family.aggregate_divisor();
        assert!((aggregated * family.aggregate_divisor() - raw).abs() < 1e-6);
    }
    assert_eq!(MetricFamily::Network.unit_divisor(), 131_072.0);
}

#[test]
fn only_cpu_is_a_percentage() {
    assert!(MetricFamily::Cpu.is_percentage());
    assert!(!MetricFamily::Cpu.sums_across_hosts());
    assert!(MetricFamily::Disk.sums_across_hosts());
}

#[test]
fn column_key_display() {
    let key = ColumnKey::new("net/total", "recv");
    assert_eq!(key.to_string(), "(net/total, recv)");
    assert!(ColumnKey::epoch().is_epoch());
    assert!(!key.is_epoch());
}
