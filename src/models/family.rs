// Metric families, their device scopes and the unit rules applied to each.

use serde::Serialize;
use std::fmt;

const KIB: f64 = 1024.0;
const MIB: f64 = KIB * KIB;
const GIB: f64 = MIB * KIB;

/// One of the four resource families a capture reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricFamily {
    Cpu,
    Network,
    Memory,
    Disk,
}

impl MetricFamily {
    /// Aggregation order: cpu, net, mem, dsk.
    pub const ALL: [MetricFamily; 4] = [
        MetricFamily::Cpu,
        MetricFamily::Network,
        MetricFamily::Memory,
        MetricFamily::Disk,
    ];

    /// Long name used for output directories and chart titles.
    pub fn name(self) -> &'static str {
        match self {
            MetricFamily::Cpu => "cpu",
            MetricFamily::Network => "network",
            MetricFamily::Memory => "memory",
            MetricFamily::Disk => "disk",
        }
    }

    /// Short key used by aggregate tables and their exported file suffixes.
    pub fn short(self) -> &'static str {
        match self {
            MetricFamily::Cpu => "cpu",
            MetricFamily::Network => "net",
            MetricFamily::Memory => "mem",
            MetricFamily::Disk => "dsk",
        }
    }

    /// Outer header label of the family's whole-host column group.
    pub fn total_label(self) -> &'static str {
        match self {
            MetricFamily::Cpu => "total cpu usage",
            MetricFamily::Network => "net/total",
            MetricFamily::Memory => "memory usage",
            MetricFamily::Disk => "dsk/total",
        }
    }

    /// Outer header label of one device's column group, if the device belongs to this family.
    pub fn device_label(self, device: Device) -> Option<String> {
        match (self, device) {
            (MetricFamily::Cpu, Device::Core(n)) => Some(format!("cpu{} usage", n)),
            (MetricFamily::Network, Device::Interface(n)) => Some(format!("net/eth{}", n)),
            (MetricFamily::Disk, Device::Disk(letter)) => Some(format!("dsk/sd{}", letter)),
            _ => None,
        }
    }

    /// First device probed when enumerating; memory has no per-device groups.
    pub fn first_device(self) -> Option<Device> {
        match self {
            MetricFamily::Cpu => Some(Device::Core(0)),
            MetricFamily::Network => Some(Device::Interface(0)),
            MetricFamily::Disk => Some(Device::Disk('a')),
            MetricFamily::Memory => None,
        }
    }

    /// Classifies an outer header label (`cpu3 usage`, `net/eth0`, `dsk/total`, ...).
    pub fn of_label(label: &str) -> Option<Self> {
        if label == "total cpu usage" || label.starts_with("cpu") {
            Some(MetricFamily::Cpu)
        } else if label.starts_with("net/") {
            Some(MetricFamily::Network)
        } else if label.starts_with("dsk/") {
            Some(MetricFamily::Disk)
        } else if label == "memory usage" {
            Some(MetricFamily::Memory)
        } else {
            None
        }
    }

    /// Divisor taking raw capture values to the units a metric frame reports.
    /// cpu: percent as is; memory: bytes to GB; network: bytes/s to Mbit/s; disk: ops to K-ops.
    pub fn unit_divisor(self) -> f64 {
        match self {
            MetricFamily::Cpu => 1.0,
            MetricFamily::Memory => GIB,
            MetricFamily::Network => MIB / 8.0,
            MetricFamily::Disk => 1000.0,
        }
    }

    /// Divisor applied to host columns before cross-host statistics.
    pub fn aggregate_divisor(self) -> f64 {
        match self {
            MetricFamily::Cpu => 1.0,
            MetricFamily::Network | MetricFamily::Disk => MIB,
            MetricFamily::Memory => GIB,
        }
    }

    /// Y-axis label for frame charts.
    pub fn unit_label(self) -> &'static str {
        match self {
            MetricFamily::Cpu => "percentage",
            MetricFamily::Network => "bandwidth [Mbps]",
            MetricFamily::Memory => "memory usage [GB]",
            MetricFamily::Disk => "operations [K]",
        }
    }

    /// Y-axis label for aggregate charts.
    pub fn aggregate_unit_label(self) -> &'static str {
        match self {
            MetricFamily::Cpu => "percentage",
            MetricFamily::Network => "bandwidth [MB/s]",
            MetricFamily::Memory => "memory usage [GB]",
            MetricFamily::Disk => "disk [MB]",
        }
    }

    pub fn is_percentage(self) -> bool {
        self == MetricFamily::Cpu
    }

    /// Summing percentages across hosts is meaningless, so cpu only gets mean/stddev.
    pub fn sums_across_hosts(self) -> bool {
        !self.is_percentage()
    }

    /// Sub-metrics drawn by default in the stacked-area view.
    pub fn stacked_metrics(self) -> &'static [&'static str] {
        match self {
            MetricFamily::Cpu => &["usr", "sys", "idl"],
            MetricFamily::Network => &["send", "recv"],
            MetricFamily::Memory => &["used", "buff", "cach", "free"],
            MetricFamily::Disk => &["read", "writ"],
        }
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One core, interface or disk within a family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Core(u32),
    Interface(u32),
    Disk(char),
}

impl Device {
    pub fn family(self) -> MetricFamily {
        match self {
            Device::Core(_) => MetricFamily::Cpu,
            Device::Interface(_) => MetricFamily::Network,
            Device::Disk(_) => MetricFamily::Disk,
        }
    }

    /// The device probed after this one; disks stop after `z`.
    pub fn next(self) -> Option<Device> {
        match self {
            Device::Core(n) => n.checked_add(1).map(Device::Core),
            Device::Interface(n) => n.checked_add(1).map(Device::Interface),
            Device::Disk(letter) if letter < 'z' => {
                char::from_u32(letter as u32 + 1).map(Device::Disk)
            }
            Device::Disk(_) => None,
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Core(n) => write!(f, "cpu{}", n),
            Device::Interface(n) => write!(f, "eth{}", n),
            Device::Disk(letter) => write!(f, "sd{}", letter),
        }
    }
}
