//! Metrics sampling over a `HostProbe`, plus the pure unit conversions used
//! to shape the readings.

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use tracing::{debug, warn};

use crate::counters::{CounterReading, CounterStore};
use crate::probe::{HostProbe, NetCounters, Partition, ProbeError};
use crate::types::{
    CpuFrequency, CpuInfo, DiskInfo, MemoryInfo, MetricsSnapshot, NetworkInfo, SystemInfo,
};

pub const DEFAULT_CPU_INTERVAL: Duration = Duration::from_secs(1);

const GIB: f64 = (1u64 << 30) as f64;
const MIB: f64 = (1u64 << 20) as f64;

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn bytes_to_gib(bytes: u64) -> f64 {
    round2(bytes as f64 / GIB)
}

pub fn bytes_to_mib(bytes: u64) -> f64 {
    round2(bytes as f64 / MIB)
}

/// `part / whole * 100`, 0 for an empty whole.
pub fn percent_of(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    round2(part as f64 / whole as f64 * 100.0)
}

/// MB/s sent and received between two counter readings.
///
/// No previous reading, or a non-positive elapsed time, gives `(0.0, 0.0)`.
/// A counter that went backwards contributes a zero delta.
pub fn throughput_mbps(prev: Option<&CounterReading>, current: &CounterReading) -> (f64, f64) {
    let Some(prev) = prev else {
        return (0.0, 0.0);
    };
    let elapsed = (current.captured_at - prev.captured_at)
        .to_std()
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    if elapsed <= 0.0 {
        return (0.0, 0.0);
    }
    let rate = |now: u64, before: u64| round2(now.saturating_sub(before) as f64 / elapsed / MIB);
    (
        rate(current.bytes_sent, prev.bytes_sent),
        rate(current.bytes_recv, prev.bytes_recv),
    )
}

/// Compact uptime such as `2d 3h 15m`. Zero units are left out; under a
/// minute renders as `< 1m`.
pub fn format_uptime(seconds: u64) -> String {
    let days = seconds / 86_400;
    let hours = (seconds % 86_400) / 3_600;
    let minutes = (seconds % 3_600) / 60;

    let parts: Vec<String> = [(days, 'd'), (hours, 'h'), (minutes, 'm')]
        .into_iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{n}{unit}"))
        .collect();
    if parts.is_empty() {
        "< 1m".to_string()
    } else {
        parts.join(" ")
    }
}

/// Result of inspecting one mounted volume.
#[derive(Debug)]
pub enum PartitionOutcome {
    Mounted(DiskInfo),
    Skipped { mountpoint: String, reason: ProbeError },
}

fn inspect_partition<P: HostProbe + ?Sized>(probe: &P, partition: Partition) -> PartitionOutcome {
    let mountpoint = partition.mountpoint.to_string_lossy().into_owned();
    match probe.disk_usage(&partition) {
        Ok(usage) => {
            let used = usage.total.saturating_sub(usage.available);
            PartitionOutcome::Mounted(DiskInfo {
                device: partition.device,
                mountpoint,
                fstype: partition.fstype,
                total_gb: bytes_to_gib(usage.total),
                used_gb: bytes_to_gib(used),
                free_gb: bytes_to_gib(usage.available),
                percent: percent_of(used, usage.total),
            })
        }
        Err(reason) => PartitionOutcome::Skipped { mountpoint, reason },
    }
}

/// Samples the host through `P`. One sampler owns one counter store, so
/// throughput is computed against this sampler's previous network read.
pub struct Sampler<P> {
    probe: P,
    counters: CounterStore,
    cpu_interval: Duration,
}

impl<P: HostProbe> Sampler<P> {
    pub fn new(probe: P) -> Self {
        Self::with_cpu_interval(probe, DEFAULT_CPU_INTERVAL)
    }

    pub fn with_cpu_interval(probe: P, cpu_interval: Duration) -> Self {
        Self {
            probe,
            counters: CounterStore::new(),
            cpu_interval,
        }
    }

    pub fn counters(&self) -> &CounterStore {
        &self.counters
    }

    /// Blocks for the configured CPU interval.
    pub fn sample_cpu(&self) -> CpuInfo {
        let r = self.probe.cpu(self.cpu_interval);
        let count_logical = r.per_core.len();
        CpuInfo {
            percent: round2(f64::from(r.global_percent)),
            count: r.physical_cores.unwrap_or(count_logical),
            count_logical,
            freq: r.frequency_mhz.map(|current_mhz| CpuFrequency { current_mhz }),
            per_cpu: r
                .per_core
                .iter()
                .map(|p| round2(f64::from(*p)))
                .collect(),
        }
    }

    pub fn sample_memory(&self) -> MemoryInfo {
        let m = self.probe.memory();
        MemoryInfo {
            total_gb: bytes_to_gib(m.total),
            available_gb: bytes_to_gib(m.available),
            used_gb: bytes_to_gib(m.used),
            percent: percent_of(m.total.saturating_sub(m.available), m.total),
            swap_total_gb: bytes_to_gib(m.swap_total),
            swap_used_gb: bytes_to_gib(m.swap_used),
            swap_percent: percent_of(m.swap_used, m.swap_total),
        }
    }

    /// Every partition the probe lists, with skipped ones kept as such.
    pub fn inspect_partitions(&self) -> Vec<PartitionOutcome> {
        self.probe
            .partitions()
            .into_iter()
            .map(|p| inspect_partition(&self.probe, p))
            .collect()
    }

    /// Mounted volumes that could be inspected, in enumeration order.
    pub fn sample_disk(&self) -> Vec<DiskInfo> {
        self.inspect_partitions()
            .into_iter()
            .filter_map(|outcome| match outcome {
                PartitionOutcome::Mounted(info) => Some(info),
                PartitionOutcome::Skipped {
                    mountpoint,
                    reason: reason @ ProbeError::PermissionDenied(_),
                } => {
                    debug!(%mountpoint, "skipping volume: {reason}");
                    None
                }
                PartitionOutcome::Skipped { mountpoint, reason } => {
                    warn!(%mountpoint, "skipping volume: {reason}");
                    None
                }
            })
            .collect()
    }

    pub fn sample_network(&self) -> NetworkInfo {
        self.sample_network_with(Utc::now)
    }

    /// Network read stamped with `now`; the counter store is overwritten
    /// afterwards, including on the very first read.
    pub fn sample_network_at(&self, now: DateTime<Utc>) -> NetworkInfo {
        self.sample_network_with(|| now)
    }

    // The counter read and its timestamp happen under the counter store lock.
    fn sample_network_with<F: FnOnce() -> DateTime<Utc>>(&self, clock: F) -> NetworkInfo {
        let mut c = NetCounters::default();
        let (prev, current) = self.counters.record(|| {
            c = self.probe.net_counters();
            CounterReading {
                bytes_sent: c.bytes_sent,
                bytes_recv: c.bytes_recv,
                captured_at: clock(),
            }
        });
        let (speed_mbps_sent, speed_mbps_recv) = throughput_mbps(prev.as_ref(), &current);
        NetworkInfo {
            bytes_sent: c.bytes_sent,
            bytes_recv: c.bytes_recv,
            packets_sent: c.packets_sent,
            packets_recv: c.packets_recv,
            mb_sent: bytes_to_mib(c.bytes_sent),
            mb_recv: bytes_to_mib(c.bytes_recv),
            speed_mbps_sent,
            speed_mbps_recv,
        }
    }

    pub fn sample_system(&self) -> SystemInfo {
        let h = self.probe.host();
        let boot_time = i64::try_from(h.boot_time)
            .ok()
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or_default();
        SystemInfo {
            hostname: h.hostname,
            platform: h.platform,
            platform_release: h.platform_release,
            platform_version: h.platform_version,
            architecture: h.architecture,
            boot_time,
            uptime_seconds: h.uptime_seconds,
            uptime_formatted: format_uptime(h.uptime_seconds),
        }
    }

    /// All five readings in sequence. Not an atomic snapshot: the CPU read
    /// alone spans the CPU interval.
    pub fn sample_all(&self) -> MetricsSnapshot {
        let timestamp = Utc::now();
        MetricsSnapshot {
            timestamp,
            cpu: self.sample_cpu(),
            memory: self.sample_memory(),
            disk: self.sample_disk(),
            network: self.sample_network(),
            system: self.sample_system(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::probe::{CpuReading, DiskUsage, HostReading, MemoryReading};
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// Scriptable probe: network counters are popped in order.
    #[derive(Default)]
    pub(crate) struct FakeProbe {
        pub partitions: Vec<(Partition, Result<DiskUsage, ()>)>,
        pub net: Mutex<Vec<NetCounters>>,
    }

    pub(crate) fn partition(mount: &str) -> Partition {
        Partition {
            device: format!("/dev/{}", mount.trim_start_matches('/')),
            mountpoint: PathBuf::from(mount),
            fstype: "ext4".into(),
        }
    }

    impl HostProbe for FakeProbe {
        fn cpu(&self, _interval: Duration) -> CpuReading {
            CpuReading {
                global_percent: 100.4,
                per_core: vec![12.345, 99.999, 0.0, 50.5],
                physical_cores: Some(2),
                frequency_mhz: None,
            }
        }

        fn memory(&self) -> MemoryReading {
            MemoryReading {
                total: 16 * (1 << 30),
                available: 4 * (1 << 30),
                used: 12 * (1 << 30),
                swap_total: 0,
                swap_used: 0,
            }
        }

        fn partitions(&self) -> Vec<Partition> {
            self.partitions.iter().map(|(p, _)| p.clone()).collect()
        }

        fn disk_usage(&self, partition: &Partition) -> Result<DiskUsage, ProbeError> {
            self.partitions
                .iter()
                .find(|(p, _)| p == partition)
                .and_then(|(_, r)| r.ok())
                .ok_or_else(|| ProbeError::PermissionDenied(partition.mountpoint.clone()))
        }

        fn net_counters(&self) -> NetCounters {
            let mut net = self.net.lock().unwrap();
            if net.len() > 1 {
                net.remove(0)
            } else {
                net.first().copied().unwrap_or_default()
            }
        }

        fn host(&self) -> HostReading {
            HostReading {
                hostname: "panel-host".into(),
                platform: "Linux".into(),
                platform_release: "6.1.0".into(),
                platform_version: "#1 SMP".into(),
                architecture: "x86_64".into(),
                boot_time: 1_700_000_000,
                uptime_seconds: 3_661,
            }
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn reading(sent: u64, recv: u64, t: DateTime<Utc>) -> CounterReading {
        CounterReading {
            bytes_sent: sent,
            bytes_recv: recv,
            captured_at: t,
        }
    }

    #[test]
    fn uptime_formatting() {
        assert_eq!(format_uptime(0), "< 1m");
        assert_eq!(format_uptime(59), "< 1m");
        assert_eq!(format_uptime(60), "1m");
        assert_eq!(format_uptime(3_661), "1h 1m");
        assert_eq!(format_uptime(90_000), "1d 1h");
        assert_eq!(format_uptime(86_460), "1d 1m");
        assert_eq!(format_uptime(2 * 86_400 + 3 * 3_600 + 15 * 60 + 7), "2d 3h 15m");
    }

    #[test]
    fn unit_conversions_round_to_two_decimals() {
        assert_eq!(bytes_to_gib(1 << 30), 1.0);
        assert_eq!(bytes_to_gib(1_610_612_736), 1.5);
        assert_eq!(bytes_to_gib(0), 0.0);
        assert_eq!(bytes_to_mib(5 * (1 << 20) + 1), 5.0);
        assert_eq!(round2(1.23456), 1.23);
        assert_eq!(percent_of(1, 3), 33.33);
        assert_eq!(percent_of(5, 0), 0.0);
    }

    #[test]
    fn throughput_matches_delta_over_elapsed() {
        let cases = [
            (0u64, 10 * (1u64 << 20), 10i64, 1.0f64),
            (1_000, 1_000 + 3 * (1 << 20), 2, 1.5),
            (1 << 20, 1 << 21, 4, 0.25),
        ];
        for (c1, c2, dt, expected) in cases {
            let prev = reading(c1, c1, at(1_000));
            let cur = reading(c2, c2, at(1_000 + dt));
            let (sent, recv) = throughput_mbps(Some(&prev), &cur);
            assert!((sent - expected).abs() < 0.005, "{sent} vs {expected}");
            assert!((recv - expected).abs() < 0.005, "{recv} vs {expected}");
        }
    }

    #[test]
    fn throughput_is_zero_without_elapsed_time() {
        let prev = reading(0, 0, at(500));
        assert_eq!(
            throughput_mbps(Some(&prev), &reading(1 << 30, 1 << 30, at(500))),
            (0.0, 0.0)
        );
        assert_eq!(
            throughput_mbps(Some(&prev), &reading(1 << 30, 1 << 30, at(400))),
            (0.0, 0.0)
        );
    }

    #[test]
    fn throughput_is_zero_without_prior_reading() {
        assert_eq!(throughput_mbps(None, &reading(10, 10, at(1))), (0.0, 0.0));
    }

    #[test]
    fn counter_reset_does_not_go_negative() {
        let prev = reading(5 << 20, 5 << 20, at(0));
        let (sent, recv) = throughput_mbps(Some(&prev), &reading(1 << 20, 1 << 20, at(1)));
        assert_eq!((sent, recv), (0.0, 0.0));
    }

    #[test]
    fn first_network_sample_reports_zero_then_rate() {
        let probe = FakeProbe {
            net: Mutex::new(vec![
                NetCounters {
                    bytes_sent: 0,
                    bytes_recv: 0,
                    packets_sent: 1,
                    packets_recv: 2,
                },
                NetCounters {
                    bytes_sent: 2 << 20,
                    bytes_recv: 4 << 20,
                    packets_sent: 3,
                    packets_recv: 4,
                },
            ]),
            ..Default::default()
        };
        let sampler = Sampler::new(probe);

        let first = sampler.sample_network_at(at(100));
        assert_eq!(first.speed_mbps_sent, 0.0);
        assert_eq!(first.speed_mbps_recv, 0.0);
        assert!(sampler.counters().last().is_some());

        let second = sampler.sample_network_at(at(102));
        assert_eq!(second.speed_mbps_sent, 1.0);
        assert_eq!(second.speed_mbps_recv, 2.0);
        assert_eq!(second.mb_recv, 4.0);
        assert_eq!(second.packets_recv, 4);
    }

    #[test]
    fn permission_denied_partition_is_skipped() {
        let usage = DiskUsage {
            total: 100 << 30,
            available: 25 << 30,
        };
        let probe = FakeProbe {
            partitions: vec![
                (partition("/"), Ok(usage)),
                (partition("/secret"), Err(())),
                (partition("/data"), Ok(usage)),
            ],
            ..Default::default()
        };
        let sampler = Sampler::new(probe);

        let outcomes = sampler.inspect_partitions();
        assert_eq!(outcomes.len(), 3);
        assert!(matches!(
            &outcomes[1],
            PartitionOutcome::Skipped { mountpoint, reason: ProbeError::PermissionDenied(_) }
                if mountpoint == "/secret"
        ));

        let disks = sampler.sample_disk();
        assert_eq!(disks.len(), 2);
        assert_eq!(disks[0].mountpoint, "/");
        assert_eq!(disks[1].mountpoint, "/data");
        assert_eq!(disks[0].total_gb, 100.0);
        assert_eq!(disks[0].used_gb, 75.0);
        assert_eq!(disks[0].free_gb, 25.0);
        assert_eq!(disks[0].percent, 75.0);
    }

    #[test]
    fn cpu_is_rounded_not_clamped() {
        let sampler = Sampler::new(FakeProbe::default());
        let cpu = sampler.sample_cpu();
        assert_eq!(cpu.percent, 100.4);
        assert_eq!(cpu.count, 2);
        assert_eq!(cpu.count_logical, 4);
        assert_eq!(cpu.per_cpu.len(), cpu.count_logical);
        assert_eq!(cpu.per_cpu[0], 12.35);
        assert!(cpu.freq.is_none());
    }

    #[test]
    fn memory_is_in_gibibytes() {
        let mem = Sampler::new(FakeProbe::default()).sample_memory();
        assert_eq!(mem.total_gb, 16.0);
        assert_eq!(mem.available_gb, 4.0);
        assert_eq!(mem.used_gb, 12.0);
        assert_eq!(mem.percent, 75.0);
        assert_eq!(mem.swap_percent, 0.0);
    }

    #[test]
    fn system_info_formats_uptime_and_boot_time() {
        let sys = Sampler::new(FakeProbe::default()).sample_system();
        assert_eq!(sys.uptime_formatted, "1h 1m");
        assert_eq!(sys.boot_time, at(1_700_000_000));
        assert_eq!(sys.hostname, "panel-host");
    }

    #[test]
    fn sample_all_shape_is_stable() {
        let usage = DiskUsage {
            total: 10 << 30,
            available: 5 << 30,
        };
        let probe = FakeProbe {
            partitions: vec![(partition("/"), Ok(usage)), (partition("/boot"), Err(()))],
            ..Default::default()
        };
        let sampler = Sampler::with_cpu_interval(probe, Duration::ZERO);
        let a = sampler.sample_all();
        let b = sampler.sample_all();
        assert_eq!(a.disk.len(), b.disk.len());
        assert_eq!(a.cpu.per_cpu.len(), b.cpu.per_cpu.len());

        let ja = serde_json::to_value(&a).unwrap();
        let jb = serde_json::to_value(&b).unwrap();
        let keys = |v: &serde_json::Value| {
            v.as_object()
                .unwrap()
                .keys()
                .cloned()
                .collect::<Vec<_>>()
        };
        assert_eq!(keys(&ja), keys(&jb));
        assert_eq!(
            keys(&ja),
            ["cpu", "disk", "memory", "network", "system", "timestamp"]
        );
    }
}
