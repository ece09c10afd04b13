//! Host OS metrics interface. `SysinfoProbe` is the real implementation,
//! tests substitute their own.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use sysinfo::{Disks, Networks, System, MINIMUM_CPU_UPDATE_INTERVAL};
use thiserror::Error;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuReading {
    pub global_percent: f32,
    pub per_core: Vec<f32>,
    pub physical_cores: Option<usize>,
    /// Mean current MHz across cores; `None` when the OS does not report it.
    pub frequency_mhz: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MemoryReading {
    pub total: u64,
    pub available: u64,
    pub used: u64,
    pub swap_total: u64,
    pub swap_used: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub device: String,
    pub mountpoint: PathBuf,
    pub fstype: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiskUsage {
    pub total: u64,
    pub available: u64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetCounters {
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostReading {
    pub hostname: String,
    pub platform: String,
    pub platform_release: String,
    pub platform_version: String,
    pub architecture: String,
    /// Unix seconds.
    pub boot_time: u64,
    pub uptime_seconds: u64,
}

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("permission denied inspecting {}", .0.display())]
    PermissionDenied(PathBuf),
    #[error("volume {} is no longer mounted", .0.display())]
    Unmounted(PathBuf),
    #[error("inspecting {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Synchronous source of host facts. Every call may block.
pub trait HostProbe: Send + Sync {
    /// Measures CPU utilization over `interval`; blocks for about that long.
    fn cpu(&self, interval: Duration) -> CpuReading;
    fn memory(&self) -> MemoryReading;
    fn partitions(&self) -> Vec<Partition>;
    fn disk_usage(&self, partition: &Partition) -> Result<DiskUsage, ProbeError>;
    fn net_counters(&self) -> NetCounters;
    fn host(&self) -> HostReading;
}

impl<T: HostProbe + ?Sized> HostProbe for Box<T> {
    fn cpu(&self, interval: Duration) -> CpuReading {
        (**self).cpu(interval)
    }
    fn memory(&self) -> MemoryReading {
        (**self).memory()
    }
    fn partitions(&self) -> Vec<Partition> {
        (**self).partitions()
    }
    fn disk_usage(&self, partition: &Partition) -> Result<DiskUsage, ProbeError> {
        (**self).disk_usage(partition)
    }
    fn net_counters(&self) -> NetCounters {
        (**self).net_counters()
    }
    fn host(&self) -> HostReading {
        (**self).host()
    }
}

// ---------- sysinfo implementation ----------

/// Keeps the sysinfo handles alive across calls so refreshes reuse them.
pub struct SysinfoProbe {
    sys: Mutex<System>,
    disks: Mutex<Disks>,
    networks: Mutex<Networks>,
    hostname: String,
}

fn relock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

impl SysinfoProbe {
    pub fn new() -> Self {
        let mut sys = System::new();
        sys.refresh_cpu_usage();
        sys.refresh_memory();
        let hostname = hostname::get()
            .ok()
            .and_then(|s| s.into_string().ok())
            .or_else(System::host_name)
            .unwrap_or_else(|| "unknown".into());
        Self {
            sys: Mutex::new(sys),
            disks: Mutex::new(Disks::new_with_refreshed_list()),
            networks: Mutex::new(Networks::new_with_refreshed_list()),
            hostname,
        }
    }
}

impl Default for SysinfoProbe {
    fn default() -> Self {
        Self::new()
    }
}

/// Cores reporting 0 MHz are left out of the mean.
fn mean_frequency<I: IntoIterator<Item = u64>>(freqs: I) -> Option<u64> {
    let (sum, n) = freqs
        .into_iter()
        .filter(|f| *f > 0)
        .fold((0u64, 0u64), |(sum, n), f| (sum.saturating_add(f), n + 1));
    (n > 0).then(|| sum / n)
}

fn classify_io(path: &Path, e: io::Error) -> ProbeError {
    match e.kind() {
        io::ErrorKind::PermissionDenied => ProbeError::PermissionDenied(path.to_path_buf()),
        io::ErrorKind::NotFound => ProbeError::Unmounted(path.to_path_buf()),
        _ => ProbeError::Io {
            path: path.to_path_buf(),
            source: e,
        },
    }
}

impl HostProbe for SysinfoProbe {
    fn cpu(&self, interval: Duration) -> CpuReading {
        let mut sys = relock(&self.sys);
        // sysinfo needs two refreshes spaced at least MINIMUM_CPU_UPDATE_INTERVAL apart
        sys.refresh_cpu_usage();
        std::thread::sleep(interval.max(MINIMUM_CPU_UPDATE_INTERVAL));
        sys.refresh_cpu_usage();
        sys.refresh_cpu_frequency();

        let frequency_mhz = mean_frequency(sys.cpus().iter().map(|c| c.frequency()));
        CpuReading {
            global_percent: sys.global_cpu_usage(),
            per_core: sys.cpus().iter().map(|c| c.cpu_usage()).collect(),
            physical_cores: System::physical_core_count(),
            frequency_mhz,
        }
    }

    fn memory(&self) -> MemoryReading {
        let mut sys = relock(&self.sys);
        sys.refresh_memory();
        MemoryReading {
            total: sys.total_memory(),
            available: sys.available_memory(),
            used: sys.used_memory(),
            swap_total: sys.total_swap(),
            swap_used: sys.used_swap(),
        }
    }

    fn partitions(&self) -> Vec<Partition> {
        let mut disks = relock(&self.disks);
        disks.refresh(true);
        disks
            .list()
            .iter()
            .map(|d| Partition {
                device: d.name().to_string_lossy().into_owned(),
                mountpoint: d.mount_point().to_path_buf(),
                fstype: d.file_system().to_string_lossy().into_owned(),
            })
            .collect()
    }

    fn disk_usage(&self, partition: &Partition) -> Result<DiskUsage, ProbeError> {
        let path = partition.mountpoint.as_path();
        std::fs::metadata(path).map_err(|e| classify_io(path, e))?;
        let disks = relock(&self.disks);
        disks
            .list()
            .iter()
            .find(|d| d.mount_point() == path)
            .map(|d| DiskUsage {
                total: d.total_space(),
                available: d.available_space(),
            })
            .ok_or_else(|| ProbeError::Unmounted(path.to_path_buf()))
    }

    fn net_counters(&self) -> NetCounters {
        let mut nets = relock(&self.networks);
        nets.refresh(true);
        nets.iter()
            .fold(NetCounters::default(), |acc, (_name, data)| NetCounters {
                bytes_sent: acc.bytes_sent.saturating_add(data.total_transmitted()),
                bytes_recv: acc.bytes_recv.saturating_add(data.total_received()),
                packets_sent: acc
                    .packets_sent
                    .saturating_add(data.total_packets_transmitted()),
                packets_recv: acc
                    .packets_recv
                    .saturating_add(data.total_packets_received()),
            })
    }

    fn host(&self) -> HostReading {
        HostReading {
            hostname: self.hostname.clone(),
            platform: System::name().unwrap_or_else(|| std::env::consts::OS.to_string()),
            platform_release: System::kernel_version().unwrap_or_default(),
            platform_version: System::os_version().unwrap_or_default(),
            architecture: std::env::consts::ARCH.to_string(),
            boot_time: System::boot_time(),
            uptime_seconds: System::uptime(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_denied_is_classified() {
        let e = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(matches!(
            classify_io(Path::new("/root"), e),
            ProbeError::PermissionDenied(p) if p == Path::new("/root")
        ));
    }

    #[test]
    fn missing_mount_is_unmounted() {
        let e = io::Error::from(io::ErrorKind::NotFound);
        assert!(matches!(
            classify_io(Path::new("/mnt/gone"), e),
            ProbeError::Unmounted(_)
        ));
    }

    #[test]
    fn frequency_is_the_mean_of_reporting_cores() {
        assert_eq!(mean_frequency([1200, 3600, 0, 2400]), Some(2400));
        assert_eq!(mean_frequency([3000]), Some(3000));
        assert_eq!(mean_frequency([0, 0]), None);
        assert_eq!(mean_frequency(std::iter::empty()), None);
    }

    #[test]
    fn sysinfo_probe_reports_host_and_memory() {
        let probe = SysinfoProbe::new();
        let host = probe.host();
        assert!(!host.hostname.is_empty());
        assert!(!host.architecture.is_empty());
        let mem = probe.memory();
        assert!(mem.total > 0);
    }
}
