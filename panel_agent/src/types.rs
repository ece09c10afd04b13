//! Data types returned to API clients.
//! Keep this module minimal and stable: it defines the wire format.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct CpuFrequency {
    /// Mean across cores.
    pub current_mhz: u64,
}

#[derive(Debug, Serialize, Clone)]
pub struct CpuInfo {
    // aggregate utilization; not clamped, may briefly exceed 100
    pub percent: f64,
    pub count: usize,
    pub count_logical: usize,
    pub freq: Option<CpuFrequency>,
    pub per_cpu: Vec<f64>,
}

#[derive(Debug, Serialize, Clone)]
pub struct MemoryInfo {
    pub total_gb: f64,
    pub available_gb: f64,
    pub used_gb: f64,
    pub percent: f64,
    pub swap_total_gb: f64,
    pub swap_used_gb: f64,
    pub swap_percent: f64,
}

#[derive(Debug, Serialize, Clone)]
pub struct DiskInfo {
    pub device: String,
    pub mountpoint: String,
    pub fstype: String,
    pub total_gb: f64,
    pub used_gb: f64,
    pub free_gb: f64,
    pub percent: f64,
}

#[derive(Debug, Serialize, Clone)]
pub struct NetworkInfo {
    // cumulative since boot
    pub bytes_sent: u64,
    pub bytes_recv: u64,
    pub packets_sent: u64,
    pub packets_recv: u64,
    pub mb_sent: f64,
    pub mb_recv: f64,
    // MB/s since the previous network read; 0 on the first read
    pub speed_mbps_sent: f64,
    pub speed_mbps_recv: f64,
}

#[derive(Debug, Serialize, Clone)]
pub struct SystemInfo {
    pub hostname: String,
    pub platform: String,
    pub platform_release: String,
    pub platform_version: String,
    pub architecture: String,
    pub boot_time: DateTime<Utc>,
    pub uptime_seconds: u64,
    pub uptime_formatted: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct MetricsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub cpu: CpuInfo,
    pub memory: MemoryInfo,
    pub disk: Vec<DiskInfo>,
    pub network: NetworkInfo,
    pub system: SystemInfo,
}

/// Scalar fields of a snapshot kept for trend charts.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct NewMetricPoint {
    pub timestamp: DateTime<Utc>,
    pub cpu_percent: f64,
    pub ram_percent: f64,
    pub ram_used_gb: f64,
    pub ram_total_gb: f64,
    // first disk volume only; absent when no volume could be inspected
    pub disk_percent: Option<f64>,
    pub disk_used_gb: Option<f64>,
    pub disk_total_gb: Option<f64>,
    pub network_sent_mb: f64,
    pub network_recv_mb: f64,
}

impl NewMetricPoint {
    pub fn from_snapshot(s: &MetricsSnapshot) -> Self {
        let first_disk = s.disk.first();
        Self {
            timestamp: s.timestamp,
            cpu_percent: s.cpu.percent,
            ram_percent: s.memory.percent,
            ram_used_gb: s.memory.used_gb,
            ram_total_gb: s.memory.total_gb,
            disk_percent: first_disk.map(|d| d.percent),
            disk_used_gb: first_disk.map(|d| d.used_gb),
            disk_total_gb: first_disk.map(|d| d.total_gb),
            network_sent_mb: s.network.mb_sent,
            network_recv_mb: s.network.mb_recv,
        }
    }
}

/// A persisted point as read back from the time series.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct StoredMetricPoint {
    #[serde(skip)]
    pub id: i64,
    #[serde(flatten)]
    pub point: NewMetricPoint,
}
