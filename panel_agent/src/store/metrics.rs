//! Append-only metric time series.

use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{millis_column, to_millis, Database, StoreResult};
use crate::types::{NewMetricPoint, StoredMetricPoint};

fn point_from_row(row: &Row<'_>) -> rusqlite::Result<StoredMetricPoint> {
    let ts: i64 = row.get(1)?;
    let point = NewMetricPoint {
        timestamp: millis_column(1, ts)?,
        cpu_percent: row.get(2)?,
        ram_percent: row.get(3)?,
        ram_used_gb: row.get(4)?,
        ram_total_gb: row.get(5)?,
        disk_percent: row.get(6)?,
        disk_used_gb: row.get(7)?,
        disk_total_gb: row.get(8)?,
        network_sent_mb: row.get(9)?,
        network_recv_mb: row.get(10)?,
    };
    Ok(StoredMetricPoint {
        id: row.get(0)?,
        point,
    })
}

impl Database {
    /// Store one point and return its id. Ids increase with every insert.
    pub fn append_metric(&self, p: &NewMetricPoint) -> StoreResult<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO metrics_history (
                timestamp, cpu_percent, ram_percent, ram_used_gb, ram_total_gb,
                disk_percent, disk_used_gb, disk_total_gb, network_sent_mb, network_recv_mb
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                to_millis(p.timestamp),
                p.cpu_percent,
                p.ram_percent,
                p.ram_used_gb,
                p.ram_total_gb,
                p.disk_percent,
                p.disk_used_gb,
                p.disk_total_gb,
                p.network_sent_mb,
                p.network_recv_mb,
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    /// Points with `timestamp >= since`, oldest first. When the window holds
    /// more than `limit` points, the latest `limit` are kept.
    pub fn query_window(
        &self,
        since: DateTime<Utc>,
        limit: u32,
    ) -> StoreResult<Vec<StoredMetricPoint>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT id, timestamp, cpu_percent, ram_percent, ram_used_gb, ram_total_gb,
                    disk_percent, disk_used_gb, disk_total_gb, network_sent_mb, network_recv_mb
             FROM metrics_history
             WHERE timestamp >= ?1
             ORDER BY timestamp DESC, id DESC
             LIMIT ?2",
        )?;
        let mut points = stmt
            .query_map(params![to_millis(since), i64::from(limit)], point_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        points.reverse();
        Ok(points)
    }

    pub fn metric_count(&self) -> StoreResult<u64> {
        let n: i64 = self
            .conn()
            .query_row("SELECT COUNT(*) FROM metrics_history", [], |r| r.get(0))?;
        Ok(n.max(0) as u64)
    }
}
