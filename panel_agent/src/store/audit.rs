//! Action audit log: who did what to which instance, and whether it worked.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use serde::{Deserialize, Serialize};

use super::{millis_column, to_millis, Database, StoreError, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    #[default]
    Success,
    Error,
}

impl ActionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionStatus::Success => "success",
            ActionStatus::Error => "error",
        }
    }

    fn parse(s: &str) -> StoreResult<Self> {
        match s {
            "success" => Ok(ActionStatus::Success),
            "error" => Ok(ActionStatus::Error),
            other => Err(StoreError::Invalid(format!("action status {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewActionLog {
    pub user_id: i64,
    pub action: String,
    pub instance_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub details: Option<String>,
    pub status: ActionStatus,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ActionLog {
    pub id: i64,
    pub user_id: i64,
    pub username: Option<String>,
    pub action: String,
    pub instance_name: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub details: Option<String>,
    pub status: ActionStatus,
}

/// Equality filters are skipped when `None`.
#[derive(Debug, Clone)]
pub struct LogFilter {
    pub instance: Option<String>,
    pub action: Option<String>,
    pub user_id: Option<i64>,
    pub since: DateTime<Utc>,
    pub limit: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ActionCount {
    pub action: String,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq, Default)]
pub struct LogStats {
    pub total: u64,
    pub success: u64,
    pub errors: u64,
    pub by_type: Vec<ActionCount>,
}

fn log_from_row(row: &Row<'_>) -> rusqlite::Result<ActionLog> {
    let status: String = row.get(7)?;
    let status = ActionStatus::parse(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(7, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(ActionLog {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        action: row.get(3)?,
        instance_name: row.get(4)?,
        timestamp: millis_column(5, row.get(5)?)?,
        details: row.get(6)?,
        status,
    })
}

fn count(n: i64) -> u64 {
    n.max(0) as u64
}

fn insert_action(conn: &Connection, entry: &NewActionLog) -> StoreResult<i64> {
    conn.execute(
        "INSERT INTO action_logs (user_id, action, instance_name, timestamp, details, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            entry.user_id,
            entry.action,
            entry.instance_name,
            to_millis(entry.timestamp),
            entry.details,
            entry.status.as_str(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

impl Database {
    pub fn record_action(&self, entry: &NewActionLog) -> StoreResult<i64> {
        insert_action(&self.conn(), entry)
    }

    /// Stamp `last_login` and append the `login` entry in one transaction;
    /// on failure neither is kept.
    pub fn record_login(&self, user_id: i64, at: DateTime<Utc>) -> StoreResult<i64> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![to_millis(at), user_id],
        )?;
        let id = insert_action(
            &tx,
            &NewActionLog {
                user_id,
                action: "login".into(),
                instance_name: None,
                timestamp: at,
                details: None,
                status: ActionStatus::Success,
            },
        )?;
        tx.commit()?;
        Ok(id)
    }

    /// Matching entries, newest first.
    pub fn query_actions(&self, filter: &LogFilter) -> StoreResult<Vec<ActionLog>> {
        let conn = self.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT l.id, l.user_id, u.username, l.action, l.instance_name,
                    l.timestamp, l.details, l.status
             FROM action_logs l
             LEFT JOIN users u ON u.id = l.user_id
             WHERE l.timestamp >= ?1
               AND (?2 IS NULL OR l.instance_name = ?2)
               AND (?3 IS NULL OR l.action = ?3)
               AND (?4 IS NULL OR l.user_id = ?4)
             ORDER BY l.timestamp DESC, l.id DESC
             LIMIT ?5",
        )?;
        let logs = stmt
            .query_map(
                params![
                    to_millis(filter.since),
                    filter.instance,
                    filter.action,
                    filter.user_id,
                    i64::from(filter.limit),
                ],
                log_from_row,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(logs)
    }

    pub fn action_stats(&self, since: DateTime<Utc>) -> StoreResult<LogStats> {
        let conn = self.conn();
        let since = to_millis(since);
        let (total, success, errors): (i64, i64, i64) = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'success' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'error' THEN 1 ELSE 0 END), 0)
             FROM action_logs WHERE timestamp >= ?1",
            params![since],
            |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
        )?;

        let mut stmt = conn.prepare_cached(
            "SELECT action, COUNT(id) FROM action_logs
             WHERE timestamp >= ?1
             GROUP BY action
             ORDER BY COUNT(id) DESC, action ASC",
        )?;
        let by_type = stmt
            .query_map(params![since], |r| {
                Ok(ActionCount {
                    action: r.get(0)?,
                    count: count(r.get(1)?),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(LogStats {
            total: count(total),
            success: count(success),
            errors: count(errors),
            by_type,
        })
    }
}
