//! Collection cycles: one snapshot in, one stored point out.
//!
//! Normally driven from outside (cron calling `POST /api/metrics/save`);
//! `spawn_collector` runs the same cycle on a tokio interval instead.

use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::state::AppState;
use crate::store::StoreError;
use crate::types::NewMetricPoint;

#[derive(Debug, Error)]
pub enum CollectError {
    #[error("storing metrics point: {0}")]
    Store(#[from] StoreError),
    #[error("sampling worker failed: {0}")]
    Worker(#[from] JoinError),
}

/// Sample, derive the stored point and append it. At most once: a failed
/// cycle is reported and not retried.
pub async fn collect_once(state: &AppState) -> Result<i64, CollectError> {
    let sampler = state.sampler.clone();
    let db = state.db.clone();
    let id = tokio::task::spawn_blocking(move || {
        let snapshot = sampler.sample_all();
        db.append_metric(&NewMetricPoint::from_snapshot(&snapshot))
    })
    .await??;
    Ok(id)
}

pub fn spawn_collector(state: AppState, period: Duration) -> JoinHandle<()> {
    info!(period_secs = period.as_secs(), "starting metrics collector");
    tokio::spawn(async move {
        let mut ticker = interval(period);
        // a slow cycle should not cause a burst of catch-up samples
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match collect_once(&state).await {
                Ok(id) => debug!(id, "stored metrics point"),
                Err(e) => warn!("metrics collection cycle failed: {e}"),
            }
        }
    })
}
