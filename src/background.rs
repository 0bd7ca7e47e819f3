//! 暂存目录的后台清理任务。

use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::config::STAGING_SWEEP_INTERVAL_SECS;
use crate::staging::{Staging, sweep_stale};

/// 启动暂存目录清理任务；`ttl` 为零时不启动。
pub fn spawn_background_tasks(staging: Arc<Staging>, ttl: Duration) {
    if ttl.is_zero() {
        return;
    }
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(STAGING_SWEEP_INTERVAL_SECS));
        loop {
            interval.tick().await;
            if let Err(err) = sweep_stale(&staging, ttl).await {
                warn!(error = %err, "staging sweep failed");
            }
        }
    });
}
