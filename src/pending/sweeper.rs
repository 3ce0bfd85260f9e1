//! Background expiry sweep

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::PendingActionStore;

/// Run `sweep_expired` every `interval` until the handle is aborted
pub fn spawn_expiry_sweeper(store: PendingActionStore, interval: Duration) -> JoinHandle<()> {
    spawn_sweeper(store, interval, None)
}

/// Like [`spawn_expiry_sweeper`], and each pass also purges terminal actions
/// resolved more than `retention` ago (`None` keeps them)
pub fn spawn_sweeper(
    store: PendingActionStore,
    interval: Duration,
    retention: Option<chrono::Duration>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(
            interval_ms = interval.as_millis() as u64,
            retention_secs = retention.map(|r| r.num_seconds()),
            "Pending action sweeper started"
        );

        loop {
            ticker.tick().await;
            match store.sweep_expired().await {
                Ok(0) => {}
                Ok(count) => tracing::debug!(count, "Sweep pass expired actions"),
                Err(e) => tracing::warn!(error = %e, "Pending action sweep failed"),
            }
            if let Some(retention) = retention {
                if let Err(e) = store.purge_resolved(retention).await {
                    tracing::warn!(error = %e, "Pending action purge failed");
                }
            }
        }
    })
}
