//! Periodic purge of abandoned uploads.

use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::MetadataStore;

/// Spawns a task that deletes pending records older than `retention` every
/// `interval`, until `cancel` fires.
pub fn spawn_sweeper(
    store: Arc<dyn MetadataStore>,
    retention: Duration,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let retention = TimeDelta::from_std(retention).unwrap_or(TimeDelta::MAX);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("pending sweeper stopped");
                    return;
                }
                _ = ticker.tick() => {}
            }

            let Some(cutoff) = Utc::now().checked_sub_signed(retention) else {
                continue;
            };
            match store.purge_expired_pending(cutoff).await {
                Ok(0) => {}
                Ok(n) => info!(purged = n, "expired pending uploads removed"),
                Err(e) => warn!(error = %e, "pending sweep failed"),
            }
        }
    })
}
