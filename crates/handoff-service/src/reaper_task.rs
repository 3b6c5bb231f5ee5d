//! Background expiry sweeps on a fixed interval.

use std::sync::Arc;
use std::time::Duration;

use handoff_core::HandoffCore;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Sweep every `interval` until `shutdown` fires.
///
/// The first tick fires immediately. A sweep error is logged and the next
/// tick retries; overdue tokens stay claim-refused meanwhile.
pub fn spawn_reaper(
    core: Arc<HandoffCore>,
    interval: Duration,
    mut shutdown: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tracing::info!(?interval, "expiry reaper started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("expiry reaper shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let core = Arc::clone(&core);
                    match tokio::task::spawn_blocking(move || core.sweep()).await {
                        Ok(Ok(report)) if !report.is_empty() => {
                            tracing::info!(
                                expired = report.expired.len(),
                                refunds = report.refunds.len(),
                                batches = report.batches,
                                "expiry sweep"
                            );
                        }
                        Ok(Ok(_)) => {}
                        Ok(Err(e)) => tracing::warn!("expiry sweep failed: {e}"),
                        Err(e) => tracing::error!("expiry sweep task panicked: {e}"),
                    }
                }
            }
        }
    })
}
