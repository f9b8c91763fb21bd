//! Background monitor loop.
//!
//! Sweeps all active monitors through the matcher on a fixed interval.
//! The first sweep is deferred by one full interval so a restart does not
//! immediately re-run every monitor (and re-bill every analyst call).

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use super::monitor_service::MonitorService;
use super::search_service::SearchService;

/// Stops the owning background loop when dropped or when `stop` is called.
pub struct TaskHandle {
    stop: watch::Sender<bool>,
}

impl TaskHandle {
    pub(crate) fn new(stop: watch::Sender<bool>) -> Self {
        Self { stop }
    }

    pub fn stop(&self) {
        let _ = self.stop.send(true);
    }
}

/// Spawn the monitor loop. The returned handle must be kept alive; the
/// loop winds down once it is dropped.
pub fn start_monitor_check_task(
    monitor_service: Arc<MonitorService>,
    search_service: Arc<SearchService>,
    interval_secs: u64,
) -> TaskHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let every = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        let mut ticker = time::interval_at(time::Instant::now() + every, every);
        // A sweep can outlast the interval when many monitors queue up;
        // don't burst afterwards.
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match monitor_service.check_all(&search_service).await {
                        Ok(report) => tracing::debug!(
                            "Monitor sweep done: {} checked, {} notifications",
                            report.checked,
                            report.notifications_created
                        ),
                        Err(e) => tracing::error!("Monitor sweep aborted: {}", e),
                    }
                },
                changed = stop_rx.changed() => {
                    // A send(true) or a dropped handle both end the loop.
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                },
            }
        }
        tracing::info!("Monitor loop stopped");
    });

    tracing::info!("Monitor loop started, sweeping every {}s", interval_secs);
    TaskHandle::new(stop_tx)
}
