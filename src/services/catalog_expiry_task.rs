//! Background catalog expiry.
//!
//! Soft-closes programs whose fixed deadline has passed. Runs once right
//! at startup (the catalog may have aged while the service was down) and
//! then on the configured interval.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use super::monitor_check_task::TaskHandle;
use super::program_service::ProgramService;

/// Spawn the expiry sweep. The returned handle must be kept alive; the
/// loop winds down once it is dropped.
pub fn start_catalog_expiry_task(
    program_service: Arc<ProgramService>,
    interval_secs: u64,
) -> TaskHandle {
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let every = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        let mut ticker = time::interval(every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match program_service.expire_overdue().await {
                        Ok(0) => {},
                        Ok(expired) => {
                            tracing::info!("Catalog expiry closed {} programs", expired);
                        },
                        Err(e) => tracing::error!("Catalog expiry failed: {}", e),
                    }
                },
                changed = stop_rx.changed() => {
                    if changed.is_err() || *stop_rx.borrow() {
                        break;
                    }
                },
            }
        }
        tracing::info!("Catalog expiry stopped");
    });

    tracing::info!("Catalog expiry started, sweeping every {}s", interval_secs);
    TaskHandle::new(stop_tx)
}
