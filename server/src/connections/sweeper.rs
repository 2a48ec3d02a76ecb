//! Background expiry of idle connections.

use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::connections::ConnectionRegistry;

/// Spawn a task that sweeps idle connections every `interval_secs` seconds.
///
/// The first sweep runs immediately. Sweeps run inline in the timer loop, so
/// there is never more than one in flight; ticks missed while a sweep runs
/// are skipped rather than replayed. `interval_secs` must be non-zero.
pub fn spawn_expiry_sweeper(
    registry: ConnectionRegistry,
    session_timeout_secs: u64,
    interval_secs: u64,
) -> JoinHandle<()> {
    let period = Duration::from_secs(interval_secs);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;

            let purged = registry.sweep(session_timeout_secs);
            if purged > 0 {
                tracing::info!(
                    "Connection sweep: purged {} idle connections, {} remain",
                    purged,
                    registry.len()
                );
            } else {
                tracing::debug!("Connection sweep: no idle connections");
            }
        }
    })
}
