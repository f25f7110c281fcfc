//! Periodic registry heartbeat.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use upl_http::RegistryClient;

/// A running heartbeat task.
///
/// Dropping it does not stop the task; call [`Heartbeat::stop`].
#[derive(Debug)]
pub struct Heartbeat {
    tracker: TaskTracker,
    stop: CancellationToken,
}

impl Heartbeat {
    /// Sends a heartbeat every `interval`, starting one interval from now.
    ///
    /// Failed heartbeats are logged and the schedule continues.
    #[must_use]
    pub fn start(registry: Arc<RegistryClient>, interval: Duration) -> Self {
        let tracker = TaskTracker::new();
        let stop = CancellationToken::new();
        let token = stop.clone();

        tracker.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;
            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match registry.heartbeat(&token).await {
                    Ok(()) => tracing::debug!("registry heartbeat sent"),
                    Err(err) if token.is_cancelled() => {
                        tracing::debug!(error = %err, "heartbeat interrupted by shutdown");
                    }
                    Err(err) => tracing::warn!(error = %err, "registry heartbeat failed"),
                }
            }
        });
        tracker.close();

        Self { tracker, stop }
    }

    /// Stops the schedule and waits for an in-flight heartbeat to finish.
    pub async fn stop(self) {
        self.stop.cancel();
        self.tracker.wait().await;
    }
}
