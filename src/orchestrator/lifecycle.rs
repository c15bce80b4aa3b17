//! Shutdown coordination.

use std::sync::atomic::Ordering;
use std::time::Duration;

use crate::error::Result;
use crate::types::Event;

use super::Orchestrator;

/// How long shutdown waits for cancelled requests to reach a terminal state
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

impl Orchestrator {
    /// Gracefully shut down the orchestrator
    ///
    /// This method performs a graceful shutdown sequence:
    /// 1. Stops accepting new requests ([`submit`](Self::submit) returns `ShuttingDown`)
    /// 2. Cancels all in-flight requests, killing their tools
    /// 3. Waits for them to reach a terminal state with a timeout (30 seconds)
    /// 4. Emits [`Event::Shutdown`]
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Initiating graceful shutdown");

        // Stored before taking the registry lock, see submit()
        self.requests.accepting_new.store(false, Ordering::SeqCst);
        tracing::info!("Stopped accepting new requests");

        let cancelled = self.cancel_all().await;
        tracing::info!(cancelled, "Signalled cancellation to all in-flight requests");

        match tokio::time::timeout(SHUTDOWN_TIMEOUT, self.wait_for_active_requests()).await {
            Ok(()) => tracing::info!("All in-flight requests finished"),
            Err(_) => {
                tracing::warn!("Timeout waiting for requests to finish, proceeding with shutdown")
            }
        }

        self.emit_event(Event::Shutdown);
        tracing::info!("Graceful shutdown complete");
        Ok(())
    }

    /// Whether shutdown has begun
    pub fn is_shutting_down(&self) -> bool {
        !self.requests.accepting_new.load(Ordering::SeqCst)
    }

    async fn wait_for_active_requests(&self) {
        loop {
            let active_count = self.requests.active.lock().await.len();
            if active_count == 0 {
                return;
            }

            tracing::debug!(active_count, "Waiting for in-flight requests to finish");
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }
}
