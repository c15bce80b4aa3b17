//! Request control: cancellation and in-flight queries.

use crate::types::{ActiveRequest, RequestId, Stage};

use super::Orchestrator;

impl Orchestrator {
    /// Cancel a request
    ///
    /// Signals the request's cancellation token. The request reaches its
    /// terminal `Cancelled` state asynchronously: a running tool is killed
    /// with its whole process tree and in-progress files are removed.
    ///
    /// Returns `true` if the request was in flight, `false` for unknown or
    /// already finished requests (a no-op).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use media_dl::*;
    /// # async fn example(orchestrator: Orchestrator, request: DownloadRequest) -> Result<()> {
    /// let handle = orchestrator.submit(request).await?;
    /// orchestrator.cancel(handle.id()).await;
    /// assert_eq!(handle.wait().await, TransferResult::Cancelled);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn cancel(&self, id: RequestId) -> bool {
        let active = self.requests.active.lock().await;
        match active.get(&id) {
            Some(entry) => {
                tracing::info!(request_id = id.0, stage = ?entry.info.stage, "cancelling request");
                entry.token.cancel();
                true
            }
            None => {
                tracing::debug!(request_id = id.0, "cancel for unknown request ignored");
                false
            }
        }
    }

    /// Cancel every in-flight request, returning how many were signalled
    pub async fn cancel_all(&self) -> usize {
        let active = self.requests.active.lock().await;
        tracing::debug!(active_count = active.len(), "cancelling all requests");

        for (id, entry) in active.iter() {
            tracing::debug!(request_id = id.0, "signalling cancellation");
            entry.token.cancel();
        }
        active.len()
    }

    /// Snapshots of all in-flight requests, ordered by ID
    pub async fn active_requests(&self) -> Vec<ActiveRequest> {
        let active = self.requests.active.lock().await;
        let mut requests: Vec<ActiveRequest> =
            active.values().map(|entry| entry.info.clone()).collect();
        requests.sort_by_key(|request| request.id);
        requests
    }

    /// Whether a request is still in flight
    pub async fn is_active(&self, id: RequestId) -> bool {
        self.requests.active.lock().await.contains_key(&id)
    }

    pub(crate) async fn set_stage(&self, id: RequestId, stage: Stage) {
        if let Some(entry) = self.requests.active.lock().await.get_mut(&id) {
            entry.info.stage = stage;
        }
    }
}
