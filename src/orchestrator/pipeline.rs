//! Submission and the per-request pipeline: metadata, destination, transfer.

use chrono::Utc;
use std::sync::atomic::Ordering;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::destination::Resolution;
use crate::error::{Error, Result};
use crate::types::{
    ActiveRequest, DownloadRequest, DownloadResponse, Event, FailureKind, OutputKind, RequestId,
    Stage, TransferResult,
};

use super::{ActiveEntry, Orchestrator};

/// Handle to a submitted request
#[derive(Debug)]
pub struct RequestHandle {
    id: RequestId,
    task: JoinHandle<TransferResult>,
}

impl RequestHandle {
    /// ID of the request, usable with [`Orchestrator::cancel`]
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Wait for the terminal result
    pub async fn wait(self) -> TransferResult {
        match self.task.await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(request_id = self.id.0, error = %e, "request task failed");
                TransferResult::failed(FailureKind::Internal, format!("request task failed: {}", e))
            }
        }
    }
}

impl Orchestrator {
    /// Submit a request and return immediately
    ///
    /// The request is registered (and thus cancellable) before its task is
    /// spawned.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ShuttingDown`] once [`shutdown`](Self::shutdown) has begun.
    pub async fn submit(&self, request: DownloadRequest) -> Result<RequestHandle> {
        let token = CancellationToken::new();

        let id = {
            // Checked under the registry lock so shutdown's cancel pass sees this entry
            let mut active = self.requests.active.lock().await;
            if !self.requests.accepting_new.load(Ordering::SeqCst) {
                return Err(Error::ShuttingDown);
            }

            let id = RequestId(self.requests.next_id.fetch_add(1, Ordering::SeqCst));
            active.insert(
                id,
                ActiveEntry {
                    token: token.clone(),
                    info: ActiveRequest {
                        id,
                        url: request.url().to_string(),
                        kind: request.kind(),
                        stage: Stage::Queued,
                        started_at: Utc::now(),
                    },
                },
            );
            id
        };

        tracing::info!(
            request_id = id.0,
            url = request.url(),
            kind = %request.kind(),
            "request submitted"
        );
        self.emit_event(Event::Submitted {
            id,
            url: request.url().to_string(),
            kind: request.kind(),
        });

        // The outer task owns cleanup so a panicking pipeline still reaches a terminal state
        let pipeline = self.clone();
        let inner = tokio::spawn(async move { pipeline.run_stages(id, request, token).await });

        let orchestrator = self.clone();
        let task = tokio::spawn(async move {
            let result = match inner.await {
                Ok(result) => result,
                Err(e) => TransferResult::failed(
                    FailureKind::Internal,
                    format!("request pipeline failed: {}", e),
                ),
            };
            orchestrator.finish(id, &result).await;
            result
        });

        Ok(RequestHandle { id, task })
    }

    /// Submit a request and wait for its result
    pub async fn run(&self, request: DownloadRequest) -> Result<TransferResult> {
        Ok(self.submit(request).await?.wait().await)
    }

    /// Download `url` as `format` (`"mp3"` or `"mp4"`) into the configured download directory
    ///
    /// Never fails: invalid input and pipeline failures come back as a
    /// response with `ok: false`.
    pub async fn download_media(&self, url: &str, format: &str) -> DownloadResponse {
        let request = format.parse::<OutputKind>().and_then(|kind| {
            DownloadRequest::new(url, kind, self.config.download_dir().clone())
        });

        let request = match request {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(url, format, error = %e, "rejected download request");
                return DownloadResponse::rejected(&e);
            }
        };

        match self.run(request).await {
            Ok(result) => result.into(),
            Err(e) => DownloadResponse::rejected(&e),
        }
    }

    async fn run_stages(
        &self,
        id: RequestId,
        request: DownloadRequest,
        token: CancellationToken,
    ) -> TransferResult {
        if token.is_cancelled() {
            return TransferResult::Cancelled;
        }

        // Stage 1: metadata (dropping the future kills the tool)
        self.set_stage(id, Stage::ResolvingMetadata).await;
        let metadata = tokio::select! {
            biased;
            _ = token.cancelled() => return TransferResult::Cancelled,
            metadata = self.stages.metadata.resolve(request.url()) => metadata,
        };
        let metadata = match metadata {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(request_id = id.0, error = %e, "metadata resolution failed");
                return TransferResult::failed(e.failure_kind(), e.diagnostic());
            }
        };
        tracing::debug!(
            request_id = id.0,
            title = %metadata.title,
            formats = metadata.formats.len(),
            "metadata resolved"
        );
        self.emit_event(Event::MetadataResolved {
            id,
            title: metadata.title.clone(),
        });

        // Stage 2: destination
        self.set_stage(id, Stage::ResolvingDestination).await;
        let destination = &self.stages.destination;
        let suggestion = tokio::select! {
            biased;
            _ = token.cancelled() => return TransferResult::Cancelled,
            suggestion = destination.suggest(&metadata, request.kind(), request.target_dir()) => {
                suggestion
            }
        };
        let suggestion = match suggestion {
            Ok(suggestion) => suggestion,
            Err(e) => {
                tracing::warn!(request_id = id.0, error = %e, "destination rejected");
                return TransferResult::failed(e.failure_kind(), e.to_string());
            }
        };

        self.emit_event(Event::AwaitingDestination {
            id,
            suggested: suggestion.suggested.clone(),
        });

        let resolution = tokio::select! {
            biased;
            _ = token.cancelled() => return TransferResult::Cancelled,
            resolution = destination.confirm(suggestion) => resolution,
        };
        let (plan, reservation) = match resolution {
            Ok(Resolution::Planned { plan, reservation }) => (plan, reservation),
            Ok(Resolution::Cancelled) => return TransferResult::Cancelled,
            Err(e) => {
                tracing::warn!(request_id = id.0, error = %e, "destination rejected");
                return TransferResult::failed(e.failure_kind(), e.to_string());
            }
        };

        // Stage 3: transfer
        self.set_stage(id, Stage::Transferring).await;
        tracing::info!(
            request_id = id.0,
            path = %plan.output_path().display(),
            directive = plan.directive().describe(),
            "starting transfer"
        );
        let result = self
            .stages
            .transfer
            .execute(id, request.url(), &plan, &token)
            .await;

        drop(reservation);
        result
    }

    /// Remove the registry entry and emit the terminal event
    async fn finish(&self, id: RequestId, result: &TransferResult) {
        self.requests.active.lock().await.remove(&id);

        match result {
            TransferResult::Success { path, title } => {
                tracing::info!(request_id = id.0, path = %path.display(), "request completed");
                self.emit_event(Event::Completed {
                    id,
                    path: path.clone(),
                    title: title.clone(),
                });
            }
            TransferResult::Cancelled => {
                tracing::info!(request_id = id.0, "request cancelled");
                self.emit_event(Event::Cancelled { id });
            }
            TransferResult::Failed { kind, diagnostic } => {
                tracing::warn!(
                    request_id = id.0,
                    kind = %kind,
                    error = %diagnostic,
                    "request failed"
                );
                self.emit_event(Event::Failed {
                    id,
                    kind: *kind,
                    error: diagnostic.clone(),
                });
            }
        }
    }
}
