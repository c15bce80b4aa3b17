//! Event helpers and assertions for integration tests

use std::time::Duration;
use tokio::sync::broadcast::Receiver;
use tokio::sync::broadcast::error::RecvError;

use media_dl::{Event, FailureKind, RequestId, TransferResult};

/// Terminal outcome observed on the event stream
#[derive(Debug, PartialEq)]
pub enum WaitResult {
    /// `Completed` event
    Completed,
    /// `Failed` event with its kind
    Failed(FailureKind),
    /// `Cancelled` event
    Cancelled,
    /// Timeout waiting for a terminal event
    Timeout,
    /// Channel closed unexpectedly
    ChannelClosed,
}

/// Wait for the terminal event of request `id`
pub async fn wait_for_terminal(
    events: &mut Receiver<Event>,
    id: RequestId,
    timeout: Duration,
) -> WaitResult {
    let result = tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(Event::Completed { id: event_id, .. }) if event_id == id => {
                    return WaitResult::Completed;
                }
                Ok(Event::Failed { id: event_id, kind, .. }) if event_id == id => {
                    return WaitResult::Failed(kind);
                }
                Ok(Event::Cancelled { id: event_id }) if event_id == id => {
                    return WaitResult::Cancelled;
                }
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return WaitResult::ChannelClosed,
            }
        }
    })
    .await;

    result.unwrap_or(WaitResult::Timeout)
}

/// Wait for the first event matching `predicate`
pub async fn wait_for_event<F>(
    events: &mut Receiver<Event>,
    timeout: Duration,
    predicate: F,
) -> Option<Event>
where
    F: Fn(&Event) -> bool,
{
    tokio::time::timeout(timeout, async {
        loop {
            match events.recv().await {
                Ok(event) if predicate(&event) => return Some(event),
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => return None,
            }
        }
    })
    .await
    .ok()
    .flatten()
}

/// Drain every event already buffered
pub fn drain_events(events: &mut Receiver<Event>) -> Vec<Event> {
    let mut drained = Vec::new();
    while let Ok(event) = events.try_recv() {
        drained.push(event);
    }
    drained
}

/// Output lines of request `id`, in arrival order
pub fn output_lines(events: &[Event], id: RequestId) -> Vec<String> {
    events
        .iter()
        .filter_map(|event| match event {
            Event::Output { id: event_id, line, .. } if *event_id == id => Some(line.clone()),
            _ => None,
        })
        .collect()
}

/// Assert a result is a success and return its path
pub fn assert_success(result: &TransferResult) -> std::path::PathBuf {
    match result {
        TransferResult::Success { path, .. } => {
            assert!(path.is_file(), "reported output {} is missing", path.display());
            path.clone()
        }
        other => panic!("expected success, got {other:?}"),
    }
}
