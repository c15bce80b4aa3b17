//! # media-dl
//!
//! Download-and-transcode orchestration core for media front ends.
//!
//! A URL plus an output kind (mp3 audio or mp4 video) goes in; a locally
//! transcoded file comes out. Fetching and muxing are delegated to two
//! external binaries, a yt-dlp compatible fetch tool and ffmpeg. This crate
//! assembles their arguments, streams their output as events, verifies the
//! result, and cancels whole process trees on request.
//!
//! Each request runs three stages in order:
//! - [`metadata`] - dump and parse the item's metadata
//! - [`destination`] - name the output file, ask the save-location prompt, claim the path
//! - [`transfer`] - download and post-process, then verify the output file
//!
//! ## Quick Start
//!
//! ```no_run
//! use media_dl::{Config, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let orchestrator = Orchestrator::new(Config::default()).await?;
//!
//!     // Subscribe to events
//!     let mut events = orchestrator.subscribe();
//!     tokio::spawn(async move {
//!         while let Ok(event) = events.recv().await {
//!             println!("Event: {:?}", event);
//!         }
//!     });
//!
//!     let response = orchestrator
//!         .download_media("https://example.com/watch?id=abc", "mp3")
//!         .await;
//!     println!("{}", serde_json::to_string(&response)?);
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Configuration types
pub mod config;
/// Destination naming, save prompt, and path reservations
pub mod destination;
/// Error types
pub mod error;
/// Metadata resolution
pub mod metadata;
/// Request orchestration (decomposed into focused submodules)
pub mod orchestrator;
pub(crate) mod process;
/// External tool discovery
pub mod tools;
/// Transfer execution
pub mod transfer;
/// Core types and events
pub mod types;

// unwrap/expect are acceptable in tests for concise failure-on-error assertions
#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
pub(crate) mod test_helpers;

// Re-export commonly used types
pub use config::{Config, FileCollisionAction, InstallLayout};
pub use destination::{
    AcceptSuggested, CancelPrompt, PathRegistry, PathReservation, SaveDialogRequest,
    SaveLocationPrompt,
};
pub use error::{DestinationError, Error, FetchError, Result};
pub use orchestrator::{Orchestrator, RequestHandle};
pub use tools::ToolPaths;
pub use types::{
    ActiveRequest, DownloadRequest, DownloadResponse, Event, FailureKind, MediaMetadata,
    OutputKind, OutputStream, RequestId, Stage, TransferPlan, TransferResult,
};

/// Helper function to run the orchestrator with graceful signal handling.
///
/// Waits for a termination signal and then calls the orchestrator's `shutdown()` method,
/// which cancels every in-flight request and kills its tools.
///
/// - **Unix:** listens for SIGTERM and SIGINT, falling back to Ctrl+C if registration fails.
/// - **Windows/other:** listens for Ctrl+C via `tokio::signal::ctrl_c()`.
///
/// # Example
///
/// ```no_run
/// use media_dl::{Config, Orchestrator, run_with_shutdown};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let orchestrator = Orchestrator::new(Config::default()).await?;
///
///     let worker = orchestrator.clone();
///     tokio::spawn(async move {
///         worker.download_media("https://example.com/watch?id=abc", "mp4").await
///     });
///
///     run_with_shutdown(orchestrator).await?;
///     Ok(())
/// }
/// ```
pub async fn run_with_shutdown(orchestrator: Orchestrator) -> Result<()> {
    wait_for_signal().await;
    orchestrator.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    // Registration can fail in restricted environments
    match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(mut sigterm), Ok(mut sigint)) => {
            tokio::select! {
                _ = sigterm.recv() => tracing::info!("Received SIGTERM signal"),
                _ = sigint.recv() => tracing::info!("Received SIGINT signal (Ctrl+C)"),
            }
        }
        (Err(e), Ok(mut sigint)) => {
            tracing::warn!(
                error = %e,
                "Could not register SIGTERM handler, waiting for SIGINT only"
            );
            sigint.recv().await;
            tracing::info!("Received SIGINT signal (Ctrl+C)");
        }
        (Ok(mut sigterm), Err(e)) => {
            tracing::warn!(
                error = %e,
                "Could not register SIGINT handler, waiting for SIGTERM only"
            );
            sigterm.recv().await;
            tracing::info!("Received SIGTERM signal");
        }
        (Err(e), Err(_)) => {
            tracing::error!(
                error = %e,
                "Could not register any signal handlers, using ctrl_c fallback"
            );
            tokio::signal::ctrl_c().await.ok();
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Received Ctrl+C signal"),
        Err(e) => tracing::error!(error = %e, "Failed to listen for Ctrl+C signal"),
    }
}
