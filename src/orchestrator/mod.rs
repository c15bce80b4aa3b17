//! Request orchestration split into focused submodules.
//!
//! The `Orchestrator` struct and its methods are organized by domain:
//! - [`pipeline`] - Submission and the per-request stage pipeline
//! - [`control`] - Cancellation and in-flight request queries
//! - [`lifecycle`] - Shutdown coordination

mod control;
mod lifecycle;
mod pipeline;


pub use pipeline::RequestHandle;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64};
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::destination::{AcceptSuggested, DestinationResolver, PathRegistry, SaveLocationPrompt};
use crate::error::{Error, Result};
use crate::metadata::MetadataResolver;
use crate::tools::ToolPaths;
use crate::transfer::TransferExecutor;
use crate::types::{ActiveRequest, Event, RequestId};

/// Registry entry for one in-flight request
pub(crate) struct ActiveEntry {
    /// Cancels every stage of the request
    pub(crate) token: CancellationToken,
    /// Snapshot returned by `active_requests()`
    pub(crate) info: ActiveRequest,
}

/// In-flight request bookkeeping
#[derive(Clone)]
pub(crate) struct RequestState {
    /// Map of in-flight requests to their cancellation tokens and snapshots
    pub(crate) active: Arc<tokio::sync::Mutex<HashMap<RequestId, ActiveEntry>>>,
    /// Next request ID
    pub(crate) next_id: Arc<AtomicU64>,
    /// Flag to indicate whether new requests are accepted (set to false during shutdown)
    pub(crate) accepting_new: Arc<AtomicBool>,
}

/// The three pipeline stages, built once from config
#[derive(Clone)]
pub(crate) struct Stages {
    pub(crate) metadata: MetadataResolver,
    pub(crate) destination: Arc<DestinationResolver>,
    pub(crate) transfer: TransferExecutor,
}

/// Main orchestrator instance (cloneable - all fields are Arc-wrapped)
#[derive(Clone)]
pub struct Orchestrator {
    /// Event broadcast channel sender (multiple subscribers supported)
    pub(crate) event_tx: tokio::sync::broadcast::Sender<Event>,
    /// Configuration (immutable for the orchestrator's lifetime)
    pub(crate) config: Arc<Config>,
    /// Tool paths, resolved once at construction
    pub(crate) tools: Arc<ToolPaths>,
    /// Output paths claimed by in-flight requests
    pub(crate) paths: PathRegistry,
    /// Pipeline stages
    pub(crate) stages: Stages,
    /// In-flight request state
    pub(crate) requests: RequestState,
}

impl Orchestrator {
    /// Create an orchestrator that accepts every suggested output path
    ///
    /// Validates the configuration, resolves the tool paths, and creates the
    /// default download directory.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use media_dl::{Config, Orchestrator};
    ///
    /// # #[tokio::main]
    /// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
    /// let orchestrator = Orchestrator::new(Config::default()).await?;
    /// let response = orchestrator
    ///     .download_media("https://example.com/watch?id=abc", "mp3")
    ///     .await;
    /// println!("{}", response.message);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn new(config: Config) -> Result<Self> {
        Self::with_prompt(config, Arc::new(AcceptSuggested)).await
    }

    /// Create an orchestrator with a custom save-location prompt
    pub async fn with_prompt(config: Config, prompt: Arc<dyn SaveLocationPrompt>) -> Result<Self> {
        config.validate()?;

        tokio::fs::create_dir_all(&config.download.download_dir)
            .await
            .map_err(|e| {
                Error::Io(std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create download directory '{}': {}",
                        config.download.download_dir.display(),
                        e
                    ),
                ))
            })?;

        let tools = Arc::new(ToolPaths::resolve(&config.tools));
        tracing::info!(
            fetcher = %tools.fetcher.display(),
            transcoder = %tools.transcoder.display(),
            all_present = tools.all_present(),
            prompt = prompt.name(),
            "Orchestrator initialized"
        );

        // Buffer size of 1000 events, same for every subscriber
        let (event_tx, _rx) = tokio::sync::broadcast::channel(1000);

        let paths = PathRegistry::new();
        let stages = Stages {
            metadata: MetadataResolver::new(
                tools.fetcher.clone(),
                config.download.metadata_timeout,
            ),
            destination: Arc::new(DestinationResolver::new(
                prompt,
                paths.clone(),
                config.download.file_collision,
                config.download.max_name_bytes,
            )),
            transfer: TransferExecutor::new(Arc::clone(&tools), event_tx.clone()),
        };

        let requests = RequestState {
            active: Arc::new(tokio::sync::Mutex::new(HashMap::new())),
            next_id: Arc::new(AtomicU64::new(1)),
            accepting_new: Arc::new(AtomicBool::new(true)),
        };

        Ok(Self {
            event_tx,
            config: Arc::new(config),
            tools,
            paths,
            stages,
            requests,
        })
    }

    /// Subscribe to request events
    ///
    /// Multiple subscribers are supported. Each subscriber receives all events independently.
    /// If a subscriber falls behind by more than 1000 events it receives
    /// `RecvError::Lagged` and continues from the oldest retained event.
    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }

    /// Get the configuration
    pub fn config(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    /// Tool paths resolved at construction
    pub fn tool_paths(&self) -> &ToolPaths {
        &self.tools
    }

    /// Output paths currently claimed by in-flight requests
    pub fn reserved_paths(&self) -> usize {
        self.paths.len()
    }

    /// Emit an event to all subscribers
    ///
    /// If there are no active subscribers, the event is silently dropped.
    pub(crate) fn emit_event(&self, event: Event) {
        self.event_tx.send(event).ok();
    }
}
