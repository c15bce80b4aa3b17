//! Core types for media-dl

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Unique identifier for one orchestration request
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub u64);

impl RequestId {
    /// Create a new RequestId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner u64 value
    pub fn get(&self) -> u64 {
        self.0
    }
}

impl From<u64> for RequestId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<RequestId> for u64 {
    fn from(id: RequestId) -> Self {
        id.0
    }
}

impl std::fmt::Display for RequestId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for RequestId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Requested output kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    /// Best audio, encoded to mp3
    Audio,
    /// Best mp4-compatible video+audio
    Video,
}

impl OutputKind {
    /// File extension of the produced file
    pub fn extension(&self) -> &'static str {
        match self {
            OutputKind::Audio => "mp3",
            OutputKind::Video => "mp4",
        }
    }

    /// Label shown next to the extension filter in a save dialog
    pub fn filter_label(&self) -> &'static str {
        match self {
            OutputKind::Audio => "Audio Files",
            OutputKind::Video => "Video Files",
        }
    }
}

impl std::fmt::Display for OutputKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.extension())
    }
}

impl std::str::FromStr for OutputKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mp3" => Ok(OutputKind::Audio),
            "mp4" => Ok(OutputKind::Video),
            _ => Err(Error::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Input to one orchestration run
///
/// Construct through [`DownloadRequest::new`], which rejects anything that does
/// not look like an absolute URL. The request is immutable afterwards, and
/// deserializing goes through the same validation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RequestParts")]
pub struct DownloadRequest {
    url: String,
    kind: OutputKind,
    target_dir: PathBuf,
}

impl DownloadRequest {
    /// Validate and build a request
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUrl`] when `url` is blank or is not an absolute
    /// URL with a host.
    pub fn new(
        url: impl Into<String>,
        kind: OutputKind,
        target_dir: impl Into<PathBuf>,
    ) -> Result<Self> {
        let url = url.into().trim().to_string();
        if url.is_empty() {
            return Err(Error::InvalidUrl("URL is empty".to_string()));
        }

        let parsed =
            url::Url::parse(&url).map_err(|e| Error::InvalidUrl(format!("{url}: {e}")))?;
        if parsed.host_str().is_none() {
            return Err(Error::InvalidUrl(format!("{url}: missing host")));
        }

        Ok(Self {
            url,
            kind,
            target_dir: target_dir.into(),
        })
    }

    /// Source URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Requested output kind
    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    /// Directory the output file is placed in (before prompt overrides)
    pub fn target_dir(&self) -> &Path {
        &self.target_dir
    }
}

#[derive(Deserialize)]
struct RequestParts {
    url: String,
    kind: OutputKind,
    target_dir: PathBuf,
}

impl TryFrom<RequestParts> for DownloadRequest {
    type Error = Error;

    fn try_from(parts: RequestParts) -> Result<Self> {
        DownloadRequest::new(parts.url, parts.kind, parts.target_dir)
    }
}

/// One stream as reported by the fetch tool
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct StreamDescriptor {
    /// Tool-specific format identifier (e.g. "137")
    #[serde(default)]
    pub format_id: String,
    /// Container extension (e.g. "mp4", "webm", "m4a")
    #[serde(default)]
    pub ext: Option<String>,
    /// Video codec, "none" for audio-only streams
    #[serde(default)]
    pub vcodec: Option<String>,
    /// Audio codec, "none" for video-only streams
    #[serde(default)]
    pub acodec: Option<String>,
    /// Frame height in pixels
    #[serde(default)]
    pub height: Option<u32>,
    /// Average audio bitrate in kbit/s
    #[serde(default)]
    pub abr: Option<f64>,
    /// Average total bitrate in kbit/s
    #[serde(default)]
    pub tbr: Option<f64>,
    /// Free-form quality note (e.g. "1080p")
    #[serde(default)]
    pub format_note: Option<String>,
}

impl StreamDescriptor {
    /// Whether the stream carries video
    pub fn has_video(&self) -> bool {
        codec_present(self.vcodec.as_deref())
    }

    /// Whether the stream carries audio
    pub fn has_audio(&self) -> bool {
        codec_present(self.acodec.as_deref())
    }
}

fn codec_present(codec: Option<&str>) -> bool {
    matches!(codec, Some(c) if !c.is_empty() && c != "none")
}

/// Metadata of a single media item, as dumped by the fetch tool
///
/// The schema is strict about `title` and lenient about everything else:
/// fields the tool does not report fall back to their defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    /// Human-readable title (unsanitized)
    pub title: String,
    /// Canonical id of the item on its site
    #[serde(default)]
    pub id: String,
    /// Available streams, in the order the tool reported them
    #[serde(default)]
    pub formats: Vec<StreamDescriptor>,
    /// Duration in seconds
    #[serde(default)]
    pub duration: Option<f64>,
    /// Uploader / channel name
    #[serde(default)]
    pub uploader: Option<String>,
    /// Canonical page URL
    #[serde(default)]
    pub webpage_url: Option<String>,
    /// Extractor that handled the URL
    #[serde(default, rename = "extractor_key")]
    pub extractor: Option<String>,
}

/// Format expression used for video: best mp4 video with m4a audio, then the
/// best single mp4 file, then anything.
pub const MP4_FORMAT_EXPRESSION: &str =
    "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";

/// Post-processing applied by the fetch tool (via the transcoder)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PostProcessDirective {
    /// Extract best audio, encode mp3
    ExtractAudioMp3,
    /// Select best video+audio streams bounded to mp4-compatible codecs,
    /// falling back to best overall if no mp4-compatible pair exists
    RemuxMp4,
}

impl PostProcessDirective {
    /// Human-readable description of the directive
    pub fn describe(&self) -> &'static str {
        match self {
            PostProcessDirective::ExtractAudioMp3 => "extract best audio, encode mp3",
            PostProcessDirective::RemuxMp4 => {
                "select best video+audio streams bounded to mp4-compatible codecs, \
                 falling back to best overall if no mp4-compatible pair exists"
            }
        }
    }
}

/// Everything the transfer stage needs, derived from metadata and request
///
/// Format selection and directive are derived from `kind` in
/// [`TransferPlan::new`], so exactly one output-kind branch is ever active.
/// Deserialized plans are rebuilt through `new` as well.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "PlanParts")]
pub struct TransferPlan {
    output_path: PathBuf,
    title: String,
    kind: OutputKind,
    format_selection: Option<String>,
    directive: PostProcessDirective,
    replace_existing: bool,
}

#[derive(Deserialize)]
struct PlanParts {
    output_path: PathBuf,
    title: String,
    kind: OutputKind,
    #[serde(default)]
    replace_existing: bool,
}

impl From<PlanParts> for TransferPlan {
    fn from(parts: PlanParts) -> Self {
        let plan = TransferPlan::new(parts.output_path, parts.title, parts.kind);
        if parts.replace_existing {
            plan.replacing_existing()
        } else {
            plan
        }
    }
}

impl TransferPlan {
    /// Build the plan for `kind`
    pub fn new(output_path: PathBuf, title: String, kind: OutputKind) -> Self {
        let (format_selection, directive) = match kind {
            OutputKind::Audio => (None, PostProcessDirective::ExtractAudioMp3),
            OutputKind::Video => (
                Some(MP4_FORMAT_EXPRESSION.to_string()),
                PostProcessDirective::RemuxMp4,
            ),
        };

        Self {
            output_path,
            title,
            kind,
            format_selection,
            directive,
            replace_existing: false,
        }
    }

    /// Mark the plan as replacing a file already at the output path
    ///
    /// The fetch tool skips downloads whose output already exists, so the
    /// transfer stage removes that file right before spawning the tool.
    #[must_use]
    pub fn replacing_existing(mut self) -> Self {
        self.replace_existing = true;
        self
    }

    /// Whether an existing file at the output path is removed before transfer
    pub fn replaces_existing(&self) -> bool {
        self.replace_existing
    }

    /// Resolved output path
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Sanitized title used for the file name
    pub fn title(&self) -> &str {
        &self.title
    }

    /// Output kind this plan was built for
    pub fn kind(&self) -> OutputKind {
        self.kind
    }

    /// Explicit `-f` expression, `None` when the tool's own audio pick is used
    pub fn format_selection(&self) -> Option<&str> {
        self.format_selection.as_deref()
    }

    /// Post-processing directive
    pub fn directive(&self) -> PostProcessDirective {
        self.directive
    }

    /// Output-kind specific fetch tool flags
    pub fn fetch_args(&self) -> Vec<String> {
        match (self.directive, &self.format_selection) {
            (PostProcessDirective::ExtractAudioMp3, _) => vec![
                "--extract-audio".to_string(),
                "--audio-format".to_string(),
                "mp3".to_string(),
            ],
            (PostProcessDirective::RemuxMp4, Some(expr)) => vec!["-f".to_string(), expr.clone()],
            (PostProcessDirective::RemuxMp4, None) => {
                vec!["-f".to_string(), MP4_FORMAT_EXPRESSION.to_string()]
            }
        }
    }
}

/// Failure taxonomy surfaced to callers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The external binary could not be started
    ProcessSpawnFailed,
    /// The external binary exited nonzero
    ToolReportedError,
    /// The metadata dump was unusable
    MalformedMetadata,
    /// The URL resolved to more than one item
    AmbiguousSource,
    /// The destination directory is missing or not writable
    InvalidTargetDirectory,
    /// The output path exists or is claimed by another in-flight request
    DestinationConflict,
    /// The tool reported success but the output file is missing or empty
    PostconditionViolated,
    /// The request task panicked or was aborted
    Internal,
}

impl FailureKind {
    /// Stable machine-readable code
    pub fn error_code(&self) -> &'static str {
        match self {
            FailureKind::ProcessSpawnFailed => "process_spawn_failed",
            FailureKind::ToolReportedError => "tool_reported_error",
            FailureKind::MalformedMetadata => "malformed_metadata",
            FailureKind::AmbiguousSource => "ambiguous_source",
            FailureKind::InvalidTargetDirectory => "invalid_target_directory",
            FailureKind::DestinationConflict => "destination_conflict",
            FailureKind::PostconditionViolated => "postcondition_violated",
            FailureKind::Internal => "internal_error",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.error_code())
    }
}

/// Terminal outcome of one request
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TransferResult {
    /// Output file exists and is non-empty
    Success {
        /// Final output path
        path: PathBuf,
        /// Sanitized title
        title: String,
    },
    /// Aborted by the user (destination prompt or explicit cancel)
    Cancelled,
    /// Failed at some pipeline stage
    Failed {
        /// Failure classification
        kind: FailureKind,
        /// Verbatim diagnostic (tool stderr where available)
        diagnostic: String,
    },
}

impl TransferResult {
    /// Shorthand for a failure
    pub fn failed(kind: FailureKind, diagnostic: impl Into<String>) -> Self {
        TransferResult::Failed {
            kind,
            diagnostic: diagnostic.into(),
        }
    }

    /// Whether this is a success
    pub fn is_success(&self) -> bool {
        matches!(self, TransferResult::Success { .. })
    }

    /// Failure kind, if failed
    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            TransferResult::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

/// Caller-facing response shape that any front end binds to
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadResponse {
    /// True only when a verified output file exists at `path`
    pub ok: bool,
    /// Human-readable summary
    pub message: String,
    /// Sanitized title (success only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Output path (success only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Diagnostic (failures other than user cancellation)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadResponse {
    /// Message used when the user aborted
    pub const CANCELLED: &'static str = "Cancelled";
    /// Message used on success
    pub const COMPLETE: &'static str = "Download Complete!";
    /// Message used on failure
    pub const FAILED: &'static str = "Failed to download";

    /// Failure response for errors raised before a request could run
    pub fn rejected(error: &Error) -> Self {
        Self {
            ok: false,
            message: Self::FAILED.to_string(),
            title: None,
            path: None,
            error: Some(error.to_string()),
        }
    }
}

impl From<TransferResult> for DownloadResponse {
    fn from(result: TransferResult) -> Self {
        match result {
            TransferResult::Success { path, title } => Self {
                ok: true,
                message: Self::COMPLETE.to_string(),
                title: Some(title),
                path: Some(path),
                error: None,
            },
            TransferResult::Cancelled => Self {
                ok: false,
                message: Self::CANCELLED.to_string(),
                title: None,
                path: None,
                error: None,
            },
            TransferResult::Failed { kind, diagnostic } => Self {
                ok: false,
                message: Self::FAILED.to_string(),
                title: None,
                path: None,
                error: Some(format!("{}: {}", kind.error_code(), diagnostic)),
            },
        }
    }
}

/// Output stream a progress line came from
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

/// Pipeline stage of an in-flight request
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Submitted, task not started yet
    Queued,
    /// Fetch tool dumping metadata
    ResolvingMetadata,
    /// Naming the output file / waiting on the save prompt
    ResolvingDestination,
    /// Fetch tool downloading and transcoding
    Transferring,
}

/// Snapshot of an in-flight request
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ActiveRequest {
    /// Request ID
    pub id: RequestId,
    /// Source URL
    pub url: String,
    /// Requested output kind
    pub kind: OutputKind,
    /// Current pipeline stage
    pub stage: Stage,
    /// When the request was submitted
    pub started_at: DateTime<Utc>,
}

/// Event emitted during the request lifecycle
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// Request accepted
    Submitted {
        /// Request ID
        id: RequestId,
        /// Source URL
        url: String,
        /// Requested output kind
        kind: OutputKind,
    },

    /// Metadata dump parsed
    MetadataResolved {
        /// Request ID
        id: RequestId,
        /// Title as reported by the tool
        title: String,
    },

    /// Waiting for the save-location prompt
    AwaitingDestination {
        /// Request ID
        id: RequestId,
        /// Suggested output path
        suggested: PathBuf,
    },

    /// Download-mode fetch tool spawned
    TransferStarted {
        /// Request ID
        id: RequestId,
        /// Output path
        path: PathBuf,
    },

    /// Raw output line from the fetch tool (progress is not parsed)
    Output {
        /// Request ID
        id: RequestId,
        /// Which stream the line came from
        stream: OutputStream,
        /// The line, without trailing newline
        line: String,
    },

    /// Request finished with a verified output file
    Completed {
        /// Request ID
        id: RequestId,
        /// Output path
        path: PathBuf,
        /// Sanitized title
        title: String,
    },

    /// Request failed
    Failed {
        /// Request ID
        id: RequestId,
        /// Failure classification
        kind: FailureKind,
        /// Diagnostic text
        error: String,
    },

    /// Request cancelled
    Cancelled {
        /// Request ID
        id: RequestId,
    },

    /// Orchestrator shut down
    Shutdown,
}
