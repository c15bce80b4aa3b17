//! Destination resolution: file naming, the save-location prompt, and
//! in-flight path reservations.

use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::FileCollisionAction;
use crate::error::DestinationError;
use crate::types::{MediaMetadata, OutputKind, TransferPlan};

/// Maximum number of rename attempts when resolving file collisions
const MAX_RENAME_ATTEMPTS: u32 = 9999;

/// How often a claim is retried when a concurrent request takes the candidate first
const CLAIM_ATTEMPTS: usize = 8;

/// Windows device names that cannot be used as a file stem
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Turn a media title into a filesystem-safe file stem
///
/// Removes path separators, characters Windows forbids (`< > : " | ? *`) and
/// non-whitespace control characters, collapses whitespace runs to one space,
/// drops trailing dots and spaces, and truncates to `max_bytes` on a character
/// boundary. Returns `None` when nothing usable is left, including for `.`,
/// `..` and reserved device names (checked again after truncation).
///
/// # Examples
///
/// ```
/// use media_dl::destination::sanitize_title;
///
/// assert_eq!(sanitize_title("My: Song?", 200).as_deref(), Some("My Song"));
/// assert_eq!(sanitize_title("../../etc/passwd", 200).as_deref(), Some("....etcpasswd"));
/// assert_eq!(sanitize_title("CON", 200), None);
/// ```
#[must_use]
pub fn sanitize_title(title: &str, max_bytes: usize) -> Option<String> {
    let stripped: String = title.chars().filter(|c| !is_forbidden(*c)).collect();
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    let name = collapsed.trim_end_matches(['.', ' ']);

    if name.is_empty() || is_reserved(name) {
        return None;
    }

    let truncated = truncate_to_bytes(name, max_bytes).trim_end_matches(['.', ' ']);
    if truncated.is_empty() || is_reserved(truncated) {
        None
    } else {
        Some(truncated.to_string())
    }
}

fn is_forbidden(c: char) -> bool {
    matches!(c, '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*')
        || (c.is_control() && !c.is_whitespace())
}

fn is_reserved(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name).trim_end();
    RESERVED_NAMES
        .iter()
        .any(|reserved| stem.eq_ignore_ascii_case(reserved))
}

fn truncate_to_bytes(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let end = s
        .char_indices()
        .map(|(i, c)| i + c.len_utf8())
        .take_while(|&end| end <= max_bytes)
        .last()
        .unwrap_or(0);
    &s[..end]
}

/// What the save-location prompt is asked to confirm
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SaveDialogRequest {
    /// Suggested output path (`<target dir>/<sanitized title>.<ext>`)
    pub suggested: PathBuf,
    /// Sanitized title
    pub title: String,
    /// Requested output kind
    pub kind: OutputKind,
}

impl SaveDialogRequest {
    /// Dialog window title, e.g. "Save MP3"
    pub fn dialog_title(&self) -> String {
        format!("Save {}", self.kind.extension().to_uppercase())
    }

    /// Extension filter label, e.g. "Audio Files"
    pub fn filter_label(&self) -> &'static str {
        self.kind.filter_label()
    }

    /// Extension filter, e.g. "mp3"
    pub fn extension(&self) -> &'static str {
        self.kind.extension()
    }
}

/// Collaborator that lets the user confirm or override the output path
///
/// Front ends implement this with a native save dialog. Returning `None`
/// means the user cancelled, which ends the request as cancelled rather than
/// failed.
#[async_trait]
pub trait SaveLocationPrompt: Send + Sync {
    /// Confirm `request.suggested`, return a different path, or cancel
    async fn confirm(&self, request: &SaveDialogRequest) -> Option<PathBuf>;

    /// Name of this prompt implementation (for logging)
    fn name(&self) -> &'static str;
}

/// Accepts every suggested path unchanged (headless use)
#[derive(Clone, Copy, Debug, Default)]
pub struct AcceptSuggested;

#[async_trait]
impl SaveLocationPrompt for AcceptSuggested {
    async fn confirm(&self, request: &SaveDialogRequest) -> Option<PathBuf> {
        Some(request.suggested.clone())
    }

    fn name(&self) -> &'static str {
        "accept-suggested"
    }
}

/// Cancels every prompt
#[derive(Clone, Copy, Debug, Default)]
pub struct CancelPrompt;

#[async_trait]
impl SaveLocationPrompt for CancelPrompt {
    async fn confirm(&self, _request: &SaveDialogRequest) -> Option<PathBuf> {
        None
    }

    fn name(&self) -> &'static str {
        "cancel"
    }
}

/// Output paths claimed by in-flight requests
///
/// Shared by every request of one orchestrator. A path stays claimed until
/// the [`PathReservation`] returned for it is dropped.
#[derive(Clone, Debug, Default)]
pub struct PathRegistry {
    claimed: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PathRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `path` is currently claimed
    pub fn is_reserved(&self, path: &Path) -> bool {
        lock(&self.claimed).contains(path)
    }

    /// Number of claimed paths
    pub fn len(&self) -> usize {
        lock(&self.claimed).len()
    }

    /// Whether no path is claimed
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Claim on an output path, released on drop
#[derive(Debug)]
pub struct PathReservation {
    path: PathBuf,
    claimed: Arc<Mutex<HashSet<PathBuf>>>,
}

impl PathReservation {
    /// The claimed path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PathReservation {
    fn drop(&mut self) {
        lock(&self.claimed).remove(&self.path);
        tracing::debug!(path = %self.path.display(), "released output path");
    }
}

// A panic while holding the lock cannot leave the set half-updated
fn lock(set: &Mutex<HashSet<PathBuf>>) -> MutexGuard<'_, HashSet<PathBuf>> {
    set.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Outcome of destination resolution
#[derive(Debug)]
pub enum Resolution {
    /// A plan with its output path claimed
    Planned {
        /// The transfer plan
        plan: TransferPlan,
        /// Claim on `plan.output_path()`, hold until the transfer ends
        reservation: PathReservation,
    },
    /// The user cancelled the save prompt
    Cancelled,
}

/// Derives output paths from metadata and claims them
pub struct DestinationResolver {
    prompt: Arc<dyn SaveLocationPrompt>,
    registry: PathRegistry,
    collision: FileCollisionAction,
    max_name_bytes: usize,
}

impl DestinationResolver {
    /// Create a resolver
    pub fn new(
        prompt: Arc<dyn SaveLocationPrompt>,
        registry: PathRegistry,
        collision: FileCollisionAction,
        max_name_bytes: usize,
    ) -> Self {
        Self {
            prompt,
            registry,
            collision,
            max_name_bytes,
        }
    }

    /// Name the output and validate the target directory, without prompting
    pub async fn suggest(
        &self,
        metadata: &MediaMetadata,
        kind: OutputKind,
        target_dir: &Path,
    ) -> Result<SaveDialogRequest, DestinationError> {
        let title = sanitize_title(&metadata.title, self.max_name_bytes)
            .or_else(|| sanitize_title(&metadata.id, self.max_name_bytes))
            .ok_or_else(|| DestinationError::UnnamedMedia {
                title: metadata.title.clone(),
            })?;

        ensure_writable_dir(target_dir).await?;

        Ok(SaveDialogRequest {
            suggested: target_dir.join(format!("{}.{}", title, kind.extension())),
            title,
            kind,
        })
    }

    /// Run the prompt on a suggestion, then apply collision policy and claim the path
    pub async fn confirm(
        &self,
        request: SaveDialogRequest,
    ) -> Result<Resolution, DestinationError> {
        let Some(chosen) = self.prompt.confirm(&request).await else {
            tracing::info!(prompt = self.prompt.name(), "save location prompt cancelled");
            return Ok(Resolution::Cancelled);
        };

        let chosen = with_extension(chosen, request.kind.extension());
        let path = normalize(&chosen).await?;
        let reservation = self.claim(&path).await?;

        tracing::debug!(path = %reservation.path().display(), "claimed output path");

        let plan =
            TransferPlan::new(reservation.path().to_path_buf(), request.title, request.kind);
        let plan = match self.collision {
            FileCollisionAction::Overwrite => plan.replacing_existing(),
            FileCollisionAction::Fail | FileCollisionAction::Rename => plan,
        };
        Ok(Resolution::Planned { plan, reservation })
    }

    /// Suggest, prompt, and claim in one step
    pub async fn resolve(
        &self,
        metadata: &MediaMetadata,
        kind: OutputKind,
        target_dir: &Path,
    ) -> Result<Resolution, DestinationError> {
        let request = self.suggest(metadata, kind, target_dir).await?;
        self.confirm(request).await
    }

    /// Apply the collision policy to `path` and reserve the result
    ///
    /// Filesystem checks run on the blocking pool without the registry lock;
    /// the registry is re-checked before the candidate is inserted.
    async fn claim(&self, path: &Path) -> Result<PathReservation, DestinationError> {
        for _ in 0..CLAIM_ATTEMPTS {
            let in_flight = {
                let claimed = lock(&self.registry.claimed);
                if claimed.contains(path) {
                    return Err(in_flight_conflict(path));
                }
                claimed.clone()
            };

            let owned = path.to_path_buf();
            let action = self.collision;
            let candidate = tokio::task::spawn_blocking(move || {
                apply_collision_action(&owned, action, &in_flight)
            })
            .await
            .map_err(|e| DestinationError::DestinationConflict {
                path: path.to_path_buf(),
                reason: format!("collision check failed: {}", e),
            })??;

            let mut claimed = lock(&self.registry.claimed);
            if claimed.contains(path) {
                return Err(in_flight_conflict(path));
            }
            if claimed.contains(&candidate) {
                tracing::debug!(
                    path = %candidate.display(),
                    "candidate claimed concurrently, retrying"
                );
                continue;
            }
            claimed.insert(candidate.clone());
            return Ok(PathReservation {
                path: candidate,
                claimed: Arc::clone(&self.registry.claimed),
            });
        }

        Err(DestinationError::DestinationConflict {
            path: path.to_path_buf(),
            reason: "every candidate name was claimed by concurrent requests".to_string(),
        })
    }
}

fn in_flight_conflict(path: &Path) -> DestinationError {
    DestinationError::DestinationConflict {
        path: path.to_path_buf(),
        reason: "path is the target of another in-flight request".to_string(),
    }
}

/// Apply the existing-file policy to `path`
///
/// For [`FileCollisionAction::Rename`], names claimed in `in_flight` are
/// skipped along with names that exist on disk.
fn apply_collision_action(
    path: &Path,
    action: FileCollisionAction,
    in_flight: &HashSet<PathBuf>,
) -> Result<PathBuf, DestinationError> {
    match action {
        FileCollisionAction::Overwrite => Ok(path.to_path_buf()),
        FileCollisionAction::Fail => {
            if path.exists() {
                return Err(DestinationError::DestinationConflict {
                    path: path.to_path_buf(),
                    reason: "file already exists".to_string(),
                });
            }
            Ok(path.to_path_buf())
        }
        FileCollisionAction::Rename => {
            if !path.exists() {
                return Ok(path.to_path_buf());
            }

            let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(|| {
                DestinationError::DestinationConflict {
                    path: path.to_path_buf(),
                    reason: "cannot extract file stem".to_string(),
                }
            })?;
            let extension = path.extension().and_then(|e| e.to_str());
            let parent = path.parent().unwrap_or_else(|| Path::new("."));

            for i in 1..=MAX_RENAME_ATTEMPTS {
                let new_name = match extension {
                    Some(ext) => format!("{} ({}).{}", stem, i, ext),
                    None => format!("{} ({})", stem, i),
                };
                let candidate = parent.join(new_name);
                if !candidate.exists() && !in_flight.contains(&candidate) {
                    return Ok(candidate);
                }
            }

            Err(DestinationError::DestinationConflict {
                path: path.to_path_buf(),
                reason: format!(
                    "could not find unique filename after {} attempts",
                    MAX_RENAME_ATTEMPTS
                ),
            })
        }
    }
}

/// Append `.ext` unless the path already ends with it (case-insensitive)
fn with_extension(path: PathBuf, ext: &str) -> PathBuf {
    let has_ext = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext));
    if has_ext {
        return path;
    }
    let mut raw = path.into_os_string();
    raw.push(".");
    raw.push(ext);
    PathBuf::from(raw)
}

/// Validate the parent directory and make the path comparable across requests
async fn normalize(path: &Path) -> Result<PathBuf, DestinationError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| DestinationError::InvalidTargetDirectory {
            path: path.to_path_buf(),
            reason: "path has no file name".to_string(),
        })?;

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    ensure_writable_dir(parent).await?;

    let canonical = tokio::fs::canonicalize(parent).await.map_err(|e| {
        DestinationError::InvalidTargetDirectory {
            path: parent.to_path_buf(),
            reason: e.to_string(),
        }
    })?;
    Ok(canonical.join(file_name))
}

/// Fail unless `dir` is an existing, writable directory
pub async fn ensure_writable_dir(dir: &Path) -> Result<(), DestinationError> {
    let invalid = |reason: String| DestinationError::InvalidTargetDirectory {
        path: dir.to_path_buf(),
        reason,
    };

    let metadata = tokio::fs::metadata(dir)
        .await
        .map_err(|e| invalid(format!("cannot access directory: {}", e)))?;

    if !metadata.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }

    #[cfg(unix)]
    {
        use std::os::unix::ffi::OsStrExt;

        let c_path = std::ffi::CString::new(dir.as_os_str().as_bytes())
            .map_err(|_| invalid("path contains a NUL byte".to_string()))?;
        // SAFETY: c_path is a valid NUL-terminated string that outlives the call
        let rc = unsafe { libc::access(c_path.as_ptr(), libc::W_OK | libc::X_OK) };
        if rc != 0 {
            return Err(invalid(format!(
                "not writable: {}",
                std::io::Error::last_os_error()
            )));
        }
    }

    #[cfg(not(unix))]
    if metadata.permissions().readonly() {
        return Err(invalid("directory is read-only".to_string()));
    }

    Ok(())
}
