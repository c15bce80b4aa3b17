//! Configuration types for media-dl

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

/// Environment variable that selects the development tool layout
pub const ENV_VAR: &str = "MEDIA_DL_ENV";

/// Upper bound for `max_name_bytes`, leaving room for ".mp3"/".mp4" and a
/// " (9999)" rename suffix within a 255-byte file name.
const MAX_NAME_BYTES_LIMIT: usize = 240;

/// Download behavior configuration (directories, naming, collisions)
///
/// Used as a nested sub-config within [`Config`].
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Default target directory (default: the user's Downloads folder, else "./downloads")
    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,

    /// What to do when the output file already exists on disk
    #[serde(default)]
    pub file_collision: FileCollisionAction,

    /// Maximum length in bytes of the sanitized file stem (default: 200)
    #[serde(default = "default_max_name_bytes")]
    pub max_name_bytes: usize,

    /// How long the metadata dump may take (default: 120 seconds)
    #[serde(default = "default_metadata_timeout", with = "duration_serde")]
    pub metadata_timeout: Duration,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            download_dir: default_download_dir(),
            file_collision: FileCollisionAction::default(),
            max_name_bytes: default_max_name_bytes(),
            metadata_timeout: default_metadata_timeout(),
        }
    }
}

/// Where the bundled fetch tool and transcoder live
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallLayout {
    /// `bin/` under the current working directory
    Development,
    /// `resources/bin/` next to the running executable
    Packaged,
}

impl InstallLayout {
    /// Layout selected by the `MEDIA_DL_ENV` environment variable
    ///
    /// `development` (any case) selects [`InstallLayout::Development`];
    /// anything else, including unset, selects [`InstallLayout::Packaged`].
    pub fn from_env() -> Self {
        match std::env::var(ENV_VAR) {
            Ok(value) if value.eq_ignore_ascii_case("development") => InstallLayout::Development,
            _ => InstallLayout::Packaged,
        }
    }
}

impl Default for InstallLayout {
    fn default() -> Self {
        Self::from_env()
    }
}

/// External tool paths (fetch tool, transcoder)
///
/// Used as a nested sub-config within [`Config`]. Resolved once into
/// [`ToolPaths`](crate::tools::ToolPaths) when the orchestrator starts.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Path to the fetch tool (yt-dlp); bundled or PATH lookup if None
    #[serde(default)]
    pub fetcher_path: Option<PathBuf>,

    /// Path to the transcoder (ffmpeg); bundled or PATH lookup if None
    #[serde(default)]
    pub transcoder_path: Option<PathBuf>,

    /// Bundled layout (default: from `MEDIA_DL_ENV`)
    #[serde(default)]
    pub layout: InstallLayout,

    /// Overrides the directory implied by `layout`
    #[serde(default)]
    pub bin_dir: Option<PathBuf>,

    /// Whether to search PATH when a binary is not bundled (default: true)
    #[serde(default = "default_true")]
    pub search_path: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            fetcher_path: None,
            transcoder_path: None,
            layout: InstallLayout::default(),
            bin_dir: None,
            search_path: true,
        }
    }
}

/// Main configuration for the [`Orchestrator`](crate::Orchestrator)
///
/// Fields are organized into sub-configs:
/// - [`download`](DownloadConfig) - target directory, naming, collisions
/// - [`tools`](ToolsConfig) - external binary locations
///
/// Both are flattened for serialization, so the JSON form has no nesting.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// Download behavior settings
    #[serde(flatten)]
    pub download: DownloadConfig,

    /// External tool locations
    #[serde(flatten)]
    pub tools: ToolsConfig,
}

impl Config {
    /// Default target directory
    pub fn download_dir(&self) -> &PathBuf {
        &self.download.download_dir
    }

    /// Parse a JSON configuration document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Check value ranges that serde cannot express
    pub fn validate(&self) -> Result<()> {
        if self.download.max_name_bytes == 0 || self.download.max_name_bytes > MAX_NAME_BYTES_LIMIT
        {
            return Err(Error::Config {
                message: format!(
                    "max_name_bytes must be between 1 and {}, got {}",
                    MAX_NAME_BYTES_LIMIT, self.download.max_name_bytes
                ),
                key: Some("max_name_bytes".to_string()),
            });
        }

        if self.download.metadata_timeout.is_zero() {
            return Err(Error::Config {
                message: "metadata_timeout must be at least one second".to_string(),
                key: Some("metadata_timeout".to_string()),
            });
        }

        Ok(())
    }
}

/// Existing-file handling at the destination
///
/// Only files already on disk are affected; two in-flight requests claiming
/// the same path always fail with a destination conflict.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileCollisionAction {
    /// Fail with a destination conflict (default)
    #[default]
    Fail,
    /// Overwrite the existing file
    Overwrite,
    /// Append (1), (2), etc. to the file name
    Rename,
}

// Default value functions
fn default_download_dir() -> PathBuf {
    directories::UserDirs::new()
        .and_then(|dirs| dirs.download_dir().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("downloads"))
}

fn default_max_name_bytes() -> usize {
    200
}

fn default_metadata_timeout() -> Duration {
    Duration::from_secs(120)
}

fn default_true() -> bool {
    true
}

// Duration serialization helper (whole seconds)
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}
