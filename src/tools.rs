//! Location of the external binaries
//!
//! Paths are resolved exactly once, when the orchestrator starts, and shared
//! read-only by every request afterwards.

use std::path::{Path, PathBuf};

use crate::config::{InstallLayout, ToolsConfig};

/// Base name of the fetch tool binary
pub const FETCHER_NAME: &str = "yt-dlp";
/// Base name of the transcoder binary
pub const TRANSCODER_NAME: &str = "ffmpeg";

/// Resolved paths of the fetch tool and the transcoder
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolPaths {
    /// Fetch tool (metadata dump and download)
    pub fetcher: PathBuf,
    /// Transcoder handed to the fetch tool via `--ffmpeg-location`
    pub transcoder: PathBuf,
}

impl ToolPaths {
    /// Create with explicit paths
    pub fn new(fetcher: impl Into<PathBuf>, transcoder: impl Into<PathBuf>) -> Self {
        Self {
            fetcher: fetcher.into(),
            transcoder: transcoder.into(),
        }
    }

    /// Resolve both binaries from configuration
    ///
    /// For each binary, in order:
    /// 1. the explicit path from config
    /// 2. `<bin dir>/<name>` when that file exists (bin dir from `bin_dir` or the layout)
    /// 3. a PATH lookup via `which`, when `search_path` is enabled
    /// 4. the bundled candidate from step 2, even though it does not exist
    ///
    /// Resolution never fails: a missing binary surfaces later as a
    /// spawn failure of the request that needs it.
    pub fn resolve(config: &ToolsConfig) -> Self {
        let bin_dir = config
            .bin_dir
            .clone()
            .unwrap_or_else(|| layout_bin_dir(config.layout));

        let fetcher = resolve_one(
            FETCHER_NAME,
            config.fetcher_path.as_deref(),
            &bin_dir,
            config.search_path,
        );
        let transcoder = resolve_one(
            TRANSCODER_NAME,
            config.transcoder_path.as_deref(),
            &bin_dir,
            config.search_path,
        );

        Self {
            fetcher,
            transcoder,
        }
    }

    /// Whether both resolved paths point at existing files
    pub fn all_present(&self) -> bool {
        self.fetcher.is_file() && self.transcoder.is_file()
    }
}

/// Platform file name of a binary (adds `.exe` on Windows)
pub fn executable_name(name: &str) -> String {
    format!("{}{}", name, std::env::consts::EXE_SUFFIX)
}

/// Directory that holds bundled binaries for a layout
pub fn layout_bin_dir(layout: InstallLayout) -> PathBuf {
    match layout {
        InstallLayout::Development => std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join("bin"),
        InstallLayout::Packaged => std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(Path::to_path_buf))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("resources")
            .join("bin"),
    }
}

fn resolve_one(name: &str, explicit: Option<&Path>, bin_dir: &Path, search_path: bool) -> PathBuf {
    if let Some(path) = explicit {
        tracing::debug!(tool = name, path = %path.display(), "using configured tool path");
        return path.to_path_buf();
    }

    let bundled = bin_dir.join(executable_name(name));
    if bundled.is_file() {
        tracing::debug!(tool = name, path = %bundled.display(), "using bundled tool");
        return bundled;
    }

    if search_path && let Ok(found) = which::which(name) {
        tracing::debug!(tool = name, path = %found.display(), "found tool in PATH");
        return found;
    }

    tracing::warn!(
        tool = name,
        path = %bundled.display(),
        "tool not found; requests will fail to spawn it"
    );
    bundled
}
