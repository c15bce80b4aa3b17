//! Test configuration helpers for creating orchestrators around a fake tool

use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use media_dl::{Config, FileCollisionAction, Orchestrator, SaveLocationPrompt};

use super::fixtures::{FakeBehavior, FakeTool};

/// An orchestrator wired to a fake tool, with its scratch directories
pub struct TestSetup {
    /// The orchestrator under test
    pub orchestrator: Orchestrator,
    /// The installed fake tool
    pub tool: FakeTool,
    /// Default download directory
    pub download_dir: PathBuf,
    /// Keeps the scratch directories alive
    pub temp_dir: TempDir,
}

/// Config pointing at `tool`, downloading into `download_dir`
pub fn fake_tool_config(tool: &FakeTool, download_dir: PathBuf) -> Config {
    let mut config = Config::default();
    config.download.download_dir = download_dir;
    config.tools.fetcher_path = Some(tool.path.clone());
    config.tools.transcoder_path = Some(PathBuf::from("/usr/local/bin/ffmpeg"));
    config.tools.search_path = false;
    config
}

/// Create an orchestrator around a fake tool built from `behavior`
pub async fn create_test_setup(behavior: FakeBehavior) -> TestSetup {
    create_test_setup_with(behavior, FileCollisionAction::Fail, None).await
}

/// Create an orchestrator with a collision action and an optional custom prompt
pub async fn create_test_setup_with(
    behavior: FakeBehavior,
    collision: FileCollisionAction,
    prompt: Option<Arc<dyn SaveLocationPrompt>>,
) -> TestSetup {
    let temp_dir = tempfile::tempdir().unwrap();
    let tool = FakeTool::install(&temp_dir.path().join("bin"), &behavior);
    let download_dir = temp_dir.path().join("downloads");

    let mut config = fake_tool_config(&tool, download_dir.clone());
    config.download.file_collision = collision;

    let orchestrator = match prompt {
        Some(prompt) => Orchestrator::with_prompt(config, prompt).await,
        None => Orchestrator::new(config).await,
    }
    .unwrap();

    // Canonical form, matching the paths the orchestrator reports
    let download_dir = std::fs::canonicalize(&download_dir).unwrap();

    TestSetup {
        orchestrator,
        tool,
        download_dir,
        temp_dir,
    }
}

/// Whether a live run against the real tools was requested
///
/// Live tests need `MEDIA_DL_LIVE_URL` set and both binaries in PATH.
pub fn live_url() -> Option<String> {
    let url = std::env::var("MEDIA_DL_LIVE_URL").ok()?;
    let tools_present = which::which("yt-dlp").is_ok() && which::which("ffmpeg").is_ok();
    tools_present.then_some(url)
}
