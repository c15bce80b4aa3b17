//! Metadata resolution via the fetch tool's JSON dump

use std::path::PathBuf;
use std::time::Duration;

use crate::error::FetchError;
use crate::process;
use crate::types::MediaMetadata;

/// Arguments appended after the URL for a single-item metadata dump
pub const DUMP_ARGS: [&str; 2] = ["--dump-json", "--no-playlist"];

/// Resolves a URL into [`MediaMetadata`] by running the fetch tool in dump mode
///
/// The resolver does not validate URL syntax itself; a URL the tool cannot
/// handle comes back as [`FetchError::ToolReportedError`].
///
/// # Examples
///
/// ```no_run
/// use media_dl::metadata::MetadataResolver;
/// use std::time::Duration;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let resolver = MetadataResolver::new("/usr/bin/yt-dlp".into(), Duration::from_secs(120));
/// let metadata = resolver.resolve("https://example.com/watch?id=abc").await?;
/// println!("{}", metadata.title);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct MetadataResolver {
    fetcher: PathBuf,
    timeout: Duration,
}

impl MetadataResolver {
    /// Create a resolver for the given fetch tool binary
    pub fn new(fetcher: PathBuf, timeout: Duration) -> Self {
        Self { fetcher, timeout }
    }

    /// Dump and parse metadata for exactly one item
    ///
    /// Dropping the returned future kills the tool.
    pub async fn resolve(&self, url: &str) -> Result<MediaMetadata, FetchError> {
        if url.trim().is_empty() {
            return Err(FetchError::EmptyUrl);
        }

        tracing::debug!(fetcher = %self.fetcher.display(), url, "dumping metadata");

        let output = tokio::time::timeout(
            self.timeout,
            process::command(&self.fetcher)
                .arg(url)
                .args(DUMP_ARGS)
                .output(),
        )
        .await
        .map_err(|_| FetchError::ToolReportedError {
            status: "timed out".to_string(),
            diagnostic: format!("metadata dump timed out after {}s", self.timeout.as_secs()),
        })?
        .map_err(|e| FetchError::ProcessSpawnFailed {
            program: self.fetcher.clone(),
            message: e.to_string(),
        })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let diagnostic = if stderr.trim().is_empty() {
                String::from_utf8_lossy(&output.stdout).trim().to_string()
            } else {
                stderr.trim().to_string()
            };
            tracing::warn!(url, status = %output.status, "fetch tool rejected metadata dump");
            return Err(FetchError::ToolReportedError {
                status: process::describe_status(&output.status),
                diagnostic,
            });
        }

        parse_metadata(&String::from_utf8_lossy(&output.stdout))
    }
}

/// Parse the fetch tool's dump output
///
/// The tool writes one JSON object per line per item. Exactly one object is
/// accepted; more than one, or an object describing a playlist, is
/// [`FetchError::AmbiguousSource`].
pub fn parse_metadata(stdout: &str) -> Result<MediaMetadata, FetchError> {
    let records: Vec<&str> = stdout
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let record = match records.as_slice() {
        [] => {
            return Err(FetchError::MalformedMetadata(
                "fetch tool produced no output".to_string(),
            ));
        }
        [single] => *single,
        many => return Err(FetchError::AmbiguousSource { records: many.len() }),
    };

    let value: serde_json::Value = serde_json::from_str(record)
        .map_err(|e| FetchError::MalformedMetadata(format!("invalid JSON: {}", e)))?;

    if !value.is_object() {
        return Err(FetchError::MalformedMetadata(
            "expected a JSON object".to_string(),
        ));
    }

    if let Some(kind) = value.get("_type").and_then(|t| t.as_str())
        && matches!(kind, "playlist" | "multi_video")
    {
        let records = value
            .get("entries")
            .and_then(|e| e.as_array())
            .map_or(0, Vec::len);
        return Err(FetchError::AmbiguousSource { records });
    }

    serde_json::from_value(value).map_err(|e| FetchError::MalformedMetadata(e.to_string()))
}
