//! Transfer stage: run the fetch tool in download mode and verify its output

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::process;
use crate::tools::ToolPaths;
use crate::types::{Event, FailureKind, OutputStream, RequestId, TransferPlan, TransferResult};

/// How long to wait for output readers after the child has exited or been killed
///
/// A grandchild that inherited the pipes can keep them open past the
/// child's exit; readers still running after this are aborted.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Suffixes the fetch tool uses for in-progress files
const PARTIAL_SUFFIXES: [&str; 2] = ["part", "ytdl"];

/// Runs one download-mode invocation of the fetch tool per plan
#[derive(Clone)]
pub struct TransferExecutor {
    tools: Arc<ToolPaths>,
    event_tx: broadcast::Sender<Event>,
}

impl TransferExecutor {
    /// Create an executor that reports progress lines on `event_tx`
    pub fn new(tools: Arc<ToolPaths>, event_tx: broadcast::Sender<Event>) -> Self {
        Self { tools, event_tx }
    }

    /// Download and post-process according to `plan`
    ///
    /// Every output line of the tool is forwarded as [`Event::Output`]. When
    /// `cancel` fires the whole process tree is killed, in-progress files are
    /// removed, and [`TransferResult::Cancelled`] is returned. A zero exit
    /// status only counts as success if the output file exists and is
    /// non-empty. A plan that replaces an existing file has that file removed
    /// before the tool starts, so a stale file never passes the output check.
    pub async fn execute(
        &self,
        id: RequestId,
        url: &str,
        plan: &TransferPlan,
        cancel: &CancellationToken,
    ) -> TransferResult {
        if cancel.is_cancelled() {
            return TransferResult::Cancelled;
        }

        if plan.replaces_existing()
            && let Err(result) = remove_existing(plan.output_path()).await
        {
            return result;
        }

        let args = build_args(url, plan, &self.tools.transcoder);
        tracing::debug!(
            request_id = id.0,
            fetcher = %self.tools.fetcher.display(),
            ?args,
            "spawning fetch tool"
        );

        let mut child = match process::command(&self.tools.fetcher).args(&args).spawn() {
            Ok(child) => child,
            Err(e) => {
                tracing::error!(request_id = id.0, error = %e, "failed to spawn fetch tool");
                return TransferResult::failed(
                    FailureKind::ProcessSpawnFailed,
                    format!("failed to execute {}: {}", self.tools.fetcher.display(), e),
                );
            }
        };

        self.emit(Event::TransferStarted {
            id,
            path: plan.output_path().to_path_buf(),
        });

        let stdout_task = child
            .stdout
            .take()
            .map(|out| self.forward_lines(id, OutputStream::Stdout, out));
        let stderr_task = child
            .stderr
            .take()
            .map(|err| self.forward_lines(id, OutputStream::Stderr, err));

        let status = tokio::select! {
            status = child.wait() => Some(status),
            _ = cancel.cancelled() => None,
        };

        let Some(status) = status else {
            tracing::info!(request_id = id.0, "cancelling transfer");
            process::kill_tree(&mut child).await;
            collect(stdout_task).await;
            collect(stderr_task).await;
            remove_partial_files(plan.output_path()).await;
            return TransferResult::Cancelled;
        };

        let stdout = collect(stdout_task).await;
        let stderr = collect(stderr_task).await;

        let status = match status {
            Ok(status) => status,
            Err(e) => {
                return TransferResult::failed(
                    FailureKind::ToolReportedError,
                    format!("failed to wait for fetch tool: {}", e),
                );
            }
        };

        if !status.success() {
            let diagnostic = match stderr.trim() {
                "" => stdout.trim(),
                stderr => stderr,
            };
            tracing::warn!(request_id = id.0, %status, "fetch tool failed");
            return TransferResult::failed(
                FailureKind::ToolReportedError,
                if diagnostic.is_empty() {
                    format!("fetch tool failed ({})", process::describe_status(&status))
                } else {
                    diagnostic.to_string()
                },
            );
        }

        verify_output(plan).await
    }

    fn forward_lines<R>(
        &self,
        id: RequestId,
        stream: OutputStream,
        reader: R,
    ) -> JoinHandle<String>
    where
        R: tokio::io::AsyncRead + Unpin + Send + 'static,
    {
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            process::drain_lines(reader, |line| {
                // No receivers is fine
                let _ = tx.send(Event::Output {
                    id,
                    stream,
                    line: line.to_string(),
                });
            })
            .await
        })
    }

    fn emit(&self, event: Event) {
        let _ = self.event_tx.send(event);
    }
}

/// Full argument list for a download-mode invocation
fn build_args(url: &str, plan: &TransferPlan, transcoder: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        url.into(),
        "--output".into(),
        output_template(plan.output_path()).into(),
        "--ffmpeg-location".into(),
        transcoder.into(),
        "--no-playlist".into(),
    ];
    args.extend(plan.fetch_args().into_iter().map(OsString::from));
    args
}

/// The tool treats `--output` as a template; `%` must be doubled to stay literal
///
/// Escaping works on the raw platform string so non-UTF-8 paths reach the
/// tool unchanged.
fn output_template(path: &Path) -> OsString {
    #[cfg(unix)]
    {
        use std::os::unix::ffi::{OsStrExt, OsStringExt};

        let mut escaped = Vec::with_capacity(path.as_os_str().len());
        for &byte in path.as_os_str().as_bytes() {
            escaped.push(byte);
            if byte == b'%' {
                escaped.push(b'%');
            }
        }
        OsString::from_vec(escaped)
    }

    #[cfg(windows)]
    {
        use std::os::windows::ffi::{OsStrExt, OsStringExt};

        let percent = u16::from(b'%');
        let mut escaped = Vec::new();
        for unit in path.as_os_str().encode_wide() {
            escaped.push(unit);
            if unit == percent {
                escaped.push(unit);
            }
        }
        OsString::from_wide(&escaped)
    }

    #[cfg(not(any(unix, windows)))]
    {
        OsString::from(path.to_string_lossy().replace('%', "%%"))
    }
}

/// Remove the file a replacing plan overwrites
async fn remove_existing(path: &Path) -> Result<(), TransferResult> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "removed existing file before transfer");
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TransferResult::failed(
            FailureKind::DestinationConflict,
            format!("cannot replace existing file {}: {}", path.display(), e),
        )),
    }
}

async fn verify_output(plan: &TransferPlan) -> TransferResult {
    let path = plan.output_path();
    match tokio::fs::metadata(path).await {
        Ok(meta) if meta.is_file() && meta.len() > 0 => TransferResult::Success {
            path: path.to_path_buf(),
            title: plan.title().to_string(),
        },
        Ok(meta) if meta.is_file() => TransferResult::failed(
            FailureKind::PostconditionViolated,
            format!("output file is empty: {}", path.display()),
        ),
        Ok(_) => TransferResult::failed(
            FailureKind::PostconditionViolated,
            format!("output path is not a file: {}", path.display()),
        ),
        Err(e) => TransferResult::failed(
            FailureKind::PostconditionViolated,
            format!("output file missing at {}: {}", path.display(), e),
        ),
    }
}

async fn collect(task: Option<JoinHandle<String>>) -> String {
    let Some(mut task) = task else {
        return String::new();
    };
    match tokio::time::timeout(DRAIN_TIMEOUT, &mut task).await {
        Ok(Ok(transcript)) => transcript,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "output reader task failed");
            String::new()
        }
        Err(_) => {
            task.abort();
            tracing::debug!("output reader still blocked after exit, aborted");
            String::new()
        }
    }
}

fn partial_paths(output: &Path) -> Vec<PathBuf> {
    PARTIAL_SUFFIXES
        .iter()
        .map(|suffix| {
            let mut raw = output.as_os_str().to_os_string();
            raw.push(".");
            raw.push(suffix);
            PathBuf::from(raw)
        })
        .collect()
}

async fn remove_partial_files(output: &Path) {
    for partial in partial_paths(output) {
        match tokio::fs::remove_file(&partial).await {
            Ok(()) => tracing::debug!(path = %partial.display(), "removed partial file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %partial.display(),
                error = %e,
                "failed to remove partial file"
            ),
        }
    }
}
