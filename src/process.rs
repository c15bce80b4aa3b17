//! Subprocess plumbing shared by the metadata and transfer stages

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};

/// Build a non-interactive command for an external tool
///
/// stdin is closed, stdout/stderr are piped, and the child is killed if its
/// handle is dropped. On unix the child leads a new process group so that
/// [`kill_tree`] also reaches the transcoder the fetch tool spawns.
pub(crate) fn command(program: &Path) -> Command {
    let mut cmd = Command::new(program);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    #[cfg(unix)]
    cmd.process_group(0);

    #[cfg(windows)]
    {
        // CREATE_NO_WINDOW
        cmd.creation_flags(0x0800_0000);
    }

    cmd
}

/// Kill a child and every process in its tree, then reap it
pub(crate) async fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let Ok(pgid) = libc::pid_t::try_from(pid) else {
            tracing::warn!(pid, "pid out of range, killing direct child only");
            kill_direct(child).await;
            return;
        };
        // SAFETY: killpg only sends a signal; the group was created for this child
        let rc = unsafe { libc::killpg(pgid, libc::SIGKILL) };
        if rc != 0 {
            tracing::debug!(
                pid,
                error = %std::io::Error::last_os_error(),
                "killpg failed, process group already gone"
            );
        }
    }

    #[cfg(windows)]
    if let Some(pid) = child.id() {
        let result = Command::new("taskkill")
            .args(["/PID", &pid.to_string(), "/T", "/F"])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        if let Err(e) = result {
            tracing::debug!(pid, error = %e, "taskkill failed");
        }
    }

    kill_direct(child).await;
}

async fn kill_direct(child: &mut Child) {
    if let Err(e) = child.kill().await {
        tracing::debug!(error = %e, "child already exited");
    }
}

/// Human-readable exit status ("exit status: 1", "signal: 9 (SIGKILL)")
pub(crate) fn describe_status(status: &ExitStatus) -> String {
    status.to_string()
}

/// Read a child stream to the end, calling `on_line` for every line
///
/// Lines are split on `\n` and `\r` (progress output rewrites the same
/// terminal line with carriage returns) and decoded lossily. Returns the
/// whole stream as text.
pub(crate) async fn drain_lines<R, F>(reader: R, mut on_line: F) -> String
where
    R: AsyncRead + Unpin,
    F: FnMut(&str),
{
    let mut reader = BufReader::new(reader);
    let mut transcript = String::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let chunk = String::from_utf8_lossy(&buf);
                for line in chunk.split(['\r', '\n']).filter(|l| !l.trim().is_empty()) {
                    on_line(line);
                    transcript.push_str(line);
                    transcript.push('\n');
                }
            }
            Err(e) => {
                tracing::debug!(error = %e, "stopped reading child output");
                break;
            }
        }
    }

    transcript
}
