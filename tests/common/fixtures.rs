//! Fake fetch tool for integration tests
//!
//! Installs a `/bin/sh` script that mimics the fetch tool at the argument
//! level. Like the real tool it treats `--output` as a template (`%%` is a
//! literal `%`), prints progress on stdout, and starts a child process
//! standing in for the transcoder while it "downloads".

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

/// Behavior of the fake tool
#[derive(Clone, Debug)]
pub struct FakeBehavior {
    /// JSON printed in `--dump-json` mode
    pub metadata_json: String,
    /// Bytes written to the output path, `None` to write nothing
    pub content: Option<String>,
    /// Seconds the simulated transcoder runs before the file is written
    pub transcode_secs: u64,
    /// Nonzero makes download mode fail with `stderr`
    pub exit_code: i32,
    /// Printed to stderr in download mode
    pub stderr: String,
}

impl Default for FakeBehavior {
    fn default() -> Self {
        Self {
            metadata_json: serde_json::json!({
                "id": "abc",
                "title": "My: Song?",
                "formats": [
                    {"format_id": "140", "ext": "m4a", "vcodec": "none", "acodec": "mp4a.40.2"}
                ]
            })
            .to_string(),
            content: Some("fake media".to_string()),
            transcode_secs: 0,
            exit_code: 0,
            stderr: String::new(),
        }
    }
}

impl FakeBehavior {
    /// Metadata with the given title
    pub fn titled(title: &str) -> Self {
        Self {
            metadata_json: serde_json::json!({ "id": "abc", "title": title }).to_string(),
            ..Default::default()
        }
    }
}

/// A fake tool installed in a directory
pub struct FakeTool {
    /// Path of the script
    pub path: PathBuf,
    log: PathBuf,
    /// File the simulated transcoder writes its pid to
    pub transcoder_pid_file: PathBuf,
}

impl FakeTool {
    /// Write the script into `dir`
    pub fn install(dir: &Path, behavior: &FakeBehavior) -> Self {
        std::fs::create_dir_all(dir).unwrap();
        let path = dir.join("yt-dlp");
        let log = dir.join("calls.log");
        let transcoder_pid_file = dir.join("transcoder.pid");

        let write = match &behavior.content {
            Some(content) => format!("printf '%s' {} > \"$out\"", quote(content)),
            None => ":".to_string(),
        };

        let script = format!(
            r#"#!/bin/sh
printf '%s\n' "$*" >> {log}
out=""
prev=""
for arg in "$@"; do
  if [ "$arg" = "--dump-json" ]; then
    printf '%s\n' {metadata}
    exit 0
  fi
  if [ "$prev" = "--output" ]; then out=$(printf '%s' "$arg" | sed 's/%%/%/g'); fi
  prev="$arg"
done
echo "[download] Destination: $out"
printf '[download]  10.0%%\r[download] 100.0%%\n'
if [ -n {stderr} ]; then printf '%s\n' {stderr} >&2; fi
if [ {code} -ne 0 ]; then exit {code}; fi
sleep {secs} &
echo $! > {pid_file}
wait
echo "[ExtractAudio] Destination: $out"
{write}
exit 0
"#,
            log = quote(&log.display().to_string()),
            metadata = quote(&behavior.metadata_json),
            stderr = quote(&behavior.stderr),
            code = behavior.exit_code,
            secs = behavior.transcode_secs,
            pid_file = quote(&transcoder_pid_file.display().to_string()),
            write = write,
        );

        std::fs::write(&path, script).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

        Self {
            path,
            log,
            transcoder_pid_file,
        }
    }

    /// Command lines of every invocation (space-joined arguments)
    pub fn calls(&self) -> Vec<String> {
        std::fs::read_to_string(&self.log)
            .map(|log| log.lines().map(str::to_string).collect())
            .unwrap_or_default()
    }

    /// Download-mode invocations
    pub fn download_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|call| !call.contains("--dump-json"))
            .collect()
    }

    /// Pid of the simulated transcoder, once it started
    pub fn transcoder_pid(&self) -> Option<i32> {
        std::fs::read_to_string(&self.transcoder_pid_file)
            .ok()
            .and_then(|pid| pid.trim().parse().ok())
    }
}

/// Whether a process is gone (exited, or a zombie nobody reaped yet)
#[cfg(target_os = "linux")]
pub fn process_gone(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Err(_) => true,
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state == "Z" || state == "X"),
    }
}

fn quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
