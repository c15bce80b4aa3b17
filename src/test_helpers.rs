//! Shared test helpers: a scriptable stand-in for the fetch tool.
//!
//! The fake is a `/bin/sh` script written into a temp dir. It logs every
//! invocation (tab-separated arguments, one line per call) and behaves like
//! the real tool at the argument level: `--dump-json` prints metadata,
//! otherwise it writes the file named by `--output`.

#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::config::Config;

/// What the fake does in download mode
#[derive(Clone, Debug)]
pub(crate) enum DownloadBehavior {
    /// Write these bytes to the output path and exit 0
    Write(String),
    /// Exit 0 without creating the output file
    NoFile,
    /// Print to stderr and exit with the code
    Fail(String, i32),
    /// Print to stdout only and exit with the code
    FailOnStdout(String, i32),
}

pub(crate) struct FakeFetcherBuilder {
    dump_stdout: String,
    dump_stderr: String,
    dump_exit: i32,
    dump_delay_secs: u64,
    download: DownloadBehavior,
    download_delay_secs: u64,
}

impl FakeFetcherBuilder {
    pub(crate) fn dump_json(mut self, json: &str) -> Self {
        self.dump_stdout = json.to_string();
        self
    }

    pub(crate) fn dump_failure(mut self, stderr: &str, code: i32) -> Self {
        self.dump_stdout = String::new();
        self.dump_stderr = stderr.to_string();
        self.dump_exit = code;
        self
    }

    /// Dump mode fails with the error printed on stdout only
    pub(crate) fn dump_failure_on_stdout(mut self, stdout: &str, code: i32) -> Self {
        self.dump_stdout = stdout.to_string();
        self.dump_stderr = String::new();
        self.dump_exit = code;
        self
    }

    pub(crate) fn dump_delay_secs(mut self, secs: u64) -> Self {
        self.dump_delay_secs = secs;
        self
    }

    pub(crate) fn download(mut self, behavior: DownloadBehavior) -> Self {
        self.download = behavior;
        self
    }

    pub(crate) fn download_delay_secs(mut self, secs: u64) -> Self {
        self.download_delay_secs = secs;
        self
    }

    pub(crate) fn build(self) -> FakeFetcher {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("yt-dlp");
        let log = dir.path().join("invocations.log");
        let dump_pid = dir.path().join("dump.pid");

        let download_body = match &self.download {
            DownloadBehavior::Write(content) => {
                format!("printf '%s' {} > \"$out\"\nexit 0", sh_quote(content))
            }
            DownloadBehavior::NoFile => "exit 0".to_string(),
            DownloadBehavior::Fail(stderr, code) => {
                format!("printf '%s\\n' {} >&2\nexit {}", sh_quote(stderr), code)
            }
            DownloadBehavior::FailOnStdout(stdout, code) => {
                format!("printf '%s\\n' {}\nexit {}", sh_quote(stdout), code)
            }
        };

        let body = format!(
            r#"#!/bin/sh
for arg in "$@"; do printf '%s\t' "$arg" >> {log}; done
printf '\n' >> {log}
mode=download
out=""
prev=""
for arg in "$@"; do
  [ "$arg" = "--dump-json" ] && mode=dump
  [ "$prev" = "--output" ] && out="$arg"
  prev="$arg"
done
if [ "$mode" = dump ]; then
  printf '%s' $$ > {dump_pid}
  if [ {dump_delay} -gt 0 ]; then sleep {dump_delay}; fi
  if [ -n {dump_stdout} ]; then printf '%s\n' {dump_stdout}; fi
  if [ -n {dump_stderr} ]; then printf '%s\n' {dump_stderr} >&2; fi
  exit {dump_exit}
fi
printf '[download] Destination: %s\n' "$out"
printf '[download]  50.0%%\r[download] 100.0%%\n'
if [ {download_delay} -gt 0 ]; then sleep {download_delay}; fi
{download_body}
"#,
            log = sh_quote(&log.display().to_string()),
            dump_pid = sh_quote(&dump_pid.display().to_string()),
            dump_delay = self.dump_delay_secs,
            dump_stdout = sh_quote(&self.dump_stdout),
            dump_stderr = sh_quote(&self.dump_stderr),
            dump_exit = self.dump_exit,
            download_delay = self.download_delay_secs,
            download_body = download_body,
        );

        std::fs::write(&script, body).unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();

        FakeFetcher {
            _dir: dir,
            script,
            log,
            dump_pid,
        }
    }
}

/// A fake fetch tool living in its own temp dir
pub(crate) struct FakeFetcher {
    _dir: TempDir,
    script: PathBuf,
    log: PathBuf,
    dump_pid: PathBuf,
}

impl FakeFetcher {
    pub(crate) fn builder() -> FakeFetcherBuilder {
        FakeFetcherBuilder {
            dump_stdout: r#"{"title":"My: Song?","id":"abc"}"#.to_string(),
            dump_stderr: String::new(),
            dump_exit: 0,
            dump_delay_secs: 0,
            download: DownloadBehavior::Write("fake media".to_string()),
            download_delay_secs: 0,
        }
    }

    /// Path of the executable script
    pub(crate) fn path(&self) -> PathBuf {
        self.script.clone()
    }

    pub(crate) fn log_path(&self) -> &Path {
        &self.log
    }

    /// Pid of the most recent dump-mode invocation, once it started
    pub(crate) fn dump_pid(&self) -> Option<i32> {
        std::fs::read_to_string(&self.dump_pid)
            .ok()
            .and_then(|pid| pid.trim().parse().ok())
    }
}

/// Whether a process has exited (a zombie nobody reaped yet counts as exited)
#[cfg(target_os = "linux")]
pub(crate) fn process_gone(pid: i32) -> bool {
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        Err(_) => true,
        Ok(stat) => stat
            .rsplit_once(')')
            .and_then(|(_, rest)| rest.split_whitespace().next())
            .is_some_and(|state| state == "Z" || state == "X"),
    }
}

/// Arguments of every invocation so far, in call order
pub(crate) fn read_invocations(fake: &FakeFetcher) -> Vec<Vec<String>> {
    let Ok(log) = std::fs::read_to_string(fake.log_path()) else {
        return Vec::new();
    };
    log.lines()
        .map(|line| {
            line.split('\t')
                .filter(|arg| !arg.is_empty())
                .map(str::to_string)
                .collect()
        })
        .collect()
}

/// Number of download-mode invocations so far
pub(crate) fn download_invocations(fake: &FakeFetcher) -> usize {
    read_invocations(fake)
        .iter()
        .filter(|args| !args.iter().any(|a| a == "--dump-json"))
        .count()
}

/// Config pointing at the fake, with `download_dir` as default target
pub(crate) fn test_config(fake: &FakeFetcher, download_dir: &Path) -> Config {
    let mut config = Config::default();
    config.download.download_dir = download_dir.to_path_buf();
    config.tools.fetcher_path = Some(fake.path());
    config.tools.transcoder_path = Some(PathBuf::from("/opt/media-dl/bin/ffmpeg"));
    config.tools.search_path = false;
    config
}

fn sh_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
