//! Helper-process plumbing: per-call handoff files and a bounded runner.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{de::DeserializeOwned, Serialize};
use tokio::process::Command;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{ClusteringError, Result};

/// Files exchanged with one helper invocation. Every path handed out is
/// removed when the value drops, whatever the outcome of the call.
pub struct Handoff {
    dir: PathBuf,
    token: String,
    files: Vec<PathBuf>,
}

impl Handoff {
    pub fn new(dir: &Path) -> Self {
        Self {
            dir: dir.to_path_buf(),
            token: Uuid::new_v4().simple().to_string(),
            files: Vec::new(),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// `<dir>/<token>_<suffix>`, registered for cleanup.
    pub fn file(&mut self, suffix: &str) -> PathBuf {
        let path = self.dir.join(format!("{}_{suffix}", self.token));
        self.files.push(path.clone());
        path
    }
}

impl Drop for Handoff {
    fn drop(&mut self) {
        for path in &self.files {
            match std::fs::remove_file(path) {
                Ok(()) => debug!(path=%path.display(), "handoff: removed"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => warn!(path=%path.display(), "handoff: cleanup failed: {e}"),
            }
        }
    }
}

pub async fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let bytes = serde_json::to_vec(value).map_err(|e| ClusteringError::handoff(path, e))?;
    tokio::fs::write(path, bytes)
        .await
        .map_err(|e| ClusteringError::handoff(path, e))
}

pub async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ClusteringError::handoff(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| ClusteringError::handoff(path, e))
}

#[derive(Debug)]
pub struct ProcessOutput {
    pub status: ExitStatus,
    pub stdout: String,
    pub stderr: String,
}

/// Runs helper scripts through one interpreter, at most `max_concurrent`
/// at a time, each bounded by `timeout`.
pub struct ProcessRunner {
    program: String,
    timeout: Duration,
    permits: Arc<Semaphore>,
}

impl ProcessRunner {
    pub fn new(program: impl Into<String>, timeout: Duration, max_concurrent: usize) -> Self {
        Self {
            program: program.into(),
            timeout,
            permits: Arc::new(Semaphore::new(max_concurrent)),
        }
    }

    /// Waits for the script to exit and returns its output whatever the exit
    /// status. A timed-out child is killed.
    pub async fn run(&self, script: &Path, args: &[OsString], envs: &[(&str, OsString)]) -> Result<ProcessOutput> {
        let name = script_name(script);
        let _permit = self.permits.acquire().await.map_err(|e| ClusteringError::Spawn {
            program: name.clone(),
            source: std::io::Error::other(e),
        })?;

        // Spawn
        let mut cmd = Command::new(&self.program);
        cmd.arg(script)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in envs {
            cmd.env(key, value);
        }

        let started = Instant::now();
        let child = cmd.spawn().map_err(|source| ClusteringError::Spawn {
            program: name.clone(),
            source,
        })?;
        info!(program=%name, pid=?child.id(), "process: started");

        // Wait, bounded
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => return Err(ClusteringError::Spawn { program: name, source }),
            Err(_) => {
                warn!(program=%name, after=?self.timeout, "process: timed out, killed");
                return Err(ClusteringError::Timeout {
                    program: name,
                    after: self.timeout,
                });
            }
        };

        info!(
            program=%name,
            status=%output.status,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "process: finished"
        );
        Ok(ProcessOutput {
            status: output.status,
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }

    pub fn failure(&self, script: &Path, output: &ProcessOutput, reported: Option<String>) -> ClusteringError {
        ClusteringError::ExternalProcess {
            program: script_name(script),
            status: output.status.to_string(),
            stderr: output.stderr.clone(),
            reported,
        }
    }
}

fn script_name(script: &Path) -> String {
    script
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| script.display().to_string())
}
