use std::path::PathBuf;
use std::time::Duration;

use forces::ForcesError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClusteringError {
    #[error("{program} failed ({status}): {}", detail(.reported, .stderr))]
    ExternalProcess {
        program: String,
        status: String,
        stderr: String,
        /// Error string the process wrote to its result file, if any.
        reported: Option<String>,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {after:?}")]
    Timeout { program: String, after: Duration },

    #[error("handoff file {}: {reason}", .path.display())]
    Handoff { path: PathBuf, reason: String },

    #[error(transparent)]
    Forces(#[from] ForcesError),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl ClusteringError {
    pub(crate) fn handoff(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        ClusteringError::Handoff {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

fn detail(reported: &Option<String>, stderr: &str) -> String {
    match reported {
        Some(r) => r.clone(),
        None if stderr.trim().is_empty() => "no output on stderr".to_string(),
        None => stderr.trim().to_string(),
    }
}

pub type Result<T> = std::result::Result<T, ClusteringError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reported_error_wins_over_stderr() {
        let e = ClusteringError::ExternalProcess {
            program: "orion_fixed_bridge.py".into(),
            status: "exit status: 1".into(),
            stderr: "Traceback ...".into(),
            reported: Some("features file missing".into()),
        };
        assert_eq!(e.to_string(), "orion_fixed_bridge.py failed (exit status: 1): features file missing");
    }

    #[test]
    fn test_stderr_shown_when_nothing_reported() {
        let e = ClusteringError::ExternalProcess {
            program: "p".into(),
            status: "exit status: 2".into(),
            stderr: "  boom\n".into(),
            reported: None,
        };
        assert!(e.to_string().ends_with(": boom"));
    }
}
