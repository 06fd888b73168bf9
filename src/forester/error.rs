use thiserror::Error;

use super::process::ExitInfo;
use crate::notice::Notice;

/// Why a `forester query` produced no forest.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The executable could not be started (missing, not executable, ...).
    #[error("{message}")]
    Spawn { message: String },

    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },

    #[error("process exited with {exit}")]
    Exit {
        exit: ExitInfo,
        stdout: String,
        stderr: String,
    },

    #[error("didn't return a valid JSON response:\n{stdout}")]
    Parse { stdout: String, stderr: String },
}

impl QueryError {
    pub fn stdout(&self) -> &str {
        match self {
            QueryError::Exit { stdout, .. } | QueryError::Parse { stdout, .. } => stdout,
            QueryError::Spawn { .. } | QueryError::Timeout { .. } => "",
        }
    }

    pub fn stderr(&self) -> &str {
        match self {
            QueryError::Exit { stderr, .. } | QueryError::Parse { stderr, .. } => stderr,
            QueryError::Spawn { .. } | QueryError::Timeout { .. } => "",
        }
    }

    /// Spawn failures mean nothing will work until the user fixes their
    /// setup, so they are shown louder than ordinary query failures.
    pub fn is_critical(&self) -> bool {
        matches!(self, QueryError::Spawn { .. })
    }

    pub fn to_notice(&self) -> Notice {
        // Parse errors already embed stdout in their message.
        let stdout = match self {
            QueryError::Parse { .. } => "",
            _ => self.stdout(),
        };
        let message = diagnostic(
            &format!("forester query failed: {self}"),
            stdout,
            self.stderr(),
        );

        if self.is_critical() {
            Notice::critical(message)
        } else {
            Notice::error(message)
        }
    }
}

/// Join a primary cause with whatever output the process left behind.
pub fn diagnostic(cause: &str, stdout: &str, stderr: &str) -> String {
    let mut message = cause.to_string();
    if !stdout.trim().is_empty() {
        message.push_str("\n\nstdout:\n");
        message.push_str(stdout.trim_end());
    }
    if !stderr.trim().is_empty() {
        message.push_str("\n\nstderr:\n");
        message.push_str(stderr.trim_end());
    }
    message
}
