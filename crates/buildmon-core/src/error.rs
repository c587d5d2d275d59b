//! Application error types with rich context

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Application error types organized by layer/domain
#[derive(Debug, Error)]
pub enum Error {
    // ─────────────────────────────────────────────────────────────
    // Common/Infrastructure Errors
    // ─────────────────────────────────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    Json(#[from] serde_json::Error),

    // ─────────────────────────────────────────────────────────────
    // Process/Supervisor Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Tool '{program}' not found. Ensure it is in your PATH.")]
    ToolNotFound { program: String },

    #[error("Failed to spawn '{program}': {reason}")]
    Spawn { program: String, reason: String },

    #[error("Process exited unexpectedly with code: {code:?}")]
    ProcessExit { code: Option<i32> },

    #[error("Supervisor channel closed unexpectedly")]
    ChannelClosed,

    // ─────────────────────────────────────────────────────────────
    // Harness Usage Errors
    // ─────────────────────────────────────────────────────────────
    #[error("Already serving")]
    AlreadyServing,

    #[error("Already testing")]
    AlreadyTesting,

    #[error("Process was not started with a server port")]
    NoServerPort,

    #[error("Fixture directory not found: {path}")]
    MissingFixture { path: PathBuf },

    // ─────────────────────────────────────────────────────────────
    // HTTP Pass-Through Errors
    // ─────────────────────────────────────────────────────────────
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
}

impl Error {
    pub fn spawn(program: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Spawn {
            program: program.into(),
            reason: reason.into(),
        }
    }

    pub fn missing_fixture(path: impl Into<PathBuf>) -> Self {
        Self::MissingFixture { path: path.into() }
    }

    /// Usage errors are reported synchronously, before any process is spawned.
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Error::AlreadyServing | Error::AlreadyTesting | Error::NoServerPort
        )
    }
}

/// Cause of a supervisor entering the errored state.
///
/// Kept separate from [`Error`] (and clonable) because one failure rejects every
/// outstanding wait with the same cause, and each rejection needs its own `Error`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureReason {
    /// The process could not be started at all.
    Spawn {
        program: String,
        reason: String,
        not_found: bool,
    },
    /// The process exited abnormally (non-zero code, or signal-death).
    Exit { code: Option<i32> },
}

impl FailureReason {
    pub fn to_error(&self) -> Error {
        match self {
            FailureReason::Spawn {
                program,
                not_found: true,
                ..
            } => Error::ToolNotFound {
                program: program.clone(),
            },
            FailureReason::Spawn {
                program, reason, ..
            } => Error::Spawn {
                program: program.clone(),
                reason: reason.clone(),
            },
            FailureReason::Exit { code } => Error::ProcessExit { code: *code },
        }
    }
}

impl From<FailureReason> for Error {
    fn from(reason: FailureReason) -> Self {
        reason.to_error()
    }
}
