//! Shared error types for the services crate.

use thiserror::Error;

use exam_core::model::{ResultId, SessionId, TestConfigError, TestSessionError};
use exam_core::{ExamError, SubmitTrigger};
use exam_core::exam::SnapshotError;
use storage::repository::StorageError;
use storage::sqlite::SqliteInitError;

/// Errors emitted by the HTTP collaborators.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ApiError {
    #[error("access token was rejected")]
    Unauthorized,
    #[error("request failed with status {0}")]
    HttpStatus(reqwest::StatusCode),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("server returned an invalid test session: {0}")]
    InvalidSession(#[from] TestSessionError),
}

/// Errors emitted while reading `ApiConfig` from the environment.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    #[error("EXAM_API_URL is not set")]
    MissingBaseUrl,
    #[error("invalid API base url {0:?}")]
    InvalidBaseUrl(String),
    #[error("invalid request timeout {0:?}")]
    InvalidTimeout(String),
}

/// Errors emitted by the exam controller, runner and loop service.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ExamServiceError {
    #[error("no stored attempt for session {0}")]
    SessionNotFound(SessionId),
    #[error("submission failed: {source}")]
    SubmissionFailed {
        trigger: SubmitTrigger,
        #[source]
        source: ApiError,
    },
    #[error("session {session} was already submitted (result {result})")]
    AlreadySubmitted { session: SessionId, result: ResultId },
    #[error("instructions must be accepted before the attempt starts")]
    InstructionsNotAccepted,
    #[error("exam runner has stopped")]
    RunnerStopped,
    #[error(transparent)]
    Exam(#[from] ExamError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Config(#[from] TestConfigError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl ExamServiceError {
    /// True when repeating the same action may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SubmissionFailed { source, .. } => !matches!(source, ApiError::Unauthorized),
            Self::Storage(_) => true,
            _ => false,
        }
    }

    /// Message suitable for showing to the candidate.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::SubmissionFailed {
                trigger: SubmitTrigger::Auto,
                ..
            } => "Time is up but the test could not be submitted. Your answers are saved; \
                  please contact support."
                .to_string(),
            Self::SubmissionFailed {
                source: ApiError::Unauthorized,
                ..
            } => "Your session has expired. Sign in again to submit; your answers are saved."
                .to_string(),
            Self::SubmissionFailed { .. } => {
                "The test could not be submitted. Please try again.".to_string()
            }
            Self::SessionNotFound(_) => "This test is no longer available.".to_string(),
            Self::AlreadySubmitted { session, .. } => {
                format!("This test was already submitted. See the result with: result {session}")
            }
            other => other.to_string(),
        }
    }
}

/// Errors emitted while bootstrapping app services.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AppServicesError {
    #[error(transparent)]
    Sqlite(#[from] SqliteInitError),
    #[error(transparent)]
    Api(#[from] ApiError),
}
