use thiserror::Error;

use crate::exam::{ExamError, SnapshotError};
use crate::model::{QuestionError, TestConfigError, TestSessionError};

/// Umbrella over the domain errors of this crate.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    #[error(transparent)]
    Exam(#[from] ExamError),
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
    #[error(transparent)]
    Session(#[from] TestSessionError),
    #[error(transparent)]
    Question(#[from] QuestionError),
    #[error(transparent)]
    Config(#[from] TestConfigError),
}
