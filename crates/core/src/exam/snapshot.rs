//! Serialized form of an in-progress attempt, written after every mutation so
//! a reload resumes exactly where the candidate left off.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{AnswerEntry, QuestionId, QuestionRef, ResultId, SessionId, TestSessionError};

/// Current on-disk layout. Bump when fields change meaning.
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SnapshotError {
    #[error("unsupported snapshot version {0}")]
    UnsupportedVersion(u32),

    #[error(transparent)]
    Session(#[from] TestSessionError),

    #[error("current index {index} is out of range for {len} questions")]
    CurrentIndexOutOfRange { index: usize, len: usize },

    #[error("visited index {index} is out of range for {len} questions")]
    VisitedOutOfRange { index: usize, len: usize },

    #[error("current question {0} is not marked as visited")]
    CurrentNotVisited(usize),

    #[error("question {0} is not part of the snapshot session")]
    UnknownQuestion(QuestionId),

    #[error("question {0} is answered or marked but was never visited")]
    NotVisited(QuestionId),

    #[error("question {0} has more than one stored answer")]
    DuplicateAnswer(QuestionId),

    #[error("remaining time {remaining}s exceeds the {limit}s limit")]
    RemainingExceedsLimit { remaining: u32, limit: u32 },
}

/// Full attempt state: the fixed session plus the mutable fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub version: u32,
    pub session_id: SessionId,
    pub time_limit_seconds: u32,
    pub questions: Vec<QuestionRef>,
    pub answers: Vec<AnswerEntry>,
    pub visited: Vec<usize>,
    pub marked_for_review: Vec<QuestionId>,
    pub current_index: usize,
    pub remaining_seconds: u32,
    /// Set once the grading service acknowledged the attempt. A stored
    /// snapshot carrying it is a tombstone: it must never be submitted again.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted: Option<ResultId>,
}

impl SessionSnapshot {
    #[must_use]
    pub fn is_submitted(&self) -> bool {
        self.submitted.is_some()
    }
}
