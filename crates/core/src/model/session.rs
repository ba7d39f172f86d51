use std::collections::BTreeSet;
use thiserror::Error;

use crate::model::ids::{QuestionId, SessionId};
use crate::model::question::{QuestionError, QuestionRef};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TestSessionError {
    #[error("session has no questions")]
    Empty,

    #[error("time limit must be positive")]
    ZeroTimeLimit,

    #[error("time limit of {minutes} minutes is too large")]
    TimeLimitOverflow { minutes: u64 },

    #[error("question {0} appears more than once")]
    DuplicateQuestion(QuestionId),

    #[error(transparent)]
    Question(#[from] QuestionError),
}

/// The fixed part of one timed attempt: identity, time limit, ordered questions.
///
/// Question order is significant and never changes for the life of the session.
#[derive(Debug, Clone, PartialEq)]
pub struct TestSession {
    id: SessionId,
    time_limit_seconds: u32,
    questions: Vec<QuestionRef>,
}

impl TestSession {
    /// Build a session, validating the question list.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError` if the list is empty, a question id repeats,
    /// a question is invalid, or the time limit is zero.
    pub fn new(
        id: SessionId,
        time_limit_seconds: u32,
        questions: Vec<QuestionRef>,
    ) -> Result<Self, TestSessionError> {
        if time_limit_seconds == 0 {
            return Err(TestSessionError::ZeroTimeLimit);
        }
        if questions.is_empty() {
            return Err(TestSessionError::Empty);
        }

        let mut seen = BTreeSet::new();
        for question in &questions {
            question.validate()?;
            if !seen.insert(question.id()) {
                return Err(TestSessionError::DuplicateQuestion(question.id()));
            }
        }

        Ok(Self {
            id,
            time_limit_seconds,
            questions,
        })
    }

    /// Build a session from a limit expressed in minutes, as the remote API sends it.
    ///
    /// # Errors
    ///
    /// Returns `TestSessionError::TimeLimitOverflow` if the limit does not fit in
    /// seconds, plus everything [`TestSession::new`] can return.
    pub fn with_minutes(
        id: SessionId,
        time_limit_minutes: u64,
        questions: Vec<QuestionRef>,
    ) -> Result<Self, TestSessionError> {
        let seconds = time_limit_minutes
            .checked_mul(60)
            .and_then(|secs| u32::try_from(secs).ok())
            .ok_or(TestSessionError::TimeLimitOverflow {
                minutes: time_limit_minutes,
            })?;
        Self::new(id, seconds, questions)
    }

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.id
    }

    #[must_use]
    pub fn time_limit_seconds(&self) -> u32 {
        self.time_limit_seconds
    }

    /// Time limit rounded up to whole minutes, for the instructions screen.
    #[must_use]
    pub fn time_limit_minutes(&self) -> u32 {
        self.time_limit_seconds.div_ceil(60)
    }

    #[must_use]
    pub fn questions(&self) -> &[QuestionRef] {
        &self.questions
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.questions.len()
    }

    /// Always false for a validated session; provided for API symmetry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[must_use]
    pub fn question(&self, index: usize) -> Option<&QuestionRef> {
        self.questions.get(index)
    }

    #[must_use]
    pub fn index_of(&self, id: QuestionId) -> Option<usize> {
        self.questions.iter().position(|question| question.id() == id)
    }

    #[must_use]
    pub fn contains(&self, id: QuestionId) -> bool {
        self.index_of(id).is_some()
    }

    #[must_use]
    pub fn total_marks(&self) -> f64 {
        self.questions.iter().map(QuestionRef::marks).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ids::ChoiceId;
    use crate::model::question::Choice;

    fn question(id: u64, marks: f64) -> QuestionRef {
        QuestionRef::new(
            QuestionId::new(id),
            format!("Q{id}"),
            None,
            marks,
            vec![Choice::new(ChoiceId::new(id * 10), "a", None)],
        )
        .unwrap()
    }

    #[test]
    fn rejects_empty_session() {
        let err = TestSession::new(SessionId::new(1), 60, Vec::new()).unwrap_err();
        assert_eq!(err, TestSessionError::Empty);
    }

    #[test]
    fn rejects_zero_time_limit() {
        let err = TestSession::new(SessionId::new(1), 0, vec![question(1, 1.0)]).unwrap_err();
        assert_eq!(err, TestSessionError::ZeroTimeLimit);
    }

    #[test]
    fn rejects_duplicate_questions() {
        let err = TestSession::new(
            SessionId::new(1),
            60,
            vec![question(1, 1.0), question(2, 1.0), question(1, 1.0)],
        )
        .unwrap_err();
        assert_eq!(err, TestSessionError::DuplicateQuestion(QuestionId::new(1)));
    }

    #[test]
    fn converts_minutes_and_guards_overflow() {
        let session =
            TestSession::with_minutes(SessionId::new(1), 15, vec![question(1, 1.0)]).unwrap();
        assert_eq!(session.time_limit_seconds(), 900);
        assert_eq!(session.time_limit_minutes(), 15);

        let err = TestSession::with_minutes(SessionId::new(1), u64::MAX, vec![question(1, 1.0)])
            .unwrap_err();
        assert!(matches!(err, TestSessionError::TimeLimitOverflow { .. }));
    }

    #[test]
    fn indexes_questions_and_sums_marks() {
        let session = TestSession::new(
            SessionId::new(1),
            60,
            vec![question(4, 1.0), question(7, 2.5)],
        ).unwrap();
        assert_eq!(session.index_of(QuestionId::new(7)), Some(1));
        assert!(!session.contains(QuestionId::new(5)));
        assert!((session.total_marks() - 3.5).abs() < f64::EPSILON);
    }
}
