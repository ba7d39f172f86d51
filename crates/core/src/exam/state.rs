use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use thiserror::Error;

use super::palette::{PaletteCounts, PaletteStatus};
use super::snapshot::{SNAPSHOT_VERSION, SessionSnapshot, SnapshotError};
use crate::model::{
    AnswerEntry, ChoiceId, QuestionId, QuestionRef, ResultId, SessionId, SubmissionPayload,
    TestSession,
};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExamError {
    #[error("question index {index} is out of range for {len} questions")]
    InvalidIndex { index: usize, len: usize },

    #[error("question {0} is not part of this session")]
    UnknownQuestion(QuestionId),

    #[error("a submission is already in progress")]
    Submitting,

    #[error("the last submission failed; retry or dismiss it first")]
    SubmissionPending,

    #[error("session already submitted")]
    Submitted,

    #[error("time is up; the attempt can only be submitted")]
    TimeExpired,

    #[error("no submission is in progress")]
    NotSubmitting,

    #[error("no failed submission to dismiss")]
    NothingToAcknowledge,
}

//
// ─── SUBMISSION PHASE ─────────────────────────────────────────────────────────
//

/// What started a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitTrigger {
    /// The candidate pressed submit.
    Manual,
    /// The countdown reached zero.
    Auto,
}

/// Submission guard. Every mutating path checks it first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitPhase {
    Idle,
    Submitting(SubmitTrigger),
    /// The last attempt failed; ticking stays paused until retry or dismissal.
    Failed(SubmitTrigger),
    Submitted(ResultId),
}

/// Result of advancing the countdown by one second.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    Running { remaining: u32 },
    /// The countdown just hit zero. The session is now submitting and the
    /// payload must be sent exactly once.
    Expired(SubmissionPayload),
    /// Nothing happened: the session is not idle or time already ran out.
    Halted,
}

//
// ─── SESSION ──────────────────────────────────────────────────────────────────
//

/// In-memory state of one timed attempt.
///
/// Owns the answers, visit/review flags, the question pointer and the
/// remaining time. All transitions are synchronous; persistence and network
/// effects belong to the caller.
#[derive(Clone)]
pub struct ExamSession {
    session: TestSession,
    answers: BTreeMap<QuestionId, ChoiceId>,
    visited: BTreeSet<usize>,
    marked: BTreeSet<QuestionId>,
    current: usize,
    remaining_seconds: u32,
    phase: SubmitPhase,
}

impl ExamSession {
    /// Start a fresh attempt: first question shown, nothing answered, full time.
    #[must_use]
    pub fn start(session: TestSession) -> Self {
        let remaining_seconds = session.time_limit_seconds();
        Self {
            session,
            answers: BTreeMap::new(),
            visited: BTreeSet::from([0]),
            marked: BTreeSet::new(),
            current: 0,
            remaining_seconds,
            phase: SubmitPhase::Idle,
        }
    }

    /// Rehydrate an attempt from a snapshot, field for field.
    ///
    /// A submitted snapshot comes back terminal, in `SubmitPhase::Submitted`.
    ///
    /// # Errors
    ///
    /// Returns `SnapshotError` when the snapshot version is unknown, the
    /// session fails validation, or the mutable fields contradict the session.
    pub fn restore(snapshot: SessionSnapshot) -> Result<Self, SnapshotError> {
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(SnapshotError::UnsupportedVersion(snapshot.version));
        }

        let session = TestSession::new(
            snapshot.session_id,
            snapshot.time_limit_seconds,
            snapshot.questions,
        )?;
        let len = session.len();

        if snapshot.current_index >= len {
            return Err(SnapshotError::CurrentIndexOutOfRange {
                index: snapshot.current_index,
                len,
            });
        }
        if snapshot.remaining_seconds > session.time_limit_seconds() {
            return Err(SnapshotError::RemainingExceedsLimit {
                remaining: snapshot.remaining_seconds,
                limit: session.time_limit_seconds(),
            });
        }

        let mut visited = BTreeSet::new();
        for index in snapshot.visited {
            if index >= len {
                return Err(SnapshotError::VisitedOutOfRange { index, len });
            }
            visited.insert(index);
        }
        if !visited.contains(&snapshot.current_index) {
            return Err(SnapshotError::CurrentNotVisited(snapshot.current_index));
        }

        let visited_index = |id: QuestionId| -> Result<(), SnapshotError> {
            let index = session
                .index_of(id)
                .ok_or(SnapshotError::UnknownQuestion(id))?;
            if visited.contains(&index) {
                Ok(())
            } else {
                Err(SnapshotError::NotVisited(id))
            }
        };

        let mut answers = BTreeMap::new();
        for entry in snapshot.answers {
            visited_index(entry.question_id)?;
            if answers.insert(entry.question_id, entry.choice_id).is_some() {
                return Err(SnapshotError::DuplicateAnswer(entry.question_id));
            }
        }

        let mut marked = BTreeSet::new();
        for id in snapshot.marked_for_review {
            visited_index(id)?;
            marked.insert(id);
        }

        let phase = snapshot
            .submitted
            .map_or(SubmitPhase::Idle, SubmitPhase::Submitted);

        Ok(Self {
            session,
            answers,
            visited,
            marked,
            current: snapshot.current_index,
            remaining_seconds: snapshot.remaining_seconds,
            phase,
        })
    }

    /// Capture the full state for durable storage.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            version: SNAPSHOT_VERSION,
            session_id: self.session.id(),
            time_limit_seconds: self.session.time_limit_seconds(),
            questions: self.session.questions().to_vec(),
            answers: self.answer_entries(),
            visited: self.visited.iter().copied().collect(),
            marked_for_review: self.marked.iter().copied().collect(),
            current_index: self.current,
            remaining_seconds: self.remaining_seconds,
            submitted: match self.phase {
                SubmitPhase::Submitted(result) => Some(result),
                _ => None,
            },
        }
    }

    // ─── Accessors ────────────────────────────────────────────────────────────

    #[must_use]
    pub fn id(&self) -> SessionId {
        self.session.id()
    }

    #[must_use]
    pub fn session(&self) -> &TestSession {
        &self.session
    }

    #[must_use]
    pub fn current_index(&self) -> usize {
        self.current
    }

    #[must_use]
    pub fn current_question(&self) -> &QuestionRef {
        &self.session.questions()[self.current]
    }

    #[must_use]
    pub fn remaining_seconds(&self) -> u32 {
        self.remaining_seconds
    }

    #[must_use]
    pub fn answer_for(&self, id: QuestionId) -> Option<ChoiceId> {
        self.answers.get(&id).copied()
    }

    #[must_use]
    pub fn answers(&self) -> &BTreeMap<QuestionId, ChoiceId> {
        &self.answers
    }

    #[must_use]
    pub fn visited(&self) -> &BTreeSet<usize> {
        &self.visited
    }

    #[must_use]
    pub fn marked_for_review(&self) -> &BTreeSet<QuestionId> {
        &self.marked
    }

    #[must_use]
    pub fn is_marked(&self, id: QuestionId) -> bool {
        self.marked.contains(&id)
    }

    #[must_use]
    pub fn phase(&self) -> SubmitPhase {
        self.phase
    }

    /// True while the countdown should keep running.
    #[must_use]
    pub fn is_ticking(&self) -> bool {
        self.phase == SubmitPhase::Idle && self.remaining_seconds > 0
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.remaining_seconds == 0
    }

    #[must_use]
    pub fn is_submitted(&self) -> bool {
        matches!(self.phase, SubmitPhase::Submitted(_))
    }

    // ─── Answering ────────────────────────────────────────────────────────────

    /// Record `choice` for `question`, replacing any earlier selection.
    ///
    /// Answering implies the question has been displayed, so its index joins
    /// the visited set. Review marks are left untouched.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::UnknownQuestion` if the question is not in this
    /// session, or a phase error if the attempt is not editable.
    pub fn select_answer(
        &mut self,
        question: QuestionId,
        choice: ChoiceId,
    ) -> Result<(), ExamError> {
        self.ensure_editable()?;
        let index = self
            .session
            .index_of(question)
            .ok_or(ExamError::UnknownQuestion(question))?;
        self.answers.insert(question, choice);
        self.visited.insert(index);
        Ok(())
    }

    /// Remove the answer for `question`. Returns whether one was present.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::UnknownQuestion` or a phase error.
    pub fn clear_answer(&mut self, question: QuestionId) -> Result<bool, ExamError> {
        self.ensure_editable()?;
        if !self.session.contains(question) {
            return Err(ExamError::UnknownQuestion(question));
        }
        Ok(self.answers.remove(&question).is_some())
    }

    /// Clear the answer of the question currently displayed.
    ///
    /// # Errors
    ///
    /// Returns a phase error if the attempt is not editable.
    pub fn clear_current(&mut self) -> Result<bool, ExamError> {
        let id = self.current_question().id();
        self.clear_answer(id)
    }

    // ─── Navigation ───────────────────────────────────────────────────────────

    /// Display question `index` and record it as visited.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::InvalidIndex` when `index` is out of range.
    pub fn go_to(&mut self, index: usize) -> Result<(), ExamError> {
        self.ensure_editable()?;
        let len = self.session.len();
        if index >= len {
            return Err(ExamError::InvalidIndex { index, len });
        }
        self.current = index;
        self.visited.insert(index);
        Ok(())
    }

    /// Step back one question. Returns false on the first question.
    ///
    /// # Errors
    ///
    /// Returns a phase error if the attempt is not editable.
    pub fn previous(&mut self) -> Result<bool, ExamError> {
        self.ensure_editable()?;
        match self.current.checked_sub(1) {
            Some(index) => self.go_to(index).map(|()| true),
            None => Ok(false),
        }
    }

    /// Drop the review mark on the current question, then advance.
    ///
    /// Returns whether the pointer moved (false on the last question).
    ///
    /// # Errors
    ///
    /// Returns a phase error if the attempt is not editable.
    pub fn save_and_next(&mut self) -> Result<bool, ExamError> {
        self.ensure_editable()?;
        let id = self.current_question().id();
        self.marked.remove(&id);
        self.advance()
    }

    /// Flag the current question for review (keeping its answer), then advance.
    ///
    /// # Errors
    ///
    /// Returns a phase error if the attempt is not editable.
    pub fn mark_for_review_and_next(&mut self) -> Result<bool, ExamError> {
        self.ensure_editable()?;
        let id = self.current_question().id();
        self.marked.insert(id);
        self.advance()
    }

    fn advance(&mut self) -> Result<bool, ExamError> {
        let next = self.current + 1;
        if next < self.session.len() {
            self.go_to(next)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    // ─── Countdown ────────────────────────────────────────────────────────────

    /// Advance the countdown by one second.
    ///
    /// Only an idle session with time left decrements. The transition to zero
    /// moves the session into `Submitting(Auto)` and hands back the payload;
    /// any later call returns `Halted`.
    pub fn tick(&mut self) -> TickOutcome {
        if !self.is_ticking() {
            return TickOutcome::Halted;
        }
        self.remaining_seconds -= 1;
        if self.remaining_seconds > 0 {
            return TickOutcome::Running {
                remaining: self.remaining_seconds,
            };
        }
        self.phase = SubmitPhase::Submitting(SubmitTrigger::Auto);
        TickOutcome::Expired(self.submission_payload())
    }

    // ─── Submission ───────────────────────────────────────────────────────────

    /// Answers as the grading service expects them; unanswered questions are absent.
    #[must_use]
    pub fn submission_payload(&self) -> SubmissionPayload {
        SubmissionPayload {
            session_id: self.session.id(),
            answers: self.answer_entries(),
        }
    }

    /// Enter `Submitting` and return the payload to send.
    ///
    /// Allowed from `Idle` and from `Failed` (an explicit retry).
    ///
    /// # Errors
    ///
    /// Returns `ExamError::Submitting` while another submission is in flight
    /// and `ExamError::Submitted` once the attempt is done.
    pub fn begin_submit(&mut self, trigger: SubmitTrigger) -> Result<SubmissionPayload, ExamError> {
        match self.phase {
            SubmitPhase::Submitting(_) => Err(ExamError::Submitting),
            SubmitPhase::Submitted(_) => Err(ExamError::Submitted),
            SubmitPhase::Idle | SubmitPhase::Failed(_) => {
                self.phase = SubmitPhase::Submitting(trigger);
                Ok(self.submission_payload())
            }
        }
    }

    /// Record the grading service's acknowledgment.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::NotSubmitting` if no submission is in flight.
    pub fn complete_submit(&mut self, result: ResultId) -> Result<(), ExamError> {
        match self.phase {
            SubmitPhase::Submitting(_) => {
                self.phase = SubmitPhase::Submitted(result);
                Ok(())
            }
            SubmitPhase::Submitted(_) => Err(ExamError::Submitted),
            SubmitPhase::Idle | SubmitPhase::Failed(_) => Err(ExamError::NotSubmitting),
        }
    }

    /// Record a failed submission. Returns what triggered it.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::NotSubmitting` if no submission is in flight.
    pub fn fail_submit(&mut self) -> Result<SubmitTrigger, ExamError> {
        match self.phase {
            SubmitPhase::Submitting(trigger) => {
                self.phase = SubmitPhase::Failed(trigger);
                Ok(trigger)
            }
            SubmitPhase::Submitted(_) => Err(ExamError::Submitted),
            SubmitPhase::Idle | SubmitPhase::Failed(_) => Err(ExamError::NotSubmitting),
        }
    }

    /// Dismiss a failed submission and resume the attempt.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::TimeExpired` when no time is left (only a retry is
    /// possible) and `ExamError::NothingToAcknowledge` outside `Failed`.
    pub fn acknowledge_failure(&mut self) -> Result<(), ExamError> {
        match self.phase {
            SubmitPhase::Failed(_) if self.remaining_seconds == 0 => Err(ExamError::TimeExpired),
            SubmitPhase::Failed(_) => {
                self.phase = SubmitPhase::Idle;
                Ok(())
            }
            _ => Err(ExamError::NothingToAcknowledge),
        }
    }

    // ─── Palette ──────────────────────────────────────────────────────────────

    /// Status of question `index`.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::InvalidIndex` when `index` is out of range.
    pub fn palette_status(&self, index: usize) -> Result<PaletteStatus, ExamError> {
        let question = self
            .session
            .question(index)
            .ok_or(ExamError::InvalidIndex {
                index,
                len: self.session.len(),
            })?;
        Ok(self.status_of(index, question.id()))
    }

    /// Status of every question, in session order.
    #[must_use]
    pub fn palette(&self) -> Vec<PaletteStatus> {
        self.session
            .questions()
            .iter()
            .enumerate()
            .map(|(index, question)| self.status_of(index, question.id()))
            .collect()
    }

    #[must_use]
    pub fn palette_counts(&self) -> PaletteCounts {
        let mut counts = PaletteCounts::default();
        for status in self.palette() {
            counts.add(status);
        }
        counts
    }

    fn status_of(&self, index: usize, id: QuestionId) -> PaletteStatus {
        PaletteStatus::classify(
            self.answers.contains_key(&id),
            self.marked.contains(&id),
            self.visited.contains(&index),
        )
    }

    fn answer_entries(&self) -> Vec<AnswerEntry> {
        self.answers
            .iter()
            .map(|(question_id, choice_id)| AnswerEntry {
                question_id: *question_id,
                choice_id: *choice_id,
            })
            .collect()
    }

    fn ensure_editable(&self) -> Result<(), ExamError> {
        match self.phase {
            SubmitPhase::Idle if self.remaining_seconds == 0 => Err(ExamError::TimeExpired),
            SubmitPhase::Idle => Ok(()),
            SubmitPhase::Submitting(_) => Err(ExamError::Submitting),
            SubmitPhase::Failed(_) => Err(ExamError::SubmissionPending),
            SubmitPhase::Submitted(_) => Err(ExamError::Submitted),
        }
    }
}

impl fmt::Debug for ExamSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSession")
            .field("session_id", &self.session.id())
            .field("questions_len", &self.session.len())
            .field("current", &self.current)
            .field("answers_len", &self.answers.len())
            .field("marked_len", &self.marked.len())
            .field("remaining_seconds", &self.remaining_seconds)
            .field("phase", &self.phase)
            .finish_non_exhaustive()
    }
}

//
// ─── TESTS ─────────────────────────────────────────────────────────────────────
//
