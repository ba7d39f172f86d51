use std::sync::Arc;

use tracing::{debug, info, warn};

use exam_core::model::{ChoiceId, QuestionId, ResultId, SubmissionPayload, TestSession};
use exam_core::ExamError;
use exam_core::exam::TickOutcome;
use exam_core::{ExamSession, SessionSnapshot, SubmitPhase, SubmitTrigger};
use storage::snapshots::SnapshotRepository;

use crate::api::SubmissionSink;
use crate::error::{ApiError, ExamServiceError};

/// A submission that has claimed the session's submit guard but not yet been sent.
///
/// Holding one means the session is in `Submitting`; the outcome of
/// [`PendingSubmission::send`] must be handed back to
/// [`ExamController::finish_submit`].
pub struct PendingSubmission {
    trigger: SubmitTrigger,
    payload: SubmissionPayload,
    sink: Arc<dyn SubmissionSink>,
}

impl PendingSubmission {
    #[must_use]
    pub fn trigger(&self) -> SubmitTrigger {
        self.trigger
    }

    #[must_use]
    pub fn payload(&self) -> &SubmissionPayload {
        &self.payload
    }

    /// Perform the network call.
    ///
    /// # Errors
    ///
    /// Returns the sink's `ApiError` unchanged.
    pub async fn send(self) -> Result<ResultId, ApiError> {
        self.sink.submit(&self.payload).await
    }
}

impl std::fmt::Debug for PendingSubmission {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingSubmission")
            .field("trigger", &self.trigger)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

/// Result of advancing the clock without waiting on the network.
#[derive(Debug)]
pub enum ClockStep {
    Running { remaining: u32 },
    /// Time ran out; the auto-submit is ready to send.
    Expired(PendingSubmission),
    Halted,
}

/// Result of [`ExamController::tick`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickReport {
    Running { remaining: u32 },
    Submitted(ResultId),
    Halted,
}

/// Drives one attempt: applies candidate actions to the session, writes the
/// snapshot after every change, and talks to the grading service.
pub struct ExamController {
    exam: ExamSession,
    snapshots: SnapshotRepository,
    sink: Arc<dyn SubmissionSink>,
}

impl ExamController {
    /// Begin a fresh attempt and persist its first snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Storage` if the snapshot cannot be written.
    pub async fn start(
        session: TestSession,
        snapshots: SnapshotRepository,
        sink: Arc<dyn SubmissionSink>,
    ) -> Result<Self, ExamServiceError> {
        let controller = Self {
            exam: ExamSession::start(session),
            snapshots,
            sink,
        };
        controller.persist().await?;
        info!(
            session_id = %controller.exam.id(),
            remaining = controller.exam.remaining_seconds(),
            "attempt started"
        );
        Ok(controller)
    }

    /// Rebuild an attempt from its stored snapshot, time left included.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Snapshot` if the snapshot is inconsistent.
    pub fn resume(
        snapshot: SessionSnapshot,
        snapshots: SnapshotRepository,
        sink: Arc<dyn SubmissionSink>,
    ) -> Result<Self, ExamServiceError> {
        let exam = ExamSession::restore(snapshot)?;
        info!(
            session_id = %exam.id(),
            remaining = exam.remaining_seconds(),
            answered = exam.answers().len(),
            "attempt resumed"
        );
        Ok(Self {
            exam,
            snapshots,
            sink,
        })
    }

    #[must_use]
    pub fn exam(&self) -> &ExamSession {
        &self.exam
    }

    /// True when time has run out and no submission has been made since.
    ///
    /// This is the state of an attempt reloaded after an unacknowledged
    /// auto-submit; the submission has to be sent again.
    #[must_use]
    pub fn needs_resubmit(&self) -> bool {
        self.exam.is_expired() && self.exam.phase() == SubmitPhase::Idle
    }

    /// Grading result id once the attempt has been acknowledged, including
    /// one restored from a submitted snapshot.
    #[must_use]
    pub fn result_id(&self) -> Option<ResultId> {
        match self.exam.phase() {
            SubmitPhase::Submitted(result) => Some(result),
            _ => None,
        }
    }

    // ─── Candidate actions ────────────────────────────────────────────────────
    //
    // Each action is applied to a copy of the session and only takes effect
    // once its snapshot is stored, so an `Err` always means nothing changed.

    /// # Errors
    ///
    /// Returns `ExamServiceError::Exam` if the action is not allowed now, or
    /// `ExamServiceError::Storage` if the snapshot write fails.
    pub async fn select_answer(
        &mut self,
        question: QuestionId,
        choice: ChoiceId,
    ) -> Result<(), ExamServiceError> {
        self.commit(|exam| exam.select_answer(question, choice)).await
    }

    /// Returns whether an answer was removed.
    ///
    /// # Errors
    ///
    /// See [`ExamController::select_answer`].
    pub async fn clear_answer(&mut self, question: QuestionId) -> Result<bool, ExamServiceError> {
        self.commit(|exam| exam.clear_answer(question)).await
    }

    /// # Errors
    ///
    /// See [`ExamController::select_answer`].
    pub async fn clear_current(&mut self) -> Result<bool, ExamServiceError> {
        self.commit(ExamSession::clear_current).await
    }

    /// # Errors
    ///
    /// Returns `ExamError::InvalidIndex` through `ExamServiceError::Exam` for
    /// an out-of-range index.
    pub async fn go_to(&mut self, index: usize) -> Result<(), ExamServiceError> {
        self.commit(|exam| exam.go_to(index)).await
    }

    /// # Errors
    ///
    /// See [`ExamController::select_answer`].
    pub async fn previous(&mut self) -> Result<bool, ExamServiceError> {
        self.commit(ExamSession::previous).await
    }

    /// # Errors
    ///
    /// See [`ExamController::select_answer`].
    pub async fn save_and_next(&mut self) -> Result<bool, ExamServiceError> {
        self.commit(ExamSession::save_and_next).await
    }

    /// # Errors
    ///
    /// See [`ExamController::select_answer`].
    pub async fn mark_for_review_and_next(&mut self) -> Result<bool, ExamServiceError> {
        self.commit(ExamSession::mark_for_review_and_next).await
    }

    /// Dismiss a failed manual submission so the attempt can continue.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::TimeExpired` once time is up (only a retry is
    /// possible then) and `ExamError::NothingToAcknowledge` without a failure.
    pub fn acknowledge_failure(&mut self) -> Result<(), ExamServiceError> {
        self.exam.acknowledge_failure()?;
        debug!(session_id = %self.exam.id(), "submission failure acknowledged");
        Ok(())
    }

    // ─── Countdown ────────────────────────────────────────────────────────────

    /// Advance one second and persist. On expiry the auto-submit is claimed
    /// and returned for the caller to send.
    ///
    /// Snapshot write failures here are logged rather than returned; the
    /// countdown has no caller to report them to.
    pub async fn advance_clock(&mut self) -> ClockStep {
        match self.exam.tick() {
            TickOutcome::Halted => ClockStep::Halted,
            TickOutcome::Running { remaining } => {
                self.persist_logged().await;
                ClockStep::Running { remaining }
            }
            TickOutcome::Expired(payload) => {
                self.persist_logged().await;
                info!(session_id = %self.exam.id(), "time is up; submitting");
                ClockStep::Expired(PendingSubmission {
                    trigger: SubmitTrigger::Auto,
                    payload,
                    sink: Arc::clone(&self.sink),
                })
            }
        }
    }

    /// Advance one second, sending the auto-submit inline when time runs out.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::SubmissionFailed` if the auto-submit fails.
    pub async fn tick(&mut self) -> Result<TickReport, ExamServiceError> {
        match self.advance_clock().await {
            ClockStep::Running { remaining } => Ok(TickReport::Running { remaining }),
            ClockStep::Halted => Ok(TickReport::Halted),
            ClockStep::Expired(pending) => {
                let outcome = pending.send().await;
                self.finish_submit(outcome).await.map(TickReport::Submitted)
            }
        }
    }

    // ─── Submission ───────────────────────────────────────────────────────────

    /// Claim the submit guard and return the submission to send.
    ///
    /// Once time is up every submission counts as the auto-submit, including
    /// retries the candidate starts by hand.
    ///
    /// # Errors
    ///
    /// Returns `ExamError::Submitting` while another submission is in flight
    /// and `ExamError::Submitted` after the attempt has been graded.
    pub fn begin_submit(
        &mut self,
        trigger: SubmitTrigger,
    ) -> Result<PendingSubmission, ExamServiceError> {
        let trigger = if self.exam.is_expired() {
            SubmitTrigger::Auto
        } else {
            trigger
        };
        let payload = self.exam.begin_submit(trigger)?;
        info!(
            session_id = %self.exam.id(),
            ?trigger,
            answers = payload.answers.len(),
            "submitting attempt"
        );
        Ok(PendingSubmission {
            trigger,
            payload,
            sink: Arc::clone(&self.sink),
        })
    }

    /// Record the outcome of a [`PendingSubmission`].
    ///
    /// On success the stored snapshot is removed and the attempt becomes
    /// terminal. If the removal fails the snapshot is overwritten with a
    /// submitted marker instead, so a later resume cannot send it again.
    /// On failure the snapshot is kept and the error is returned for display.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::SubmissionFailed` when the grading service
    /// rejected or never received the submission.
    pub async fn finish_submit(
        &mut self,
        outcome: Result<ResultId, ApiError>,
    ) -> Result<ResultId, ExamServiceError> {
        let id = self.exam.id();
        match outcome {
            Ok(result_id) => {
                self.exam.complete_submit(result_id)?;
                info!(session_id = %id, result_id = %result_id, "attempt submitted");
                self.forget_snapshot().await;
                Ok(result_id)
            }
            Err(source) => {
                let trigger = self.exam.fail_submit()?;
                warn!(session_id = %id, ?trigger, error = %source, "submission failed");
                Err(ExamServiceError::SubmissionFailed { trigger, source })
            }
        }
    }

    /// Submit and wait for the grading service.
    ///
    /// # Errors
    ///
    /// See [`ExamController::begin_submit`] and [`ExamController::finish_submit`].
    pub async fn submit(&mut self, trigger: SubmitTrigger) -> Result<ResultId, ExamServiceError> {
        let pending = self.begin_submit(trigger)?;
        let outcome = pending.send().await;
        self.finish_submit(outcome).await
    }

    /// Re-send the auto-submit of an attempt reloaded with no time left.
    ///
    /// An attempt restored as already submitted returns its stored result id
    /// without contacting the grading service.
    ///
    /// # Errors
    ///
    /// See [`ExamController::submit`].
    pub async fn submit_if_expired(&mut self) -> Result<Option<ResultId>, ExamServiceError> {
        if let Some(result_id) = self.result_id() {
            return Ok(Some(result_id));
        }
        if !self.needs_resubmit() {
            return Ok(None);
        }
        self.submit(SubmitTrigger::Auto).await.map(Some)
    }

    async fn commit<T>(
        &mut self,
        action: impl FnOnce(&mut ExamSession) -> Result<T, ExamError>,
    ) -> Result<T, ExamServiceError> {
        let mut next = self.exam.clone();
        let value = action(&mut next)?;
        self.snapshots.save(&next.snapshot()).await?;
        self.exam = next;
        Ok(value)
    }

    async fn forget_snapshot(&self) {
        let id = self.exam.id();
        let Err(err) = self.snapshots.clear(id).await else {
            return;
        };
        warn!(session_id = %id, error = %err, "failed to remove snapshot after submit");
        if let Err(err) = self.snapshots.save(&self.exam.snapshot()).await {
            warn!(session_id = %id, error = %err, "failed to mark snapshot as submitted");
        }
    }

    async fn persist(&self) -> Result<(), ExamServiceError> {
        self.snapshots.save(&self.exam.snapshot()).await?;
        Ok(())
    }

    async fn persist_logged(&self) {
        if let Err(err) = self.persist().await {
            warn!(session_id = %self.exam.id(), error = %err, "failed to persist snapshot");
        }
    }
}

impl std::fmt::Debug for ExamController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExamController")
            .field("exam", &self.exam)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use exam_core::ExamError;
    use exam_core::model::{Choice, QuestionRef, SessionId};
    use storage::repository::{InMemoryStore, KeyValueStore};

    #[derive(Default)]
    struct ScriptedSink {
        calls: Mutex<Vec<SubmissionPayload>>,
        failures_left: AtomicUsize,
    }

    impl ScriptedSink {
        fn failing(times: usize) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                failures_left: AtomicUsize::new(times),
            }
        }

        fn calls(&self) -> Vec<SubmissionPayload> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl SubmissionSink for ScriptedSink {
        async fn submit(&self, payload: &SubmissionPayload) -> Result<ResultId, ApiError> {
            self.calls.lock().unwrap().push(payload.clone());
            let failures = self.failures_left.load(Ordering::SeqCst);
            if failures > 0 {
                self.failures_left.store(failures - 1, Ordering::SeqCst);
                return Err(ApiError::HttpStatus(reqwest::StatusCode::BAD_GATEWAY));
            }
            Ok(ResultId::new(77))
        }
    }

    fn session(seconds: u32) -> TestSession {
        let questions = (1..=3)
            .map(|id| {
                QuestionRef::new(
                    QuestionId::new(id),
                    format!("Q{id}"),
                    None,
                    1.0,
                    vec![
                        Choice::new(ChoiceId::new(id * 10 + 1), "a", None),
                        Choice::new(ChoiceId::new(id * 10 + 2), "b", None),
                    ],
                )
                .unwrap()
            })
            .collect();
        TestSession::new(SessionId::new(8), seconds, questions).unwrap()
    }

    async fn started(
        seconds: u32,
        sink: Arc<ScriptedSink>,
    ) -> (ExamController, SnapshotRepository, InMemoryStore) {
        let store = InMemoryStore::new();
        let snapshots = SnapshotRepository::new(Arc::new(store.clone()));
        let controller = ExamController::start(session(seconds), snapshots.clone(), sink)
            .await
            .unwrap();
        (controller, snapshots, store)
    }

    #[tokio::test]
    async fn every_action_is_persisted() {
        let sink = Arc::new(ScriptedSink::default());
        let (mut controller, snapshots, _) = started(120, sink).await;

        controller
            .select_answer(QuestionId::new(1), ChoiceId::new(11))
            .await
            .unwrap();
        let stored = snapshots.load(SessionId::new(8)).await.unwrap().unwrap();
        assert_eq!(stored.answers.len(), 1);

        assert!(controller.mark_for_review_and_next().await.unwrap());
        controller.go_to(2).await.unwrap();
        assert!(controller.previous().await.unwrap());
        controller.tick().await.unwrap();

        let stored = snapshots.load(SessionId::new(8)).await.unwrap().unwrap();
        assert_eq!(stored.current_index, 1);
        assert_eq!(stored.marked_for_review, vec![QuestionId::new(1)]);
        assert_eq!(stored.remaining_seconds, 119);
    }

    #[tokio::test]
    async fn rejected_action_leaves_snapshot_untouched() {
        let sink = Arc::new(ScriptedSink::default());
        let (mut controller, snapshots, _) = started(120, sink).await;

        let err = controller.go_to(3).await.unwrap_err();
        assert!(matches!(
            err,
            ExamServiceError::Exam(ExamError::InvalidIndex { index: 3, len: 3 })
        ));
        let stored = snapshots.load(SessionId::new(8)).await.unwrap().unwrap();
        assert_eq!(stored.current_index, 0);
    }

    #[tokio::test]
    async fn expiry_submits_once_and_clears_snapshot() {
        let sink = Arc::new(ScriptedSink::default());
        let (mut controller, _, store) = started(3, Arc::clone(&sink)).await;
        controller
            .select_answer(QuestionId::new(2), ChoiceId::new(22))
            .await
            .unwrap();

        assert_eq!(
            controller.tick().await.unwrap(),
            TickReport::Running { remaining: 2 }
        );
        controller.tick().await.unwrap();
        assert_eq!(
            controller.tick().await.unwrap(),
            TickReport::Submitted(ResultId::new(77))
        );
        assert_eq!(controller.tick().await.unwrap(), TickReport::Halted);

        assert_eq!(sink.calls().len(), 1);
        assert_eq!(sink.calls()[0].answers.len(), 1);
        assert!(store.get("exam_session:8").await.unwrap().is_none());
        assert_eq!(
            controller.exam().phase(),
            SubmitPhase::Submitted(ResultId::new(77))
        );

        let err = controller.submit(SubmitTrigger::Manual).await.unwrap_err();
        assert!(matches!(err, ExamServiceError::Exam(ExamError::Submitted)));
        assert_eq!(sink.calls().len(), 1);
    }

    #[tokio::test]
    async fn claimed_submission_blocks_a_second_one() {
        let sink = Arc::new(ScriptedSink::default());
        let (mut controller, _, _) = started(60, Arc::clone(&sink)).await;

        let pending = controller.begin_submit(SubmitTrigger::Manual).unwrap();
        let err = controller.begin_submit(SubmitTrigger::Manual).unwrap_err();
        assert!(matches!(err, ExamServiceError::Exam(ExamError::Submitting)));
        assert_eq!(controller.tick().await.unwrap(), TickReport::Halted);

        let outcome = pending.send().await;
        controller.finish_submit(outcome).await.unwrap();
        assert_eq!(sink.calls().len(), 1);
    }

    #[tokio::test]
    async fn manual_failure_keeps_snapshot_and_can_be_dismissed() {
        let sink = Arc::new(ScriptedSink::failing(1));
        let (mut controller, _, store) = started(60, Arc::clone(&sink)).await;
        controller
            .select_answer(QuestionId::new(1), ChoiceId::new(12))
            .await
            .unwrap();

        let err = controller.submit(SubmitTrigger::Manual).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(
            err,
            ExamServiceError::SubmissionFailed {
                trigger: SubmitTrigger::Manual,
                ..
            }
        ));
        assert!(store.get("exam_session:8").await.unwrap().is_some());

        let err = controller.save_and_next().await.unwrap_err();
        assert!(matches!(err, ExamServiceError::Exam(ExamError::SubmissionPending)));
        assert_eq!(controller.tick().await.unwrap(), TickReport::Halted);

        controller.acknowledge_failure().unwrap();
        assert_eq!(
            controller.tick().await.unwrap(),
            TickReport::Running { remaining: 59 }
        );

        let result = controller.submit(SubmitTrigger::Manual).await.unwrap();
        assert_eq!(result, ResultId::new(77));
        assert_eq!(sink.calls().len(), 2);
    }

    #[tokio::test]
    async fn auto_failure_can_only_be_retried() {
        let sink = Arc::new(ScriptedSink::failing(1));
        let (mut controller, _, store) = started(1, Arc::clone(&sink)).await;

        let err = controller.tick().await.unwrap_err();
        assert!(err.user_message().contains("contact support"));
        assert!(store.get("exam_session:8").await.unwrap().is_some());

        let err = controller.acknowledge_failure().unwrap_err();
        assert!(matches!(err, ExamServiceError::Exam(ExamError::TimeExpired)));

        let pending = controller.begin_submit(SubmitTrigger::Manual).unwrap();
        assert_eq!(pending.trigger(), SubmitTrigger::Auto);
        let outcome = pending.send().await;
        controller.finish_submit(outcome).await.unwrap();
        assert!(store.get("exam_session:8").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn expired_snapshot_is_resubmitted_on_resume() {
        let sink = Arc::new(ScriptedSink::default());
        let store = InMemoryStore::new();
        let snapshots = SnapshotRepository::new(Arc::new(store.clone()));

        let mut exam = ExamSession::start(session(2));
        exam.select_answer(QuestionId::new(3), ChoiceId::new(31)).unwrap();
        exam.tick();
        let mut snapshot = exam.snapshot();
        snapshot.remaining_seconds = 0;
        snapshots.save(&snapshot).await.unwrap();

        let mut controller = ExamController::resume(snapshot, snapshots, sink.clone()).unwrap();
        assert!(controller.needs_resubmit());
        assert_eq!(
            controller.submit_if_expired().await.unwrap(),
            Some(ResultId::new(77))
        );
        assert_eq!(controller.submit_if_expired().await.unwrap(), None);
        assert_eq!(sink.calls().len(), 1);
        assert!(store.get("exam_session:8").await.unwrap().is_none());
    }
}
