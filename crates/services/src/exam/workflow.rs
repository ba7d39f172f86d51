use std::sync::Arc;

use tracing::{info, warn};

use exam_core::{ExamSession, SessionSnapshot};
use exam_core::model::{SessionId, TestConfigDraft, TestResult, TestSession};
use storage::snapshots::SnapshotRepository;

use super::controller::ExamController;
use crate::api::{ResultSource, SessionSource, SubmissionSink};
use crate::error::ExamServiceError;

/// What the candidate reads before starting an attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct Instructions {
    pub session_id: SessionId,
    pub question_count: usize,
    pub duration_minutes: u32,
    pub total_marks: f64,
    pub remaining_seconds: u32,
    /// Some time has already been spent on this attempt.
    pub resumed: bool,
}

/// Graded result with the figures shown on the result page.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultSummary {
    pub result: TestResult,
    pub percentage: f64,
    pub correct: usize,
    pub incorrect: usize,
    pub unattempted: usize,
}

impl From<TestResult> for ResultSummary {
    fn from(result: TestResult) -> Self {
        let counts = result.outcome_counts();
        Self {
            percentage: result.percentage(),
            correct: counts.correct,
            incorrect: counts.incorrect,
            unattempted: counts.unattempted,
            result,
        }
    }
}

/// Orchestrates an attempt from generation through grading.
#[derive(Clone)]
pub struct ExamLoopService {
    sessions: Arc<dyn SessionSource>,
    sink: Arc<dyn SubmissionSink>,
    results: Arc<dyn ResultSource>,
    snapshots: SnapshotRepository,
}

impl ExamLoopService {
    #[must_use]
    pub fn new(
        sessions: Arc<dyn SessionSource>,
        sink: Arc<dyn SubmissionSink>,
        results: Arc<dyn ResultSource>,
        snapshots: SnapshotRepository,
    ) -> Self {
        Self {
            sessions,
            sink,
            results,
            snapshots,
        }
    }

    /// Validate the configuration, request a new test, and store its first snapshot.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Config` for an out-of-range configuration,
    /// `ExamServiceError::Api` if generation fails, and
    /// `ExamServiceError::Storage` if the snapshot cannot be written.
    pub async fn generate(&self, draft: TestConfigDraft) -> Result<TestSession, ExamServiceError> {
        let config = draft.validate()?;
        let session = self.sessions.generate(&config).await?;
        // A session id the server hands out twice keeps its stored progress.
        if self.snapshots.load(session.id()).await?.is_none() {
            self.snapshots
                .save(&ExamSession::start(session.clone()).snapshot())
                .await?;
        }
        info!(
            session_id = %session.id(),
            questions = session.len(),
            minutes = session.time_limit_minutes(),
            "test generated"
        );
        Ok(session)
    }

    /// # Errors
    ///
    /// Returns `ExamServiceError::SessionNotFound` if nothing is stored for `id`.
    pub async fn instructions(&self, id: SessionId) -> Result<Instructions, ExamServiceError> {
        let exam = ExamSession::restore(self.load(id).await?)?;
        let session = exam.session();
        Ok(Instructions {
            session_id: id,
            question_count: session.len(),
            duration_minutes: session.time_limit_minutes(),
            total_marks: session.total_marks(),
            remaining_seconds: exam.remaining_seconds(),
            resumed: exam.remaining_seconds() < session.time_limit_seconds(),
        })
    }

    /// Resume the stored attempt once the candidate has accepted the instructions.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::InstructionsNotAccepted` without acceptance,
    /// `ExamServiceError::SessionNotFound` if nothing is stored for `id`,
    /// `ExamServiceError::AlreadySubmitted` if the stored attempt was already
    /// graded, and `ExamServiceError::Snapshot` if the stored state is
    /// inconsistent.
    pub async fn begin_attempt(
        &self,
        id: SessionId,
        accepted_instructions: bool,
    ) -> Result<ExamController, ExamServiceError> {
        if !accepted_instructions {
            return Err(ExamServiceError::InstructionsNotAccepted);
        }
        let snapshot = self.load(id).await?;
        if let Some(result) = snapshot.submitted {
            // Leftover marker from a submit whose cleanup failed; retry it.
            if let Err(err) = self.snapshots.clear(id).await {
                warn!(session_id = %id, error = %err, "failed to remove submitted snapshot");
            }
            return Err(ExamServiceError::AlreadySubmitted { session: id, result });
        }
        ExamController::resume(snapshot, self.snapshots.clone(), Arc::clone(&self.sink))
    }

    /// Sessions with a stored attempt that has not been submitted yet.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::Storage` if listing or loading fails.
    pub async fn resumable_sessions(&self) -> Result<Vec<SessionId>, ExamServiceError> {
        let mut resumable = Vec::new();
        for id in self.snapshots.list_sessions().await? {
            let submitted = self
                .snapshots
                .load(id)
                .await?
                .is_none_or(|snapshot| snapshot.is_submitted());
            if !submitted {
                resumable.push(id);
            }
        }
        Ok(resumable)
    }

    /// # Errors
    ///
    /// Returns `ExamServiceError::Api` if the result cannot be fetched.
    pub async fn fetch_result(&self, id: SessionId) -> Result<ResultSummary, ExamServiceError> {
        let result = self.results.fetch_result(id).await?;
        Ok(ResultSummary::from(result))
    }

    async fn load(&self, id: SessionId) -> Result<SessionSnapshot, ExamServiceError> {
        self.snapshots
            .load(id)
            .await?
            .ok_or(ExamServiceError::SessionNotFound(id))
    }
}
