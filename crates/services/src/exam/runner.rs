//! Event loop that owns a live attempt.
//!
//! One task serializes three event sources: the one-second countdown, candidate
//! commands, and the completion of the in-flight submission. Because they are
//! handled one at a time, the submit guard in `ExamSession` is all that is
//! needed to keep the auto-submit and a manual submit from both going out.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::{debug, warn};

use exam_core::SubmitTrigger;
use exam_core::model::{ChoiceId, QuestionId, ResultId};

use super::controller::{ClockStep, ExamController, PendingSubmission};
use super::view::ExamView;
use crate::error::{ApiError, ExamServiceError};

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

const COMMAND_BUFFER: usize = 32;

type SubmissionFuture = Pin<Box<dyn Future<Output = Result<ResultId, ApiError>> + Send>>;

/// Candidate actions accepted by a running attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExamCommand {
    SelectAnswer {
        question: QuestionId,
        choice: ChoiceId,
    },
    ClearAnswer(QuestionId),
    ClearCurrent,
    GoTo(usize),
    Previous,
    SaveAndNext,
    MarkForReviewAndNext,
    /// Start a manual submission; the outcome arrives through the view.
    Submit,
    AcknowledgeFailure,
}

/// Why the runner task ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerExit {
    Submitted(ResultId),
    /// Every command sender went away before the attempt was submitted.
    Closed,
}

struct Envelope {
    command: ExamCommand,
    reply: oneshot::Sender<Result<(), ExamServiceError>>,
}

pub struct ExamRunner {
    controller: ExamController,
    commands: mpsc::Receiver<Envelope>,
    view: watch::Sender<ExamView>,
    interval: Interval,
    in_flight: Option<SubmissionFuture>,
    notice: Option<String>,
}

impl ExamRunner {
    /// Move the attempt onto its own task and return the handle that drives it.
    ///
    /// An attempt resumed with no time left starts by re-sending its
    /// auto-submit; one restored as already submitted ends at once without
    /// sending anything. Must be called from within a tokio runtime.
    #[must_use]
    pub fn spawn(controller: ExamController) -> RunnerHandle {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (view_tx, view_rx) = watch::channel(ExamView::from_session(controller.exam(), None));
        let runner = Self {
            controller,
            commands: command_rx,
            view: view_tx,
            interval: countdown(),
            in_flight: None,
            notice: None,
        };
        RunnerHandle {
            commands: command_tx,
            view: view_rx,
            task: Some(tokio::spawn(runner.run())),
        }
    }

    async fn run(mut self) -> RunnerExit {
        if let Some(result_id) = self.controller.result_id() {
            return RunnerExit::Submitted(result_id);
        }
        if self.controller.needs_resubmit() {
            match self.controller.begin_submit(SubmitTrigger::Auto) {
                Ok(pending) => self.launch(pending),
                Err(err) => warn!(error = %err, "could not resend expired attempt"),
            }
        }
        self.publish();

        loop {
            tokio::select! {
                outcome = in_flight(&mut self.in_flight) => {
                    self.in_flight = None;
                    let settled = self.controller.finish_submit(outcome).await;
                    if let Err(err) = &settled {
                        self.notice = Some(err.user_message());
                    }
                    self.publish();
                    if let Ok(result_id) = settled {
                        return RunnerExit::Submitted(result_id);
                    }
                }
                _ = self.interval.tick(), if self.controller.exam().is_ticking() => {
                    if let ClockStep::Expired(pending) = self.controller.advance_clock().await {
                        self.launch(pending);
                    }
                    self.publish();
                }
                envelope = self.commands.recv() => {
                    let Some(Envelope { command, reply }) = envelope else {
                        debug!("command channel closed; stopping runner");
                        return RunnerExit::Closed;
                    };
                    let result = self.apply(command).await;
                    self.publish();
                    // The caller may have stopped waiting for the reply.
                    let _ = reply.send(result);
                }
            }
        }
    }

    async fn apply(&mut self, command: ExamCommand) -> Result<(), ExamServiceError> {
        let controller = &mut self.controller;
        match command {
            ExamCommand::SelectAnswer { question, choice } => {
                controller.select_answer(question, choice).await
            }
            ExamCommand::ClearAnswer(question) => {
                controller.clear_answer(question).await.map(|_| ())
            }
            ExamCommand::ClearCurrent => controller.clear_current().await.map(|_| ()),
            ExamCommand::GoTo(index) => controller.go_to(index).await,
            ExamCommand::Previous => controller.previous().await.map(|_| ()),
            ExamCommand::SaveAndNext => controller.save_and_next().await.map(|_| ()),
            ExamCommand::MarkForReviewAndNext => {
                controller.mark_for_review_and_next().await.map(|_| ())
            }
            ExamCommand::Submit => {
                let pending = controller.begin_submit(SubmitTrigger::Manual)?;
                self.launch(pending);
                Ok(())
            }
            ExamCommand::AcknowledgeFailure => {
                controller.acknowledge_failure()?;
                self.notice = None;
                // The countdown restarts a full second after resuming.
                self.interval.reset();
                Ok(())
            }
        }
    }

    fn launch(&mut self, pending: PendingSubmission) {
        self.notice = None;
        self.in_flight = Some(Box::pin(pending.send()));
    }

    fn publish(&self) {
        self.view.send_replace(ExamView::from_session(
            self.controller.exam(),
            self.notice.clone(),
        ));
    }
}

fn countdown() -> Interval {
    let mut interval = time::interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn in_flight(slot: &mut Option<SubmissionFuture>) -> Result<ResultId, ApiError> {
    match slot {
        Some(submission) => submission.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Handle to a running attempt.
///
/// Dropping the handle aborts the runner task, which stops the countdown.
/// The stored snapshot is left in place for a later resume.
pub struct RunnerHandle {
    commands: mpsc::Sender<Envelope>,
    view: watch::Receiver<ExamView>,
    task: Option<JoinHandle<RunnerExit>>,
}

impl RunnerHandle {
    /// Apply a command and wait until the runner has processed it.
    ///
    /// # Errors
    ///
    /// Returns the command's `ExamServiceError`, or
    /// `ExamServiceError::RunnerStopped` if the attempt has already ended.
    pub async fn send(&self, command: ExamCommand) -> Result<(), ExamServiceError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Envelope { command, reply })
            .await
            .map_err(|_| ExamServiceError::RunnerStopped)?;
        response
            .await
            .map_err(|_| ExamServiceError::RunnerStopped)?
    }

    /// Latest published view.
    #[must_use]
    pub fn view(&self) -> ExamView {
        self.view.borrow().clone()
    }

    /// Receiver notified on every view change.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ExamView> {
        self.view.clone()
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the attempt to end.
    ///
    /// # Errors
    ///
    /// Returns `ExamServiceError::RunnerStopped` if the task was cancelled or
    /// panicked.
    pub async fn finished(mut self) -> Result<RunnerExit, ExamServiceError> {
        let task = self.task.take().ok_or(ExamServiceError::RunnerStopped)?;
        task.await.map_err(|_| ExamServiceError::RunnerStopped)
    }
}

impl Drop for RunnerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
