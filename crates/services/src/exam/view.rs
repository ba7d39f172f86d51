use exam_core::exam::PaletteCounts;
use exam_core::format_remaining;
use exam_core::model::{ChoiceId, QuestionRef, SessionId};
use exam_core::{ExamSession, PaletteStatus, SubmitPhase};

/// Everything a front end needs to draw the attempt screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ExamView {
    pub session_id: SessionId,
    pub current_index: usize,
    pub question_count: usize,
    pub question: QuestionRef,
    pub selected: Option<ChoiceId>,
    pub marked: bool,
    pub remaining_seconds: u32,
    pub palette: Vec<PaletteStatus>,
    pub counts: PaletteCounts,
    pub phase: SubmitPhase,
    /// Message from the last failed submission, cleared by the next attempt.
    pub notice: Option<String>,
}

impl ExamView {
    #[must_use]
    pub fn from_session(exam: &ExamSession, notice: Option<String>) -> Self {
        let question = exam.current_question().clone();
        Self {
            session_id: exam.id(),
            current_index: exam.current_index(),
            question_count: exam.session().len(),
            selected: exam.answer_for(question.id()),
            marked: exam.is_marked(question.id()),
            question,
            remaining_seconds: exam.remaining_seconds(),
            palette: exam.palette(),
            counts: exam.palette_counts(),
            phase: exam.phase(),
            notice,
        }
    }

    /// Countdown as `H:MM:SS`.
    #[must_use]
    pub fn remaining_display(&self) -> String {
        format_remaining(self.remaining_seconds)
    }

    #[must_use]
    pub fn is_last_question(&self) -> bool {
        self.current_index + 1 == self.question_count
    }
}
