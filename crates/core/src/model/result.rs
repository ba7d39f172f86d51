use std::fmt;

use serde::{Deserialize, Serialize};

use crate::model::ids::{ChoiceId, QuestionId};

/// Graded result of a submitted attempt, as returned by the result endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    pub score: f64,
    pub questions: Vec<QuestionOutcome>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionOutcome {
    pub question: GradedQuestion,
    pub awarded_marks: f64,
    #[serde(default)]
    pub is_correct: bool,
    #[serde(default)]
    pub selected_choice: Option<SelectedChoice>,
    /// Multiple-select questions report every picked choice here.
    #[serde(default)]
    pub selected_choices: Vec<SelectedChoice>,
    /// Typed answer for numerical-answer (NAT) questions.
    #[serde(default)]
    pub nat_answer: Option<NatValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradedQuestion {
    pub id: QuestionId,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub question_type: Option<String>,
    #[serde(default)]
    pub choices: Vec<GradedChoice>,
    #[serde(default)]
    pub nat_min: Option<NatValue>,
    #[serde(default)]
    pub nat_max: Option<NatValue>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GradedChoice {
    pub id: ChoiceId,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub is_correct: bool,
}

/// Numeric answer or bound; decimal fields may arrive as JSON strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NatValue {
    Number(f64),
    Text(String),
}

impl fmt::Display for NatValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NatValue::Number(value) => write!(f, "{value}"),
            NatValue::Text(value) => f.write_str(value),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectedChoice {
    pub id: ChoiceId,
}

/// Tally of question outcomes by the sign of the awarded marks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub correct: usize,
    pub incorrect: usize,
    pub unattempted: usize,
}

impl GradedQuestion {
    #[must_use]
    pub fn is_numerical(&self) -> bool {
        self.question_type.as_deref() == Some("NAT")
    }
}

impl QuestionOutcome {
    /// Whether the candidate picked `choice`, single or multiple select.
    #[must_use]
    pub fn is_selected(&self, choice: ChoiceId) -> bool {
        self.selected_choice.is_some_and(|selected| selected.id == choice)
            || self.selected_choices.iter().any(|selected| selected.id == choice)
    }

    #[must_use]
    pub fn is_attempted(&self) -> bool {
        self.selected_choice.is_some()
            || !self.selected_choices.is_empty()
            || self.nat_answer.is_some()
    }
}

impl TestResult {
    /// Score as a percentage of the question count, one mark per question.
    ///
    /// Returns 0 when the result has no questions.
    #[must_use]
    pub fn percentage(&self) -> f64 {
        if self.questions.is_empty() {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        let total = self.questions.len() as f64;
        self.score / total * 100.0
    }

    #[must_use]
    pub fn outcome_counts(&self) -> OutcomeCounts {
        let mut counts = OutcomeCounts::default();
        for outcome in &self.questions {
            if outcome.awarded_marks > 0.0 {
                counts.correct += 1;
            } else if outcome.awarded_marks < 0.0 || outcome.is_attempted() {
                counts.incorrect += 1;
            } else {
                counts.unattempted += 1;
            }
        }
        counts
    }
}
