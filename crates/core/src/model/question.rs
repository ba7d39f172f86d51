use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::model::ids::{ChoiceId, QuestionId};

//
// ─── ERRORS ───────────────────────────────────────────────────────────────────
//

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum QuestionError {
    #[error("question {0} has no choices")]
    NoChoices(QuestionId),

    #[error("question {question} lists choice {choice} more than once")]
    DuplicateChoice {
        question: QuestionId,
        choice: ChoiceId,
    },

    #[error("question {0} has a non-finite marks value")]
    InvalidMarks(QuestionId),
}

//
// ─── CHOICE ───────────────────────────────────────────────────────────────────
//

/// One selectable option of a multiple-choice question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Choice {
    id: ChoiceId,
    text: String,
    image: Option<String>,
}

impl Choice {
    #[must_use]
    pub fn new(id: ChoiceId, text: impl Into<String>, image: Option<String>) -> Self {
        Self {
            id,
            text: text.into(),
            image,
        }
    }

    #[must_use]
    pub fn id(&self) -> ChoiceId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }
}

//
// ─── QUESTION ─────────────────────────────────────────────────────────────────
//

/// A question as presented during an attempt. Immutable for the session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRef {
    id: QuestionId,
    text: String,
    image: Option<String>,
    marks: f64,
    choices: Vec<Choice>,
}

impl QuestionRef {
    /// Build a question, validating its choices and marks.
    ///
    /// # Errors
    ///
    /// Returns `QuestionError` if there are no choices, a choice id repeats,
    /// or `marks` is NaN/infinite.
    pub fn new(
        id: QuestionId,
        text: impl Into<String>,
        image: Option<String>,
        marks: f64,
        choices: Vec<Choice>,
    ) -> Result<Self, QuestionError> {
        let question = Self {
            id,
            text: text.into(),
            image,
            marks,
            choices,
        };
        question.validate()?;
        Ok(question)
    }

    /// Re-check invariants, used when a question is rehydrated from a snapshot.
    ///
    /// # Errors
    ///
    /// Same conditions as [`QuestionRef::new`].
    pub fn validate(&self) -> Result<(), QuestionError> {
        if !self.marks.is_finite() {
            return Err(QuestionError::InvalidMarks(self.id));
        }
        if self.choices.is_empty() {
            return Err(QuestionError::NoChoices(self.id));
        }
        let mut seen = BTreeSet::new();
        for choice in &self.choices {
            if !seen.insert(choice.id) {
                return Err(QuestionError::DuplicateChoice {
                    question: self.id,
                    choice: choice.id,
                });
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn id(&self) -> QuestionId {
        self.id
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.text
    }

    #[must_use]
    pub fn image(&self) -> Option<&str> {
        self.image.as_deref()
    }

    #[must_use]
    pub fn marks(&self) -> f64 {
        self.marks
    }

    #[must_use]
    pub fn choices(&self) -> &[Choice] {
        &self.choices
    }

    #[must_use]
    pub fn choice(&self, id: ChoiceId) -> Option<&Choice> {
        self.choices.iter().find(|choice| choice.id == id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn choices(ids: &[u64]) -> Vec<Choice> {
        ids.iter()
            .map(|id| Choice::new(ChoiceId::new(*id), format!("option {id}"), None))
            .collect()
    }

    #[test]
    fn rejects_question_without_choices() {
        let err = QuestionRef::new(QuestionId::new(1), "Q", None, 1.0, Vec::new()).unwrap_err();
        assert_eq!(err, QuestionError::NoChoices(QuestionId::new(1)));
    }

    #[test]
    fn rejects_duplicate_choice_ids() {
        let err =
            QuestionRef::new(QuestionId::new(1), "Q", None, 1.0, choices(&[3, 4, 3])).unwrap_err();
        assert_eq!(
            err,
            QuestionError::DuplicateChoice {
                question: QuestionId::new(1),
                choice: ChoiceId::new(3),
            }
        );
    }

    #[test]
    fn rejects_nan_marks() {
        let err =
            QuestionRef::new(QuestionId::new(9), "Q", None, f64::NAN, choices(&[1])).unwrap_err();
        assert_eq!(err, QuestionError::InvalidMarks(QuestionId::new(9)));
    }

    #[test]
    fn looks_up_choice_by_id() {
        let question =
            QuestionRef::new(QuestionId::new(1), "Q", None, 2.0, choices(&[10, 11])).unwrap();
        assert_eq!(question.choice(ChoiceId::new(11)).unwrap().text(), "option 11");
        assert!(question.choice(ChoiceId::new(12)).is_none());
    }
}
