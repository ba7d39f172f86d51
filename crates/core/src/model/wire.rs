//! Records exchanged with the remote coaching API.
//!
//! These mirror the JSON shapes exactly; conversion into domain types happens
//! through `TryFrom` so nothing downstream trusts an unvalidated payload.

use serde::{Deserialize, Serialize};

use crate::model::ids::{ChoiceId, QuestionId, ResultId, SessionId};
use crate::model::question::{Choice, QuestionRef};
use crate::model::session::{TestSession, TestSessionError};

fn default_marks() -> f64 {
    1.0
}

/// Body returned by the test-generation endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionPayload {
    pub id: SessionId,
    pub time_limit_minutes: u64,
    pub questions: Vec<QuestionPayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionPayload {
    pub question_id: QuestionId,
    pub question_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question_image: Option<String>,
    #[serde(default = "default_marks")]
    pub marks: f64,
    pub choices: Vec<ChoicePayload>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChoicePayload {
    pub id: ChoiceId,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

impl TryFrom<SessionPayload> for TestSession {
    type Error = TestSessionError;

    fn try_from(payload: SessionPayload) -> Result<Self, Self::Error> {
        let questions = payload
            .questions
            .into_iter()
            .map(|question| {
                let choices = question
                    .choices
                    .into_iter()
                    .map(|choice| Choice::new(choice.id, choice.text, non_blank(choice.image)))
                    .collect();
                QuestionRef::new(
                    question.question_id,
                    question.question_text,
                    non_blank(question.question_image),
                    question.marks,
                    choices,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        TestSession::with_minutes(payload.id, payload.time_limit_minutes, questions)
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|val| !val.trim().is_empty())
}

/// One selected answer as sent to the grading service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub question_id: QuestionId,
    pub choice_id: ChoiceId,
}

/// Body sent to the submission endpoint. Unanswered questions are absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionPayload {
    #[serde(rename = "sessionId")]
    pub session_id: SessionId,
    pub answers: Vec<AnswerEntry>,
}

/// Acknowledgment returned by the submission endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionReceipt {
    pub id: ResultId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_generation_payload_into_session() {
        let json = r#"{
            "id": 31,
            "time_limit_minutes": 2,
            "questions": [
                {
                    "question_id": 5,
                    "question_text": "2 + 2 = ?",
                    "question_image": "",
                    "marks": 2,
                    "choices": [
                        {"id": 50, "text": "3"},
                        {"id": 51, "text": "4", "image": "https://cdn/4.png"}
                    ]
                },
                {
                    "question_id": 6,
                    "question_text": "Pick one",
                    "choices": [{"id": 60, "text": "only"}]
                }
            ]
        }"#;
        let payload: SessionPayload = serde_json::from_str(json).unwrap();
        let session = TestSession::try_from(payload).unwrap();

        assert_eq!(session.id(), SessionId::new(31));
        assert_eq!(session.time_limit_seconds(), 120);
        assert_eq!(session.len(), 2);
        let first = session.question(0).unwrap();
        assert_eq!(first.image(), None);
        assert_eq!(first.choices()[1].image(), Some("https://cdn/4.png"));
        assert!((session.question(1).unwrap().marks() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_payload_with_empty_choices() {
        let payload = SessionPayload {
            id: SessionId::new(1),
            time_limit_minutes: 10,
            questions: vec![QuestionPayload {
                question_id: QuestionId::new(1),
                question_text: "Q".into(),
                question_image: None,
                marks: 1.0,
                choices: Vec::new(),
            }],
        };
        let err = TestSession::try_from(payload).unwrap_err();
        assert!(matches!(err, TestSessionError::Question(_)));
    }

    #[test]
    fn submission_uses_session_id_key() {
        let payload = SubmissionPayload {
            session_id: SessionId::new(9),
            answers: vec![AnswerEntry {
                question_id: QuestionId::new(1),
                choice_id: ChoiceId::new(2),
            }],
        };
        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "sessionId": 9,
                "answers": [{"question_id": 1, "choice_id": 2}]
            })
        );
    }
}
