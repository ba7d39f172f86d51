use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::model::ids::BranchId;

pub const MIN_QUESTIONS: u32 = 1;
pub const MAX_QUESTIONS: u32 = 50;
pub const MIN_TIME_LIMIT_MINUTES: u32 = 5;
pub const MAX_TIME_LIMIT_MINUTES: u32 = 180;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum TestConfigError {
    #[error("number of questions must be between 1 and 50, got {0}")]
    QuestionCount(u32),

    #[error("time limit must be between 5 and 180 minutes, got {0}")]
    TimeLimit(u32),

    #[error("unknown category: {0}")]
    UnknownCategory(String),
}

/// Question pool a generated test may draw from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "General Aptitude")]
    GeneralAptitude,
    #[serde(rename = "Engineering Mathematics")]
    EngineeringMathematics,
    #[serde(rename = "Subject Paper")]
    SubjectPaper,
}

impl Category {
    pub const ALL: [Category; 3] = [
        Category::GeneralAptitude,
        Category::EngineeringMathematics,
        Category::SubjectPaper,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Category::GeneralAptitude => "General Aptitude",
            Category::EngineeringMathematics => "Engineering Mathematics",
            Category::SubjectPaper => "Subject Paper",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for Category {
    type Err = TestConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Category::ALL
            .into_iter()
            .find(|category| {
                category.label().eq_ignore_ascii_case(wanted)
                    || format!("{category:?}").eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| TestConfigError::UnknownCategory(wanted.to_string()))
    }
}

/// Unvalidated test configuration as collected from the candidate.
#[derive(Debug, Clone)]
pub struct TestConfigDraft {
    pub branch_id: Option<BranchId>,
    pub categories: Vec<Category>,
    pub number_of_questions: u32,
    pub time_limit_minutes: u32,
    pub allow_repeats: bool,
}

impl Default for TestConfigDraft {
    fn default() -> Self {
        Self {
            branch_id: None,
            categories: Vec::new(),
            number_of_questions: 10,
            time_limit_minutes: 15,
            allow_repeats: true,
        }
    }
}

impl TestConfigDraft {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate ranges and normalize the category list.
    ///
    /// An empty category list means "all categories".
    ///
    /// # Errors
    ///
    /// Returns `TestConfigError` if the question count or time limit is out of range.
    pub fn validate(self) -> Result<TestConfig, TestConfigError> {
        if !(MIN_QUESTIONS..=MAX_QUESTIONS).contains(&self.number_of_questions) {
            return Err(TestConfigError::QuestionCount(self.number_of_questions));
        }
        if !(MIN_TIME_LIMIT_MINUTES..=MAX_TIME_LIMIT_MINUTES).contains(&self.time_limit_minutes) {
            return Err(TestConfigError::TimeLimit(self.time_limit_minutes));
        }

        let mut categories = self.categories;
        categories.sort();
        categories.dedup();

        Ok(TestConfig {
            branch_id: self.branch_id,
            categories,
            number_of_questions: self.number_of_questions,
            time_limit_minutes: self.time_limit_minutes,
            allow_repeats: self.allow_repeats,
        })
    }
}

/// Validated request body for the test-generation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestConfig {
    branch_id: Option<BranchId>,
    categories: Vec<Category>,
    number_of_questions: u32,
    time_limit_minutes: u32,
    allow_repeats: bool,
}

impl TestConfig {
    #[must_use]
    pub fn branch_id(&self) -> Option<BranchId> {
        self.branch_id
    }

    #[must_use]
    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    #[must_use]
    pub fn number_of_questions(&self) -> u32 {
        self.number_of_questions
    }

    #[must_use]
    pub fn time_limit_minutes(&self) -> u32 {
        self.time_limit_minutes
    }

    #[must_use]
    pub fn allow_repeats(&self) -> bool {
        self.allow_repeats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_draft_is_valid() {
        let config = TestConfigDraft::new().validate().unwrap();
        assert_eq!(config.number_of_questions(), 10);
        assert_eq!(config.time_limit_minutes(), 15);
        assert!(config.allow_repeats());
    }

    #[test]
    fn rejects_out_of_range_values() {
        let draft = TestConfigDraft {
            number_of_questions: 51,
            ..TestConfigDraft::default()
        };
        assert_eq!(draft.validate().unwrap_err(), TestConfigError::QuestionCount(51));

        let draft = TestConfigDraft {
            time_limit_minutes: 4,
            ..TestConfigDraft::default()
        };
        assert_eq!(draft.validate().unwrap_err(), TestConfigError::TimeLimit(4));
    }

    #[test]
    fn dedups_categories_and_serializes_labels() {
        let draft = TestConfigDraft {
            branch_id: Some(BranchId::new(3)),
            categories: vec![
                Category::SubjectPaper,
                Category::GeneralAptitude,
                Category::SubjectPaper,
            ],
            ..TestConfigDraft::default()
        };
        let config = draft.validate().unwrap();
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "branch_id": 3,
                "categories": ["General Aptitude", "Subject Paper"],
                "number_of_questions": 10,
                "time_limit_minutes": 15,
                "allow_repeats": true
            })
        );
    }

    #[test]
    fn parses_category_names() {
        assert_eq!(
            "engineering mathematics".parse::<Category>().unwrap(),
            Category::EngineeringMathematics
        );
        assert_eq!(
            "SubjectPaper".parse::<Category>().unwrap(),
            Category::SubjectPaper
        );
        assert!("History".parse::<Category>().is_err());
    }
}
