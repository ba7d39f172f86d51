pub mod config;
mod ids;
mod question;
pub mod result;
mod session;
pub mod wire;

pub use config::{Category, TestConfig, TestConfigDraft, TestConfigError};
pub use ids::{BranchId, ChoiceId, ParseIdError, QuestionId, ResultId, SessionId};
pub use question::{Choice, QuestionError, QuestionRef};
pub use result::{OutcomeCounts, TestResult};
pub use session::{TestSession, TestSessionError};
pub use wire::{AnswerEntry, SessionPayload, SubmissionPayload, SubmissionReceipt};
