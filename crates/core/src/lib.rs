#![forbid(unsafe_code)]

pub mod error;
pub mod exam;
pub mod model;
pub mod time;

pub use error::Error;
pub use exam::{ExamError, ExamSession, PaletteStatus, SessionSnapshot, SubmitPhase, SubmitTrigger};
pub use time::format_remaining;
