mod controller;
mod runner;
mod view;
mod workflow;

pub use controller::{ClockStep, ExamController, PendingSubmission, TickReport};
pub use runner::{ExamCommand, ExamRunner, RunnerExit, RunnerHandle, TICK_PERIOD};
pub use view::ExamView;
pub use workflow::{ExamLoopService, Instructions, ResultSummary};
