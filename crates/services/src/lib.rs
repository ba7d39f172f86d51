#![forbid(unsafe_code)]

pub mod api;
pub mod app_services;
pub mod config;
pub mod error;
pub mod exam;

pub use app_services::AppServices;
pub use config::ApiConfig;
pub use error::{ApiError, AppServicesError, ConfigError, ExamServiceError};
pub use exam::{
    ExamCommand, ExamController, ExamLoopService, ExamRunner, ExamView, Instructions,
    ResultSummary, RunnerExit, RunnerHandle,
};
