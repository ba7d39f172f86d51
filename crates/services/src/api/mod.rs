//! Remote collaborators of an attempt: test generation, grading and results.

use async_trait::async_trait;

use exam_core::model::{ResultId, SessionId, SubmissionPayload, TestConfig, TestResult, TestSession};

use crate::error::ApiError;

mod client;

pub use client::ApiClient;

/// Produces a fresh test session for a configuration.
#[async_trait]
pub trait SessionSource: Send + Sync {
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails or the payload is invalid.
    async fn generate(&self, config: &TestConfig) -> Result<TestSession, ApiError>;
}

/// Accepts a finished attempt for grading.
#[async_trait]
pub trait SubmissionSink: Send + Sync {
    /// Submit the answers and return the id of the graded result.
    ///
    /// # Errors
    ///
    /// Returns `ApiError` if the request is rejected or fails in transit.
    async fn submit(&self, payload: &SubmissionPayload) -> Result<ResultId, ApiError>;
}

/// Reads back the graded result of a submitted session.
#[async_trait]
pub trait ResultSource: Send + Sync {
    /// # Errors
    ///
    /// Returns `ApiError` if the request fails.
    async fn fetch_result(&self, session: SessionId) -> Result<TestResult, ApiError>;
}
