use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use exam_core::model::{
    ResultId, SessionId, SessionPayload, SubmissionPayload, SubmissionReceipt, TestConfig,
    TestResult, TestSession,
};

use super::{ResultSource, SessionSource, SubmissionSink};
use crate::config::ApiConfig;
use crate::error::ApiError;

/// JSON client for the coaching API.
///
/// Every request carries the configured bearer token. A 401 is reported as
/// [`ApiError::Unauthorized`]; any other non-success status as
/// [`ApiError::HttpStatus`].
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    config: ApiConfig,
}

impl ApiClient {
    /// Build a client with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Http` if the HTTP client cannot be constructed.
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        let client = Client::builder().timeout(config.timeout()).build()?;
        Ok(Self { client, config })
    }

    #[must_use]
    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self.client.request(method, self.config.endpoint(path));
        match self.config.access_token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await?;
        check_status(response.status())?;
        Ok(response.json().await?)
    }
}

fn check_status(status: StatusCode) -> Result<(), ApiError> {
    if status == StatusCode::UNAUTHORIZED {
        return Err(ApiError::Unauthorized);
    }
    if !status.is_success() {
        return Err(ApiError::HttpStatus(status));
    }
    Ok(())
}

#[async_trait]
impl SessionSource for ApiClient {
    async fn generate(&self, config: &TestConfig) -> Result<TestSession, ApiError> {
        let request = self
            .request(Method::POST, "/api/student/tests/generate/")
            .json(config);
        let payload: SessionPayload = self.send_json(request).await?;
        debug!(
            session_id = %payload.id,
            questions = payload.questions.len(),
            "generated test session"
        );
        Ok(TestSession::try_from(payload)?)
    }
}

#[async_trait]
impl SubmissionSink for ApiClient {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<ResultId, ApiError> {
        let path = format!("/api/student/tests/{}/submit/", payload.session_id);
        let request = self.request(Method::POST, &path).json(payload);
        let receipt: SubmissionReceipt = self.send_json(request).await?;
        Ok(receipt.id)
    }
}

#[async_trait]
impl ResultSource for ApiClient {
    async fn fetch_result(&self, session: SessionId) -> Result<TestResult, ApiError> {
        let path = format!("/api/student/tests/{session}/result/");
        self.send_json(self.request(Method::GET, &path)).await
    }
}
