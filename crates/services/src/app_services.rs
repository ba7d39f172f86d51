use std::sync::Arc;

use storage::repository::Storage;
use storage::snapshots::SnapshotRepository;

use crate::api::ApiClient;
use crate::config::ApiConfig;
use crate::error::AppServicesError;
use crate::exam::ExamLoopService;

/// Assembles the app-facing services over one storage backend and API client.
#[derive(Clone)]
pub struct AppServices {
    client: ApiClient,
    exam_loop: Arc<ExamLoopService>,
}

impl AppServices {
    /// Build services backed by `SQLite` storage.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError` if storage initialization or the HTTP client
    /// setup fails.
    pub async fn new_sqlite(db_url: &str, api: ApiConfig) -> Result<Self, AppServicesError> {
        let storage = Storage::sqlite(db_url).await?;
        Self::with_storage(storage, api)
    }

    /// Build services over an existing storage backend.
    ///
    /// # Errors
    ///
    /// Returns `AppServicesError::Api` if the HTTP client cannot be built.
    pub fn with_storage(storage: Storage, api: ApiConfig) -> Result<Self, AppServicesError> {
        let client = ApiClient::new(api)?;
        let shared = Arc::new(client.clone());
        let exam_loop = Arc::new(ExamLoopService::new(
            shared.clone(),
            shared.clone(),
            shared,
            SnapshotRepository::new(Arc::clone(&storage.kv)),
        ));
        Ok(Self { client, exam_loop })
    }

    #[must_use]
    pub fn api(&self) -> &ApiClient {
        &self.client
    }

    #[must_use]
    pub fn exam_loop(&self) -> Arc<ExamLoopService> {
        Arc::clone(&self.exam_loop)
    }
}
