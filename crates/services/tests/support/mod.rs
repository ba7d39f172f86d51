#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use exam_core::model::{
    Choice, ChoiceId, QuestionId, QuestionRef, ResultId, SessionId, SubmissionPayload, TestConfig,
    TestResult, TestSession,
};
use services::ApiError;
use services::api::{ResultSource, SessionSource, SubmissionSink};
use storage::repository::{InMemoryStore, KeyValueStore, StorageError};
use storage::snapshots::SnapshotRepository;

pub const RESULT_ID: u64 = 501;

/// Three single-mark questions; choice ids are `q * 10 + 1` and `q * 10 + 2`.
pub fn three_questions(id: u64, seconds: u32) -> TestSession {
    let questions = (1..=3)
        .map(|qid| {
            QuestionRef::new(
                QuestionId::new(qid),
                format!("Question {qid}"),
                None,
                1.0,
                vec![
                    Choice::new(ChoiceId::new(qid * 10 + 1), "first", None),
                    Choice::new(ChoiceId::new(qid * 10 + 2), "second", None),
                ],
            )
            .expect("valid question")
        })
        .collect();
    TestSession::new(SessionId::new(id), seconds, questions).expect("valid session")
}

pub fn memory_snapshots() -> (SnapshotRepository, InMemoryStore) {
    let store = InMemoryStore::new();
    (SnapshotRepository::new(Arc::new(store.clone())), store)
}

/// In-memory store whose writes or deletes can be switched to fail.
#[derive(Default)]
pub struct FaultyStore {
    inner: InMemoryStore,
    fail_sets: AtomicBool,
    fail_removes: AtomicBool,
}

impl FaultyStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_sets(&self, fail: bool) {
        self.fail_sets.store(fail, Ordering::SeqCst);
    }

    pub fn fail_removes(&self, fail: bool) {
        self.fail_removes.store(fail, Ordering::SeqCst);
    }

    pub fn snapshots(self: &Arc<Self>) -> SnapshotRepository {
        SnapshotRepository::new(self.clone())
    }
}

#[async_trait]
impl KeyValueStore for FaultyStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        if self.fail_sets.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("disk full".into()));
        }
        self.inner.set(key, value).await
    }

    async fn remove(&self, key: &str) -> Result<bool, StorageError> {
        if self.fail_removes.load(Ordering::SeqCst) {
            return Err(StorageError::Connection("database is locked".into()));
        }
        self.inner.remove(key).await
    }

    async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        self.inner.keys_with_prefix(prefix).await
    }
}

/// Records every submission; can fail a number of times and delay its answer.
pub struct CountingSink {
    calls: Mutex<Vec<SubmissionPayload>>,
    failures_left: AtomicUsize,
    delay: Duration,
}

impl CountingSink {
    pub fn new() -> Arc<Self> {
        Self::build(0, Duration::ZERO)
    }

    pub fn failing(times: usize) -> Arc<Self> {
        Self::build(times, Duration::ZERO)
    }

    pub fn slow(delay: Duration) -> Arc<Self> {
        Self::build(0, delay)
    }

    fn build(failures: usize, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            failures_left: AtomicUsize::new(failures),
            delay,
        })
    }

    pub fn calls(&self) -> Vec<SubmissionPayload> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SubmissionSink for CountingSink {
    async fn submit(&self, payload: &SubmissionPayload) -> Result<ResultId, ApiError> {
        self.calls.lock().unwrap().push(payload.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let failures = self.failures_left.load(Ordering::SeqCst);
        if failures > 0 {
            self.failures_left.store(failures - 1, Ordering::SeqCst);
            return Err(ApiError::HttpStatus(reqwest::StatusCode::SERVICE_UNAVAILABLE));
        }
        Ok(ResultId::new(RESULT_ID))
    }
}

/// Hands out the same session for every configuration.
pub struct FixedSource {
    session: TestSession,
    requests: Mutex<Vec<TestConfig>>,
}

impl FixedSource {
    pub fn new(session: TestSession) -> Arc<Self> {
        Arc::new(Self {
            session,
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<TestConfig> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionSource for FixedSource {
    async fn generate(&self, config: &TestConfig) -> Result<TestSession, ApiError> {
        self.requests.lock().unwrap().push(config.clone());
        Ok(self.session.clone())
    }
}

pub struct FixedResults(pub TestResult);

#[async_trait]
impl ResultSource for FixedResults {
    async fn fetch_result(&self, _session: SessionId) -> Result<TestResult, ApiError> {
        Ok(self.0.clone())
    }
}
