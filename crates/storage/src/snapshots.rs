use std::sync::Arc;

use exam_core::SessionSnapshot;
use exam_core::model::SessionId;

use crate::repository::{KeyValueStore, StorageError};

const KEY_PREFIX: &str = "exam_session:";

/// Typed access to attempt snapshots stored in a [`KeyValueStore`].
///
/// Values are the JSON form of [`SessionSnapshot`], keyed by session id.
#[derive(Clone)]
pub struct SnapshotRepository {
    store: Arc<dyn KeyValueStore>,
}

impl SnapshotRepository {
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Storage key for a session.
    #[must_use]
    pub fn key_for(id: SessionId) -> String {
        format!("{KEY_PREFIX}{id}")
    }

    /// Read the snapshot for `id`, if any.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Serialization` if the stored JSON is unreadable.
    pub async fn load(&self, id: SessionId) -> Result<Option<SessionSnapshot>, StorageError> {
        let Some(raw) = self.store.get(&Self::key_for(id)).await? else {
            return Ok(None);
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|err| StorageError::Serialization(err.to_string()))
    }

    /// Write the snapshot, replacing any previous one for the same session.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if encoding or the write fails.
    pub async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StorageError> {
        let raw = serde_json::to_string(snapshot)
            .map_err(|err| StorageError::Serialization(err.to_string()))?;
        self.store.set(&Self::key_for(snapshot.session_id), &raw).await
    }

    /// Delete the snapshot for `id`. Returns whether one existed.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the delete fails.
    pub async fn clear(&self, id: SessionId) -> Result<bool, StorageError> {
        self.store.remove(&Self::key_for(id)).await
    }

    /// Sessions with a stored snapshot, i.e. attempts that can be resumed.
    ///
    /// Keys under the prefix that do not parse as a session id are skipped.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` if the key listing fails.
    pub async fn list_sessions(&self) -> Result<Vec<SessionId>, StorageError> {
        let keys = self.store.keys_with_prefix(KEY_PREFIX).await?;
        let mut ids: Vec<SessionId> = keys
            .iter()
            .filter_map(|key| key.strip_prefix(KEY_PREFIX))
            .filter_map(|raw| raw.parse().ok())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::InMemoryStore;
    use exam_core::ExamSession;
    use exam_core::model::{Choice, ChoiceId, QuestionId, QuestionRef, TestSession};

    fn build_exam(id: u64) -> ExamSession {
        let question = QuestionRef::new(
            QuestionId::new(1),
            "Q",
            None,
            1.0,
            vec![Choice::new(ChoiceId::new(10), "a", None)],
        ).unwrap();
        ExamSession::start(TestSession::new(SessionId::new(id), 60, vec![question]).unwrap())
    }

    #[tokio::test]
    async fn saves_loads_and_clears() {
        let store = InMemoryStore::new();
        let repo = SnapshotRepository::new(Arc::new(store.clone()));
        let exam = build_exam(4);

        repo.save(&exam.snapshot()).await.unwrap();
        assert!(store.get("exam_session:4").await.unwrap().is_some());

        let loaded = repo.load(SessionId::new(4)).await.unwrap().unwrap();
        assert_eq!(loaded, exam.snapshot());

        assert!(repo.clear(SessionId::new(4)).await.unwrap());
        assert!(repo.load(SessionId::new(4)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_value_is_a_serialization_error() {
        let store = InMemoryStore::new();
        store.set("exam_session:1", "{not json").await.unwrap();
        let repo = SnapshotRepository::new(Arc::new(store));

        let err = repo.load(SessionId::new(1)).await.unwrap_err();
        assert!(matches!(err, StorageError::Serialization(_)));
    }

    #[tokio::test]
    async fn lists_resumable_sessions() {
        let store = InMemoryStore::new();
        store.set("exam_session:garbage", "{}").await.unwrap();
        let repo = SnapshotRepository::new(Arc::new(store));
        repo.save(&build_exam(9).snapshot()).await.unwrap();
        repo.save(&build_exam(3).snapshot()).await.unwrap();

        let ids = repo.list_sessions().await.unwrap();
        assert_eq!(ids, vec![SessionId::new(3), SessionId::new(9)]);
    }
}
