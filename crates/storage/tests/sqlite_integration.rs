use std::sync::Arc;

use exam_core::ExamSession;
use exam_core::model::{Choice, ChoiceId, QuestionId, QuestionRef, SessionId, TestSession};
use storage::repository::KeyValueStore;
use storage::snapshots::SnapshotRepository;
use storage::sqlite::SqliteKvStore;

fn build_exam(id: u64) -> ExamSession {
    let questions = (1..=3)
        .map(|qid| {
            QuestionRef::new(
                QuestionId::new(qid),
                format!("Q{qid}"),
                None,
                1.0,
                vec![
                    Choice::new(ChoiceId::new(qid * 10), "a", None),
                    Choice::new(ChoiceId::new(qid * 10 + 1), "b", None),
                ],
            )
            .unwrap()
        })
        .collect();
    ExamSession::start(TestSession::new(SessionId::new(id), 300, questions).unwrap())
}

#[tokio::test]
async fn sqlite_key_value_round_trip() {
    let repo = SqliteKvStore::connect("sqlite:file:memdb_kv_roundtrip?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    assert_eq!(repo.get("missing").await.unwrap(), None);

    repo.set("k", "v1").await.unwrap();
    repo.set("k", "v2").await.unwrap();
    assert_eq!(repo.get("k").await.unwrap().as_deref(), Some("v2"));

    assert!(repo.remove("k").await.unwrap());
    assert!(!repo.remove("k").await.unwrap());
}

#[tokio::test]
async fn sqlite_migrations_are_idempotent() {
    let repo = SqliteKvStore::connect("sqlite:file:memdb_kv_migrate?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("first migrate");
    repo.migrate().await.expect("second migrate");

    repo.set("a", "1").await.unwrap();
    assert_eq!(repo.get("a").await.unwrap().as_deref(), Some("1"));
}

#[tokio::test]
async fn sqlite_prefix_listing_does_not_treat_wildcards_specially() {
    let repo = SqliteKvStore::connect("sqlite:file:memdb_kv_prefix?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");

    repo.set("exam_session:2", "{}").await.unwrap();
    repo.set("exam_session:1", "{}").await.unwrap();
    repo.set("examXsession:3", "{}").await.unwrap();
    repo.set("settings", "{}").await.unwrap();

    let keys = repo.keys_with_prefix("exam_session:").await.unwrap();
    assert_eq!(keys, vec!["exam_session:1", "exam_session:2"]);
}

#[tokio::test]
async fn sqlite_persists_exam_snapshots() {
    let repo = SqliteKvStore::connect("sqlite:file:memdb_kv_snapshots?mode=memory&cache=shared")
        .await
        .expect("connect");
    repo.migrate().await.expect("migrate");
    let snapshots = SnapshotRepository::new(Arc::new(repo));

    let mut exam = build_exam(12);
    exam.select_answer(QuestionId::new(2), ChoiceId::new(21)).unwrap();
    exam.mark_for_review_and_next().unwrap();
    for _ in 0..45 {
        exam.tick();
    }
    snapshots.save(&exam.snapshot()).await.unwrap();

    let loaded = snapshots
        .load(SessionId::new(12))
        .await
        .unwrap()
        .expect("snapshot stored");
    let restored = ExamSession::restore(loaded).unwrap();
    assert_eq!(restored.remaining_seconds(), 255);
    assert_eq!(restored.current_index(), 1);
    assert_eq!(
        restored.answer_for(QuestionId::new(2)),
        Some(ChoiceId::new(21))
    );
    assert!(restored.is_marked(QuestionId::new(1)));

    assert_eq!(snapshots.list_sessions().await.unwrap(), vec![SessionId::new(12)]);
    assert!(snapshots.clear(SessionId::new(12)).await.unwrap());
    assert!(snapshots.list_sessions().await.unwrap().is_empty());
}
