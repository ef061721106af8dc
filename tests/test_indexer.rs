mod common;

use common::{user, user_mapping, EngineCall, MemoryEngine};
use docmirror::{
    DocumentIndexer, IndexDescriptor, IndexEvent, IndexOptions, MirrorError, Record, RetryPolicy,
};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn indexer(engine: &Arc<MemoryEngine>) -> DocumentIndexer {
    DocumentIndexer::new(
        engine.clone(),
        Arc::new(user_mapping()),
        IndexDescriptor {
            index: "users".into(),
            type_name: "user".into(),
        },
    )
}

fn not_found() -> MirrorError {
    MirrorError::NotFound("users/user/x".into())
}

#[tokio::test]
async fn test_index_one_uses_record_id_and_mapping() {
    let engine = Arc::new(MemoryEngine::new());
    let record = user(7);
    let id = record.id().unwrap();

    let resp = indexer(&engine)
        .index_one(&record, IndexOptions::default())
        .await
        .unwrap();

    assert_eq!(resp.id, id);
    assert_eq!(
        engine.doc("users", "user", &id),
        Some(json!({"name": "user-7", "email": "user7@example.com"}))
    );
}

#[tokio::test]
async fn test_index_one_honours_overrides() {
    let engine = Arc::new(MemoryEngine::new());
    let options = IndexOptions {
        index: Some("archive".into()),
        type_name: Some("old_user".into()),
        id: Some("custom-id".into()),
        refresh: true,
    };

    indexer(&engine).index_one(&user(1), options).await.unwrap();

    assert_eq!(
        engine.calls(),
        vec![EngineCall::Index {
            index: "archive".into(),
            type_name: "old_user".into(),
            id: "custom-id".into(),
            document: json!({"name": "user-1", "email": "user1@example.com"}),
            refresh: true,
        }]
    );
}

#[tokio::test]
async fn test_index_one_emits_event() {
    let engine = Arc::new(MemoryEngine::new());
    let indexer = indexer(&engine);
    let mut events = indexer.subscribe();

    indexer
        .index_one(&user(2), IndexOptions::default())
        .await
        .unwrap();

    match events.recv().await.unwrap() {
        IndexEvent::Indexed { id, outcome } => {
            assert_eq!(id, user(2).id().unwrap());
            assert!(outcome.is_ok());
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_index_failure_is_returned_and_emitted() {
    let engine = Arc::new(MemoryEngine::new());
    engine.fail_index_with(MirrorError::Transport("503".into()));
    let indexer = indexer(&engine);
    let mut events = indexer.subscribe();

    let err = indexer
        .index_one(&user(2), IndexOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err, MirrorError::Transport("503".into()));

    match events.recv().await.unwrap() {
        IndexEvent::Indexed { outcome, .. } => {
            assert_eq!(outcome, Err(MirrorError::Transport("503".into())))
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_index_one_without_id_fails_without_event() {
    let engine = Arc::new(MemoryEngine::new());
    let indexer = indexer(&engine);
    let mut events = indexer.subscribe();

    let err = indexer
        .index_one(&Record::new().with("name", "x"), IndexOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err, MirrorError::MissingField("_id".into()));
    assert!(engine.calls().is_empty());
    assert!(matches!(
        events.try_recv(),
        Err(tokio::sync::broadcast::error::TryRecvError::Empty)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_remove_retries_not_found_three_times_then_stops() {
    let engine = Arc::new(MemoryEngine::new());
    engine.script_deletes(vec![
        Err(not_found()),
        Err(not_found()),
        Err(not_found()),
        Err(not_found()),
        Ok(json!({"found": true})),
    ]);
    let indexer = indexer(&engine);
    let mut events = indexer.subscribe();

    let outcome = indexer.remove_one(&user(1)).unwrap().await.unwrap();

    assert_eq!(outcome.attempts, 4);
    assert_eq!(outcome.result, Err(not_found()));

    let attempts = engine.delete_calls();
    assert_eq!(attempts.len(), 4);
    for pair in attempts.windows(2) {
        assert!(pair[1] - pair[0] >= Duration::from_millis(500));
    }

    // exhaustion is reported, not swallowed
    match events.recv().await.unwrap() {
        IndexEvent::Removed { outcome, .. } => assert_eq!(outcome, Err(not_found())),
        other => panic!("unexpected event {:?}", other),
    }

    // nothing further happens afterwards
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(engine.delete_calls().len(), 4);
}

#[tokio::test(start_paused = true)]
async fn test_remove_succeeds_once_engine_catches_up() {
    let engine = Arc::new(MemoryEngine::new());
    engine.script_deletes(vec![
        Err(not_found()),
        Err(not_found()),
        Ok(json!({"found": true})),
    ]);
    let indexer = indexer(&engine);
    let mut events = indexer.subscribe();

    let outcome = indexer.remove_with_retry("abc").await;

    assert_eq!(outcome.attempts, 3);
    assert!(outcome.result.is_ok());
    assert!(matches!(
        events.recv().await.unwrap(),
        IndexEvent::Removed { outcome: Ok(_), .. }
    ));
}

#[tokio::test(start_paused = true)]
async fn test_remove_other_errors_are_terminal() {
    let engine = Arc::new(MemoryEngine::new());
    engine.script_deletes(vec![Err(MirrorError::Transport("reset".into()))]);
    let indexer = indexer(&engine);
    let mut events = indexer.subscribe();

    let outcome = indexer.remove_with_retry("abc").await;

    assert_eq!(outcome.attempts, 1);
    assert_eq!(engine.delete_calls().len(), 1);
    match events.recv().await.unwrap() {
        IndexEvent::Removed { outcome, .. } => {
            assert_eq!(outcome, Err(MirrorError::Transport("reset".into())))
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_pending_removal_does_not_block_other_work() {
    let engine = Arc::new(MemoryEngine::new());
    engine.script_deletes(vec![Err(not_found()), Err(not_found()), Ok(json!({}))]);
    let indexer = indexer(&engine);

    let handle = indexer.remove_one(&user(1)).unwrap();
    tokio::task::yield_now().await;

    // While the delete sits in its backoff, indexing goes straight through.
    let started = tokio::time::Instant::now();
    indexer
        .index_one(&user(2), IndexOptions::default())
        .await
        .unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    assert!(!handle.is_finished());

    let outcome = handle.await.unwrap();
    assert_eq!(outcome.attempts, 3);
}

#[tokio::test(start_paused = true)]
async fn test_custom_retry_policy() {
    let engine = Arc::new(MemoryEngine::new());
    let indexer = indexer(&engine).with_retry_policy(RetryPolicy {
        max_retries: 1,
        backoff: Duration::from_millis(10),
    });

    // nothing indexed, so every delete is "not found"
    let outcome = indexer.remove_with_retry("missing").await;

    assert_eq!(outcome.attempts, 2);
    assert!(matches!(outcome.result, Err(MirrorError::NotFound(_))));
}
