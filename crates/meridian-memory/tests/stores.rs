#![allow(clippy::unwrap_used, clippy::expect_used)]

use chrono::Utc;
use meridian_core::{ExperienceEvent, ExperienceStore, RetrievalContext, RetrievalProvider};
use meridian_memory::{InMemoryExperienceStore, JsonlExperienceStore, KeywordRetriever};
use std::sync::Arc;

fn graph_event(run_id: &str) -> ExperienceEvent {
    ExperienceEvent::TaskGraphCompleted {
        run_id: run_id.to_string(),
        task_count: 3,
        succeeded: 2,
        failed: 1,
        overall_success: false,
        average_confidence: 0.6,
        duration_ms: 42,
        recorded_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_jsonl_store_appends_and_loads() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonlExperienceStore::new(dir.path().join("nested/experience.jsonl"))
        .await
        .unwrap();
    assert!(store.load().await.unwrap().is_empty());

    store.record(graph_event("r1")).await.unwrap();
    store
        .record(ExperienceEvent::CorrectionLoopCompleted {
            query: "q".into(),
            iterations: 2,
            corrections_applied: vec!["refine_query".into()],
            final_score: 0.8,
            improvement_score: 0.2,
            duration_ms: 7,
            recorded_at: Utc::now(),
        })
        .await
        .unwrap();

    let raw = std::fs::read_to_string(store.path()).unwrap();
    assert_eq!(raw.lines().count(), 2);
    assert!(raw.lines().next().unwrap().contains("\"type\":\"task_graph_completed\""));

    let events = store.load().await.unwrap();
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[0], ExperienceEvent::TaskGraphCompleted { run_id, .. } if run_id == "r1"));
    assert!(matches!(
        &events[1],
        ExperienceEvent::CorrectionLoopCompleted { iterations: 2, .. }
    ));
}

#[tokio::test]
async fn test_jsonl_store_concurrent_appends() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        JsonlExperienceStore::new(dir.path().join("experience.jsonl"))
            .await
            .unwrap(),
    );
    let handles: Vec<_> = (0..10)
        .map(|i| {
            let store = store.clone();
            tokio::spawn(async move { store.record(graph_event(&format!("r{i}"))).await })
        })
        .collect();
    for handle in handles {
        handle.await.unwrap().unwrap();
    }
    assert_eq!(store.load().await.unwrap().len(), 10);
}

#[tokio::test]
async fn test_jsonl_store_rejects_corrupt_line() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("experience.jsonl");
    std::fs::write(&path, "{not json}\n").unwrap();
    let store = JsonlExperienceStore::new(&path).await.unwrap();
    let err = store.load().await.unwrap_err();
    assert!(err.to_string().contains("line 1"));
}

#[tokio::test]
async fn test_in_memory_store_keeps_order() {
    let store = InMemoryExperienceStore::new();
    assert!(store.is_empty().await);
    store.record(graph_event("a")).await.unwrap();
    store.record(graph_event("b")).await.unwrap();
    let events = store.events().await;
    assert_eq!(events.len(), 2);
    assert!(matches!(&events[1], ExperienceEvent::TaskGraphCompleted { run_id, .. } if run_id == "b"));
}

#[tokio::test]
async fn test_corpus_directory_loading() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("docs")).unwrap();
    std::fs::write(
        dir.path().join("docs/runtime.md"),
        "The scheduler polls futures.\n\nWork stealing balances the runtime across threads.",
    )
    .unwrap();
    std::fs::write(dir.path().join("notes.txt"), "Dinner recipes and cooking.").unwrap();
    std::fs::write(dir.path().join("image.png"), [0u8, 1, 2]).unwrap();

    let retriever = KeywordRetriever::from_dir(dir.path()).await.unwrap();
    assert_eq!(retriever.len().await, 2);

    let chunks = retriever
        .retrieve("work stealing runtime", &RetrievalContext::top_k(3))
        .await
        .unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].title, "runtime");
    assert_eq!(chunks[0].path.as_deref(), Some("docs/runtime.md"));
    assert_eq!(chunks[0].score, 1.0);
}

#[tokio::test]
async fn test_corpus_loading_tolerates_invalid_utf8() {
    let dir = tempfile::tempdir().unwrap();
    let mut latin1 = b"Caf\xe9 opening hours and espresso pricing.".to_vec();
    latin1.push(b'\n');
    std::fs::write(dir.path().join("legacy.txt"), latin1).unwrap();
    std::fs::write(dir.path().join("guide.md"), "Tokio runtime guide.").unwrap();

    let retriever = KeywordRetriever::from_dir(dir.path()).await.unwrap();
    assert_eq!(retriever.len().await, 2);

    let chunks = retriever
        .retrieve("espresso pricing", &RetrievalContext::top_k(3))
        .await
        .unwrap();
    assert_eq!(chunks.len(), 1);
    assert_eq!(chunks[0].title, "legacy");
    assert!(chunks[0].content.contains('\u{FFFD}'));
}

#[tokio::test]
async fn test_missing_corpus_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = KeywordRetriever::from_dir(&dir.path().join("absent")).await;
    assert!(result.is_err());
}
