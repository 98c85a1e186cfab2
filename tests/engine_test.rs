mod helpers;

use helpers::{test_config, test_engine};
use recollect::engine::Engine;
use recollect::error::Error;
use recollect::model::SearchKind;
use recollect::repo::records::DecisionFields;
use recollect::search::MatchSource;

#[tokio::test]
async fn empty_store_stats_after_init() {
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(dir.path());

    let stats = engine.stats().unwrap();
    assert_eq!(stats.sessions, 0);
    assert_eq!(stats.messages, 0);
    assert_eq!(stats.loa_entries, 0);
    assert_eq!(stats.decisions, 0);
    assert_eq!(stats.learnings, 0);
    assert_eq!(stats.breadcrumbs, 0);
    assert!(stats.db_size_bytes > 0, "schema pages give the file size");
}

#[tokio::test]
async fn open_before_init_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let err = Engine::open(test_config(dir.path())).unwrap_err();
    assert!(matches!(err, Error::NotInitialized(_)));
}

#[tokio::test]
async fn add_then_search_decision() {
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(dir.path());

    engine
        .add_decision(
            "Use embedded store",
            &DecisionFields {
                reasoning: Some("Simpler deploy"),
                project: Some("demo"),
                ..Default::default()
            },
        )
        .unwrap();

    let hits = engine.search("embedded", None, None, 10).unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].kind, SearchKind::Decisions);
    assert_eq!(hits[0].id, 1);
    assert_eq!(hits[0].content, "Use embedded store");
}

#[tokio::test]
async fn fts_operators_pass_through() {
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(dir.path());

    engine
        .add_decision("cache sessions in redis", &DecisionFields::default())
        .unwrap();
    engine
        .add_decision("cache sessions in memcached", &DecisionFields::default())
        .unwrap();
    engine
        .add_decision("benchmark redis OR memcached", &DecisionFields::default())
        .unwrap();

    let hits = engine
        .search("redis NOT memcached", Some(SearchKind::Decisions), None, 10)
        .unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content, "cache sessions in redis");
}

#[tokio::test]
async fn hybrid_degrades_without_embeddings() {
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(dir.path());

    engine
        .add_decision(
            "auth tokens rotate daily",
            &DecisionFields {
                project: Some("demo"),
                ..Default::default()
            },
        )
        .unwrap();
    engine
        .add_learning(
            "auth header was dropped by the proxy",
            &recollect::repo::records::LearningFields::default(),
        )
        .unwrap();

    // The test config points embeddings at a dead address; hybrid must not
    // raise, and every hit is lexical.
    let results = engine.hybrid("auth", None, None, 10).await.unwrap();
    assert!(!results.embeddings_available);
    assert!(!results.hits.is_empty());
    assert!(results.hits.iter().all(|h| h.source == MatchSource::Fts));

    // Semantic-only search does surface the failure
    let err = engine.semantic("auth", None, 10).await.unwrap_err();
    assert!(matches!(err, Error::ServiceUnavailable(_)));
}

#[tokio::test]
async fn show_renders_and_missing_ids_are_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(dir.path());

    engine
        .add_decision(
            "Pin the schema version",
            &DecisionFields {
                reasoning: Some("refuse newer files"),
                ..Default::default()
            },
        )
        .unwrap();

    let rendered = engine.show(SearchKind::Decisions, 1).unwrap();
    assert!(rendered.contains("Pin the schema version"));
    assert!(rendered.contains("refuse newer files"));

    let err = engine.show(SearchKind::Decisions, 99).unwrap_err();
    assert!(matches!(err, Error::NotFound { kind: "decision", id: 99 }));
}

#[tokio::test]
async fn recent_lists_newest_first_per_kind() {
    let dir = tempfile::tempdir().unwrap();
    let engine = test_engine(dir.path());

    for i in 0..3 {
        engine
            .add_breadcrumb(
                &format!("left off at step {i}"),
                &recollect::repo::records::BreadcrumbFields::default(),
            )
            .unwrap();
    }

    let items = engine.recent(SearchKind::Breadcrumbs, None, 2).unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0].preview, "left off at step 2");
}
