// Invariant checks for spec.md §8's P1-P8. The exhaustive ones (P4, P7) are
// closed-form enough to check directly rather than via `proptest`; the
// others are single-scenario checks of a property that genuinely holds for
// any input of that shape, grounded in the same engines the scenario tests
// in `knowledge_base_scenarios.rs` drive.

use std::sync::Arc;

use conduit::builders::SourceBuilder;
use conduit::contracts::Store;
use conduit::events::EventBus;
use conduit::indexer::Indexer;
use conduit::lifecycle::is_valid_transition;
use conduit::policy::{DeclaredPermissions, PolicyConfig, PolicyEngine};
use conduit::retrieval::{RetrievalEngine, SearchMode, SearchParams};
use conduit::source_manager::{SourceManager, SyncOptions};
use conduit::store::FileStore;
use conduit::types::{AuditStatus, ConnectorStatus, ValidatedDocumentId};
use proptest::prelude::*;

async fn store() -> (Arc<dyn Store>, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let store: Arc<dyn Store> = Arc::new(FileStore::open(dir.path().to_path_buf()).await.unwrap());
    (store, dir)
}

fn manager(store: Arc<dyn Store>) -> SourceManager {
    SourceManager::new(store.clone(), Arc::new(Indexer::new(store)), EventBus::new())
}

/// P1: running sync twice on an unchanged tree adds 0, updates 0, deletes 0
/// on the second pass.
#[tokio::test]
async fn p1_idempotent_resync_of_an_unchanged_tree() {
    let (store, _store_dir) = store().await;
    let source_dir = tempfile::tempdir().unwrap();
    std::fs::write(source_dir.path().join("a.md"), "stable content").unwrap();
    std::fs::write(source_dir.path().join("b.md"), "also stable").unwrap();

    let source =
        SourceBuilder::new().display_name("docs").root_path(source_dir.path()).unwrap().include("*.md").unwrap().build().unwrap();
    store.create_source(source.clone()).await.unwrap();

    let manager = manager(store);
    manager.sync(source.id, SyncOptions::default()).await.unwrap();
    let second = manager.sync(source.id, SyncOptions::default()).await.unwrap();

    assert_eq!((second.added, second.updated, second.deleted), (0, 0, 0));
}

/// P2: indexing identical extracted text twice (once per document) produces
/// identical chunk ids, since chunk ids are derived from document id, chunk
/// index, and a content hash prefix rather than from insertion order.
#[tokio::test]
async fn p2_identical_text_yields_identical_chunk_ids() {
    let document_id = ValidatedDocumentId::new();
    let config = conduit::chunker::ChunkerConfig::default();
    let a = conduit::chunker::chunk_document(document_id, "identical body text", &config).unwrap();
    let b = conduit::chunker::chunk_document(document_id, "identical body text", &config).unwrap();

    assert_eq!(a.len(), b.len());
    for (x, y) in a.iter().zip(b.iter()) {
        assert_eq!(x.id, y.id);
    }
}

/// P3: deleting a source leaves no documents or chunks referencing it.
#[tokio::test]
async fn p3_cascade_delete_leaves_no_orphaned_rows() {
    let (store, _store_dir) = store().await;
    let source_dir = tempfile::tempdir().unwrap();
    std::fs::write(source_dir.path().join("a.md"), "will be deleted").unwrap();

    let source =
        SourceBuilder::new().display_name("docs").root_path(source_dir.path()).unwrap().include("*.md").unwrap().build().unwrap();
    store.create_source(source.clone()).await.unwrap();
    manager(store.clone()).sync(source.id, SyncOptions::default()).await.unwrap();

    let documents = store.list_documents(Some(source.id)).await.unwrap();
    assert_eq!(documents.len(), 1);
    let chunks_before = store.list_chunks(documents[0].id).await.unwrap();
    assert!(!chunks_before.is_empty());

    store.delete_source(source.id).await.unwrap();

    assert!(store.list_documents(Some(source.id)).await.unwrap().is_empty());
    for chunk in &chunks_before {
        assert!(store.get_chunk(chunk.id).await.unwrap().is_none());
    }
}

/// P4: transition closure. Every pair in the state machine's table is
/// accepted; every pair not in it is refused. Checked exhaustively over the
/// full cross product of `ConnectorStatus` rather than sampled, since the
/// state space is small and fixed.
#[test]
fn p4_transition_table_is_exhaustively_closed() {
    const ALL: &[ConnectorStatus] = &[
        ConnectorStatus::Created,
        ConnectorStatus::Auditing,
        ConnectorStatus::Installed,
        ConnectorStatus::Blocked,
        ConnectorStatus::Failed,
        ConnectorStatus::Starting,
        ConnectorStatus::Running,
        ConnectorStatus::Degraded,
        ConnectorStatus::Stopping,
        ConnectorStatus::Stopped,
        ConnectorStatus::Removing,
        ConnectorStatus::Removed,
        ConnectorStatus::Updating,
        ConnectorStatus::Restarting,
    ];

    const ALLOWED: &[(ConnectorStatus, ConnectorStatus)] = &[
        (ConnectorStatus::Created, ConnectorStatus::Auditing),
        (ConnectorStatus::Auditing, ConnectorStatus::Installed),
        (ConnectorStatus::Auditing, ConnectorStatus::Blocked),
        (ConnectorStatus::Auditing, ConnectorStatus::Failed),
        (ConnectorStatus::Installed, ConnectorStatus::Starting),
        (ConnectorStatus::Installed, ConnectorStatus::Removing),
        (ConnectorStatus::Starting, ConnectorStatus::Running),
        (ConnectorStatus::Starting, ConnectorStatus::Stopped),
        (ConnectorStatus::Starting, ConnectorStatus::Failed),
        (ConnectorStatus::Running, ConnectorStatus::Degraded),
        (ConnectorStatus::Running, ConnectorStatus::Stopping),
        (ConnectorStatus::Running, ConnectorStatus::Failed),
        (ConnectorStatus::Running, ConnectorStatus::Restarting),
        (ConnectorStatus::Degraded, ConnectorStatus::Running),
        (ConnectorStatus::Degraded, ConnectorStatus::Stopping),
        (ConnectorStatus::Degraded, ConnectorStatus::Failed),
        (ConnectorStatus::Stopping, ConnectorStatus::Stopped),
        (ConnectorStatus::Stopping, ConnectorStatus::Failed),
        (ConnectorStatus::Stopped, ConnectorStatus::Starting),
        (ConnectorStatus::Stopped, ConnectorStatus::Removing),
        (ConnectorStatus::Stopped, ConnectorStatus::Updating),
        (ConnectorStatus::Removing, ConnectorStatus::Removed),
        (ConnectorStatus::Removing, ConnectorStatus::Failed),
        (ConnectorStatus::Failed, ConnectorStatus::Starting),
        (ConnectorStatus::Failed, ConnectorStatus::Removing),
        (ConnectorStatus::Updating, ConnectorStatus::Installed),
        (ConnectorStatus::Updating, ConnectorStatus::Failed),
        (ConnectorStatus::Restarting, ConnectorStatus::Running),
        (ConnectorStatus::Restarting, ConnectorStatus::Failed),
        (ConnectorStatus::Blocked, ConnectorStatus::Removing),
    ];

    for &from in ALL {
        for &to in ALL {
            let expected = ALLOWED.contains(&(from, to));
            assert_eq!(
                is_valid_transition(from, to),
                expected,
                "transition {from:?} -> {to:?} should be {}",
                if expected { "allowed" } else { "refused" }
            );
        }
    }
}

/// P5: with the vector backend disabled, hybrid search returns exactly the
/// lexical-only results, same ids in the same order.
#[tokio::test]
async fn p5_hybrid_without_vectors_matches_lexical_only() {
    let (store, _store_dir) = store().await;
    let source_dir = tempfile::tempdir().unwrap();
    std::fs::write(source_dir.path().join("a.md"), "the quick brown fox jumps").unwrap();
    std::fs::write(source_dir.path().join("b.md"), "a slow brown turtle walks").unwrap();

    let source =
        SourceBuilder::new().display_name("docs").root_path(source_dir.path()).unwrap().include("*.md").unwrap().build().unwrap();
    store.create_source(source.clone()).await.unwrap();
    manager(store.clone()).sync(source.id, SyncOptions::default()).await.unwrap();

    let retrieval = RetrievalEngine::new(store.clone());
    let hybrid = retrieval
        .search(SearchParams { query: "brown".to_string(), mode: SearchMode::Hybrid, ..Default::default() })
        .await
        .unwrap();
    let lexical = retrieval
        .search(SearchParams { query: "brown".to_string(), mode: SearchMode::Lexical, ..Default::default() })
        .await
        .unwrap();

    let hybrid_ids: Vec<&str> = hybrid.hits.iter().map(|h| h.chunk_id.as_str()).collect();
    let lexical_ids: Vec<&str> = lexical.hits.iter().map(|h| h.chunk_id.as_str()).collect();
    assert_eq!(hybrid_ids, lexical_ids);
}

/// P6: identical inputs and configuration produce the same ranked order on
/// repeated calls.
#[tokio::test]
async fn p6_ranking_is_deterministic_across_repeated_calls() {
    let (store, _store_dir) = store().await;
    let source_dir = tempfile::tempdir().unwrap();
    for i in 0..5 {
        std::fs::write(source_dir.path().join(format!("doc{i}.md")), "repeated needle word appears here").unwrap();
    }

    let source =
        SourceBuilder::new().display_name("docs").root_path(source_dir.path()).unwrap().include("*.md").unwrap().build().unwrap();
    store.create_source(source.clone()).await.unwrap();
    manager(store.clone()).sync(source.id, SyncOptions::default()).await.unwrap();

    let retrieval = RetrievalEngine::new(store.clone());
    let params = || SearchParams { query: "needle".to_string(), mode: SearchMode::Lexical, ..Default::default() };

    let first = retrieval.search(params()).await.unwrap();
    let second = retrieval.search(params()).await.unwrap();

    let first_ids: Vec<&str> = first.hits.iter().map(|h| h.chunk_id.as_str()).collect();
    let second_ids: Vec<&str> = second.hits.iter().map(|h| h.chunk_id.as_str()).collect();
    assert_eq!(first_ids, second_ids);
}

proptest! {
    /// P7: any byte sequence, once sanitized at the vector-backend boundary,
    /// is valid UTF-8.
    #[test]
    fn p7_sanitize_utf8_always_produces_valid_utf8(bytes in proptest::collection::vec(any::<u8>(), 0..256)) {
        let sanitized = conduit::contracts::vector::sanitize_utf8(&bytes);
        prop_assert!(std::str::from_utf8(sanitized.as_bytes()).is_ok());
    }
}

/// P8: any declared path under a forbidden prefix is blocked unless it also
/// falls under a configured allow-list carve-out.
#[test]
fn p8_forbidden_paths_are_blocked_unless_carved_out() {
    let engine = PolicyEngine::new(PolicyConfig { allowed_prefixes: vec!["/etc/allowed".to_string()], home_dir: "/home/user".to_string() });

    let blocked = engine.evaluate(uuid::Uuid::new_v4(), &DeclaredPermissions { read_paths: vec!["/etc/shadow".to_string()], ..Default::default() });
    assert_eq!(blocked.status, AuditStatus::Block);

    let carved_out = engine.evaluate(
        uuid::Uuid::new_v4(),
        &DeclaredPermissions { read_paths: vec!["/etc/allowed/config.toml".to_string()], ..Default::default() },
    );
    assert_eq!(carved_out.status, AuditStatus::Pass);

    let fine = engine.evaluate(uuid::Uuid::new_v4(), &DeclaredPermissions { read_paths: vec!["/home/user/projects/a".to_string()], ..Default::default() });
    assert_eq!(fine.status, AuditStatus::Pass);
}
