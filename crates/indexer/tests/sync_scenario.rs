use docsync_indexer::{
    CollectionRegistration, CollectionRegistry, JobState, ReconcileReport, Reconciler,
    ReindexConfig, Reindexer, ScanConfig, StopSignal, SyncCoordinator,
};
use docsync_search::{FieldType, IndexIdentity, IndexMapping, MemorySearchBackend, SearchBackend, SearchQuery};
use docsync_store::{CollectionKind, FsObjectStore, MemoryObjectStore, ObjectKey, ObjectStore};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

const ALIAS: &str = "app:k:v1";

fn registration() -> CollectionRegistration {
    CollectionRegistration::json(
        CollectionKind::new("K").unwrap(),
        IndexIdentity::new("app", "k", "v1").unwrap(),
        "json",
        IndexMapping::new()
            .with_field("title", FieldType::Text)
            .with_field("rank", FieldType::Long),
    )
}

fn config() -> ReindexConfig {
    ReindexConfig {
        workers: 4,
        bulk_batch_size: 2,
        delete_timeouts: vec![Duration::from_millis(100); 2],
        scan: ScanConfig {
            poll_interval: Duration::from_millis(10),
            ..ScanConfig::default()
        },
        ..ReindexConfig::default()
    }
}

async fn put(store: &dyn ObjectStore, id: &str, rank: i64) {
    let key = ObjectKey::new(CollectionKind::new("K").unwrap(), id, "json").unwrap();
    let body = json!({ "id": id, "title": format!("Object {id}"), "rank": rank });
    store.put(&key, serde_json::to_vec(&body).unwrap()).await.unwrap();
}

async fn alias_ids(search: &MemorySearchBackend) -> Vec<String> {
    search
        .query(ALIAS, &SearchQuery::match_all(100))
        .await
        .unwrap()
        .hits
        .into_iter()
        .map(|hit| hit.id)
        .collect()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reindex_then_reconcile_after_storage_delete() {
    let dir = TempDir::new().unwrap();
    let store = Arc::new(FsObjectStore::new(dir.path()));
    let search = Arc::new(MemorySearchBackend::new());
    for (rank, id) in ["o1", "o2", "o3"].into_iter().enumerate() {
        put(store.as_ref(), id, rank as i64).await;
    }

    let registry = CollectionRegistry::new();
    assert!(registry.register(registration()).unwrap());
    let registration = registry.get(&CollectionKind::new("K").unwrap()).unwrap();

    let report = Reindexer::new(store.clone(), search.clone())
        .with_config(config())
        .reindex(&registration)
        .await;
    assert_eq!(report.state, JobState::Done, "{report:?}");
    assert_eq!(report.documents_indexed, 3);
    assert_eq!(report.reconcile, Some(ReconcileReport {
        examined: 3,
        deleted: 0,
        failures: 0,
    }));

    let generation = report.generation.unwrap();
    let suffix = generation.strip_prefix("app:k:v1_").unwrap();
    assert!(suffix.chars().all(|c| c.is_ascii_digit()));
    assert_eq!(
        search.alias_targets(ALIAS).await.unwrap(),
        BTreeSet::from([generation])
    );
    assert_eq!(alias_ids(&search).await, vec!["o1", "o2", "o3"]);

    let o2 = ObjectKey::new(CollectionKind::new("K").unwrap(), "o2", "json").unwrap();
    assert!(store.delete(&o2).await.unwrap());

    let reconciler = Reconciler::new(store.clone(), search.clone());
    let pass = reconciler.reconcile(&registration).await.unwrap();
    assert_eq!(pass.deleted, 1);
    assert_eq!(alias_ids(&search).await, vec!["o1", "o3"]);

    let again = reconciler.reconcile(&registration).await.unwrap();
    assert_eq!(again.deleted, 0);
    assert_eq!(again.failures, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn reconcile_never_touches_store_only_objects() {
    let store = Arc::new(MemoryObjectStore::new());
    let search = Arc::new(MemorySearchBackend::new());
    put(store.as_ref(), "o1", 1).await;

    let report = Reindexer::new(store.clone(), search.clone())
        .with_config(config())
        .reindex(&registration())
        .await;
    assert!(report.succeeded());

    // Written after the reindex: present in storage only.
    put(store.as_ref(), "o2", 2).await;
    let pass = Reconciler::new(store.clone(), search.clone())
        .reconcile(&registration())
        .await
        .unwrap();
    assert_eq!(pass.deleted, 0);
    assert_eq!(store.len().await, 2);
    assert_eq!(alias_ids(&search).await, vec!["o1"]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn queries_keep_working_while_a_reindex_replaces_the_generation() {
    let store = Arc::new(MemoryObjectStore::new());
    let search = Arc::new(MemorySearchBackend::new());
    for i in 0..40 {
        put(store.as_ref(), &format!("o{i:02}"), i).await;
    }
    let first = Reindexer::new(store.clone(), search.clone())
        .with_config(config())
        .reindex(&registration())
        .await;
    assert!(first.succeeded());

    let reader_search = search.clone();
    let reader = tokio::spawn(async move {
        for _ in 0..200 {
            let page = reader_search
                .query(ALIAS, &SearchQuery::match_all(100))
                .await
                .unwrap();
            let indices: BTreeSet<&str> = page.hits.iter().map(|hit| hit.index.as_str()).collect();
            assert_eq!(indices.len(), 1);
            assert_eq!(page.total, 40);
            tokio::task::yield_now().await;
        }
    });

    let second = Reindexer::new(store.clone(), search.clone())
        .with_config(config())
        .reindex(&registration())
        .await;
    reader.await.unwrap();
    assert!(second.succeeded());
    assert_eq!(second.removed_generations, vec![first.generation.unwrap()]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn coordinator_stop_signal_cancels_every_job() {
    let store = Arc::new(MemoryObjectStore::new());
    let search = Arc::new(MemorySearchBackend::new());
    put(store.as_ref(), "o1", 1).await;

    let registry = Arc::new(CollectionRegistry::new());
    registry.register(registration()).unwrap();
    let stop = StopSignal::new();
    stop.stop();

    let report = SyncCoordinator::new(registry, store, search.clone())
        .with_reindex_config(config())
        .with_stop_signal(stop)
        .run_registered(2)
        .await;
    assert_eq!(report.jobs.len(), 1);
    assert_eq!(report.jobs[0].state, JobState::Failed);
    assert!(search.index_names().is_empty());
}
