use conductor::conductor::model::{Metadata, ThreadStatus};
use conductor::conductor::store::WorkingSetStore;

#[tokio::test]
async fn search_by_status_and_metadata_returns_only_the_matching_thread() {
    let dir = tempfile::tempdir().unwrap();
    let store = WorkingSetStore::new(dir.path().join("snapshot.json"));

    let mut prod_meta = Metadata::new();
    prod_meta.insert("env".to_string(), serde_json::json!("prod"));
    let t1 = store.create_thread(prod_meta).await;

    let mut dev_meta = Metadata::new();
    dev_meta.insert("env".to_string(), serde_json::json!("dev"));
    store.create_thread(dev_meta).await;

    let results = store
        .search_threads(
            None,
            Some(ThreadStatus::Active),
            Some(&("env".to_string(), "prod".to_string())),
            10,
        )
        .await;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].id, t1.id);
}

#[tokio::test]
async fn snapshot_survives_a_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let store = WorkingSetStore::new(path.clone());
    store.create_thread(Metadata::new()).await;
    store
        .create_item("finding".to_string(), serde_json::json!("hello world"), Default::default())
        .await;

    // `create_thread`/`create_item` only schedule a background write; give
    // the coalesced writer a moment to flush before reloading from a fresh
    // store instance.
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;

    let reloaded = WorkingSetStore::new(path);
    reloaded.load().await;

    let before = store.statistics().await;
    let after = reloaded.statistics().await;
    assert_eq!(before.thread_count, after.thread_count);
    assert_eq!(before.item_count, after.item_count);
}
