//! Integration tests for the change-projection path.
//!
//! These tests wire a record store, the projector and an in-memory search
//! backend the way the host does: every store mutation is followed by a
//! change event handed to the projector. They verify:
//! - records become searchable after create/update
//! - deletions unindex
//! - one event means one bulk submission, regardless of record count
//! - indexing failures never break the primary write path

use std::sync::Arc;

use serde_json::{json, Map, Value};
use tempfile::tempdir;

use searchbridge::{
    bucket_event, collection_event, record_event, Change, ChangeAction, ChangeProjector,
    CollectionId, Config, Indexer, MemoryBackend, RedbStore, SearchBackend, TenantId,
};

struct Host {
    _dir: tempfile::TempDir,
    store: RedbStore,
    backend: Arc<MemoryBackend>,
    projector: ChangeProjector,
    tenant: TenantId,
    collection: CollectionId,
}

fn host() -> Host {
    let dir = tempdir().unwrap();
    let store = RedbStore::open(dir.path().join("records.db")).unwrap();
    let backend = Arc::new(MemoryBackend::new());
    let config = Config {
        index_prefix: "test".to_string(),
        ..Default::default()
    };
    let indexer = Arc::new(Indexer::new(
        Arc::clone(&backend) as Arc<dyn SearchBackend>,
        &config,
    ));

    let tenant = TenantId::new("bid");
    let collection = CollectionId::new("cid");
    store.put_collection(&tenant, &collection, Map::new()).unwrap();

    Host {
        _dir: dir,
        store,
        backend,
        projector: ChangeProjector::new(indexer),
        tenant,
        collection,
    }
}

fn fields(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}

// ============================================================================
// Record Projection Tests
// ============================================================================

#[test]
fn test_created_record_is_searchable() {
    let host = host();

    let record = host
        .store
        .create_record(&host.tenant, &host.collection, fields(json!({"hello": "world"})))
        .unwrap();
    host.projector.handle(&record_event(
        &host.tenant,
        &host.collection,
        ChangeAction::Create,
        vec![Change::created(record.document())],
    ));

    let results = host
        .backend
        .search("test-bid-cid", &json!({}))
        .unwrap();
    assert_eq!(results["hits"]["total"]["value"], 1);
    assert_eq!(results["hits"]["hits"][0]["_source"]["hello"], "world");
    // The store id is the document id.
    assert_eq!(
        results["hits"]["hits"][0]["_id"],
        json!(record.id.as_str())
    );
}

#[test]
fn test_updated_record_overwrites_document() {
    let host = host();

    let record = host
        .store
        .create_record(&host.tenant, &host.collection, fields(json!({"v": 1})))
        .unwrap();
    host.projector.handle(&record_event(
        &host.tenant,
        &host.collection,
        ChangeAction::Create,
        vec![Change::created(record.document())],
    ));

    let updated = host
        .store
        .upsert_record(
            &host.tenant,
            &host.collection,
            record.id.clone(),
            fields(json!({"v": 2})),
        )
        .unwrap();
    host.projector.handle(&record_event(
        &host.tenant,
        &host.collection,
        ChangeAction::Update,
        vec![Change::updated(record.document(), updated.document())],
    ));

    let results = host.backend.search("test-bid-cid", &json!({})).unwrap();
    assert_eq!(results["hits"]["total"]["value"], 1);
    assert_eq!(results["hits"]["hits"][0]["_source"]["v"], 2);
}

#[test]
fn test_deleted_record_is_unindexed() {
    let host = host();

    let record = host
        .store
        .create_record(&host.tenant, &host.collection, fields(json!({})))
        .unwrap();
    host.projector.handle(&record_event(
        &host.tenant,
        &host.collection,
        ChangeAction::Create,
        vec![Change::created(record.document())],
    ));

    host.store
        .delete_record(&host.tenant, &host.collection, &record.id)
        .unwrap();
    host.projector.handle(&record_event(
        &host.tenant,
        &host.collection,
        ChangeAction::Delete,
        vec![Change::deleted(record.document())],
    ));

    let results = host.backend.search("test-bid-cid", &json!({})).unwrap();
    assert_eq!(results["hits"]["total"]["value"], 0);
}

// ============================================================================
// Batching Tests
// ============================================================================

#[test]
fn test_batch_import_is_one_submission() {
    let host = host();

    let mut impacted = Vec::new();
    for i in 0..50 {
        let record = host
            .store
            .create_record(&host.tenant, &host.collection, fields(json!({"n": i})))
            .unwrap();
        impacted.push(Change::created(record.document()));
    }

    // One event for the whole import, like a host-side batch request.
    host.projector.handle(&record_event(
        &host.tenant,
        &host.collection,
        ChangeAction::Create,
        impacted,
    ));

    assert_eq!(host.backend.bulk_calls(), 1);
    assert_eq!(host.backend.doc_ids("test-bid-cid").len(), 50);
}

#[test]
fn test_event_with_no_impacted_records_skips_backend() {
    let host = host();

    host.projector.handle(&record_event(
        &host.tenant,
        &host.collection,
        ChangeAction::Create,
        vec![],
    ));

    assert_eq!(host.backend.bulk_calls(), 0);
}

// ============================================================================
// Failure Isolation Tests
// ============================================================================

#[test]
fn test_primary_write_survives_indexing_failure() {
    let host = host();
    host.backend.set_bulk_failure(true);

    // The store write is the primary operation; it must succeed...
    let record = host
        .store
        .create_record(&host.tenant, &host.collection, fields(json!({"hola": "mundo"})))
        .unwrap();
    // ...and projecting the event must not panic or error out.
    host.projector.handle(&record_event(
        &host.tenant,
        &host.collection,
        ChangeAction::Create,
        vec![Change::created(record.document())],
    ));

    assert_eq!(
        host.store.count_records(&host.tenant, &host.collection).unwrap(),
        1
    );
    // The document never made it to search.
    assert!(host.backend.doc_ids("test-bid-cid").is_empty());
}

#[test]
fn test_indexing_recovers_after_backend_comes_back() {
    let host = host();

    host.backend.set_bulk_failure(true);
    let record = host
        .store
        .create_record(&host.tenant, &host.collection, fields(json!({"v": 1})))
        .unwrap();
    host.projector.handle(&record_event(
        &host.tenant,
        &host.collection,
        ChangeAction::Create,
        vec![Change::created(record.document())],
    ));
    assert!(host.backend.doc_ids("test-bid-cid").is_empty());

    // Self-healing: the next write to the same id re-indexes the document.
    host.backend.set_bulk_failure(false);
    let updated = host
        .store
        .upsert_record(
            &host.tenant,
            &host.collection,
            record.id.clone(),
            fields(json!({"v": 2})),
        )
        .unwrap();
    host.projector.handle(&record_event(
        &host.tenant,
        &host.collection,
        ChangeAction::Update,
        vec![Change::updated(record.document(), updated.document())],
    ));

    assert_eq!(host.backend.doc_ids("test-bid-cid").len(), 1);
}

// ============================================================================
// Collection / Bucket Event Tests
// ============================================================================

#[test]
fn test_collection_deletion_removes_index_and_store_side() {
    let host = host();
    let sibling = CollectionId::new("other");
    host.store.put_collection(&host.tenant, &sibling, Map::new()).unwrap();

    host.projector.handle(&collection_event(
        &host.tenant,
        ChangeAction::Create,
        vec![
            Change::created(json!({"id": "cid"})),
            Change::created(json!({"id": "other"})),
        ],
    ));

    host.store.delete_collection(&host.tenant, &host.collection).unwrap();
    host.projector.handle(&collection_event(
        &host.tenant,
        ChangeAction::Delete,
        vec![Change::deleted(json!({"id": "cid"}))],
    ));

    assert_eq!(host.backend.index_names(), vec!["test-bid-other"]);
}

#[test]
fn test_bucket_deletion_removes_all_tenant_indices() {
    let host = host();

    host.projector.handle(&collection_event(
        &host.tenant,
        ChangeAction::Create,
        vec![
            Change::created(json!({"id": "c1"})),
            Change::created(json!({"id": "c2"})),
        ],
    ));
    // Another tenant's index must survive.
    host.projector.handle(&collection_event(
        &TenantId::new("unrelated"),
        ChangeAction::Create,
        vec![Change::created(json!({"id": "c9"}))],
    ));

    host.projector
        .handle(&bucket_event(&host.tenant, ChangeAction::Delete));

    assert_eq!(host.backend.index_names(), vec!["test-unrelated-c9"]);
}
