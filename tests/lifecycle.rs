//! Integration tests for index naming and lifecycle.
//!
//! Covers the naming invariants (deterministic, injective for slug
//! identifiers), idempotent creation, non-destructive mapping updates, and
//! cascade deletion boundaries.

use std::sync::Arc;

use proptest::prelude::*;
use serde_json::json;

use searchbridge::{
    is_valid_slug, CollectionId, Config, Indexer, MemoryBackend, Schema, SearchBackend, TenantId,
};

fn indexer_with(backend: Arc<MemoryBackend>) -> Indexer {
    let config = Config {
        index_prefix: "test".to_string(),
        ..Default::default()
    };
    Indexer::new(backend as Arc<dyn SearchBackend>, &config)
}

fn schema(value: serde_json::Value) -> Schema {
    Schema::from_value(&value).unwrap()
}

// ============================================================================
// Naming Tests
// ============================================================================

#[test]
fn test_index_name_is_deterministic() {
    let idx = indexer_with(Arc::new(MemoryBackend::new()));
    let tenant = TenantId::new("bid");
    let collection = CollectionId::new("cid");

    let first = idx.index_name(&tenant, &collection);
    let second = idx.index_name(&tenant, &collection);
    assert_eq!(first, second);
    assert_eq!(first, "test-bid-cid");
}

proptest! {
    #[test]
    fn test_index_name_injective_for_slugs(
        t1 in "[a-z0-9_]{1,12}",
        c1 in "[a-z0-9_]{1,12}",
        t2 in "[a-z0-9_]{1,12}",
        c2 in "[a-z0-9_]{1,12}",
    ) {
        prop_assume!(is_valid_slug(&t1) && is_valid_slug(&c1));
        prop_assume!((t1.clone(), c1.clone()) != (t2.clone(), c2.clone()));

        let idx = indexer_with(Arc::new(MemoryBackend::new()));
        let a = idx.index_name(&TenantId::new(t1), &CollectionId::new(c1));
        let b = idx.index_name(&TenantId::new(t2), &CollectionId::new(c2));
        prop_assert_ne!(a, b);
    }
}

// ============================================================================
// Creation Idempotence Tests
// ============================================================================

#[test]
fn test_create_twice_with_same_schema_is_stable() {
    let backend = Arc::new(MemoryBackend::new());
    let idx = indexer_with(Arc::clone(&backend));
    let tenant = TenantId::new("bid");
    let collection = CollectionId::new("cid");
    let s = schema(json!({"properties": {"id": {"type": "keyword"}}}));

    idx.create_index(&tenant, &collection, Some(&s)).unwrap();
    let before = backend.get_mapping("test-bid-cid").unwrap();

    idx.create_index(&tenant, &collection, Some(&s)).unwrap();
    let after = backend.get_mapping("test-bid-cid").unwrap();

    assert_eq!(before, after);
}

#[test]
fn test_create_without_schema_leaves_dynamic_mapping() {
    let backend = Arc::new(MemoryBackend::new());
    let idx = indexer_with(Arc::clone(&backend));

    idx.create_index(&TenantId::new("bid"), &CollectionId::new("cid"), None)
        .unwrap();

    assert!(backend.get_mapping("test-bid-cid").unwrap().is_empty());
}

// ============================================================================
// Mapping Update Tests
// ============================================================================

#[test]
fn test_update_merges_without_dropping_fields() {
    let backend = Arc::new(MemoryBackend::new());
    let idx = indexer_with(Arc::clone(&backend));
    let tenant = TenantId::new("bid");
    let collection = CollectionId::new("cid");

    idx.create_index(
        &tenant,
        &collection,
        Some(&schema(json!({"properties": {
            "build": {"properties": {"id": {"type": "keyword"}}},
            "last_modified": {"type": "long"},
        }}))),
    )
    .unwrap();

    // A refinement of one nested field only.
    idx.update_index(
        &tenant,
        &collection,
        &schema(json!({"properties": {
            "build": {"properties": {"id": {"type": "keyword", "ignore_above": 12}}},
        }})),
    )
    .unwrap();

    let mapping = backend.get_mapping("test-bid-cid").unwrap().as_value();
    assert_eq!(
        mapping["properties"]["build"]["properties"]["id"]["ignore_above"],
        12
    );
    // Untouched fields are retained.
    assert_eq!(mapping["properties"]["last_modified"]["type"], "long");
}

// ============================================================================
// Deletion Tests
// ============================================================================

#[test]
fn test_collection_delete_leaves_siblings() {
    let backend = Arc::new(MemoryBackend::new());
    let idx = indexer_with(Arc::clone(&backend));
    let tenant = TenantId::new("bid");

    idx.create_index(&tenant, &CollectionId::new("c1"), None).unwrap();
    idx.create_index(&tenant, &CollectionId::new("c2"), None).unwrap();

    idx.delete_index(&tenant, Some(&CollectionId::new("c1"))).unwrap();

    assert_eq!(backend.index_names(), vec!["test-bid-c2"]);
}

#[test]
fn test_tenant_delete_cascades_to_every_collection() {
    let backend = Arc::new(MemoryBackend::new());
    let idx = indexer_with(Arc::clone(&backend));

    for collection in ["c1", "c2", "c3"] {
        idx.create_index(&TenantId::new("bid"), &CollectionId::new(collection), None)
            .unwrap();
    }
    idx.create_index(&TenantId::new("other"), &CollectionId::new("c1"), None)
        .unwrap();

    idx.delete_index(&TenantId::new("bid"), None).unwrap();

    assert_eq!(backend.index_names(), vec!["test-other-c1"]);
}

#[test]
fn test_flush_all_is_prefix_scoped() {
    let backend = Arc::new(MemoryBackend::new());
    let idx = indexer_with(Arc::clone(&backend));

    idx.create_index(&TenantId::new("b1"), &CollectionId::new("c1"), None)
        .unwrap();
    idx.create_index(&TenantId::new("b2"), &CollectionId::new("c2"), None)
        .unwrap();
    backend.create_index("unrelated", None).unwrap();

    idx.flush_all().unwrap();

    assert_eq!(backend.index_names(), vec!["unrelated"]);
}

// ============================================================================
// Round-trip Tests
// ============================================================================

#[test]
fn test_index_then_delete_leaves_no_document() {
    let backend = Arc::new(MemoryBackend::new());
    let idx = indexer_with(Arc::clone(&backend));
    let tenant = TenantId::new("bid");
    let collection = CollectionId::new("cid");
    let id = searchbridge::RecordId::new("r1");

    let mut batch = idx.bulk();
    batch.index_document(&tenant, &collection, id.clone(), json!({"id": "r1"}));
    batch.commit().unwrap();

    let mut batch = idx.bulk();
    batch.unindex_record(&tenant, &collection, &id);
    batch.commit().unwrap();

    let results = backend.search("test-bid-cid", &json!({})).unwrap();
    assert_eq!(results["hits"]["total"]["value"], 0);
}
