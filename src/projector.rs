//! Change projection: primary-store mutations to index operations.
//!
//! The host invokes [`ChangeProjector::handle`] synchronously with one
//! [`ChangeEvent`] per mutating request. Dispatch is an explicit table from
//! `(resource kind, action)` to handler functions; unmapped combinations are
//! ignored.
//!
//! Indexing is best-effort relative to the primary write: every backend
//! failure in this module is logged and swallowed, never surfaced to the
//! caller. A record mutation that fails to index self-heals on the next
//! write to the same id, or through an operator reindex.
//!
//! All per-record operations of one event go into a single bulk batch, so an
//! event touching 50 records costs exactly one backend round-trip.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, error, warn};

use crate::error::BackendError;
use crate::indexer::Indexer;
use crate::types::{
    Change, ChangeAction, ChangeEvent, CollectionId, RecordId, ResourceKind, Schema, TenantId,
    SCHEMA_ATTRIBUTE,
};

type Handler = fn(&ChangeProjector, &ChangeEvent) -> Result<(), BackendError>;

/// Projects primary-store change events into search-index operations.
pub struct ChangeProjector {
    indexer: Arc<Indexer>,
}

impl ChangeProjector {
    /// Creates a projector over the shared indexer handle.
    pub fn new(indexer: Arc<Indexer>) -> Self {
        Self { indexer }
    }

    /// Dispatch table keyed by `(resource kind, action)`.
    fn route(resource: ResourceKind, action: ChangeAction) -> Option<Handler> {
        use ChangeAction::*;
        use ResourceKind::*;

        match (resource, action) {
            (Record, Create) | (Record, Update) | (Record, Delete) => {
                Some(Self::on_record_changed)
            }
            (Collection, Create) => Some(Self::on_collection_created),
            (Collection, Update) => Some(Self::on_collection_updated),
            (Collection, Delete) => Some(Self::on_collection_deleted),
            (Bucket, Delete) => Some(Self::on_bucket_deleted),
            _ => None,
        }
    }

    /// Handles one change event.
    ///
    /// Never fails: indexing errors are logged and the primary write's
    /// outcome stands.
    pub fn handle(&self, event: &ChangeEvent) {
        let Some(handler) = Self::route(event.resource, event.action) else {
            debug!(resource = ?event.resource, action = ?event.action, "No handler for event");
            return;
        };

        if let Err(e) = handler(self, event) {
            error!(
                tenant = %event.tenant_id,
                resource = ?event.resource,
                action = ?event.action,
                error = %e,
                "Failed to project change event"
            );
        }
    }

    /// Handles the global "store flushed" notification: drops every index
    /// under the configured prefix.
    pub fn on_store_flushed(&self) {
        if let Err(e) = self.indexer.flush_all() {
            error!(error = %e, "Failed to flush indices");
        }
    }

    /// Record create/update/delete: one batch for all impacted records.
    fn on_record_changed(&self, event: &ChangeEvent) -> Result<(), BackendError> {
        let Some(collection) = &event.collection_id else {
            warn!(tenant = %event.tenant_id, "Record event without collection id");
            return Ok(());
        };

        let mut batch = self.indexer.bulk();
        for change in &event.impacted {
            if event.action == ChangeAction::Delete {
                if let Some(id) = record_id(change.old.as_ref()) {
                    batch.unindex_record(&event.tenant_id, collection, &id);
                }
            } else if let Some(new) = &change.new {
                if let Some(id) = record_id(Some(new)) {
                    batch.index_document(&event.tenant_id, collection, id, new.clone());
                }
            }
        }

        batch.commit()?;
        Ok(())
    }

    /// Collection created: create its index, with the declared schema when
    /// the metadata carries one.
    fn on_collection_created(&self, event: &ChangeEvent) -> Result<(), BackendError> {
        for change in &event.impacted {
            let Some(meta) = &change.new else { continue };
            let Some(collection) = collection_id(meta) else { continue };
            let schema = declared_schema(meta);
            self.indexer
                .create_index(&event.tenant_id, &collection, schema.as_ref())?;
        }
        Ok(())
    }

    /// Collection updated: propagate schema declarations and changes.
    ///
    /// Removing the schema attribute leaves the live mapping untouched;
    /// only value changes reach the backend.
    fn on_collection_updated(&self, event: &ChangeEvent) -> Result<(), BackendError> {
        for change in &event.impacted {
            let Some(new) = &change.new else { continue };
            let Some(collection) = collection_id(new) else { continue };

            let old_schema = change.old.as_ref().and_then(declared_schema);
            let new_schema = declared_schema(new);

            match (old_schema, new_schema) {
                (None, Some(schema)) => {
                    self.indexer
                        .create_index(&event.tenant_id, &collection, Some(&schema))?;
                }
                (Some(old), Some(new)) if old != new => {
                    self.indexer
                        .update_index(&event.tenant_id, &collection, &new)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    /// Collection deleted: drop its index.
    fn on_collection_deleted(&self, event: &ChangeEvent) -> Result<(), BackendError> {
        for change in &event.impacted {
            let Some(old) = &change.old else { continue };
            let Some(collection) = collection_id(old) else { continue };
            self.indexer
                .delete_index(&event.tenant_id, Some(&collection))?;
        }
        Ok(())
    }

    /// Bucket deleted: drop every index of the tenant.
    fn on_bucket_deleted(&self, event: &ChangeEvent) -> Result<(), BackendError> {
        self.indexer.delete_index(&event.tenant_id, None)
    }
}

/// Extracts the record id from a record document.
fn record_id(value: Option<&Value>) -> Option<RecordId> {
    value
        .and_then(|v| v.get("id"))
        .and_then(Value::as_str)
        .map(RecordId::new)
}

/// Extracts the collection id from a collection-metadata object.
fn collection_id(meta: &Value) -> Option<CollectionId> {
    meta.get("id").and_then(Value::as_str).map(CollectionId::new)
}

/// Extracts the declared index schema from collection metadata.
fn declared_schema(meta: &Value) -> Option<Schema> {
    meta.get(SCHEMA_ATTRIBUTE).and_then(Schema::from_value)
}

/// Convenience constructor for record-level events.
pub fn record_event(
    tenant: &TenantId,
    collection: &CollectionId,
    action: ChangeAction,
    impacted: Vec<Change>,
) -> ChangeEvent {
    ChangeEvent {
        tenant_id: tenant.clone(),
        collection_id: Some(collection.clone()),
        resource: ResourceKind::Record,
        action,
        impacted,
    }
}

/// Convenience constructor for collection-level events.
pub fn collection_event(
    tenant: &TenantId,
    action: ChangeAction,
    impacted: Vec<Change>,
) -> ChangeEvent {
    ChangeEvent {
        tenant_id: tenant.clone(),
        collection_id: None,
        resource: ResourceKind::Collection,
        action,
        impacted,
    }
}

/// Convenience constructor for bucket-level events.
pub fn bucket_event(tenant: &TenantId, action: ChangeAction) -> ChangeEvent {
    ChangeEvent {
        tenant_id: tenant.clone(),
        collection_id: None,
        resource: ResourceKind::Bucket,
        action,
        impacted: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MemoryBackend, SearchBackend};
    use crate::config::Config;
    use serde_json::json;

    fn fixture() -> (Arc<MemoryBackend>, ChangeProjector) {
        let backend = Arc::new(MemoryBackend::new());
        let config = Config {
            index_prefix: "test".to_string(),
            ..Default::default()
        };
        let indexer = Indexer::new(Arc::clone(&backend) as Arc<dyn SearchBackend>, &config);
        (backend, ChangeProjector::new(Arc::new(indexer)))
    }

    #[test]
    fn test_route_table_coverage() {
        use ChangeAction::*;
        use ResourceKind::*;

        assert!(ChangeProjector::route(Record, Create).is_some());
        assert!(ChangeProjector::route(Record, Update).is_some());
        assert!(ChangeProjector::route(Record, Delete).is_some());
        assert!(ChangeProjector::route(Collection, Create).is_some());
        assert!(ChangeProjector::route(Collection, Update).is_some());
        assert!(ChangeProjector::route(Collection, Delete).is_some());
        assert!(ChangeProjector::route(Bucket, Delete).is_some());
        // Bucket creation has no index-side effect.
        assert!(ChangeProjector::route(Bucket, Create).is_none());
    }

    #[test]
    fn test_record_create_indexes_document() {
        let (backend, projector) = fixture();
        let tenant = TenantId::new("bid");
        let collection = CollectionId::new("cid");

        let event = record_event(
            &tenant,
            &collection,
            ChangeAction::Create,
            vec![Change::created(json!({"id": "r1", "hello": "world"}))],
        );
        projector.handle(&event);

        assert_eq!(backend.doc_ids("test-bid-cid"), vec!["r1"]);
    }

    #[test]
    fn test_batch_import_single_submission() {
        let (backend, projector) = fixture();
        let tenant = TenantId::new("bid");
        let collection = CollectionId::new("cid");

        let impacted: Vec<Change> = (0..50)
            .map(|i| Change::created(json!({"id": format!("r{:02}", i), "n": i})))
            .collect();
        let event = record_event(&tenant, &collection, ChangeAction::Create, impacted);
        projector.handle(&event);

        assert_eq!(backend.bulk_calls(), 1);
        assert_eq!(backend.doc_ids("test-bid-cid").len(), 50);
    }

    #[test]
    fn test_record_delete_unindexes_old() {
        let (backend, projector) = fixture();
        let tenant = TenantId::new("bid");
        let collection = CollectionId::new("cid");

        projector.handle(&record_event(
            &tenant,
            &collection,
            ChangeAction::Create,
            vec![Change::created(json!({"id": "r1"}))],
        ));
        projector.handle(&record_event(
            &tenant,
            &collection,
            ChangeAction::Delete,
            vec![Change::deleted(json!({"id": "r1"}))],
        ));

        assert!(backend.doc_ids("test-bid-cid").is_empty());
    }

    #[test]
    fn test_backend_failure_is_swallowed() {
        let (backend, projector) = fixture();
        backend.set_bulk_failure(true);

        // Must not panic or propagate.
        projector.handle(&record_event(
            &TenantId::new("bid"),
            &CollectionId::new("cid"),
            ChangeAction::Create,
            vec![Change::created(json!({"id": "r1"}))],
        ));

        assert!(backend.doc_ids("test-bid-cid").is_empty());
    }

    #[test]
    fn test_collection_created_with_schema() {
        let (backend, projector) = fixture();
        let meta = json!({
            "id": "cid",
            "index:schema": {"properties": {"id": {"type": "keyword"}}},
        });

        projector.handle(&collection_event(
            &TenantId::new("bid"),
            ChangeAction::Create,
            vec![Change::created(meta)],
        ));

        assert!(backend.index_exists("test-bid-cid").unwrap());
        let mapping = backend.get_mapping("test-bid-cid").unwrap().as_value();
        assert_eq!(mapping["properties"]["id"]["type"], "keyword");
    }

    #[test]
    fn test_collection_update_schema_added() {
        let (backend, projector) = fixture();
        let tenant = TenantId::new("bid");

        projector.handle(&collection_event(
            &tenant,
            ChangeAction::Create,
            vec![Change::created(json!({"id": "cid"}))],
        ));

        let old = json!({"id": "cid"});
        let new = json!({"id": "cid", "index:schema": {"properties": {"a": {"type": "long"}}}});
        projector.handle(&collection_event(
            &tenant,
            ChangeAction::Update,
            vec![Change::updated(old, new)],
        ));

        let mapping = backend.get_mapping("test-bid-cid").unwrap().as_value();
        assert_eq!(mapping["properties"]["a"]["type"], "long");
    }

    #[test]
    fn test_collection_update_unchanged_schema_is_noop() {
        let (backend, projector) = fixture();
        let tenant = TenantId::new("bid");
        let meta = json!({"id": "cid", "index:schema": {"properties": {"a": {"type": "long"}}}});

        projector.handle(&collection_event(
            &tenant,
            ChangeAction::Create,
            vec![Change::created(meta.clone())],
        ));

        // Same schema value: nothing should change, and nothing should fail
        // even if the backend were unreachable for mapping updates.
        projector.handle(&collection_event(
            &tenant,
            ChangeAction::Update,
            vec![Change::updated(meta.clone(), meta)],
        ));

        assert!(backend.index_exists("test-bid-cid").unwrap());
    }

    #[test]
    fn test_schema_removal_preserves_mapping() {
        let (backend, projector) = fixture();
        let tenant = TenantId::new("bid");
        let meta = json!({"id": "cid", "index:schema": {"properties": {"a": {"type": "long"}}}});

        projector.handle(&collection_event(
            &tenant,
            ChangeAction::Create,
            vec![Change::created(meta.clone())],
        ));
        projector.handle(&collection_event(
            &tenant,
            ChangeAction::Update,
            vec![Change::updated(meta, json!({"id": "cid"}))],
        ));

        let mapping = backend.get_mapping("test-bid-cid").unwrap().as_value();
        assert_eq!(mapping["properties"]["a"]["type"], "long");
    }

    #[test]
    fn test_collection_delete_removes_only_own_index() {
        let (backend, projector) = fixture();
        let tenant = TenantId::new("bid");

        projector.handle(&collection_event(
            &tenant,
            ChangeAction::Create,
            vec![
                Change::created(json!({"id": "c1"})),
                Change::created(json!({"id": "c2"})),
            ],
        ));

        projector.handle(&collection_event(
            &tenant,
            ChangeAction::Delete,
            vec![Change::deleted(json!({"id": "c1"}))],
        ));

        assert_eq!(backend.index_names(), vec!["test-bid-c2"]);
    }

    #[test]
    fn test_bucket_delete_cascades() {
        let (backend, projector) = fixture();
        let tenant = TenantId::new("bid");

        projector.handle(&collection_event(
            &tenant,
            ChangeAction::Create,
            vec![
                Change::created(json!({"id": "c1"})),
                Change::created(json!({"id": "c2"})),
            ],
        ));

        projector.handle(&bucket_event(&tenant, ChangeAction::Delete));

        assert!(backend.index_names().is_empty());
    }

    #[test]
    fn test_store_flush_drops_everything() {
        let (backend, projector) = fixture();

        projector.handle(&collection_event(
            &TenantId::new("b1"),
            ChangeAction::Create,
            vec![Change::created(json!({"id": "c1"}))],
        ));
        projector.handle(&collection_event(
            &TenantId::new("b2"),
            ChangeAction::Create,
            vec![Change::created(json!({"id": "c2"}))],
        ));

        projector.on_store_flushed();

        assert!(backend.index_names().is_empty());
    }
}
