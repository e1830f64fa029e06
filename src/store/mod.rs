//! Primary record store interface boundary.
//!
//! The record store is an external collaborator; this crate consumes exactly
//! two things from it: collection-metadata reads (to resolve a declared
//! schema) and keyset-paginated record listings (to drive a full reindex).
//! [`RecordStore`] captures that contract; [`RedbStore`] is an embedded
//! adapter used by the host glue, the reindex CLI and tests.

pub mod redb;

pub use self::redb::RedbStore;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::StoreError;
use crate::types::{CollectionId, PageCursor, Record, Schema, TenantId, Timestamp, SCHEMA_ATTRIBUTE};

/// Collection metadata object.
///
/// Wire shape `{"id": ..., "last_modified": ..., <attributes>}`; the
/// `index:schema` attribute, when present, declares the collection's index
/// mapping.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CollectionMeta {
    /// Collection identifier.
    pub id: CollectionId,

    /// Metadata modification timestamp.
    pub last_modified: Timestamp,

    /// Arbitrary metadata attributes.
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

impl CollectionMeta {
    /// Creates collection metadata.
    pub fn new(id: CollectionId, last_modified: Timestamp, attributes: Map<String, Value>) -> Self {
        Self {
            id,
            last_modified,
            attributes,
        }
    }

    /// Returns the declared index schema, if the metadata carries one.
    pub fn schema(&self) -> Option<Schema> {
        self.attributes
            .get(SCHEMA_ATTRIBUTE)
            .and_then(Schema::from_value)
    }

    /// Returns the metadata as a JSON value (the change-event payload shape).
    pub fn document(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Read contract the indexing bridge consumes from the primary store.
pub trait RecordStore: Send + Sync {
    /// Fetches a collection's metadata.
    ///
    /// # Errors
    /// `StoreError::CollectionNotFound` if the collection does not exist.
    fn get_collection(
        &self,
        tenant: &TenantId,
        collection: &CollectionId,
    ) -> Result<CollectionMeta, StoreError>;

    /// Returns up to `limit` records in descending `(last_modified, id)`
    /// order, strictly before `before` when given.
    ///
    /// Consecutive calls feeding each page's last record back as the cursor
    /// visit every record exactly once, with no overlap and no gaps.
    fn page_records(
        &self,
        tenant: &TenantId,
        collection: &CollectionId,
        before: Option<&PageCursor>,
        limit: usize,
    ) -> Result<Vec<Record>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_collection_meta_schema_extraction() {
        let mut attributes = Map::new();
        attributes.insert(
            SCHEMA_ATTRIBUTE.to_string(),
            json!({"properties": {"id": {"type": "keyword"}}}),
        );
        let meta = CollectionMeta::new(
            CollectionId::new("cid"),
            Timestamp::from_millis(1),
            attributes,
        );

        let schema = meta.schema().unwrap();
        assert_eq!(
            schema.as_value()["properties"]["id"]["type"],
            json!("keyword")
        );
    }

    #[test]
    fn test_collection_meta_without_schema() {
        let meta = CollectionMeta::new(CollectionId::new("cid"), Timestamp::from_millis(1), Map::new());
        assert!(meta.schema().is_none());
    }

    #[test]
    fn test_collection_meta_document_shape() {
        let mut attributes = Map::new();
        attributes.insert("label".to_string(), json!("news"));
        let meta = CollectionMeta::new(
            CollectionId::new("cid"),
            Timestamp::from_millis(9),
            attributes,
        );

        let doc = meta.document();
        assert_eq!(doc["id"], json!("cid"));
        assert_eq!(doc["last_modified"], json!(9));
        assert_eq!(doc["label"], json!("news"));
    }
}
