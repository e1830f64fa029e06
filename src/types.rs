//! Core type definitions: identifiers, timestamps, records and change events.
//!
//! Tenant and collection identifiers are lowercase slugs (`[a-z0-9_]`); the
//! `-` character is reserved as the index-name separator, which is what makes
//! `{prefix}-{tenant}-{collection}` an injective naming function. Record ids
//! are opaque strings assigned by the record store (UUID v7 when the store
//! assigns them itself).

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Collection-metadata attribute holding the declared index mapping.
pub const SCHEMA_ATTRIBUTE: &str = "index:schema";

/// Returns true if `id` is a valid tenant/collection slug.
///
/// Slugs are non-empty, lowercase alphanumeric plus underscore. Hyphens are
/// rejected because they separate the components of an index name.
pub fn is_valid_slug(id: &str) -> bool {
    !id.is_empty()
        && id
            .bytes()
            .all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || b == b'_')
}

/// Tenant identifier (the top level of the record hierarchy).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TenantId(pub String);

impl TenantId {
    /// Creates a new TenantId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the tenant id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Collection identifier, unique within its tenant.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionId(pub String);

impl CollectionId {
    /// Creates a new CollectionId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the collection id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Record identifier.
///
/// The record store's id doubles as the search backend's document id, which
/// makes index/overwrite/delete idempotent per record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordId(pub String);

impl RecordId {
    /// Creates a RecordId from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Creates a random, time-ordered RecordId (UUID v7).
    ///
    /// Used when the record store assigns ids server-side.
    pub fn random() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Returns the record id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unix timestamp in milliseconds.
///
/// Record modification times. Big-endian byte form gives lexicographic
/// ordering equal to numeric ordering, which the store's mtime index relies
/// on.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Timestamp(pub i64);

impl Timestamp {
    /// Creates a timestamp for the current moment.
    ///
    /// If the system clock is before the Unix epoch, returns 0 rather than
    /// panicking.
    #[inline]
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as i64)
    }

    /// Creates a timestamp from Unix milliseconds.
    #[inline]
    pub const fn from_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Returns the timestamp as Unix milliseconds.
    #[inline]
    pub const fn as_millis(&self) -> i64 {
        self.0
    }

    /// Returns big-endian bytes (lexicographic ordering matches numeric).
    #[inline]
    pub fn to_be_bytes(&self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One record of the primary store.
///
/// Serializes to the wire shape `{"id": ..., "last_modified": ..., <fields>}`,
/// which is also the document shape sent to the search backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Record identifier, also the search document id.
    pub id: RecordId,

    /// Modification timestamp, strictly increasing per collection.
    pub last_modified: Timestamp,

    /// Arbitrary user fields.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Record {
    /// Creates a record with the given id, timestamp and fields.
    pub fn new(id: RecordId, last_modified: Timestamp, fields: Map<String, Value>) -> Self {
        Self {
            id,
            last_modified,
            fields,
        }
    }

    /// Returns the full document (id and last_modified folded into the
    /// fields) as a JSON value.
    pub fn document(&self) -> Value {
        // serde flatten produces exactly this shape.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// A typed field mapping declared on a collection.
///
/// The mapping structure is opaque to this crate; equality is value equality,
/// which is how "schema changed?" is decided on collection updates.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Schema(pub Map<String, Value>);

impl Schema {
    /// Extracts a schema from a JSON value, if it is an object.
    pub fn from_value(value: &Value) -> Option<Self> {
        value.as_object().map(|m| Self(m.clone()))
    }

    /// Returns the mapping as a JSON value.
    pub fn as_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    /// Returns true if the mapping has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Keyset-pagination cursor: the last seen `(last_modified, id)` pair.
///
/// The next page fetches records strictly before this pair in descending
/// `(last_modified, id)` order. Including the id breaks ties between records
/// sharing a timestamp, so boundary records are neither skipped nor repeated.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageCursor {
    /// Modification time of the last record of the previous page.
    pub last_modified: Timestamp,

    /// Id of the last record of the previous page.
    pub id: RecordId,
}

impl PageCursor {
    /// Builds a cursor pointing at the given record.
    pub fn after(record: &Record) -> Self {
        Self {
            last_modified: record.last_modified,
            id: record.id.clone(),
        }
    }
}

/// Kind of resource a change notification refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A record inside a collection.
    Record,

    /// A collection (metadata object, may carry a declared schema).
    Collection,

    /// A tenant bucket.
    Bucket,
}

/// Action performed on a resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// Resource was created.
    Create,

    /// Resource was updated.
    Update,

    /// Resource was deleted.
    Delete,
}

/// One `(old, new)` pair affected by a mutation.
///
/// `old` is present for update/delete, `new` for create/update. The values
/// are the resource's JSON representation (a record document, or collection
/// metadata).
#[derive(Clone, Debug, Default)]
pub struct Change {
    /// State before the mutation.
    pub old: Option<Value>,

    /// State after the mutation.
    pub new: Option<Value>,
}

impl Change {
    /// A creation: only the new state.
    pub fn created(new: Value) -> Self {
        Self {
            old: None,
            new: Some(new),
        }
    }

    /// An update: both states.
    pub fn updated(old: Value, new: Value) -> Self {
        Self {
            old: Some(old),
            new: Some(new),
        }
    }

    /// A deletion: only the old state.
    pub fn deleted(old: Value) -> Self {
        Self {
            old: Some(old),
            new: None,
        }
    }
}

/// Change notification emitted by the primary store, one per mutating
/// request.
///
/// For record events, `collection_id` names the collection and each impacted
/// pair holds record documents. For collection events, `collection_id` is
/// absent and the impacted pairs hold collection-metadata objects (each with
/// an `"id"` attribute). Bucket events carry no impacted payload that this
/// crate inspects.
#[derive(Clone, Debug)]
pub struct ChangeEvent {
    /// Owning tenant.
    pub tenant_id: TenantId,

    /// Collection, for record-level events.
    pub collection_id: Option<CollectionId>,

    /// Kind of resource mutated.
    pub resource: ResourceKind,

    /// Action performed.
    pub action: ChangeAction,

    /// Ordered list of affected `(old, new)` pairs.
    pub impacted: Vec<Change>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_slug_validation() {
        assert!(is_valid_slug("bid"));
        assert!(is_valid_slug("my_bucket_01"));
        assert!(!is_valid_slug(""));
        assert!(!is_valid_slug("with-hyphen"));
        assert!(!is_valid_slug("Upper"));
        assert!(!is_valid_slug("dot.ted"));
    }

    #[test]
    fn test_record_id_random_is_unique() {
        let id1 = RecordId::random();
        let id2 = RecordId::random();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_timestamp_ordering() {
        let t1 = Timestamp::from_millis(1000);
        let t2 = Timestamp::from_millis(2000);
        assert!(t1 < t2);
        assert!(t1.to_be_bytes() < t2.to_be_bytes());
    }

    #[test]
    fn test_record_document_shape() {
        let mut fields = Map::new();
        fields.insert("hello".to_string(), json!("world"));
        let record = Record::new(RecordId::new("r1"), Timestamp::from_millis(42), fields);

        let doc = record.document();
        assert_eq!(doc["id"], json!("r1"));
        assert_eq!(doc["last_modified"], json!(42));
        assert_eq!(doc["hello"], json!("world"));
    }

    #[test]
    fn test_record_wire_roundtrip() {
        let raw = json!({"age": 12, "id": "r1", "last_modified": 7});
        let record: Record = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(record.id.as_str(), "r1");
        assert_eq!(record.last_modified.as_millis(), 7);
        assert_eq!(record.fields["age"], json!(12));
        assert_eq!(record.document(), raw);
    }

    #[test]
    fn test_schema_value_equality() {
        let a = Schema::from_value(&json!({"properties": {"id": {"type": "keyword"}}})).unwrap();
        let b = Schema::from_value(&json!({"properties": {"id": {"type": "keyword"}}})).unwrap();
        let c = Schema::from_value(&json!({"properties": {"id": {"type": "long"}}})).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_schema_from_non_object_is_none() {
        assert!(Schema::from_value(&json!("nope")).is_none());
        assert!(Schema::from_value(&json!(3)).is_none());
    }

    #[test]
    fn test_page_cursor_after() {
        let record = Record::new(RecordId::new("r9"), Timestamp::from_millis(123), Map::new());
        let cursor = PageCursor::after(&record);
        assert_eq!(cursor.last_modified.as_millis(), 123);
        assert_eq!(cursor.id.as_str(), "r9");
    }
}
