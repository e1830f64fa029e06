//! Search-backend abstraction.
//!
//! The backend is an opaque indexing/query engine reached through a narrow
//! contract: create/alter a typed index, write/delete documents in bulk, run
//! a structured query. The production implementation speaks the
//! Elasticsearch REST protocol; tests use an in-memory engine.
//!
//! # Architecture
//!
//! ```text
//!              ┌─────────────────────┐
//!              │   SearchBackend     │  ← Trait
//!              └─────────────────────┘
//!                    ▲         ▲
//!                    │         │
//!         ┌──────────┴─┐   ┌───┴───────────┐
//!         │HttpBackend │   │ MemoryBackend │
//!         └────────────┘   └───────────────┘
//!            (prod)            (test)
//! ```

pub mod http;
pub mod memory;

pub use http::HttpBackend;
pub use memory::MemoryBackend;

use serde_json::Value;

use crate::error::BackendError;
use crate::types::Schema;

/// One entry of a bulk submission.
///
/// Operations are applied in order; within one submission the last write for
/// a given document id wins.
#[derive(Clone, Debug, PartialEq)]
pub enum BulkOperation {
    /// Index (create or overwrite) a document.
    Index {
        /// Target index name.
        index: String,
        /// Document id.
        id: String,
        /// Full document body.
        document: Value,
    },

    /// Delete a document by id.
    Delete {
        /// Target index name.
        index: String,
        /// Document id.
        id: String,
    },
}

impl BulkOperation {
    /// Returns the target index name.
    pub fn index_name(&self) -> &str {
        match self {
            Self::Index { index, .. } | Self::Delete { index, .. } => index,
        }
    }

    /// Returns the document id.
    pub fn doc_id(&self) -> &str {
        match self {
            Self::Index { id, .. } | Self::Delete { id, .. } => id,
        }
    }
}

/// Per-document failure inside an otherwise accepted bulk submission.
#[derive(Clone, Debug)]
pub struct BulkFailure {
    /// Document id of the failed operation.
    pub id: String,

    /// Backend-provided reason.
    pub reason: String,
}

/// Outcome of one bulk submission.
///
/// The submission itself either succeeds or fails as a unit (transport or
/// cluster failure returns `Err`); this summary reports what the backend
/// accepted, including per-document failures it chose to report.
#[derive(Clone, Debug, Default)]
pub struct BulkSummary {
    /// Number of operations submitted.
    pub operations: usize,

    /// Operations the backend rejected individually.
    pub failures: Vec<BulkFailure>,
}

impl BulkSummary {
    /// Returns true if every operation was accepted.
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Contract every search backend must implement.
///
/// Implementations must be `Send + Sync`: one instance is created at startup
/// and shared by reference across request handlers. Aside from its own
/// connection pool, the backend handle is stateless.
pub trait SearchBackend: Send + Sync {
    /// Returns true if the named index exists.
    fn index_exists(&self, index: &str) -> Result<bool, BackendError>;

    /// Creates an index, applying `schema` as its initial mapping if given.
    ///
    /// Creating an index that already exists is success, not an error: the
    /// lifecycle layer calls this unconditionally and concurrent creators
    /// must not fail each other.
    fn create_index(&self, index: &str, schema: Option<&Schema>) -> Result<(), BackendError>;

    /// Merges `schema` into the index's existing mapping.
    ///
    /// Fields present in the index but absent from `schema` are retained;
    /// this call is never destructive.
    fn put_mapping(&self, index: &str, schema: &Schema) -> Result<(), BackendError>;

    /// Returns the index's current mapping.
    fn get_mapping(&self, index: &str) -> Result<Schema, BackendError>;

    /// Deletes every index matching `pattern` (a name, or a `*` wildcard
    /// pattern).
    ///
    /// Deleting a non-existent index is success, not an error.
    fn delete_index(&self, pattern: &str) -> Result<(), BackendError>;

    /// Submits `operations` as one bulk request, in order.
    ///
    /// `refresh` forces the writes to become visible to search before
    /// returning.
    fn bulk(&self, operations: &[BulkOperation], refresh: bool)
        -> Result<BulkSummary, BackendError>;

    /// Runs a structured query against `index`, returning the backend's
    /// native result envelope.
    fn search(&self, index: &str, body: &Value) -> Result<Value, BackendError>;

    /// Returns true if the backend is reachable.
    fn ping(&self) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bulk_operation_accessors() {
        let op = BulkOperation::Index {
            index: "p-bid-cid".to_string(),
            id: "r1".to_string(),
            document: json!({"id": "r1"}),
        };
        assert_eq!(op.index_name(), "p-bid-cid");
        assert_eq!(op.doc_id(), "r1");

        let op = BulkOperation::Delete {
            index: "p-bid-cid".to_string(),
            id: "r2".to_string(),
        };
        assert_eq!(op.doc_id(), "r2");
    }

    #[test]
    fn test_bulk_summary_is_clean() {
        let summary = BulkSummary {
            operations: 3,
            failures: vec![],
        };
        assert!(summary.is_clean());

        let summary = BulkSummary {
            operations: 3,
            failures: vec![BulkFailure {
                id: "r1".to_string(),
                reason: "mapper_parsing_exception".to_string(),
            }],
        };
        assert!(!summary.is_clean());
    }
}
