//! Error types for searchbridge.
//!
//! A hierarchical error system:
//! - `SearchBridgeError` is the top-level error returned by public APIs
//! - `BackendError` carries an explicit [`BackendErrorKind`] so call sites
//!   can branch on the failure class instead of matching exception types
//! - `StoreError` covers the record-store adapter
//!
//! The change-projection path never returns these to its caller: backend
//! failures during event handling are logged and swallowed, so the primary
//! write always succeeds independently of indexing.

use serde_json::Value;
use thiserror::Error;

use crate::types::{CollectionId, TenantId};

/// Result type alias for searchbridge operations.
pub type Result<T> = std::result::Result<T, SearchBridgeError>;

/// Top-level error enum for all searchbridge operations.
#[derive(Debug, Error)]
pub enum SearchBridgeError {
    /// Search-backend error (index lifecycle, bulk, query).
    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),

    /// Record-store adapter error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A query the backend could not parse, translated for the client.
    ///
    /// `details` carries the backend's machine-readable location info
    /// (line/column/type) when available.
    #[error("Query rejected: {reason}")]
    QueryRejected {
        /// Human-readable parse failure reason.
        reason: String,
        /// Structured failure location (line/col/type), if the backend
        /// provided one.
        details: Option<Value>,
    },

    /// Reindex precondition: the collection has no declared schema.
    #[error("Collection '{collection}' in bucket '{tenant}' has no '{attr}' attribute", attr = crate::types::SCHEMA_ATTRIBUTE)]
    SchemaMissing {
        /// Owning tenant.
        tenant: TenantId,
        /// Collection without a schema.
        collection: CollectionId,
    },

    /// Configuration error.
    #[error("Configuration error: {reason}")]
    Config {
        /// Description of what's wrong with the configuration.
        reason: String,
    },

    /// General I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SearchBridgeError {
    /// Creates a configuration error with the given reason.
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    /// Returns true if this is a query-rejected (client) error.
    pub fn is_query_rejected(&self) -> bool {
        matches!(self, Self::QueryRejected { .. })
    }

    /// Returns true if this is a missing-schema precondition error.
    pub fn is_schema_missing(&self) -> bool {
        matches!(self, Self::SchemaMissing { .. })
    }

    /// Returns true if this wraps a store "collection not found".
    pub fn is_collection_not_found(&self) -> bool {
        matches!(
            self,
            Self::Store(StoreError::CollectionNotFound { .. })
        )
    }

    /// Returns true if this wraps a backend-unavailable failure.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Backend(BackendError {
                kind: BackendErrorKind::Unavailable,
                ..
            })
        )
    }
}

/// Failure classes reported by the search backend.
///
/// An explicit enumeration switched on at call sites: the query gateway
/// turns `NotFound` into a lazy index creation, `MalformedQuery` into a
/// structured client error, and everything else into an empty result.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// The target index does not exist.
    NotFound,

    /// The backend could not parse the query body.
    MalformedQuery,

    /// The index already exists (create race); treated as success by the
    /// lifecycle layer.
    AlreadyExists,

    /// Transport-level failure: connection refused, timeout, DNS.
    Unavailable,

    /// Any other backend exception.
    Other,
}

/// Error from the search backend, carrying its failure class.
#[derive(Debug, Error)]
#[error("{kind:?}: {message}")]
pub struct BackendError {
    /// Failure class.
    pub kind: BackendErrorKind,

    /// Backend-provided reason.
    pub message: String,

    /// Structured error payload (e.g. parse location), if any.
    pub details: Option<Value>,
}

impl BackendError {
    /// Creates a backend error of the given kind.
    pub fn new(kind: BackendErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Creates a not-found error.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::NotFound, message)
    }

    /// Creates a malformed-query error with optional location details.
    pub fn malformed_query(message: impl Into<String>, details: Option<Value>) -> Self {
        Self {
            kind: BackendErrorKind::MalformedQuery,
            message: message.into(),
            details,
        }
    }

    /// Creates an already-exists error.
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::AlreadyExists, message)
    }

    /// Creates an unavailable (transport) error.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Unavailable, message)
    }

    /// Creates an uncategorized backend error.
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(BackendErrorKind::Other, message)
    }

    /// Returns true if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        self.kind == BackendErrorKind::NotFound
    }
}

/// Record-store adapter errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Collection does not exist.
    #[error("No collection '{collection}' in bucket '{tenant}'")]
    CollectionNotFound {
        /// Tenant that was searched.
        tenant: TenantId,
        /// Missing collection.
        collection: CollectionId,
    },

    /// Tenant/collection id is not a valid slug.
    #[error("Invalid identifier '{id}': expected lowercase [a-z0-9_]")]
    InvalidSlug {
        /// The offending identifier.
        id: String,
    },

    /// Store data is corrupted.
    #[error("Store corrupted: {0}")]
    Corrupted(String),

    /// Transaction failed (begin, commit).
    #[error("Transaction failed: {0}")]
    Transaction(String),

    /// Serialization/deserialization of a stored value failed.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Error from the redb storage engine.
    #[error("Storage engine error: {0}")]
    Redb(String),
}

impl StoreError {
    /// Creates a collection-not-found error.
    pub fn collection_not_found(tenant: &TenantId, collection: &CollectionId) -> Self {
        Self::CollectionNotFound {
            tenant: tenant.clone(),
            collection: collection.clone(),
        }
    }

    /// Creates an invalid-slug error.
    pub fn invalid_slug(id: impl Into<String>) -> Self {
        Self::InvalidSlug { id: id.into() }
    }

    /// Creates a corruption error with the given message.
    pub fn corrupted(msg: impl Into<String>) -> Self {
        Self::Corrupted(msg.into())
    }
}

// Conversions from redb error types, collapsed to their messages.
impl From<redb::Error> for StoreError {
    fn from(err: redb::Error) -> Self {
        StoreError::Redb(err.to_string())
    }
}

impl From<redb::DatabaseError> for StoreError {
    fn from(err: redb::DatabaseError) -> Self {
        StoreError::Redb(err.to_string())
    }
}

impl From<redb::TransactionError> for StoreError {
    fn from(err: redb::TransactionError) -> Self {
        StoreError::Transaction(err.to_string())
    }
}

impl From<redb::CommitError> for StoreError {
    fn from(err: redb::CommitError) -> Self {
        StoreError::Transaction(format!("Commit failed: {}", err))
    }
}

impl From<redb::TableError> for StoreError {
    fn from(err: redb::TableError) -> Self {
        StoreError::Redb(format!("Table error: {}", err))
    }
}

impl From<redb::StorageError> for StoreError {
    fn from(err: redb::StorageError) -> Self {
        StoreError::Redb(format!("Storage error: {}", err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}
