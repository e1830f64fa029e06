//! # searchbridge
//!
//! Keeps a secondary search index eventually consistent with an
//! authoritative record store, and provides a bounded-size query path plus a
//! full-rebuild recovery tool.
//!
//! The host invokes the bridge synchronously: one [`ChangeEvent`] per
//! mutating request goes through the [`ChangeProjector`], which turns it
//! into index operations batched into a single bulk submission. Indexing is
//! best-effort relative to the primary write: backend failures are logged
//! and swallowed, and a later write or an operator reindex heals the index.
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use searchbridge::{
//!     ChangeProjector, Config, HttpBackend, Indexer, SearchGateway,
//! };
//!
//! // One backend handle and one indexer per process, wired at startup.
//! let config = Config::default();
//! config.validate()?;
//! let backend = Arc::new(HttpBackend::new(&config.hosts));
//! let indexer = Arc::new(Indexer::new(backend, &config));
//!
//! // Mutation path: the host hands every change notification to the
//! // projector.
//! let projector = ChangeProjector::new(Arc::clone(&indexer));
//! projector.handle(&event);
//!
//! // Read path: capped, failure-translating search.
//! let gateway = SearchGateway::new(Arc::clone(&indexer), &config);
//! let results = gateway.search(&tenant, &collection, request)?;
//! ```
//!
//! ## Key Concepts
//!
//! ### Index per collection
//!
//! Every `(tenant, collection)` pair owns one index named
//! `{prefix}-{tenant}-{collection}`. Lifecycle operations are idempotent:
//! creating an existing index merges its mapping, deleting an absent one
//! succeeds, so event handlers are unconditional effects.
//!
//! ### Bulk batches
//!
//! All operations of one unit of work (one change event, one reindex page)
//! are accumulated in a [`BulkBatch`] and submitted as a single request.
//!
//! ### Reindex
//!
//! [`reindex`] rebuilds an index from the record store's current state via
//! strictly-descending keyset pagination, independent of live traffic.
//!
//! ## Thread Safety
//!
//! [`Indexer`] is `Send + Sync` and shared via `Arc`; concurrency comes
//! entirely from the host serving requests in parallel, each owning its own
//! batch. No shared mutable state crosses requests.

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![deny(unsafe_op_in_unsafe_fn)]

// ============================================================================
// Module declarations
// ============================================================================

mod bulk;
mod config;
mod error;
mod indexer;
mod projector;
mod query;
mod reindex;
mod types;

pub mod backend;
pub mod store;

// ============================================================================
// Public API re-exports
// ============================================================================

// Backend contract
pub use backend::{BulkOperation, BulkSummary, HttpBackend, MemoryBackend, SearchBackend};

// Configuration
pub use config::Config;

// Error handling
pub use error::{BackendError, BackendErrorKind, Result, SearchBridgeError, StoreError};

// Core types
pub use types::{
    is_valid_slug, Change, ChangeAction, ChangeEvent, CollectionId, PageCursor, Record, RecordId,
    ResourceKind, Schema, TenantId, Timestamp, SCHEMA_ATTRIBUTE,
};

// Components
pub use bulk::BulkBatch;
pub use indexer::Indexer;
pub use projector::{bucket_event, collection_event, record_event, ChangeProjector};
pub use query::{capability, Capability, SearchGateway, SearchRequest};
pub use reindex::{reindex, RecordPages, ReindexReport};

// Store boundary
pub use store::{CollectionMeta, RecordStore, RedbStore};

// ============================================================================
// Prelude module for convenient imports
// ============================================================================

/// Convenient imports for common searchbridge usage.
///
/// ```rust
/// use searchbridge::prelude::*;
/// ```
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Result, SearchBridgeError};
    pub use crate::indexer::Indexer;
    pub use crate::projector::ChangeProjector;
    pub use crate::query::{SearchGateway, SearchRequest};
    pub use crate::types::{ChangeAction, ChangeEvent, CollectionId, RecordId, TenantId};
}
