//! Bulk batching of index operations.
//!
//! A [`BulkBatch`] is scoped to one unit of work: one incoming change event,
//! or one page of a reindex scan. Enqueueing never touches the network; the
//! whole batch goes out as a single request on [`BulkBatch::commit`], which
//! consumes the batch so it is submitted exactly once. Operation order is
//! preserved, so the last write for a duplicated id wins.
//!
//! A failed commit fails the batch as a unit; per-operation failures the
//! backend reports inside an accepted submission come back in the
//! [`BulkSummary`] for the caller to log or act on.

use serde_json::Value;
use tracing::debug;

use crate::backend::{BulkOperation, BulkSummary};
use crate::error::BackendError;
use crate::indexer::Indexer;
use crate::types::{CollectionId, Record, RecordId, TenantId};

/// Append-only accumulator of index/delete operations, committed once.
pub struct BulkBatch<'a> {
    indexer: &'a Indexer,
    operations: Vec<BulkOperation>,
}

impl<'a> BulkBatch<'a> {
    pub(crate) fn new(indexer: &'a Indexer) -> Self {
        Self {
            indexer,
            operations: Vec::new(),
        }
    }

    /// Enqueues an index (create or overwrite) of a record's document.
    pub fn index_record(
        &mut self,
        tenant: &TenantId,
        collection: &CollectionId,
        record: &Record,
    ) {
        self.index_document(tenant, collection, record.id.clone(), record.document());
    }

    /// Enqueues an index of an arbitrary document under the given id.
    pub fn index_document(
        &mut self,
        tenant: &TenantId,
        collection: &CollectionId,
        id: RecordId,
        document: Value,
    ) {
        self.operations.push(BulkOperation::Index {
            index: self.indexer.index_name(tenant, collection),
            id: id.0,
            document,
        });
    }

    /// Enqueues a deletion by record id.
    pub fn unindex_record(
        &mut self,
        tenant: &TenantId,
        collection: &CollectionId,
        id: &RecordId,
    ) {
        self.operations.push(BulkOperation::Delete {
            index: self.indexer.index_name(tenant, collection),
            id: id.0.clone(),
        });
    }

    /// Number of pending operations.
    pub fn len(&self) -> usize {
        self.operations.len()
    }

    /// Returns true if nothing has been enqueued.
    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// Submits all pending operations as one bulk request.
    ///
    /// Consumes the batch: commit happens exactly once per unit of work. An
    /// empty batch skips the network entirely.
    pub fn commit(self) -> Result<BulkSummary, BackendError> {
        if self.operations.is_empty() {
            return Ok(BulkSummary::default());
        }

        debug!(operations = self.operations.len(), "Submitting bulk batch");
        let summary = self
            .indexer
            .backend()
            .bulk(&self.operations, self.indexer.refresh_enabled())?;

        for failure in &summary.failures {
            debug!(id = %failure.id, reason = %failure.reason, "Bulk operation rejected");
        }
        Ok(summary)
    }
}
