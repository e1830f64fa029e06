//! Full index rebuild from the primary store.
//!
//! Reads the complete contents of a collection through the store's keyset
//! pagination and replays every record through the bulk batcher, bypassing
//! live event traffic. Used for initial backfill and recovery.
//!
//! Preconditions are checked before anything destructive happens: the
//! collection must exist and must declare an `index:schema` attribute.
//! Only then is the old index deleted and recreated with the resolved
//! schema. A page whose bulk submission fails is logged and skipped; the
//! scan itself always runs to the end of the data.

use tracing::{error, info, instrument, warn};

use crate::error::{Result, SearchBridgeError};
use crate::indexer::Indexer;
use crate::store::RecordStore;
use crate::types::{CollectionId, PageCursor, Record, TenantId};

/// Outcome of a reindex run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReindexReport {
    /// Records successfully handed to the backend.
    pub total: u64,

    /// Pages whose bulk submission succeeded.
    pub pages: u32,

    /// Pages whose bulk submission failed and were skipped.
    pub failed_pages: u32,
}

/// Iterator over a collection's records, one page at a time.
///
/// Pages are fetched in descending `(last_modified, id)` order; each page's
/// last record becomes the exclusive upper bound of the next fetch. A page
/// shorter than the requested size signals the end of the data. Records are
/// visited exactly once even if the collection is concurrently modified,
/// provided modification timestamps only ever increase.
pub struct RecordPages<'a> {
    store: &'a dyn RecordStore,
    tenant: &'a TenantId,
    collection: &'a CollectionId,
    cursor: Option<PageCursor>,
    page_size: usize,
    done: bool,
}

impl<'a> RecordPages<'a> {
    /// Creates a page iterator over the given collection.
    pub fn new(
        store: &'a dyn RecordStore,
        tenant: &'a TenantId,
        collection: &'a CollectionId,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            tenant,
            collection,
            cursor: None,
            page_size,
            done: false,
        }
    }
}

impl Iterator for RecordPages<'_> {
    type Item = Result<Vec<Record>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let page = match self.store.page_records(
            self.tenant,
            self.collection,
            self.cursor.as_ref(),
            self.page_size,
        ) {
            Ok(page) => page,
            Err(e) => {
                // The cursor cannot advance safely past a failed read.
                self.done = true;
                return Some(Err(e.into()));
            }
        };

        if page.len() < self.page_size {
            self.done = true;
        }
        if page.is_empty() {
            return None;
        }

        self.cursor = page.last().map(PageCursor::after);
        Some(Ok(page))
    }
}

/// Rebuilds a collection's index from the primary store's current state.
///
/// # Errors
///
/// Fails before touching the index when the collection does not exist
/// ([`crate::error::StoreError::CollectionNotFound`]) or has no declared
/// schema ([`SearchBridgeError::SchemaMissing`]), and when the backend
/// refuses the delete/recreate. Bulk failures during the scan do not fail
/// the run; they surface in [`ReindexReport::failed_pages`].
#[instrument(skip(indexer, store), fields(tenant = %tenant, collection = %collection))]
pub fn reindex(
    indexer: &Indexer,
    store: &dyn RecordStore,
    tenant: &TenantId,
    collection: &CollectionId,
    page_size: usize,
) -> Result<ReindexReport> {
    // Preconditions first; nothing is deleted until both hold.
    let meta = store.get_collection(tenant, collection)?;
    let schema = meta.schema().ok_or_else(|| SearchBridgeError::SchemaMissing {
        tenant: tenant.clone(),
        collection: collection.clone(),
    })?;

    let index = indexer.index_name(tenant, collection);
    indexer.delete_index(tenant, Some(collection))?;
    info!(index = %index, "Old index deleted");
    indexer.create_index(tenant, collection, Some(&schema))?;
    info!(index = %index, "New index created with declared schema");

    let mut report = ReindexReport::default();
    for page in RecordPages::new(store, tenant, collection, page_size) {
        let records = page?;

        let mut batch = indexer.bulk();
        for record in &records {
            batch.index_record(tenant, collection, record);
        }

        match batch.commit() {
            Ok(summary) => {
                for failure in &summary.failures {
                    warn!(id = %failure.id, reason = %failure.reason, "Record not indexed");
                }
                report.total += records.len() as u64;
                report.pages += 1;
            }
            Err(e) => {
                error!(error = %e, records = records.len(), "Failed to index page, skipping");
                report.failed_pages += 1;
            }
        }
    }

    info!(
        total = report.total,
        pages = report.pages,
        failed_pages = report.failed_pages,
        "Reindex finished"
    );
    Ok(report)
}
