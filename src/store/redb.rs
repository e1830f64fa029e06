//! redb-backed record store adapter.
//!
//! An embedded implementation of [`RecordStore`] using
//! [redb](https://docs.rs/redb), with the minimal write surface the host
//! glue, tests and the reindex CLI need to populate it.
//!
//! # Table Layout
//!
//! ```text
//! collections:       "tenant/collection"      -> JSON CollectionMeta
//! records:           "tenant/collection/id"   -> JSON Record
//! records_by_mtime:  ("tenant/collection", BE(last_modified) ++ id) -> ()
//! collection_clocks: "tenant/collection"      -> i64 last issued timestamp
//! ```
//!
//! The mtime index key concatenates the big-endian timestamp with the record
//! id, so byte order equals `(last_modified, id)` order and a reverse range
//! scan yields descending keyset pages with an id tie-breaker for free.
//!
//! Modification timestamps are issued per collection as `max(now, last + 1)`:
//! strictly increasing, which is the ordering assumption the reindex cursor
//! relies on.

use std::path::{Path, PathBuf};

use redb::{Database, ReadableTable, TableDefinition};
use serde_json::Map;
use tracing::{debug, info, instrument};

use crate::error::StoreError;
use crate::types::{
    is_valid_slug, CollectionId, PageCursor, Record, RecordId, TenantId, Timestamp,
};

use super::{CollectionMeta, RecordStore};

/// Collection metadata, keyed by `tenant/collection`.
const COLLECTIONS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("collections");

/// Records, keyed by `tenant/collection/id`.
const RECORDS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("records");

/// Modification-time index: `(collection path, BE timestamp ++ record id)`.
const RECORDS_BY_MTIME_TABLE: TableDefinition<(&str, &[u8]), ()> =
    TableDefinition::new("records_by_mtime");

/// Last issued timestamp per collection.
const COLLECTION_CLOCKS_TABLE: TableDefinition<&str, i64> =
    TableDefinition::new("collection_clocks");

/// Embedded record store over redb.
#[derive(Debug)]
pub struct RedbStore {
    db: Database,
    path: PathBuf,
}

impl RedbStore {
    /// Opens or creates a store at the given path.
    ///
    /// # Errors
    /// Returns an error if the file is corrupted or locked by another
    /// writer.
    #[instrument(fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();

        // redb has no typed lock-conflict variant; detect via message.
        let db = Database::builder().create(path).map_err(|e| {
            if e.to_string().contains("locked") {
                StoreError::Transaction("store is locked by another writer".to_string())
            } else {
                StoreError::Redb(e.to_string())
            }
        })?;

        // Create all tables up front so reads never hit TableDoesNotExist.
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(COLLECTIONS_TABLE)?;
            let _ = write_txn.open_table(RECORDS_TABLE)?;
            let _ = write_txn.open_table(RECORDS_BY_MTIME_TABLE)?;
            let _ = write_txn.open_table(COLLECTION_CLOCKS_TABLE)?;
        }
        write_txn.commit()?;

        info!("Record store opened");
        Ok(Self {
            db,
            path: path.to_path_buf(),
        })
    }

    /// Returns the path of the store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Creates or replaces a collection's metadata.
    ///
    /// Identifiers must be lowercase slugs; the collection's clock advances.
    #[instrument(skip(self, attributes), fields(tenant = %tenant, collection = %collection))]
    pub fn put_collection(
        &self,
        tenant: &TenantId,
        collection: &CollectionId,
        attributes: Map<String, serde_json::Value>,
    ) -> Result<CollectionMeta, StoreError> {
        if !is_valid_slug(tenant.as_str()) {
            return Err(StoreError::invalid_slug(tenant.as_str()));
        }
        if !is_valid_slug(collection.as_str()) {
            return Err(StoreError::invalid_slug(collection.as_str()));
        }

        let path = collection_path(tenant, collection);
        let write_txn = self.db.begin_write()?;
        let meta = {
            let mut clocks = write_txn.open_table(COLLECTION_CLOCKS_TABLE)?;
            let now = tick(&mut clocks, &path)?;

            let meta = CollectionMeta::new(collection.clone(), now, attributes);
            let bytes = serde_json::to_vec(&meta)?;

            let mut collections = write_txn.open_table(COLLECTIONS_TABLE)?;
            collections.insert(path.as_str(), bytes.as_slice())?;
            meta
        };
        write_txn.commit()?;

        debug!("Collection metadata written");
        Ok(meta)
    }

    /// Creates a record with a server-assigned id and timestamp.
    ///
    /// # Errors
    /// `StoreError::CollectionNotFound` if the collection does not exist.
    pub fn create_record(
        &self,
        tenant: &TenantId,
        collection: &CollectionId,
        fields: Map<String, serde_json::Value>,
    ) -> Result<Record, StoreError> {
        self.write_record(tenant, collection, RecordId::random(), fields, None)
    }

    /// Creates or overwrites a record under an explicit id, assigning a
    /// fresh timestamp.
    pub fn upsert_record(
        &self,
        tenant: &TenantId,
        collection: &CollectionId,
        id: RecordId,
        fields: Map<String, serde_json::Value>,
    ) -> Result<Record, StoreError> {
        self.write_record(tenant, collection, id, fields, None)
    }

    /// Imports a record preserving its existing timestamp (restore path).
    ///
    /// The collection clock still advances past the imported timestamp so
    /// later writes stay strictly increasing.
    pub fn import_record(
        &self,
        tenant: &TenantId,
        collection: &CollectionId,
        record: Record,
    ) -> Result<Record, StoreError> {
        self.write_record(
            tenant,
            collection,
            record.id,
            record.fields,
            Some(record.last_modified),
        )
    }

    fn write_record(
        &self,
        tenant: &TenantId,
        collection: &CollectionId,
        id: RecordId,
        fields: Map<String, serde_json::Value>,
        at: Option<Timestamp>,
    ) -> Result<Record, StoreError> {
        let path = collection_path(tenant, collection);
        let record_key = format!("{}/{}", path, id);

        let write_txn = self.db.begin_write()?;
        let record = {
            let collections = write_txn.open_table(COLLECTIONS_TABLE)?;
            if collections.get(path.as_str())?.is_none() {
                return Err(StoreError::collection_not_found(tenant, collection));
            }
            drop(collections);

            let mut clocks = write_txn.open_table(COLLECTION_CLOCKS_TABLE)?;
            let last_modified = match at {
                Some(at) => {
                    advance_clock(&mut clocks, &path, at)?;
                    at
                }
                None => tick(&mut clocks, &path)?,
            };
            drop(clocks);

            let record = Record::new(id, last_modified, fields);
            let bytes = serde_json::to_vec(&record)?;

            let mut records = write_txn.open_table(RECORDS_TABLE)?;
            let mut by_mtime = write_txn.open_table(RECORDS_BY_MTIME_TABLE)?;

            // Overwrites must drop the old mtime entry first.
            if let Some(existing) = records.insert(record_key.as_str(), bytes.as_slice())? {
                let old: Record = serde_json::from_slice(existing.value())?;
                let old_key = mtime_key(old.last_modified, &old.id);
                by_mtime.remove((path.as_str(), old_key.as_slice()))?;
            }

            let key = mtime_key(record.last_modified, &record.id);
            by_mtime.insert((path.as_str(), key.as_slice()), ())?;
            record
        };
        write_txn.commit()?;

        Ok(record)
    }

    /// Deletes a record.
    ///
    /// Returns `true` if it existed.
    pub fn delete_record(
        &self,
        tenant: &TenantId,
        collection: &CollectionId,
        id: &RecordId,
    ) -> Result<bool, StoreError> {
        let path = collection_path(tenant, collection);
        let record_key = format!("{}/{}", path, id);

        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut records = write_txn.open_table(RECORDS_TABLE)?;
            let mut by_mtime = write_txn.open_table(RECORDS_BY_MTIME_TABLE)?;

            let existed = match records.remove(record_key.as_str())? {
                Some(existing) => {
                    let old: Record = serde_json::from_slice(existing.value())?;
                    let old_key = mtime_key(old.last_modified, &old.id);
                    by_mtime.remove((path.as_str(), old_key.as_slice()))?;
                    true
                }
                None => false,
            };
            existed
        };
        write_txn.commit()?;

        Ok(existed)
    }

    /// Deletes a collection, its records and index entries.
    ///
    /// Returns `true` if the collection existed.
    #[instrument(skip(self), fields(tenant = %tenant, collection = %collection))]
    pub fn delete_collection(
        &self,
        tenant: &TenantId,
        collection: &CollectionId,
    ) -> Result<bool, StoreError> {
        let path = collection_path(tenant, collection);

        let write_txn = self.db.begin_write()?;
        let existed = {
            let mut collections = write_txn.open_table(COLLECTIONS_TABLE)?;
            let existed = collections.remove(path.as_str())?.is_some();

            let mut records = write_txn.open_table(RECORDS_TABLE)?;
            let record_prefix = format!("{}/", path);
            // '/' + 1 == '0' in ASCII, so [prefix, end) spans exactly the
            // collection's records.
            let record_end = format!("{}0", path);
            records.retain_in(record_prefix.as_str()..record_end.as_str(), |_, _| false)?;

            let mut by_mtime = write_txn.open_table(RECORDS_BY_MTIME_TABLE)?;
            by_mtime.retain(|key, _| key.0 != path.as_str())?;

            let mut clocks = write_txn.open_table(COLLECTION_CLOCKS_TABLE)?;
            clocks.remove(path.as_str())?;

            existed
        };
        write_txn.commit()?;

        debug!(existed = existed, "Collection deleted");
        Ok(existed)
    }

    /// Counts the records of a collection.
    pub fn count_records(
        &self,
        tenant: &TenantId,
        collection: &CollectionId,
    ) -> Result<u64, StoreError> {
        let path = collection_path(tenant, collection);
        let read_txn = self.db.begin_read()?;
        let by_mtime = read_txn.open_table(RECORDS_BY_MTIME_TABLE)?;

        let mut count = 0u64;
        for item in by_mtime.range((path.as_str(), &[][..])..(path_end(&path).as_str(), &[][..]))? {
            item?;
            count += 1;
        }
        Ok(count)
    }
}

impl RecordStore for RedbStore {
    fn get_collection(
        &self,
        tenant: &TenantId,
        collection: &CollectionId,
    ) -> Result<CollectionMeta, StoreError> {
        let path = collection_path(tenant, collection);
        let read_txn = self.db.begin_read()?;
        let collections = read_txn.open_table(COLLECTIONS_TABLE)?;

        match collections.get(path.as_str())? {
            Some(bytes) => Ok(serde_json::from_slice(bytes.value())?),
            None => Err(StoreError::collection_not_found(tenant, collection)),
        }
    }

    fn page_records(
        &self,
        tenant: &TenantId,
        collection: &CollectionId,
        before: Option<&PageCursor>,
        limit: usize,
    ) -> Result<Vec<Record>, StoreError> {
        let path = collection_path(tenant, collection);
        let read_txn = self.db.begin_read()?;
        let by_mtime = read_txn.open_table(RECORDS_BY_MTIME_TABLE)?;
        let records = read_txn.open_table(RECORDS_TABLE)?;

        // Exclusive upper bound: the cursor key itself, or the whole
        // collection when no cursor is given.
        let end_path;
        let cursor_key;
        let range = match before {
            Some(cursor) => {
                cursor_key = mtime_key(cursor.last_modified, &cursor.id);
                by_mtime.range((path.as_str(), &[][..])..(path.as_str(), cursor_key.as_slice()))?
            }
            None => {
                end_path = path_end(&path);
                by_mtime.range((path.as_str(), &[][..])..(end_path.as_str(), &[][..]))?
            }
        };

        let mut page = Vec::with_capacity(limit.min(1024));
        for item in range.rev().take(limit) {
            let (key, _) = item?;
            let (_, suffix) = key.value();

            let id = std::str::from_utf8(&suffix[8..])
                .map_err(|_| StoreError::corrupted("non-utf8 record id in mtime index"))?;
            let record_key = format!("{}/{}", path, id);

            let bytes = records.get(record_key.as_str())?.ok_or_else(|| {
                StoreError::corrupted(format!("mtime index points at missing record {}", id))
            })?;
            page.push(serde_json::from_slice(bytes.value())?);
        }

        Ok(page)
    }
}

/// `tenant/collection` composite key.
fn collection_path(tenant: &TenantId, collection: &CollectionId) -> String {
    format!("{}/{}", tenant, collection)
}

/// First path sorting strictly after every `(path, *)` tuple.
fn path_end(path: &str) -> String {
    format!("{}\u{0}", path)
}

/// Mtime index key: big-endian timestamp, then the record id.
fn mtime_key(last_modified: Timestamp, id: &RecordId) -> Vec<u8> {
    let mut key = Vec::with_capacity(8 + id.as_str().len());
    key.extend_from_slice(&last_modified.to_be_bytes());
    key.extend_from_slice(id.as_str().as_bytes());
    key
}

/// Issues the next strictly increasing timestamp for a collection.
fn tick(
    clocks: &mut redb::Table<'_, &str, i64>,
    path: &str,
) -> Result<Timestamp, StoreError> {
    let last = clocks.get(path)?.map(|v| v.value()).unwrap_or(0);
    let next = Timestamp::now().as_millis().max(last + 1);
    clocks.insert(path, next)?;
    Ok(Timestamp::from_millis(next))
}

/// Advances the clock past an externally supplied timestamp.
fn advance_clock(
    clocks: &mut redb::Table<'_, &str, i64>,
    path: &str,
    at: Timestamp,
) -> Result<(), StoreError> {
    let last = clocks.get(path)?.map(|v| v.value()).unwrap_or(0);
    if at.as_millis() > last {
        clocks.insert(path, at.as_millis())?;
    }
    Ok(())
}
