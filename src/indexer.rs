//! Index naming and lifecycle.
//!
//! The [`Indexer`] is the long-lived, shared handle to the search backend.
//! One instance is created at startup and passed by reference into every
//! component (constructor injection, no ambient globals).
//!
//! Index names are `{prefix}-{tenant}-{collection}`. With slug identifiers
//! (no hyphens, see [`crate::types::is_valid_slug`]) the mapping is a pure,
//! injective function of the pair, stable for the lifetime of the
//! collection.
//!
//! Lifecycle operations are unconditional effects: creating an index that
//! exists merges the mapping instead, deleting one that is absent is
//! success. That lets the change projector call them on every relevant event
//! without existence checks, and resolves the create race without locking.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use serde_json::Value;

use crate::backend::SearchBackend;
use crate::bulk::BulkBatch;
use crate::config::Config;
use crate::error::BackendError;
use crate::types::{CollectionId, Schema, TenantId};

/// Shared handle for index lifecycle, bulk writes and raw queries.
pub struct Indexer {
    backend: Arc<dyn SearchBackend>,
    index_prefix: String,
    refresh_enabled: bool,
}

impl std::fmt::Debug for Indexer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Indexer")
            .field("index_prefix", &self.index_prefix)
            .field("refresh_enabled", &self.refresh_enabled)
            .finish_non_exhaustive()
    }
}

impl Indexer {
    /// Creates an indexer over the given backend, configured once from
    /// process configuration.
    pub fn new(backend: Arc<dyn SearchBackend>, config: &Config) -> Self {
        Self {
            backend,
            index_prefix: config.index_prefix.clone(),
            refresh_enabled: config.refresh_enabled,
        }
    }

    /// Derives the index name for a collection.
    ///
    /// Pure and deterministic; distinct `(tenant, collection)` pairs never
    /// collide as long as identifiers are hyphen-free slugs.
    pub fn index_name(&self, tenant: &TenantId, collection: &CollectionId) -> String {
        format!("{}-{}-{}", self.index_prefix, tenant, collection)
    }

    /// Wildcard pattern covering every index of a tenant.
    fn tenant_pattern(&self, tenant: &TenantId) -> String {
        format!("{}-{}-*", self.index_prefix, tenant)
    }

    /// Wildcard pattern covering every index under the configured prefix.
    fn global_pattern(&self) -> String {
        format!("{}-*", self.index_prefix)
    }

    /// Creates the collection's index, applying `schema` as the initial
    /// mapping when given.
    ///
    /// If the index already exists this merges the schema into its mapping
    /// instead (no-op without a schema); "already exists" is never an error.
    #[instrument(skip(self, schema), fields(tenant = %tenant, collection = %collection))]
    pub fn create_index(
        &self,
        tenant: &TenantId,
        collection: &CollectionId,
        schema: Option<&Schema>,
    ) -> Result<(), BackendError> {
        let index = self.index_name(tenant, collection);

        if self.backend.index_exists(&index)? {
            if let Some(schema) = schema {
                return self.update_index(tenant, collection, schema);
            }
            debug!(index = %index, "Index already exists");
            return Ok(());
        }

        self.backend.create_index(&index, schema)?;
        info!(index = %index, with_schema = schema.is_some(), "Index created");
        Ok(())
    }

    /// Merges `schema` into the collection's index mapping.
    ///
    /// Never destructive: mapped fields absent from `schema` are retained.
    /// If the index does not exist yet it is created with the schema.
    #[instrument(skip(self, schema), fields(tenant = %tenant, collection = %collection))]
    pub fn update_index(
        &self,
        tenant: &TenantId,
        collection: &CollectionId,
        schema: &Schema,
    ) -> Result<(), BackendError> {
        let index = self.index_name(tenant, collection);

        match self.backend.put_mapping(&index, schema) {
            Ok(()) => {
                debug!(index = %index, "Mapping updated");
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                self.backend.create_index(&index, Some(schema))?;
                info!(index = %index, "Index created on mapping update");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Deletes the collection's index, or every index of the tenant when
    /// `collection` is `None`.
    ///
    /// Deleting a non-existent index is success.
    #[instrument(skip(self), fields(tenant = %tenant))]
    pub fn delete_index(
        &self,
        tenant: &TenantId,
        collection: Option<&CollectionId>,
    ) -> Result<(), BackendError> {
        let pattern = match collection {
            Some(collection) => self.index_name(tenant, collection),
            None => self.tenant_pattern(tenant),
        };

        self.backend.delete_index(&pattern)?;
        info!(pattern = %pattern, "Index deleted");
        Ok(())
    }

    /// Deletes every index under the configured prefix, regardless of
    /// tenant. Used for full environment resets.
    #[instrument(skip(self))]
    pub fn flush_all(&self) -> Result<(), BackendError> {
        let pattern = self.global_pattern();
        self.backend.delete_index(&pattern)?;
        info!(pattern = %pattern, "All indices flushed");
        Ok(())
    }

    /// Runs a raw structured query against the collection's index.
    pub fn search(
        &self,
        tenant: &TenantId,
        collection: &CollectionId,
        body: &Value,
    ) -> Result<Value, BackendError> {
        let index = self.index_name(tenant, collection);
        self.backend.search(&index, body)
    }

    /// Opens a new bulk batch scoped to one unit of work.
    ///
    /// The batch only appends until [`BulkBatch::commit`] submits all
    /// pending operations as one request.
    pub fn bulk(&self) -> BulkBatch<'_> {
        BulkBatch::new(self)
    }

    /// Returns true if the search backend is reachable.
    pub fn ping(&self) -> bool {
        self.backend.ping()
    }

    /// Whether bulk writes request an immediate refresh.
    pub(crate) fn refresh_enabled(&self) -> bool {
        self.refresh_enabled
    }

    /// Backend handle, for batch submission.
    pub(crate) fn backend(&self) -> &dyn SearchBackend {
        self.backend.as_ref()
    }
}
