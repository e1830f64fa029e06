//! Query gateway: bounded-size search with deterministic error translation.
//!
//! The read path never hard-fails except for queries the backend cannot
//! parse:
//! - missing index: lazily create it (schema-less) and retry once, so
//!   collections created before the bridge was enabled stay queryable
//! - malformed query: a structured client error with reason and location
//! - anything else: logged, and an empty result object is returned
//!
//! Result sizes are capped to
//! `min(requested, paginate_by-or-max, max_fetch_size)`; an oversized
//! request is silently reduced, never rejected.

use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::{debug, error};

use crate::config::Config;
use crate::error::{BackendError, BackendErrorKind, Result, SearchBridgeError};
use crate::indexer::Indexer;
use crate::types::{CollectionId, TenantId};

/// A search request from the host: either a structured body or a free-text
/// query expression.
#[derive(Clone, Debug)]
pub enum SearchRequest {
    /// Structured query body (the backend's native query DSL).
    Body(Value),

    /// Free-text `q` expression; `None` or empty matches everything.
    QueryString(Option<String>),
}

/// Capability descriptor advertised at the host's discovery endpoint.
#[derive(Clone, Debug, Serialize)]
pub struct Capability {
    /// Capability name.
    pub name: &'static str,

    /// Human-readable description.
    pub description: &'static str,

    /// Crate version.
    pub version: &'static str,
}

/// Returns the capability descriptor for this bridge.
pub fn capability() -> Capability {
    Capability {
        name: "search",
        description: "Index and search records using an Elasticsearch-compatible backend.",
        version: env!("CARGO_PKG_VERSION"),
    }
}

/// Read-only search entry point over the shared indexer handle.
pub struct SearchGateway {
    indexer: Arc<Indexer>,
    page_cap: usize,
}

impl SearchGateway {
    /// Creates a gateway; size limits are fixed from process configuration.
    pub fn new(indexer: Arc<Indexer>, config: &Config) -> Self {
        Self {
            indexer,
            page_cap: config.page_cap(),
        }
    }

    /// Executes a search against the collection's index.
    ///
    /// Returns the backend's native result envelope, unmodified except for
    /// size capping.
    ///
    /// # Errors
    ///
    /// Only [`SearchBridgeError::QueryRejected`] is ever returned; every
    /// other failure resolves to an empty result object.
    pub fn search(
        &self,
        tenant: &TenantId,
        collection: &CollectionId,
        request: SearchRequest,
    ) -> Result<Value> {
        let body = self.build_body(request);

        match self.indexer.search(tenant, collection, &body) {
            Ok(results) => Ok(results),
            Err(e) if e.kind == BackendErrorKind::NotFound => {
                // The collection predates the bridge: create its index on
                // demand and retry once against the (empty) index.
                debug!(tenant = %tenant, collection = %collection, "Index missing, creating lazily");
                if let Err(create_err) = self.indexer.create_index(tenant, collection, None) {
                    return self.translate(create_err);
                }
                match self.indexer.search(tenant, collection, &body) {
                    Ok(results) => Ok(results),
                    Err(e) => self.translate(e),
                }
            }
            Err(e) => self.translate(e),
        }
    }

    /// Builds the effective query body, applying the size cap.
    fn build_body(&self, request: SearchRequest) -> Value {
        let mut body = match request {
            SearchRequest::Body(Value::Object(obj)) => obj,
            // A non-object body is passed along empty; the backend's own
            // parse error handling takes over from there.
            SearchRequest::Body(_) => Map::new(),
            SearchRequest::QueryString(q) => {
                let mut obj = Map::new();
                if let Some(q) = q.filter(|q| !q.is_empty()) {
                    obj.insert("query".to_string(), json!({"query_string": {"query": q}}));
                }
                obj
            }
        };

        let specified = body.get("size").and_then(Value::as_u64).map(|s| s as usize);
        match specified {
            Some(size) if size <= self.page_cap => {}
            // Absent, oversized or unparsable: silently reduce to the cap.
            _ => {
                body.insert("size".to_string(), json!(self.page_cap));
            }
        }

        Value::Object(body)
    }

    /// Translates a backend failure into the gateway's contract.
    fn translate(&self, e: BackendError) -> Result<Value> {
        match e.kind {
            BackendErrorKind::MalformedQuery => Err(SearchBridgeError::QueryRejected {
                reason: e.message,
                details: e.details,
            }),
            _ => {
                error!(error = %e, "Index query failed");
                Ok(json!({}))
            }
        }
    }

    /// Returns true if the search backend is reachable.
    pub fn heartbeat(&self) -> bool {
        self.indexer.ping()
    }
}
