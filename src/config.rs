//! Configuration for the indexing bridge.
//!
//! All knobs are process-wide values computed once at startup and shared
//! immutably; nothing here is renegotiated at runtime.
//!
//! # Example
//! ```rust
//! use searchbridge::Config;
//!
//! let config = Config {
//!     hosts: vec!["http://search01:9200".to_string()],
//!     index_prefix: "prod".to_string(),
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};

use crate::error::SearchBridgeError;

/// Configuration options for the indexing bridge.
///
/// All fields have sensible defaults. Use struct update syntax to override
/// specific settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    /// Search-backend host list, tried in order on connection failure.
    pub hosts: Vec<String>,

    /// Prefix shared by every index this process manages.
    ///
    /// `flush_all` deletes `{prefix}-*`, so the prefix is also the blast
    /// radius of a global reset. Must be a lowercase slug.
    pub index_prefix: String,

    /// Force an immediate refresh on every bulk write.
    ///
    /// Makes writes visible to search before the request returns, at a
    /// throughput cost. Default: off.
    pub refresh_enabled: bool,

    /// Default page size for search responses.
    ///
    /// `0` means "not configured": the hard maximum applies instead.
    pub paginate_by: usize,

    /// Hard maximum number of hits a single search may return.
    pub max_fetch_size: usize,

    /// Page size used by the reindex scanner when reading the record store.
    pub reindex_page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            hosts: vec!["http://localhost:9200".to_string()],
            index_prefix: "searchbridge".to_string(),
            refresh_enabled: false,
            paginate_by: 0,
            max_fetch_size: 10_000,
            reindex_page_size: 5_000,
        }
    }
}

impl Config {
    /// Creates a new Config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validates the configuration.
    ///
    /// # Errors
    /// Returns a configuration error if:
    /// - `hosts` is empty
    /// - `index_prefix` is not a lowercase slug
    /// - `max_fetch_size` or `reindex_page_size` is 0
    pub fn validate(&self) -> Result<(), SearchBridgeError> {
        if self.hosts.is_empty() {
            return Err(SearchBridgeError::config("hosts must not be empty"));
        }

        if !crate::types::is_valid_slug(&self.index_prefix) {
            return Err(SearchBridgeError::config(format!(
                "index_prefix '{}' must be a lowercase slug ([a-z0-9_])",
                self.index_prefix
            )));
        }

        if self.max_fetch_size == 0 {
            return Err(SearchBridgeError::config(
                "max_fetch_size must be greater than 0",
            ));
        }

        if self.reindex_page_size == 0 {
            return Err(SearchBridgeError::config(
                "reindex_page_size must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Returns the configured search page cap: `paginate_by` when set,
    /// bounded by `max_fetch_size`.
    pub fn page_cap(&self) -> usize {
        if self.paginate_by == 0 {
            self.max_fetch_size
        } else {
            self.paginate_by.min(self.max_fetch_size)
        }
    }
}
