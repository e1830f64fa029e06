//! In-memory search backend for tests.
//!
//! Implements enough of the backend contract to exercise the indexing
//! pipeline without a running cluster: document storage per index, mapping
//! merge, wildcard deletion, a small query evaluator (`match_all`, `term`,
//! `bool.must`, `query_string` with `<`/`>` comparisons) and ES-shaped
//! result envelopes. Failure injection flags simulate an unreachable or
//! misbehaving cluster.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use serde_json::{json, Map, Value};

use crate::error::BackendError;
use crate::types::Schema;

use super::{BulkFailure, BulkOperation, BulkSummary, SearchBackend};

/// Top-level search-body keys the evaluator understands; anything else is
/// reported as a parse error, mirroring the real backend.
const KNOWN_BODY_KEYS: &[&str] = &["query", "size", "from", "sort", "aggs", "_source"];

#[derive(Clone, Debug, Default)]
struct MemoryIndex {
    mapping: Schema,
    docs: BTreeMap<String, Value>,
}

/// In-memory [`SearchBackend`] implementation.
#[derive(Default)]
pub struct MemoryBackend {
    indices: Mutex<HashMap<String, MemoryIndex>>,
    bulk_calls: AtomicUsize,
    fail_bulk: AtomicBool,
    fail_search: AtomicBool,
    fail_ping: AtomicBool,
}

impl MemoryBackend {
    /// Creates an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent bulk submission fail as unavailable.
    pub fn set_bulk_failure(&self, fail: bool) {
        self.fail_bulk.store(fail, Ordering::SeqCst);
    }

    /// Makes every subsequent search fail with a generic backend error.
    pub fn set_search_failure(&self, fail: bool) {
        self.fail_search.store(fail, Ordering::SeqCst);
    }

    /// Makes the backend report itself unreachable.
    pub fn set_ping_failure(&self, fail: bool) {
        self.fail_ping.store(fail, Ordering::SeqCst);
    }

    /// Number of bulk submissions received (including failed ones).
    pub fn bulk_calls(&self) -> usize {
        self.bulk_calls.load(Ordering::SeqCst)
    }

    /// Returns the ids currently indexed under `index`, in order.
    pub fn doc_ids(&self, index: &str) -> Vec<String> {
        let indices = self.indices.lock().unwrap();
        indices
            .get(index)
            .map(|idx| idx.docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the names of all live indices, sorted.
    pub fn index_names(&self) -> Vec<String> {
        let indices = self.indices.lock().unwrap();
        let mut names: Vec<String> = indices.keys().cloned().collect();
        names.sort();
        names
    }

    fn matches(doc: &Value, query: &Value) -> Result<bool, BackendError> {
        let Some(obj) = query.as_object() else {
            return Err(BackendError::malformed_query("query must be an object", None));
        };
        let Some((kind, clause)) = obj.iter().next() else {
            return Ok(true);
        };

        match kind.as_str() {
            "match_all" => Ok(true),
            "term" => {
                let Some(term) = clause.as_object() else {
                    return Err(BackendError::malformed_query("term must be an object", None));
                };
                Ok(term.iter().all(|(field, expected)| {
                    // Term clauses may be {"field": v} or {"field": {"value": v}}.
                    let expected = expected.get("value").unwrap_or(expected);
                    lookup(doc, field) == Some(expected)
                }))
            }
            "bool" => {
                let must = &clause["must"];
                let clauses: Vec<&Value> = match must {
                    Value::Array(items) => items.iter().collect(),
                    Value::Null => vec![],
                    other => vec![other],
                };
                for sub in clauses {
                    if !Self::matches(doc, sub)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            "query_string" => {
                let expr = clause["query"].as_str().unwrap_or("");
                Ok(query_string_matches(doc, expr))
            }
            other => Err(parse_error(other)),
        }
    }
}

impl SearchBackend for MemoryBackend {
    fn index_exists(&self, index: &str) -> Result<bool, BackendError> {
        Ok(self.indices.lock().unwrap().contains_key(index))
    }

    fn create_index(&self, index: &str, schema: Option<&Schema>) -> Result<(), BackendError> {
        let mut indices = self.indices.lock().unwrap();
        // Creating an existing index is success; its mapping is untouched.
        let entry = indices.entry(index.to_string()).or_default();
        if entry.mapping.is_empty() {
            if let Some(schema) = schema {
                entry.mapping = schema.clone();
            }
        }
        Ok(())
    }

    fn put_mapping(&self, index: &str, schema: &Schema) -> Result<(), BackendError> {
        let mut indices = self.indices.lock().unwrap();
        let entry = indices
            .get_mut(index)
            .ok_or_else(|| BackendError::not_found(format!("no such index [{}]", index)))?;
        merge_mapping(&mut entry.mapping.0, &schema.0);
        Ok(())
    }

    fn get_mapping(&self, index: &str) -> Result<Schema, BackendError> {
        let indices = self.indices.lock().unwrap();
        indices
            .get(index)
            .map(|idx| idx.mapping.clone())
            .ok_or_else(|| BackendError::not_found(format!("no such index [{}]", index)))
    }

    fn delete_index(&self, pattern: &str) -> Result<(), BackendError> {
        let mut indices = self.indices.lock().unwrap();
        if let Some(prefix) = pattern.strip_suffix('*') {
            indices.retain(|name, _| !name.starts_with(prefix));
        } else {
            // Absent index: deletion is already done.
            indices.remove(pattern);
        }
        Ok(())
    }

    fn bulk(
        &self,
        operations: &[BulkOperation],
        _refresh: bool,
    ) -> Result<BulkSummary, BackendError> {
        self.bulk_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_bulk.load(Ordering::SeqCst) {
            return Err(BackendError::unavailable("bulk submission refused"));
        }

        let mut indices = self.indices.lock().unwrap();
        let mut failures = Vec::new();

        for op in operations {
            match op {
                BulkOperation::Index {
                    index,
                    id,
                    document,
                } => {
                    // Bulk writes create missing indices with dynamic mapping.
                    let entry = indices.entry(index.clone()).or_default();
                    entry.docs.insert(id.clone(), document.clone());
                }
                BulkOperation::Delete { index, id } => match indices.get_mut(index) {
                    Some(entry) => {
                        entry.docs.remove(id);
                    }
                    None => failures.push(BulkFailure {
                        id: id.clone(),
                        reason: format!("no such index [{}]", index),
                    }),
                },
            }
        }

        Ok(BulkSummary {
            operations: operations.len(),
            failures,
        })
    }

    fn search(&self, index: &str, body: &Value) -> Result<Value, BackendError> {
        if self.fail_search.load(Ordering::SeqCst) {
            return Err(BackendError::other("search exploded"));
        }

        let obj = body.as_object().cloned().unwrap_or_default();
        for key in obj.keys() {
            if !KNOWN_BODY_KEYS.contains(&key.as_str()) {
                return Err(parse_error(key));
            }
        }

        let indices = self.indices.lock().unwrap();
        let idx = indices
            .get(index)
            .ok_or_else(|| BackendError::not_found(format!("no such index [{}]", index)))?;

        let query = obj.get("query").cloned().unwrap_or(json!({"match_all": {}}));
        let size = obj.get("size").and_then(Value::as_u64).unwrap_or(10) as usize;
        let from = obj.get("from").and_then(Value::as_u64).unwrap_or(0) as usize;

        let mut hits = Vec::new();
        for (id, doc) in idx.docs.iter() {
            if MemoryBackend::matches(doc, &query)? {
                hits.push(json!({
                    "_index": index,
                    "_id": id,
                    "_score": 1.0,
                    "_source": doc,
                }));
            }
        }
        let total = hits.len();
        let hits: Vec<Value> = hits.into_iter().skip(from).take(size).collect();

        Ok(json!({
            "took": 1,
            "timed_out": false,
            "hits": {
                "total": {"value": total, "relation": "eq"},
                "hits": hits,
            }
        }))
    }

    fn ping(&self) -> bool {
        !self.fail_ping.load(Ordering::SeqCst)
    }
}

/// Builds an ES-shaped parse error for an unknown key.
fn parse_error(key: &str) -> BackendError {
    let reason = format!("Unknown key for a START_OBJECT in [{}].", key);
    let details = json!({
        "type": "parsing_exception",
        "reason": reason.clone(),
        "line": 1,
        "col": 14,
    });
    BackendError::malformed_query(reason, Some(details))
}

/// Looks up a possibly dotted field path in a document.
fn lookup<'a>(doc: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = doc;
    for part in path.split('.') {
        current = current.get(part)?;
    }
    Some(current)
}

/// Evaluates a `field:value` / `field:<n` / `field:>n` expression.
///
/// An empty expression matches everything, like the real backend's empty
/// query string.
fn query_string_matches(doc: &Value, expr: &str) -> bool {
    let Some((field, expected)) = expr.split_once(':') else {
        return expr.is_empty();
    };

    let actual = lookup(doc, field);
    if let Some(rest) = expected.strip_prefix('<') {
        return compare_numeric(actual, rest, |a, b| a < b);
    }
    if let Some(rest) = expected.strip_prefix('>') {
        return compare_numeric(actual, rest, |a, b| a > b);
    }

    match actual {
        Some(Value::String(s)) => s == expected,
        Some(other) => other.to_string() == expected,
        None => false,
    }
}

fn compare_numeric(actual: Option<&Value>, bound: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (actual.and_then(Value::as_f64), bound.parse::<f64>()) {
        (Some(a), Ok(b)) => cmp(a, b),
        _ => false,
    }
}

/// Recursively merges `src` into `dst`: objects merge, scalars overwrite,
/// keys absent from `src` are retained.
fn merge_mapping(dst: &mut Map<String, Value>, src: &Map<String, Value>) {
    for (key, value) in src {
        let merged = match (dst.get_mut(key), value) {
            (Some(Value::Object(dst_obj)), Value::Object(src_obj)) => {
                merge_mapping(dst_obj, src_obj);
                true
            }
            _ => false,
        };
        if !merged {
            dst.insert(key.clone(), value.clone());
        }
    }
}
