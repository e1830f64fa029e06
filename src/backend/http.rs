//! Elasticsearch-compatible REST backend.
//!
//! Speaks the plain JSON REST protocol over a blocking [`ureq`] agent:
//! `PUT /{index}` to create, `PUT /{index}/_mapping` to merge a mapping,
//! `POST /_bulk` with NDJSON payloads, `POST /{index}/_search` to query.
//! Non-2xx responses are read and translated into [`BackendErrorKind`]
//! values rather than surfaced as raw HTTP failures.
//!
//! Hosts are tried in order; a transport-level failure on one host falls
//! through to the next before giving up as `Unavailable`.

use std::time::Duration;

use serde_json::{json, Map, Value};
use tracing::{debug, warn};
use ureq::Agent;

use crate::error::{BackendError, BackendErrorKind};
use crate::types::Schema;

use super::{BulkFailure, BulkOperation, BulkSummary, SearchBackend};

/// Request timeout applied to every backend round-trip.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Body of an outgoing request.
enum Payload<'a> {
    Empty,
    Json(&'a Value),
    NdJson(&'a str),
}

/// Search backend over the Elasticsearch REST API.
pub struct HttpBackend {
    agent: Agent,
    hosts: Vec<String>,
}

impl HttpBackend {
    /// Creates a backend for the given host list.
    ///
    /// Hosts may be given with or without a scheme (`localhost:9200` becomes
    /// `http://localhost:9200`). Trailing slashes are stripped.
    pub fn new(hosts: &[String]) -> Self {
        let config = Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(REQUEST_TIMEOUT))
            .build();

        let hosts = hosts
            .iter()
            .map(|h| {
                let h = h.trim_end_matches('/');
                if h.contains("://") {
                    h.to_string()
                } else {
                    format!("http://{}", h)
                }
            })
            .collect();

        Self {
            agent: config.new_agent(),
            hosts,
        }
    }

    /// Sends a request to the first reachable host and returns the status
    /// code plus parsed JSON body (`Null` when the body is empty or not
    /// JSON).
    fn request(
        &self,
        method: &str,
        path: &str,
        payload: Payload<'_>,
    ) -> Result<(u16, Value), BackendError> {
        let mut last_error = String::new();

        for (attempt, host) in self.hosts.iter().enumerate() {
            let url = format!("{}{}", host, path);
            let sent = match (&payload, method) {
                (Payload::Empty, "GET") => self.agent.get(&url).call(),
                (Payload::Empty, "HEAD") => self.agent.head(&url).call(),
                (Payload::Empty, "DELETE") => self.agent.delete(&url).call(),
                (Payload::Empty, "PUT") => self.agent.put(&url).send_empty(),
                (Payload::Empty, "POST") => self.agent.post(&url).send_empty(),
                (Payload::Json(body), "PUT") => self.agent.put(&url).send_json(body),
                (Payload::Json(body), "POST") => self.agent.post(&url).send_json(body),
                (Payload::NdJson(body), "POST") => self
                    .agent
                    .post(&url)
                    .header("Content-Type", "application/x-ndjson")
                    .send(*body),
                _ => unreachable!("unsupported method/payload combination"),
            };

            match sent {
                Ok(mut response) => {
                    let status = response.status().as_u16();
                    let body = if method == "HEAD" {
                        Value::Null
                    } else {
                        response
                            .body_mut()
                            .read_json::<Value>()
                            .unwrap_or(Value::Null)
                    };
                    return Ok((status, body));
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt + 1 < self.hosts.len() {
                        warn!(host = %host, error = %last_error, "Host unreachable, trying next");
                    }
                }
            }
        }

        Err(BackendError::unavailable(last_error))
    }

    /// Translates an error-status response body into a [`BackendError`].
    fn classify(status: u16, body: &Value) -> BackendError {
        let error = &body["error"];

        // Older servers return a bare string instead of an error object.
        let (error_type, reason, root_cause) = match error {
            Value::Object(obj) => (
                obj.get("type").and_then(Value::as_str).unwrap_or(""),
                obj.get("reason")
                    .and_then(Value::as_str)
                    .unwrap_or("backend error")
                    .to_string(),
                obj.get("root_cause")
                    .and_then(|rc| rc.get(0))
                    .cloned(),
            ),
            Value::String(s) => ("", s.clone(), None),
            _ => ("", format!("backend returned HTTP {}", status), None),
        };

        if status == 404 || error_type == "index_not_found_exception" {
            return BackendError::not_found(reason);
        }
        if error_type == "resource_already_exists_exception" {
            return BackendError::already_exists(reason);
        }
        if status == 400 {
            return BackendError::malformed_query(reason, root_cause);
        }
        BackendError::other(reason)
    }

    /// Serializes operations into the `_bulk` NDJSON payload.
    fn ndjson(operations: &[BulkOperation]) -> String {
        let mut payload = String::new();
        for op in operations {
            match op {
                BulkOperation::Index {
                    index,
                    id,
                    document,
                } => {
                    let action = json!({"index": {"_index": index, "_id": id}});
                    payload.push_str(&action.to_string());
                    payload.push('\n');
                    payload.push_str(&document.to_string());
                    payload.push('\n');
                }
                BulkOperation::Delete { index, id } => {
                    let action = json!({"delete": {"_index": index, "_id": id}});
                    payload.push_str(&action.to_string());
                    payload.push('\n');
                }
            }
        }
        payload
    }

    /// Extracts per-item failures from a `_bulk` response.
    fn bulk_failures(body: &Value) -> Vec<BulkFailure> {
        let mut failures = Vec::new();
        if body["errors"] != json!(true) {
            return failures;
        }

        let items = match body["items"].as_array() {
            Some(items) => items,
            None => return failures,
        };

        for item in items {
            // Each item is {"index": {...}} or {"delete": {...}}.
            let Some((action, detail)) = item.as_object().and_then(|o| o.iter().next()) else {
                continue;
            };
            let status = detail["status"].as_u64().unwrap_or(200);

            // Deleting an absent document reports 404; that is idempotent
            // success, not a failure.
            if status < 300 || (action == "delete" && status == 404) {
                continue;
            }

            failures.push(BulkFailure {
                id: detail["_id"].as_str().unwrap_or("").to_string(),
                reason: detail["error"]["reason"]
                    .as_str()
                    .unwrap_or("bulk operation rejected")
                    .to_string(),
            });
        }
        failures
    }
}

impl SearchBackend for HttpBackend {
    fn index_exists(&self, index: &str) -> Result<bool, BackendError> {
        let (status, _) = self.request("HEAD", &format!("/{}", index), Payload::Empty)?;
        Ok(status == 200)
    }

    fn create_index(&self, index: &str, schema: Option<&Schema>) -> Result<(), BackendError> {
        let body = match schema {
            Some(schema) => json!({"mappings": schema.as_value()}),
            None => Value::Object(Map::new()),
        };

        let (status, response) =
            self.request("PUT", &format!("/{}", index), Payload::Json(&body))?;
        if status < 300 {
            debug!(index = %index, "Index created");
            return Ok(());
        }

        match Self::classify(status, &response) {
            // Lost a create race; the index is there, which is what we wanted.
            BackendError {
                kind: BackendErrorKind::AlreadyExists,
                ..
            } => Ok(()),
            err => Err(err),
        }
    }

    fn put_mapping(&self, index: &str, schema: &Schema) -> Result<(), BackendError> {
        let body = schema.as_value();
        let (status, response) =
            self.request("PUT", &format!("/{}/_mapping", index), Payload::Json(&body))?;
        if status < 300 {
            return Ok(());
        }
        Err(Self::classify(status, &response))
    }

    fn get_mapping(&self, index: &str) -> Result<Schema, BackendError> {
        let (status, response) =
            self.request("GET", &format!("/{}/_mapping", index), Payload::Empty)?;
        if status >= 300 {
            return Err(Self::classify(status, &response));
        }

        // Response shape: {"<concrete-index>": {"mappings": {...}}}
        let mappings = response
            .as_object()
            .and_then(|o| o.values().next())
            .map(|entry| &entry["mappings"])
            .and_then(Schema::from_value)
            .unwrap_or_default();
        Ok(mappings)
    }

    fn delete_index(&self, pattern: &str) -> Result<(), BackendError> {
        let (status, response) =
            self.request("DELETE", &format!("/{}", pattern), Payload::Empty)?;
        if status < 300 || status == 404 {
            return Ok(());
        }
        Err(Self::classify(status, &response))
    }

    fn bulk(
        &self,
        operations: &[BulkOperation],
        refresh: bool,
    ) -> Result<BulkSummary, BackendError> {
        let payload = Self::ndjson(operations);
        let path = if refresh {
            "/_bulk?refresh=true"
        } else {
            "/_bulk"
        };

        let (status, response) = self.request("POST", path, Payload::NdJson(&payload))?;
        if status >= 300 {
            return Err(Self::classify(status, &response));
        }

        Ok(BulkSummary {
            operations: operations.len(),
            failures: Self::bulk_failures(&response),
        })
    }

    fn search(&self, index: &str, body: &Value) -> Result<Value, BackendError> {
        let (status, response) = self.request(
            "POST",
            &format!("/{}/_search", index),
            Payload::Json(body),
        )?;
        if status >= 300 {
            return Err(Self::classify(status, &response));
        }
        Ok(response)
    }

    fn ping(&self) -> bool {
        matches!(self.request("HEAD", "/", Payload::Empty), Ok((status, _)) if status < 300)
    }
}
