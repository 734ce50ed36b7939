// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Elasticsearch backend over HTTP.
//!
//! Writes go to a data stream, which only accepts `create` operations:
//! - single entry: `PUT {url}/{stream}/_create/{id}`
//! - bulk: `POST {url}/{stream}/_bulk` with NDJSON `{"create":{"_id":..}}` pairs
//! - availability: `HEAD {url}/`
//!
//! A `409 Conflict` on create means the document id is already indexed.
//! Redelivery from the fallback queue is at-least-once, so a conflict is
//! reported as success; otherwise a redelivered file could never be cleared.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, warn};

use super::traits::{AvailabilityProbe, BulkItemResult, BulkResponse, BulkSink, EntryWriter};
use crate::log_entry::LogEntry;
use crate::outcome::{DeliveryError, WriteOutcome};

pub struct ElasticBackend {
    client: Client,
    base_url: String,
    data_stream: String,
    timeout: Duration,
}

impl ElasticBackend {
    pub fn new(
        base_url: impl Into<String>,
        data_stream: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Backend(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            data_stream: data_stream.into(),
            timeout,
        })
    }

    #[must_use]
    pub fn data_stream(&self) -> &str {
        &self.data_stream
    }

    fn create_url(&self, entry: &LogEntry) -> String {
        format!("{}/{}/_create/{}", self.base_url, self.data_stream, entry.id)
    }

    fn bulk_url(&self) -> String {
        format!("{}/{}/_bulk", self.base_url, self.data_stream)
    }

    fn map_transport_error(&self, err: reqwest::Error) -> DeliveryError {
        if err.is_timeout() {
            DeliveryError::Timeout(saturating_millis(self.timeout))
        } else if err.is_connect() {
            DeliveryError::Unavailable(err.to_string())
        } else {
            DeliveryError::Backend(err.to_string())
        }
    }
}

/// Build the NDJSON body for a bulk create request.
pub fn bulk_body(entries: &[LogEntry]) -> Result<String, serde_json::Error> {
    let mut body = String::with_capacity(entries.len() * 256);
    for entry in entries {
        let action = serde_json::json!({ "create": { "_id": entry.id.to_string() } });
        body.push_str(&serde_json::to_string(&action)?);
        body.push('\n');
        body.push_str(&serde_json::to_string(entry)?);
        body.push('\n');
    }
    Ok(body)
}

/// Parse a bulk response into per-item results.
///
/// Items missing from the response are reported as failed so the caller's
/// accounting matches the batch it sent.
pub fn parse_bulk_response(response: &Value, entries: &[LogEntry]) -> BulkResponse {
    let items = response.get("items").and_then(Value::as_array);

    let results = entries
        .iter()
        .enumerate()
        .map(|(idx, entry)| {
            let id = entry.id.to_string();
            let Some(item) = items.and_then(|items| items.get(idx)) else {
                return BulkItemResult { id, error: Some("missing from bulk response".into()) };
            };

            // Data streams answer with "create"; tolerate "index" from plain indices
            let op = item.get("create").or_else(|| item.get("index")).unwrap_or(item);
            let status = op.get("status").and_then(Value::as_u64).unwrap_or(0);
            let error = match op.get("error") {
                Some(_) if status == u64::from(StatusCode::CONFLICT.as_u16()) => None,
                Some(err) => Some(error_reason(err)),
                None => None,
            };

            BulkItemResult { id, error }
        })
        .collect();

    BulkResponse { items: results }
}

fn error_reason(err: &Value) -> String {
    let kind = err.get("type").and_then(Value::as_str).unwrap_or("error");
    match err.get("reason").and_then(Value::as_str) {
        Some(reason) => format!("{kind}: {reason}"),
        None => kind.to_string(),
    }
}

#[async_trait]
impl EntryWriter for ElasticBackend {
    async fn write(&self, entry: &LogEntry) -> Result<WriteOutcome, DeliveryError> {
        let response = self
            .client
            .put(self.create_url(entry))
            .json(entry)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            debug!(id = %entry.id, "Log entry indexed");
            return Ok(WriteOutcome::success());
        }
        if status == StatusCode::CONFLICT {
            debug!(id = %entry.id, "Log entry already indexed, treating as delivered");
            return Ok(WriteOutcome::success());
        }

        let body: Value = response.json().await.unwrap_or(Value::Null);
        let reason = body
            .get("error")
            .map(error_reason)
            .unwrap_or_else(|| "unknown error".to_string());
        warn!(id = %entry.id, status = status.as_u16(), reason = %reason, "Backend rejected log entry");

        Ok(WriteOutcome::failure(format!("HTTP {}: {}", status.as_u16(), reason)))
    }
}

#[async_trait]
impl AvailabilityProbe for ElasticBackend {
    async fn is_available(&self) -> bool {
        match self.client.head(format!("{}/", self.base_url)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!(error = %e, "Backend ping failed");
                false
            }
        }
    }
}

#[async_trait]
impl BulkSink for ElasticBackend {
    async fn bulk_index(&self, entries: &[LogEntry]) -> Result<BulkResponse, DeliveryError> {
        let body = bulk_body(entries)?;

        let response = self
            .client
            .post(self.bulk_url())
            .header(reqwest::header::CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .await
            .map_err(|e| self.map_transport_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DeliveryError::Backend(format!("bulk request failed with HTTP {}", status.as_u16())));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| DeliveryError::Serialization(e.to_string()))?;

        Ok(parse_bulk_response(&json, entries))
    }
}

fn saturating_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log_entry::LogLevel;
    use serde_json::json;

    fn entries(n: usize) -> Vec<LogEntry> {
        (0..n).map(|i| LogEntry::new(LogLevel::Information, format!("msg {i}"))).collect()
    }

    #[test]
    fn test_timeout_millis_saturate() {
        assert_eq!(saturating_millis(Duration::from_secs(30)), 30_000);
        assert_eq!(saturating_millis(Duration::MAX), u64::MAX);
    }

    #[test]
    fn test_urls_strip_trailing_slash() {
        let backend = ElasticBackend::new("http://es:9200/", "logservice-logs", Duration::from_secs(1)).unwrap();
        let entry = LogEntry::new(LogLevel::Error, "x");

        assert_eq!(backend.bulk_url(), "http://es:9200/logservice-logs/_bulk");
        assert_eq!(
            backend.create_url(&entry),
            format!("http://es:9200/logservice-logs/_create/{}", entry.id)
        );
    }

    #[test]
    fn test_bulk_body_is_ndjson_pairs() {
        let batch = entries(2);
        let body = bulk_body(&batch).unwrap();
        let lines: Vec<&str> = body.lines().collect();

        assert_eq!(lines.len(), 4);
        assert!(body.ends_with('\n'));

        let action: Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(action["create"]["_id"], batch[0].id.to_string());

        let doc: LogEntry = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(doc, batch[0]);
    }

    #[test]
    fn test_parse_bulk_response_per_item() {
        let batch = entries(3);
        let response = json!({
            "errors": true,
            "items": [
                { "create": { "_id": "a", "status": 201 } },
                { "create": { "_id": "b", "status": 400,
                    "error": { "type": "mapper_parsing_exception", "reason": "bad field" } } },
                { "create": { "_id": "c", "status": 409,
                    "error": { "type": "version_conflict_engine_exception", "reason": "exists" } } }
            ]
        });

        let parsed = parse_bulk_response(&response, &batch);

        assert_eq!(parsed.items.len(), 3);
        assert!(parsed.items[0].error.is_none());
        assert_eq!(
            parsed.items[1].error.as_deref(),
            Some("mapper_parsing_exception: bad field")
        );
        assert!(parsed.items[2].error.is_none(), "conflict means already indexed");
    }

    #[test]
    fn test_parse_bulk_response_missing_items() {
        let batch = entries(2);
        let parsed = parse_bulk_response(&json!({ "errors": false, "items": [] }), &batch);

        assert_eq!(parsed.failed().count(), 2);
    }

    #[tokio::test]
    async fn test_unreachable_backend() {
        // Port 9 (discard) on localhost is not expected to serve HTTP
        let backend = ElasticBackend::new("http://127.0.0.1:9", "logs", Duration::from_millis(500)).unwrap();
        let entry = LogEntry::new(LogLevel::Warning, "nobody home");

        assert!(!backend.is_available().await);
        let result = backend.write(&entry).await;
        assert!(matches!(
            result,
            Err(DeliveryError::Unavailable(_) | DeliveryError::Timeout(_) | DeliveryError::Backend(_))
        ));
    }
}
