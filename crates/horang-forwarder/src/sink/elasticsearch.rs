//! Elasticsearch bulk sink

use super::Sink;
use crate::config::ElasticsearchConfig;
use async_trait::async_trait;
use horang_common::document_id::document_id;
use horang_common::{Batch, HorangError, Result};
use reqwest::{header, Client, RequestBuilder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on a single HTTP exchange; the forwarder applies its own
/// per-attempt timeout on top.
const REQUEST_TIMEOUT_SECS: u64 = 60;

const NDJSON: &str = "application/x-ndjson";

/// Sends batches to the `_bulk` endpoint of one index
pub struct ElasticsearchSink {
    client: Client,
    base_url: String,
    index: String,
    basic_auth: Option<(String, String)>,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

/// Result of one action, keyed by action name in the response
#[derive(Debug, Deserialize)]
struct BulkItem {
    #[serde(rename = "_id")]
    id: Option<String>,
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

/// What a bulk response with `errors: true` means for the batch
#[derive(Debug, PartialEq, Eq)]
enum ItemFailures {
    /// At least one item may succeed if the batch is sent again
    Retryable(Vec<String>),
    /// Every failed item was refused for good
    Dropped(Vec<String>),
}

/// 429 and 5xx may succeed on a later attempt
fn is_retryable(status: u16) -> bool {
    status == 429 || status >= 500
}

impl BulkResponse {
    fn failures(&self) -> ItemFailures {
        let failed: Vec<&BulkItem> = self
            .items
            .iter()
            .flat_map(|item| item.values())
            .filter(|item| item.error.is_some() || item.status >= 300)
            .collect();
        let ids = |items: &[&BulkItem]| {
            items
                .iter()
                .map(|item| item.id.clone().unwrap_or_default())
                .collect::<Vec<_>>()
        };

        let retryable: Vec<&BulkItem> = failed
            .iter()
            .copied()
            .filter(|item| is_retryable(item.status))
            .collect();
        if retryable.is_empty() {
            ItemFailures::Dropped(ids(&failed))
        } else {
            ItemFailures::Retryable(ids(&retryable))
        }
    }
}

impl ElasticsearchSink {
    /// Build the sink without contacting the cluster
    pub fn new(config: &ElasticsearchConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| HorangError::sink(format!("failed to build HTTP client: {e}")))?;

        let basic_auth = match (&config.username, &config.password) {
            (Some(user), Some(pass)) => Some((user.clone(), pass.clone())),
            _ => None,
        };

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            index: config.index.clone(),
            basic_auth,
            api_key: config.api_key.clone(),
        })
    }

    /// Build the sink and verify the cluster answers
    pub async fn connect(config: &ElasticsearchConfig) -> Result<Self> {
        let sink = Self::new(config)?;
        if !sink.ping().await? {
            return Err(HorangError::sink(format!(
                "Elasticsearch at {} refused the connection check",
                sink.base_url
            )));
        }
        info!(url = %sink.base_url, index = %sink.index, "Connected to Elasticsearch");
        Ok(sink)
    }

    /// `GET /`; true on a 2xx answer
    pub async fn ping(&self) -> Result<bool> {
        let response = self
            .authorize(self.client.get(format!("{}/", self.base_url)))
            .send()
            .await
            .map_err(|e| HorangError::sink(format!("{}: {e}", self.base_url)))?;
        Ok(response.status().is_success())
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        if let Some(ref key) = self.api_key {
            request.header(header::AUTHORIZATION, format!("ApiKey {key}"))
        } else if let Some((ref user, ref pass)) = self.basic_auth {
            request.basic_auth(user, Some(pass))
        } else {
            request
        }
    }

    /// One action line and one source line per record
    fn bulk_body(&self, batch: &Batch) -> Result<String> {
        let mut body = String::new();
        for (index, record) in batch.records.iter().enumerate() {
            let action = json!({
                "index": {
                    "_index": self.index,
                    "_id": document_id(batch.source(), batch.start_offset, index),
                }
            });
            body.push_str(&serde_json::to_string(&action)?);
            body.push('\n');
            body.push_str(&serde_json::to_string(record)?);
            body.push('\n');
        }
        Ok(body)
    }
}

#[async_trait]
impl Sink for ElasticsearchSink {
    fn name(&self) -> &str {
        "elasticsearch"
    }

    async fn deliver(&self, batch: &Batch) -> Result<bool> {
        if batch.is_empty() {
            return Ok(true);
        }

        let body = self.bulk_body(batch)?;
        let response = self
            .authorize(self.client.post(format!("{}/_bulk", self.base_url)))
            .header(header::CONTENT_TYPE, NDJSON)
            .body(body)
            .send()
            .await
            .map_err(|e| HorangError::sink(format!("bulk request failed: {e}")))?;

        let status = response.status();
        if is_retryable(status.as_u16()) {
            return Err(HorangError::sink(format!("bulk request answered {status}")));
        }
        if !status.is_success() {
            warn!(status = %status, source = %batch.source().display(), "Bulk request rejected");
            return Ok(false);
        }

        let parsed: BulkResponse = response
            .json()
            .await
            .map_err(|e| HorangError::sink(format!("unreadable bulk response: {e}")))?;
        if parsed.errors {
            match parsed.failures() {
                ItemFailures::Retryable(ids) => {
                    return Err(HorangError::sink(format!(
                        "{} bulk items need another attempt",
                        ids.len()
                    )));
                }
                ItemFailures::Dropped(ids) => {
                    warn!(
                        source = %batch.source().display(),
                        dropped = ids.len(),
                        ids = ?ids,
                        "Elasticsearch refused records, dropping them"
                    );
                }
            }
        }

        debug!(records = batch.len(), index = %self.index, "Bulk request accepted");
        Ok(true)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use horang_common::Record;

    fn config() -> ElasticsearchConfig {
        ElasticsearchConfig {
            url: "http://localhost:9200/".to_string(),
            index: "logs".to_string(),
            ..ElasticsearchConfig::default()
        }
    }

    fn record(n: u64) -> Record {
        let mut record = Record::new();
        record.insert("n".to_string(), Value::from(n));
        record
    }

    #[test]
    fn test_base_url_is_normalized() {
        let sink = ElasticsearchSink::new(&config()).unwrap();
        assert_eq!(sink.base_url, "http://localhost:9200");
        assert_eq!(sink.index(), "logs");
    }

    #[test]
    fn test_bulk_body_layout() {
        let sink = ElasticsearchSink::new(&config()).unwrap();
        let batch = Batch::new("/var/log/a.json", 4, vec![record(1), record(2)]);
        let body = sink.bulk_body(&batch).unwrap();

        let lines: Vec<Value> = body
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0]["index"]["_index"], "logs");
        assert_eq!(
            lines[0]["index"]["_id"],
            Value::String(document_id(batch.source(), 4, 0))
        );
        assert_eq!(lines[1]["n"], 1);
        assert_eq!(lines[3]["n"], 2);
        assert!(body.ends_with('\n'));
    }

    #[test]
    fn test_half_basic_auth_is_ignored() {
        let sink = ElasticsearchSink::new(&ElasticsearchConfig {
            username: Some("elastic".to_string()),
            ..config()
        })
        .unwrap();
        assert!(sink.basic_auth.is_none());
    }

    fn response(items: Value) -> BulkResponse {
        serde_json::from_value(json!({ "errors": true, "items": items })).unwrap()
    }

    #[test]
    fn test_mapping_rejections_are_dropped() {
        let parsed = response(json!([
            { "index": { "_id": "a", "status": 201 } },
            { "index": { "_id": "b", "status": 400, "error": { "type": "mapper_parsing_exception" } } },
        ]));
        assert_eq!(parsed.failures(), ItemFailures::Dropped(vec!["b".to_string()]));
    }

    #[test]
    fn test_throttled_items_are_retryable() {
        let parsed = response(json!([
            { "index": { "_id": "a", "status": 400, "error": { "type": "mapper_parsing_exception" } } },
            { "index": { "_id": "b", "status": 429, "error": { "type": "es_rejected_execution_exception" } } },
            { "create": { "_id": "c", "status": 503, "error": { "type": "unavailable_shards_exception" } } },
        ]));
        assert_eq!(
            parsed.failures(),
            ItemFailures::Retryable(vec!["b".to_string(), "c".to_string()])
        );
    }
}
