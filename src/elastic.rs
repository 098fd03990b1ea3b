use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::ElasticSettings;
use crate::domain::{HistoryEntry, LegacyId, StableId};
use crate::emitter::BulkTransport;
use crate::error::PipelineError;
use crate::lookup::{HistoryLookup, IdentifierLookup, XrefHit};

/// Upper bound on hits per search; lookups are sliced well below this.
const MAX_HITS: usize = 10_000;

#[derive(Clone)]
pub struct ElasticClient {
    client: Client,
    settings: ElasticSettings,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    hits: SearchHits,
}

#[derive(Debug, Deserialize)]
struct SearchHits {
    #[serde(default)]
    hits: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

impl ElasticClient {
    pub fn new(settings: ElasticSettings, timeout: Duration) -> Result<Self, PipelineError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("genedocs/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| PipelineError::ElasticHttp(err.to_string()))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|err| PipelineError::ElasticHttp(err.to_string()))?;

        Ok(Self { client, settings })
    }

    fn search(&self, index: &str, field: &str, ids: &[LegacyId]) -> Result<Vec<SearchHit>, PipelineError> {
        let url = format!("{}/{index}/_search", self.settings.url);
        let terms = ids.iter().map(LegacyId::as_str).collect::<Vec<_>>();
        let body = json!({
            "size": MAX_HITS,
            "query": { "bool": { "filter": { "terms": { field: terms } } } }
        });
        debug!(index, field, ids = ids.len(), "search");
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .map_err(|err| PipelineError::ElasticHttp(err.to_string()))?;
        let parsed: SearchResponse = check_status(response)?
            .json()
            .map_err(|err| PipelineError::ElasticHttp(err.to_string()))?;
        Ok(parsed.hits.hits)
    }
}

impl IdentifierLookup for ElasticClient {
    fn find_by_xref(&self, ids: &[LegacyId]) -> Result<Vec<XrefHit>, PipelineError> {
        let field = self.settings.xref_field.as_str();
        let mut found = Vec::new();
        for hit in self.search(&self.settings.index, field, ids)? {
            let stable = match hit.id.parse::<StableId>() {
                Ok(stable) => stable,
                Err(err) => {
                    warn!(id = %hit.id, error = %err, "skipping hit with unexpected _id");
                    continue;
                }
            };
            for value in xref_values(&hit.source, field) {
                if let Some(legacy) = ids.iter().find(|id| id.as_str() == value) {
                    found.push(XrefHit {
                        legacy: legacy.clone(),
                        stable: stable.clone(),
                    });
                }
            }
        }
        Ok(found)
    }
}

impl HistoryLookup for ElasticClient {
    fn find_history(&self, ids: &[LegacyId]) -> Result<Vec<HistoryEntry>, PipelineError> {
        let hits = self.search(&self.settings.history_index, "discontinued_geneid", ids)?;
        Ok(history_entries(hits))
    }
}

fn history_entries(hits: Vec<SearchHit>) -> Vec<HistoryEntry> {
    let mut entries = Vec::with_capacity(hits.len());
    for hit in hits {
        match serde_json::from_value::<HistoryEntry>(hit.source) {
            Ok(entry) => entries.push(entry),
            Err(err) => warn!(id = %hit.id, error = %err, "skipping malformed history document"),
        }
    }
    entries
}

impl BulkTransport for ElasticClient {
    fn send_bulk(&self, body: String, actions: usize) -> Result<(), PipelineError> {
        let url = format!("{}/_bulk", self.settings.url);
        let response = self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(body)
            .send()
            .map_err(|err| PipelineError::ElasticHttp(err.to_string()))?;
        let parsed: BulkResponse = check_status(response)?
            .json()
            .map_err(|err| PipelineError::ElasticHttp(err.to_string()))?;
        if parsed.errors {
            let failed = parsed.items.iter().filter(|item| item_failed(item)).count();
            return Err(PipelineError::BulkRejected {
                failed,
                total: actions,
            });
        }
        debug!(actions, "bulk request accepted");
        Ok(())
    }
}

fn check_status(response: Response) -> Result<Response, PipelineError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response
        .text()
        .unwrap_or_else(|_| "elasticsearch request failed".to_string());
    Err(PipelineError::ElasticStatus { status, message })
}

fn item_failed(item: &Value) -> bool {
    item.as_object()
        .and_then(|actions| actions.values().next())
        .map(|result| result.get("error").is_some())
        .unwrap_or(false)
}

/// Values of a dotted field path in `_source`. Entrez ids may be stored as
/// strings or numbers, alone or in arrays.
pub fn xref_values(source: &Value, field: &str) -> Vec<String> {
    let mut current = source;
    for segment in field.split('.') {
        match current.get(segment) {
            Some(value) => current = value,
            None => return Vec::new(),
        }
    }
    let scalar = |value: &Value| match value {
        Value::String(text) => Some(text.trim().to_string()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    };
    match current {
        Value::Array(values) => values.iter().filter_map(scalar).collect(),
        other => scalar(other).into_iter().collect(),
    }
}
