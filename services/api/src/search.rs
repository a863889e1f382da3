//! Retrieval backend client.
//!
//! One search request per tool call. Field names are configurable so the
//! relay can sit in front of any index layout; when vector queries are
//! enabled the backend vectorizes the query text itself and ranking is
//! hybrid, otherwise it is text-only.

use crate::config::SearchConfig;
use async_trait::async_trait;
use groundwire_core::error::RelayError;
use groundwire_core::grounding::ToolSource;
use serde_json::{Value, json};
use tracing::debug;

/// A queryable retrieval index.
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<ToolSource>, RelayError>;
}

/// REST client for the search service.
pub struct SearchClient {
    http: reqwest::Client,
    config: SearchConfig,
}

impl SearchClient {
    pub fn new(config: SearchConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self) -> String {
        format!(
            "{}/indexes/{}/docs/search?api-version={}",
            self.config.endpoint.trim_end_matches('/'),
            self.config.index,
            self.config.api_version,
        )
    }

    fn request_body(&self, query: &str) -> Value {
        let mut body = json!({
            "search": query,
            "top": self.config.top,
            "select": format!(
                "{},{},{}",
                self.config.identifier_field,
                self.config.content_field,
                self.config.title_field,
            ),
        });
        if self.config.use_vector_query {
            body["vectorQueries"] = json!([{
                "kind": "text",
                "text": query,
                "fields": self.config.embedding_field,
                "k": self.config.top,
            }]);
        }
        if let Some(semantic) = &self.config.semantic_configuration {
            body["queryType"] = json!("semantic");
            body["semanticConfiguration"] = json!(semantic);
        }
        body
    }

    fn map_documents(&self, response: &Value) -> Result<Vec<ToolSource>, RelayError> {
        let documents = response
            .get("value")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                RelayError::RetrievalFailure("search response missing result array".to_string())
            })?;
        Ok(documents
            .iter()
            .map(|doc| ToolSource {
                chunk_id: field_string(doc, &self.config.identifier_field),
                title: field_string(doc, &self.config.title_field),
                chunk: field_string(doc, &self.config.content_field),
            })
            .collect())
    }
}

/// Reads a document field as text; non-string scalars are rendered, missing
/// fields become empty.
fn field_string(doc: &Value, field: &str) -> String {
    match doc.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

#[async_trait]
impl Retriever for SearchClient {
    async fn search(&self, query: &str) -> Result<Vec<ToolSource>, RelayError> {
        debug!(%query, index = %self.config.index, "issuing retrieval request");
        let response = self
            .http
            .post(self.url())
            .header("api-key", &self.config.api_key)
            .json(&self.request_body(query))
            .send()
            .await
            .map_err(|e| RelayError::RetrievalFailure(e.to_string()))?
            .error_for_status()
            .map_err(|e| RelayError::RetrievalFailure(e.to_string()))?;
        let body: Value = response
            .json()
            .await
            .map_err(|e| RelayError::RetrievalFailure(e.to_string()))?;
        self.map_documents(&body)
    }
}
