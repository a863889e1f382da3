//! Grounding documents surfaced to the client from retrieval results.

use crate::error::RelayError;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// A retrieved document chunk shown in the client's grounding viewer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroundingFile {
    pub id: String,
    pub name: String,
    pub content: String,
}

/// One retrieved chunk inside a tool result payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSource {
    pub chunk_id: String,
    pub title: String,
    pub chunk: String,
}

/// The payload carried by a tool result, decoded once at the boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultPayload {
    pub sources: Vec<ToolSource>,
}

impl ToolResultPayload {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text).map_err(|e| RelayError::MalformedEvent(e.to_string()))
    }

    pub fn to_json(&self) -> String {
        json!({"sources": self.sources}).to_string()
    }
}

/// The client-visible grounding collection.
///
/// Append-only: duplicate chunk ids across repeated tool calls accumulate.
/// Deduplication is intentionally not performed.
#[derive(Debug, Default)]
pub struct GroundingCollector {
    files: Vec<GroundingFile>,
}

impl GroundingCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes a tool result and appends its sources as grounding files.
    /// Returns how many files were added.
    pub fn absorb(&mut self, tool_result: &str) -> Result<usize, RelayError> {
        let payload = ToolResultPayload::parse(tool_result)?;
        let added = payload.sources.len();
        for source in payload.sources {
            self.files.push(GroundingFile {
                id: source.chunk_id,
                name: source.title,
                content: source.chunk,
            });
        }
        Ok(added)
    }

    pub fn files(&self) -> &[GroundingFile] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULT: &str = r#"{"sources":[
        {"chunk_id":"doc1#0","title":"Handbook","chunk":"Lorem ipsum."},
        {"chunk_id":"doc2#3","title":"FAQ","chunk":"Dolor sit."}
    ]}"#;

    #[test]
    fn payload_round_trips() {
        let payload = ToolResultPayload::parse(RESULT).unwrap();
        assert_eq!(payload.sources.len(), 2);
        let reparsed = ToolResultPayload::parse(&payload.to_json()).unwrap();
        assert_eq!(reparsed, payload);
    }

    #[test]
    fn schema_mismatch_is_rejected() {
        assert!(ToolResultPayload::parse(r#"{"sources":"nope"}"#).is_err());
        assert!(ToolResultPayload::parse("not json").is_err());
    }

    #[test]
    fn empty_payload_serializes_empty_source_list() {
        assert_eq!(ToolResultPayload::empty().to_json(), r#"{"sources":[]}"#);
    }

    #[test]
    fn collector_maps_sources_to_files() {
        let mut collector = GroundingCollector::new();
        assert_eq!(collector.absorb(RESULT).unwrap(), 2);
        assert_eq!(
            collector.files()[0],
            GroundingFile {
                id: "doc1#0".into(),
                name: "Handbook".into(),
                content: "Lorem ipsum.".into(),
            }
        );
    }

    #[test]
    fn duplicate_chunks_accumulate_without_dedup() {
        let mut collector = GroundingCollector::new();
        collector.absorb(RESULT).unwrap();
        collector.absorb(RESULT).unwrap();
        assert_eq!(collector.len(), 4);
        assert_eq!(collector.files()[0].id, collector.files()[2].id);
    }

    #[test]
    fn malformed_result_leaves_collection_untouched() {
        let mut collector = GroundingCollector::new();
        collector.absorb(RESULT).unwrap();
        assert!(collector.absorb("garbage").is_err());
        assert_eq!(collector.len(), 2);
    }
}
