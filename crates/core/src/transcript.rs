//! Conversation transcript, accumulated on the client side.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// One finished utterance. Immutable once appended.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptEntry {
    pub text: String,
    pub is_user: bool,
    pub timestamp: DateTime<Utc>,
}

/// Append-only, ordered conversation log. Unbounded within a session; the
/// log lives and dies with the connection.
#[derive(Debug, Default)]
pub struct TranscriptLog {
    entries: Vec<TranscriptEntry>,
}

impl TranscriptLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a completed user transcription.
    pub fn push_user(&mut self, transcript: &str) {
        self.entries.push(TranscriptEntry {
            text: transcript.to_string(),
            is_user: true,
            timestamp: Utc::now(),
        });
    }

    /// Appends the assistant's spoken text from a completed response.
    /// Responses that flatten to nothing (e.g. tool-only turns) are skipped.
    pub fn push_assistant_response(&mut self, response: &Value) {
        if let Some(text) = response_text(response) {
            self.entries.push(TranscriptEntry {
                text,
                is_user: false,
                timestamp: Utc::now(),
            });
        }
    }

    pub fn entries(&self) -> &[TranscriptEntry] {
        &self.entries
    }
}

/// Flattens a `response.done` payload into the assistant's spoken text.
///
/// Per content block the first non-empty of `text`/`transcript` counts;
/// blocks are space-joined within an item and items space-joined overall.
/// Returns `None` when the concatenation is empty or whitespace.
pub fn response_text(response: &Value) -> Option<String> {
    let output = response.get("output")?.as_array()?;
    let mut items = Vec::new();
    for item in output {
        let Some(content) = item.get("content").and_then(Value::as_array) else {
            continue;
        };
        let parts: Vec<&str> = content
            .iter()
            .filter_map(|block| {
                block
                    .get("text")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .or_else(|| {
                        block
                            .get("transcript")
                            .and_then(Value::as_str)
                            .filter(|s| !s.is_empty())
                    })
            })
            .collect();
        if !parts.is_empty() {
            items.push(parts.join(" "));
        }
    }
    let joined = items.join(" ");
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
