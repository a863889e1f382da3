//! Server-held session policy.
//!
//! The policy is computed once from process configuration and merged into
//! every upstream session, both in the initial `session.update` the relay
//! sends on connect and over any `session.update` the client supplies later.
//! Clients can never override these fields, and `session.created` is
//! scrubbed on the way back so they never see them either.

use crate::events;
use crate::variant::{ProviderVariant, VadPolicy};
use serde_json::{Map, Value, json};
use std::sync::Arc;

/// Name of the single tool the model is allowed to invoke.
pub const SEARCH_TOOL_NAME: &str = "search";

/// Declaration of the search tool offered to the model.
pub fn search_tool_schema() -> Value {
    json!({
        "type": "function",
        "name": SEARCH_TOOL_NAME,
        "description": "Search the knowledge base. The knowledge base is in English, \
                        translate to and from English if needed. Results are returned \
                        as a list of sources, each with a chunk id, a title, and the \
                        text content.",
        "parameters": {
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Search query"
                }
            },
            "required": ["query"],
            "additionalProperties": false
        }
    })
}

/// Immutable, server-held session configuration.
#[derive(Clone)]
pub struct SessionPolicy {
    variant: Arc<dyn ProviderVariant>,
    instructions: String,
    voice: Option<String>,
    transcription_model: String,
    vad: VadPolicy,
    temperature: Option<f64>,
    max_response_output_tokens: Option<u64>,
    tool_schemas: Vec<Value>,
}

impl SessionPolicy {
    pub fn new(
        variant: Arc<dyn ProviderVariant>,
        instructions: String,
        voice: Option<String>,
        transcription_model: String,
        vad: VadPolicy,
        tool_schemas: Vec<Value>,
    ) -> Self {
        Self {
            variant,
            instructions,
            voice,
            transcription_model,
            vad,
            temperature: None,
            max_response_output_tokens: None,
            tool_schemas,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_response_output_tokens(mut self, max: Option<u64>) -> Self {
        self.max_response_output_tokens = max;
        self
    }

    pub fn instructions(&self) -> &str {
        &self.instructions
    }

    pub fn variant(&self) -> &dyn ProviderVariant {
        &*self.variant
    }

    fn tool_choice(&self) -> &'static str {
        if self.tool_schemas.is_empty() { "none" } else { "auto" }
    }

    /// The full session payload sent in the relay's initial `session.update`.
    pub fn session_value(&self) -> Value {
        let mut session = Map::new();
        self.apply(&mut session);
        Value::Object(session)
    }

    /// The initial `session.update` event, serialized.
    pub fn initial_session_update(&self) -> String {
        events::session_update(self.session_value())
    }

    /// Overwrites every policy-owned field on a client-supplied session.
    pub fn apply(&self, session: &mut Map<String, Value>) {
        session.insert("instructions".into(), json!(self.instructions));
        if let Some(t) = self.temperature {
            session.insert("temperature".into(), json!(t));
        }
        if let Some(max) = self.max_response_output_tokens {
            session.insert("max_response_output_tokens".into(), json!(max));
        }
        if let Some(voice) = &self.voice {
            session.insert("voice".into(), self.variant.voice_value(voice));
        }
        session.insert(
            "input_audio_transcription".into(),
            json!({"model": self.transcription_model}),
        );
        session.insert(
            "turn_detection".into(),
            self.variant.turn_detection_value(&self.vad),
        );
        session.insert("tool_choice".into(), json!(self.tool_choice()));
        session.insert("tools".into(), json!(self.tool_schemas));
    }

    /// Hides server-held policy from the `session.created` acknowledgement
    /// forwarded to the client.
    pub fn scrub_created(&self, session: &mut Map<String, Value>) {
        session.insert("instructions".into(), json!(""));
        session.insert("tools".into(), json!([]));
        session.insert("tool_choice".into(), json!("none"));
        session.insert("max_response_output_tokens".into(), Value::Null);
        if let Some(voice) = &self.voice {
            session.insert("voice".into(), self.variant.voice_value(voice));
        }
        session.insert(
            "input_audio_transcription".into(),
            json!({"model": self.transcription_model}),
        );
        session.insert(
            "turn_detection".into(),
            self.variant.turn_detection_value(&self.vad),
        );
    }
}
