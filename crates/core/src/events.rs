//! Wire-format event vocabulary shared by both connections.
//!
//! Every message on either socket is a JSON object discriminated by its
//! `type` field. The relay only fully decodes the kinds it intercepts;
//! everything else is forwarded verbatim, so unknown kinds from newer
//! provider API versions pass through untouched.

use crate::error::RelayError;
use serde::Deserialize;
use serde_json::{Value, json};

/// Event kind discriminators the relay dispatches on.
pub mod kind {
    pub const SESSION_UPDATE: &str = "session.update";
    pub const SESSION_CREATED: &str = "session.created";
    pub const INPUT_AUDIO_APPEND: &str = "input_audio_buffer.append";
    pub const INPUT_AUDIO_CLEAR: &str = "input_audio_buffer.clear";
    pub const SPEECH_STARTED: &str = "input_audio_buffer.speech_started";
    pub const RESPONSE_AUDIO_DELTA: &str = "response.audio.delta";
    pub const RESPONSE_DONE: &str = "response.done";
    pub const RESPONSE_CREATE: &str = "response.create";
    pub const OUTPUT_ITEM_ADDED: &str = "response.output_item.added";
    pub const OUTPUT_ITEM_DONE: &str = "response.output_item.done";
    pub const ITEM_CREATED: &str = "conversation.item.created";
    pub const ITEM_CREATE: &str = "conversation.item.create";
    pub const FUNCTION_ARGS_DELTA: &str = "response.function_call_arguments.delta";
    pub const FUNCTION_ARGS_DONE: &str = "response.function_call_arguments.done";
    pub const TRANSCRIPTION_COMPLETED: &str =
        "conversation.item.input_audio_transcription.completed";
    pub const TOOL_RESPONSE: &str = "extension.middle_tier_tool_response";
    pub const ERROR: &str = "error";
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
}

/// Reads the `type` discriminator of an event without decoding the payload.
pub fn event_kind(text: &str) -> Result<String, RelayError> {
    serde_json::from_str::<Envelope>(text)
        .map(|e| e.kind)
        .map_err(|e| RelayError::MalformedEvent(e.to_string()))
}

/// Conversation item carried by item-level server events.
#[derive(Debug, Clone, Deserialize)]
pub struct ConversationItem {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub call_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub arguments: Option<String>,
}

impl ConversationItem {
    pub fn is_function_call(&self) -> bool {
        self.kind == "function_call"
    }

    pub fn is_function_call_output(&self) -> bool {
        self.kind == "function_call_output"
    }
}

/// Shared shape of `response.output_item.*` and `conversation.item.created`.
#[derive(Debug, Deserialize)]
pub struct ItemEvent {
    pub item: ConversationItem,
    #[serde(default)]
    pub previous_item_id: Option<String>,
}

impl ItemEvent {
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text).map_err(|e| RelayError::MalformedEvent(e.to_string()))
    }
}

/// The events a client-side consumer reacts to, decoded once at the boundary.
///
/// The relay forwards more kinds than these; anything that fails to decode
/// here is chrome the projections do not track and is ignored by callers.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientBoundEvent {
    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta { delta: String },
    #[serde(rename = "response.done")]
    ResponseDone { response: Value },
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted,
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    TranscriptionCompleted { transcript: String },
    #[serde(rename = "extension.middle_tier_tool_response")]
    ToolResponse {
        #[serde(default)]
        previous_item_id: Option<String>,
        tool_name: String,
        tool_result: String,
    },
    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: String,
    },
}

impl ClientBoundEvent {
    pub fn parse(text: &str) -> Result<Self, RelayError> {
        serde_json::from_str(text).map_err(|e| RelayError::MalformedEvent(e.to_string()))
    }
}

// Builders for the events the relay and client adapters inject themselves.

pub fn session_update(session: Value) -> String {
    json!({"type": kind::SESSION_UPDATE, "session": session}).to_string()
}

pub fn audio_append(audio_b64: &str) -> String {
    json!({"type": kind::INPUT_AUDIO_APPEND, "audio": audio_b64}).to_string()
}

pub fn audio_clear() -> String {
    json!({"type": kind::INPUT_AUDIO_CLEAR}).to_string()
}

pub fn function_call_output(call_id: &str, output: &str) -> String {
    json!({
        "type": kind::ITEM_CREATE,
        "item": {
            "type": "function_call_output",
            "call_id": call_id,
            "output": output,
        }
    })
    .to_string()
}

pub fn response_create() -> String {
    json!({"type": kind::RESPONSE_CREATE}).to_string()
}

pub fn tool_response(previous_item_id: Option<&str>, tool_name: &str, tool_result: &str) -> String {
    json!({
        "type": kind::TOOL_RESPONSE,
        "previous_item_id": previous_item_id,
        "tool_name": tool_name,
        "tool_result": tool_result,
    })
    .to_string()
}

pub fn error_event(message: &str) -> String {
    json!({"type": kind::ERROR, "message": message}).to_string()
}
