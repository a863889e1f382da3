//! Provider variant normalization.
//!
//! Two realtime backends are supported. They speak the same event protocol
//! but differ in endpoint path, in the shape of the session `voice` field,
//! and in the VAD payload vocabulary. A variant is selected once at
//! configuration time; the relay itself is variant-agnostic.

use serde_json::{Value, json};
use std::str::FromStr;

/// Voice activity detection policy applied to every session.
#[derive(Debug, Clone, PartialEq)]
pub enum VadPolicy {
    ServerVad {
        threshold: f64,
        prefix_padding_ms: u32,
        silence_duration_ms: u32,
    },
    SemanticVad {
        eagerness: Eagerness,
    },
}

impl Default for VadPolicy {
    fn default() -> Self {
        VadPolicy::ServerVad {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Eagerness {
    Low,
    Medium,
    High,
    #[default]
    Auto,
}

impl Eagerness {
    pub fn as_str(&self) -> &'static str {
        match self {
            Eagerness::Low => "low",
            Eagerness::Medium => "medium",
            Eagerness::High => "high",
            Eagerness::Auto => "auto",
        }
    }
}

impl FromStr for Eagerness {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Eagerness::Low),
            "medium" => Ok(Eagerness::Medium),
            "high" => Ok(Eagerness::High),
            "auto" => Ok(Eagerness::Auto),
            other => Err(format!("'{other}' is not a valid VAD eagerness")),
        }
    }
}

/// Field-level differences between the supported realtime backends.
pub trait ProviderVariant: Send + Sync {
    fn name(&self) -> &'static str;

    /// Path of the realtime websocket, joined to the configured endpoint.
    fn realtime_path(&self) -> &'static str;

    /// Shape of the session `voice` field.
    fn voice_value(&self, voice: &str) -> Value;

    /// Shape of the session `turn_detection` field.
    fn turn_detection_value(&self, vad: &VadPolicy) -> Value;
}

/// The plain realtime API: string voice, stock VAD vocabulary.
pub struct RealtimeApi;

impl ProviderVariant for RealtimeApi {
    fn name(&self) -> &'static str {
        "realtime"
    }

    fn realtime_path(&self) -> &'static str {
        "/openai/realtime"
    }

    fn voice_value(&self, voice: &str) -> Value {
        Value::String(voice.to_string())
    }

    fn turn_detection_value(&self, vad: &VadPolicy) -> Value {
        match vad {
            VadPolicy::ServerVad {
                threshold,
                prefix_padding_ms,
                silence_duration_ms,
            } => json!({
                "type": "server_vad",
                "threshold": threshold,
                "prefix_padding_ms": prefix_padding_ms,
                "silence_duration_ms": silence_duration_ms,
                "create_response": true,
            }),
            VadPolicy::SemanticVad { eagerness } => json!({
                "type": "semantic_vad",
                "eagerness": eagerness.as_str(),
                "create_response": true,
            }),
        }
    }
}

/// The voice-agent API: structured voice object, prefixed semantic VAD type.
pub struct VoiceAgentApi;

impl ProviderVariant for VoiceAgentApi {
    fn name(&self) -> &'static str {
        "voice_agent"
    }

    fn realtime_path(&self) -> &'static str {
        "/voice-agent/realtime"
    }

    fn voice_value(&self, voice: &str) -> Value {
        json!({
            "name": voice,
            "type": "azure-standard",
        })
    }

    fn turn_detection_value(&self, vad: &VadPolicy) -> Value {
        match vad {
            VadPolicy::ServerVad {
                threshold,
                prefix_padding_ms,
                silence_duration_ms,
            } => json!({
                "type": "server_vad",
                "threshold": threshold,
                "prefix_padding_ms": prefix_padding_ms,
                "silence_duration_ms": silence_duration_ms,
                "create_response": true,
            }),
            VadPolicy::SemanticVad { eagerness } => json!({
                "type": "azure_semantic_vad",
                "eagerness": eagerness.as_str(),
                "create_response": true,
            }),
        }
    }
}
