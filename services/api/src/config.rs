//! Environment-driven configuration, resolved once at startup.
//!
//! Everything session-scoped (policy, search field mappings, provider
//! variant) is computed from this struct at process start and never reloaded;
//! a missing required variable refuses to start the process.

use groundwire_core::variant::{Eagerness, VadPolicy};
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingVar(String),
    #[error("Invalid value for environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// The two supported realtime backends.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum VoiceBackend {
    Realtime,
    VoiceAgent,
}

/// Credential presented on the upstream realtime connection. An API key wins
/// when both are configured.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UpstreamAuth {
    ApiKey(String),
    Bearer(String),
}

/// Connection and field-mapping settings for the retrieval backend.
#[derive(Clone, Debug)]
pub struct SearchConfig {
    pub endpoint: String,
    pub index: String,
    pub api_key: String,
    pub api_version: String,
    pub identifier_field: String,
    pub content_field: String,
    pub title_field: String,
    pub embedding_field: String,
    pub semantic_configuration: Option<String>,
    pub use_vector_query: bool,
    pub top: usize,
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub backend: VoiceBackend,
    pub voice_endpoint: String,
    pub voice_deployment: String,
    pub voice_auth: UpstreamAuth,
    pub voice_api_version: String,
    pub voice_choice: Option<String>,
    pub vad: VadPolicy,
    pub transcription_model: String,
    pub instructions: String,
    pub temperature: Option<f64>,
    pub max_response_output_tokens: Option<u64>,
    pub search: SearchConfig,
    pub log_level: Level,
}

const DEFAULT_INSTRUCTIONS: &str = "\
You are a helpful assistant. Answer questions using only information found with the 'search' tool.
The user is listening to your answers, so keep them concise, ideally a single sentence.
Never read out file names, source names, or chunk ids.

Follow these steps strictly:
Always use the 'search' tool before answering.
If the answer is not in the knowledge base, simply say: I don't know.
Respond in the same language as the question.";

fn required(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingVar(name.to_string()))
}

fn optional(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(name: &str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        None => Ok(default),
        Some(raw) => raw
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(name.to_string(), raw)),
    }
}

fn load_vad() -> Result<VadPolicy, ConfigError> {
    let mode = optional("VAD_MODE").unwrap_or_else(|| "server_vad".to_string());
    match mode.as_str() {
        "server_vad" => Ok(VadPolicy::ServerVad {
            threshold: parsed("VAD_THRESHOLD", 0.5)?,
            prefix_padding_ms: parsed("VAD_PREFIX_PADDING_MS", 300)?,
            silence_duration_ms: parsed("VAD_SILENCE_DURATION_MS", 500)?,
        }),
        "semantic_vad" => {
            let eagerness = match optional("VAD_EAGERNESS") {
                None => Eagerness::Auto,
                Some(raw) => raw
                    .parse::<Eagerness>()
                    .map_err(|_| ConfigError::InvalidValue("VAD_EAGERNESS".to_string(), raw))?,
            };
            Ok(VadPolicy::SemanticVad { eagerness })
        }
        other => Err(ConfigError::InvalidValue(
            "VAD_MODE".to_string(),
            other.to_string(),
        )),
    }
}

fn load_instructions() -> Result<String, ConfigError> {
    let mut instructions = match optional("INSTRUCTIONS_PATH") {
        Some(path) => std::fs::read_to_string(&path)
            .map_err(|e| ConfigError::InvalidValue("INSTRUCTIONS_PATH".to_string(), e.to_string()))?
            .trim()
            .to_string(),
        None => DEFAULT_INSTRUCTIONS.to_string(),
    };
    if let Some(language) = optional("SPOKEN_LANGUAGE") {
        instructions = instructions.replace(
            "You are a helpful assistant.",
            &format!("You are a helpful assistant that speaks in {language}."),
        );
    }
    if let Some(notes) = optional("PRONUNCIATION_NOTES") {
        instructions.push_str("\n\nPronunciation guidance:\n");
        instructions.push_str(&notes);
    }
    Ok(instructions)
}

fn load_search() -> Result<SearchConfig, ConfigError> {
    Ok(SearchConfig {
        endpoint: required("SEARCH_ENDPOINT")?,
        index: required("SEARCH_INDEX")?,
        api_key: required("SEARCH_API_KEY")?,
        api_version: optional("SEARCH_API_VERSION").unwrap_or_else(|| "2024-07-01".to_string()),
        identifier_field: optional("SEARCH_IDENTIFIER_FIELD")
            .unwrap_or_else(|| "chunk_id".to_string()),
        content_field: optional("SEARCH_CONTENT_FIELD").unwrap_or_else(|| "chunk".to_string()),
        title_field: optional("SEARCH_TITLE_FIELD").unwrap_or_else(|| "title".to_string()),
        embedding_field: optional("SEARCH_EMBEDDING_FIELD")
            .unwrap_or_else(|| "text_vector".to_string()),
        semantic_configuration: optional("SEARCH_SEMANTIC_CONFIGURATION"),
        use_vector_query: parsed("SEARCH_USE_VECTOR_QUERY", true)?,
        top: parsed("SEARCH_TOP", 5)?,
    })
}

impl Config {
    /// Loads configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        let bind_address_str =
            std::env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8765".to_string());
        let bind_address = bind_address_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::InvalidValue("BIND_ADDRESS".to_string(), e.to_string()))?;

        let backend_str = optional("VOICE_BACKEND").unwrap_or_else(|| "realtime".to_string());
        let backend = match backend_str.as_str() {
            "realtime" => VoiceBackend::Realtime,
            "voice_agent" => VoiceBackend::VoiceAgent,
            other => {
                return Err(ConfigError::InvalidValue(
                    "VOICE_BACKEND".to_string(),
                    other.to_string(),
                ));
            }
        };

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let temperature = match optional("TEMPERATURE") {
            None => None,
            Some(raw) => Some(
                raw.parse::<f64>()
                    .map_err(|_| ConfigError::InvalidValue("TEMPERATURE".to_string(), raw))?,
            ),
        };
        let max_response_output_tokens = match optional("MAX_RESPONSE_OUTPUT_TOKENS") {
            None => None,
            Some(raw) => Some(raw.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue("MAX_RESPONSE_OUTPUT_TOKENS".to_string(), raw)
            })?),
        };

        let voice_endpoint = required("VOICE_ENDPOINT")?;
        let voice_deployment = required("VOICE_DEPLOYMENT")?;
        let voice_auth = match optional("VOICE_API_KEY") {
            Some(key) => UpstreamAuth::ApiKey(key),
            None => match optional("VOICE_BEARER_TOKEN") {
                Some(token) => UpstreamAuth::Bearer(token),
                None => return Err(ConfigError::MissingVar("VOICE_API_KEY".to_string())),
            },
        };

        Ok(Self {
            bind_address,
            backend,
            voice_endpoint,
            voice_deployment,
            voice_auth,
            voice_api_version: optional("VOICE_API_VERSION")
                .unwrap_or_else(|| "2025-04-01-preview".to_string()),
            voice_choice: optional("VOICE_CHOICE"),
            vad: load_vad()?,
            transcription_model: optional("TRANSCRIPTION_MODEL")
                .unwrap_or_else(|| "whisper-1".to_string()),
            instructions: load_instructions()?,
            temperature,
            max_response_output_tokens,
            search: load_search()?,
            log_level,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ALL_VARS: &[&str] = &[
        "BIND_ADDRESS",
        "VOICE_BACKEND",
        "VOICE_ENDPOINT",
        "VOICE_DEPLOYMENT",
        "VOICE_API_KEY",
        "VOICE_BEARER_TOKEN",
        "VOICE_API_VERSION",
        "VOICE_CHOICE",
        "VAD_MODE",
        "VAD_THRESHOLD",
        "VAD_PREFIX_PADDING_MS",
        "VAD_SILENCE_DURATION_MS",
        "VAD_EAGERNESS",
        "TRANSCRIPTION_MODEL",
        "INSTRUCTIONS_PATH",
        "SPOKEN_LANGUAGE",
        "PRONUNCIATION_NOTES",
        "TEMPERATURE",
        "MAX_RESPONSE_OUTPUT_TOKENS",
        "SEARCH_ENDPOINT",
        "SEARCH_INDEX",
        "SEARCH_API_KEY",
        "SEARCH_API_VERSION",
        "SEARCH_IDENTIFIER_FIELD",
        "SEARCH_CONTENT_FIELD",
        "SEARCH_TITLE_FIELD",
        "SEARCH_EMBEDDING_FIELD",
        "SEARCH_SEMANTIC_CONFIGURATION",
        "SEARCH_USE_VECTOR_QUERY",
        "SEARCH_TOP",
        "RUST_LOG",
    ];

    fn clear_env_vars() {
        unsafe {
            for var in ALL_VARS {
                env::remove_var(var);
            }
        }
    }

    fn set_minimal_env() {
        unsafe {
            env::set_var("VOICE_ENDPOINT", "https://voice.example.net");
            env::set_var("VOICE_DEPLOYMENT", "rt-voice");
            env::set_var("VOICE_API_KEY", "voice-key");
            env::set_var("SEARCH_ENDPOINT", "https://search.example.net");
            env::set_var("SEARCH_INDEX", "kb-index");
            env::set_var("SEARCH_API_KEY", "search-key");
        }
    }

    #[test]
    fn config_error_display() {
        let missing = ConfigError::MissingVar("TEST_VAR".to_string());
        assert_eq!(format!("{}", missing), "Missing environment variable: TEST_VAR");

        let invalid = ConfigError::InvalidValue("TEST_VAR".to_string(), "bad".to_string());
        assert_eq!(
            format!("{}", invalid),
            "Invalid value for environment variable TEST_VAR: bad"
        );
    }

    #[test]
    #[serial]
    fn minimal_env_uses_defaults() {
        clear_env_vars();
        set_minimal_env();

        let config = Config::from_env().expect("Config should load successfully");

        assert_eq!(config.bind_address.to_string(), "0.0.0.0:8765");
        assert_eq!(config.backend, VoiceBackend::Realtime);
        assert_eq!(
            config.voice_auth,
            UpstreamAuth::ApiKey("voice-key".to_string())
        );
        assert_eq!(config.voice_api_version, "2025-04-01-preview");
        assert_eq!(config.voice_choice, None);
        assert_eq!(config.transcription_model, "whisper-1");
        assert_eq!(
            config.vad,
            VadPolicy::ServerVad {
                threshold: 0.5,
                prefix_padding_ms: 300,
                silence_duration_ms: 500,
            }
        );
        assert!(config.instructions.contains("'search' tool"));
        assert_eq!(config.search.identifier_field, "chunk_id");
        assert_eq!(config.search.content_field, "chunk");
        assert_eq!(config.search.title_field, "title");
        assert_eq!(config.search.embedding_field, "text_vector");
        assert!(config.search.use_vector_query);
        assert_eq!(config.search.top, 5);
        assert_eq!(config.log_level, Level::INFO);
    }

    #[test]
    #[serial]
    fn missing_required_vars_refuse_startup() {
        clear_env_vars();
        match Config::from_env().unwrap_err() {
            ConfigError::MissingVar(var) => assert_eq!(var, "VOICE_ENDPOINT"),
            other => panic!("expected MissingVar, got {other:?}"),
        }

        clear_env_vars();
        set_minimal_env();
        unsafe { env::remove_var("SEARCH_INDEX") };
        match Config::from_env().unwrap_err() {
            ConfigError::MissingVar(var) => assert_eq!(var, "SEARCH_INDEX"),
            other => panic!("expected MissingVar, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn bearer_token_substitutes_for_api_key() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::remove_var("VOICE_API_KEY");
            env::set_var("VOICE_BEARER_TOKEN", "aad-token");
        }
        let config = Config::from_env().unwrap();
        assert_eq!(config.voice_auth, UpstreamAuth::Bearer("aad-token".to_string()));
    }

    #[test]
    #[serial]
    fn missing_both_credentials_refuses_startup() {
        clear_env_vars();
        set_minimal_env();
        unsafe { env::remove_var("VOICE_API_KEY") };
        match Config::from_env().unwrap_err() {
            ConfigError::MissingVar(var) => assert_eq!(var, "VOICE_API_KEY"),
            other => panic!("expected MissingVar, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn voice_agent_backend_is_selectable() {
        clear_env_vars();
        set_minimal_env();
        unsafe { env::set_var("VOICE_BACKEND", "voice_agent") };
        let config = Config::from_env().unwrap();
        assert_eq!(config.backend, VoiceBackend::VoiceAgent);
    }

    #[test]
    #[serial]
    fn unknown_backend_is_invalid() {
        clear_env_vars();
        set_minimal_env();
        unsafe { env::set_var("VOICE_BACKEND", "telepathy") };
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, value) => {
                assert_eq!(var, "VOICE_BACKEND");
                assert_eq!(value, "telepathy");
            }
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn semantic_vad_parses_eagerness() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("VAD_MODE", "semantic_vad");
            env::set_var("VAD_EAGERNESS", "high");
        }
        let config = Config::from_env().unwrap();
        assert_eq!(
            config.vad,
            VadPolicy::SemanticVad {
                eagerness: Eagerness::High
            }
        );
    }

    #[test]
    #[serial]
    fn invalid_vad_numbers_are_rejected() {
        clear_env_vars();
        set_minimal_env();
        unsafe { env::set_var("VAD_THRESHOLD", "loud") };
        match Config::from_env().unwrap_err() {
            ConfigError::InvalidValue(var, _) => assert_eq!(var, "VAD_THRESHOLD"),
            other => panic!("expected InvalidValue, got {other:?}"),
        }
    }

    #[test]
    #[serial]
    fn spoken_language_rewrites_the_persona_line() {
        clear_env_vars();
        set_minimal_env();
        unsafe { env::set_var("SPOKEN_LANGUAGE", "Portuguese") };
        let config = Config::from_env().unwrap();
        assert!(
            config
                .instructions
                .starts_with("You are a helpful assistant that speaks in Portuguese.")
        );
    }

    #[test]
    #[serial]
    fn pronunciation_notes_are_appended() {
        clear_env_vars();
        set_minimal_env();
        unsafe { env::set_var("PRONUNCIATION_NOTES", "Say 'X10' as 'X one-zero'.") };
        let config = Config::from_env().unwrap();
        assert!(config.instructions.contains("Pronunciation guidance:"));
        assert!(config.instructions.ends_with("Say 'X10' as 'X one-zero'."));
    }

    #[test]
    #[serial]
    fn custom_values_override_defaults() {
        clear_env_vars();
        set_minimal_env();
        unsafe {
            env::set_var("BIND_ADDRESS", "127.0.0.1:9000");
            env::set_var("VOICE_CHOICE", "alloy");
            env::set_var("TRANSCRIPTION_MODEL", "gpt-4o-transcribe");
            env::set_var("TEMPERATURE", "0.6");
            env::set_var("MAX_RESPONSE_OUTPUT_TOKENS", "1024");
            env::set_var("SEARCH_USE_VECTOR_QUERY", "false");
            env::set_var("SEARCH_TOP", "3");
            env::set_var("SEARCH_SEMANTIC_CONFIGURATION", "kb-semantic");
            env::set_var("RUST_LOG", "debug");
        }
        let config = Config::from_env().unwrap();
        assert_eq!(config.bind_address.to_string(), "127.0.0.1:9000");
        assert_eq!(config.voice_choice.as_deref(), Some("alloy"));
        assert_eq!(config.transcription_model, "gpt-4o-transcribe");
        assert_eq!(config.temperature, Some(0.6));
        assert_eq!(config.max_response_output_tokens, Some(1024));
        assert!(!config.search.use_vector_query);
        assert_eq!(config.search.top, 3);
        assert_eq!(
            config.search.semantic_configuration.as_deref(),
            Some("kb-semantic")
        );
        assert_eq!(config.log_level, Level::DEBUG);
    }
}
