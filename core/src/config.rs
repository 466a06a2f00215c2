//! Gateway settings.
//!
//! [`Settings`] is the immutable, process-wide configuration value. It is
//! built once by the server binary from environment variables, a packaged
//! options file, and hardcoded defaults, then passed by value into the rest
//! of the core library. This library never reads environment variables or
//! files itself.

use serde::{Deserialize, Serialize};

/// Default remote model identifier (without the `models/` prefix).
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-12-2025";

/// Fixed sample rate at which the remote model emits audio.
pub const MODEL_OUTPUT_SAMPLE_RATE_HZ: u32 = 24_000;

/// Immutable, process-wide gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Address the edge-protocol TCP server binds to.
    pub host: String,
    /// Port the edge-protocol TCP server binds to.
    pub port: u16,

    /// API key for the remote live-audio model. Required; startup fails without it.
    pub gemini_api_key: String,
    /// Remote model identifier. The `models/` prefix is added automatically if absent.
    pub model: String,
    /// API version segment used when building the live-session URL.
    pub gemini_api_version: String,

    /// Base URL of the home-automation REST API.
    pub ha_url: String,
    /// Bearer token for the home-automation REST API.
    pub ha_token: String,

    /// Domains an entity must belong to in order to be surfaced in context.
    /// Empty means no domain restriction.
    pub allowed_domains: Vec<String>,
    /// Shell-style glob patterns; if non-empty, an entity must match at least one.
    pub entity_allowlist: Vec<String>,
    /// Shell-style glob patterns; an entity matching any of these is dropped.
    pub entity_blocklist: Vec<String>,
    /// Maximum number of entities surfaced in the system prompt.
    pub max_context_entities: usize,

    /// Sample rate, in Hz, the gateway expects inbound edge audio to use
    /// before resampling to the model's input rate.
    pub input_sample_rate_hz: u32,
    /// Sample rate, in Hz, at which resampled model audio is delivered to the edge.
    pub output_sample_rate_hz: u32,
    /// Duration of the silence tail appended at end-of-turn, in milliseconds.
    pub silence_tail_ms: u32,
    /// Chunk size, in samples, used when generating the silence tail.
    pub audio_chunk_size: usize,

    /// Log level name (`error`, `warn`, `info`, `debug`, `trace`).
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 10700,
            gemini_api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            gemini_api_version: "v1beta".to_string(),
            ha_url: "http://homeassistant.local:8123".to_string(),
            ha_token: String::new(),
            allowed_domains: vec![
                "light".to_string(),
                "switch".to_string(),
                "cover".to_string(),
                "climate".to_string(),
                "lock".to_string(),
                "scene".to_string(),
                "script".to_string(),
            ],
            entity_allowlist: Vec::new(),
            entity_blocklist: Vec::new(),
            max_context_entities: 200,
            input_sample_rate_hz: 16_000,
            output_sample_rate_hz: 16_000,
            silence_tail_ms: 600,
            audio_chunk_size: 1024,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Returns the model identifier with the `models/` prefix applied, as
    /// required by the live-session connect call.
    #[must_use]
    pub fn qualified_model(&self) -> String {
        if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        }
    }

    /// Whether a live session can plausibly be opened.
    #[must_use]
    pub fn has_api_key(&self) -> bool {
        !self.gemini_api_key.trim().is_empty()
    }
}
