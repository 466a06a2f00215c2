//! Settings resolution: environment variables, the packaged-application
//! options file, and hardcoded defaults, combined with the precedence
//! documented for the gateway (env var wins, then the options file, then
//! the default baked into `gateway-core`).

use std::path::Path;

use gateway_core::config::Settings;
use serde_json::Value;

/// Default location of the packaged-application options file (the Home
/// Assistant add-on convention this gateway was built to run under).
pub const DEFAULT_OPTIONS_PATH: &str = "/data/options.json";

/// Resolves [`Settings`] from environment variables, then `options_path`
/// if it exists and parses as JSON, then `Settings::default()`.
///
/// Never fails: a missing or unreadable options file degrades silently to
/// "no options", the same way the source's `load_addon_options` does.
#[must_use]
pub fn load_settings(options_path: &Path) -> Settings {
    let options = read_options_file(options_path);
    let defaults = Settings::default();

    Settings {
        host: resolve_string("HOST", &options, "host", &defaults.host),
        port: resolve_u16("PORT", &options, "port", defaults.port),
        gemini_api_key: resolve_api_key(&options, &defaults.gemini_api_key),
        model: resolve_string("MODEL", &options, "model", &defaults.model),
        gemini_api_version: resolve_string(
            "GEMINI_API_VERSION",
            &options,
            "gemini_api_version",
            &defaults.gemini_api_version,
        ),
        ha_url: resolve_string("HA_URL", &options, "ha_url", &defaults.ha_url),
        ha_token: resolve_string("HA_TOKEN", &options, "ha_token", &defaults.ha_token),
        allowed_domains: resolve_list(
            "ALLOWED_DOMAINS",
            &options,
            "allowed_domains",
            &defaults.allowed_domains,
        ),
        entity_allowlist: resolve_list(
            "ENTITY_ALLOWLIST",
            &options,
            "entity_allowlist",
            &defaults.entity_allowlist,
        ),
        entity_blocklist: resolve_list(
            "ENTITY_BLOCKLIST",
            &options,
            "entity_blocklist",
            &defaults.entity_blocklist,
        ),
        max_context_entities: resolve_usize(
            "MAX_CONTEXT_ENTITIES",
            &options,
            "max_context_entities",
            defaults.max_context_entities,
        ),
        input_sample_rate_hz: resolve_u32(
            "INPUT_SAMPLE_RATE_HZ",
            &options,
            "input_sample_rate_hz",
            defaults.input_sample_rate_hz,
        ),
        output_sample_rate_hz: resolve_u32(
            "OUTPUT_SAMPLE_RATE_HZ",
            &options,
            "output_sample_rate_hz",
            defaults.output_sample_rate_hz,
        ),
        silence_tail_ms: resolve_u32("SILENCE_TAIL_MS", &options, "silence_tail_ms", defaults.silence_tail_ms),
        audio_chunk_size: resolve_usize(
            "AUDIO_CHUNK_SIZE",
            &options,
            "audio_chunk_size",
            defaults.audio_chunk_size,
        ),
        log_level: resolve_string("LOG_LEVEL", &options, "log_level", &defaults.log_level),
    }
}

fn read_options_file(path: &Path) -> Value {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|content| serde_json::from_str(&content).ok())
        .unwrap_or(Value::Null)
}

/// `GEMINI_API_KEY` is checked before `GOOGLE_API_KEY`, in both the
/// environment and the options file, mirroring the source's dual-key
/// acceptance (some deployments only set the generic Google key).
fn resolve_api_key(options: &Value, default: &str) -> String {
    for env_name in ["GEMINI_API_KEY", "GOOGLE_API_KEY"] {
        if let Ok(v) = std::env::var(env_name) {
            if !v.trim().is_empty() {
                return v;
            }
        }
    }
    for key in ["gemini_api_key", "google_api_key"] {
        if let Some(v) = options.get(key).and_then(Value::as_str) {
            if !v.trim().is_empty() {
                return v.to_string();
            }
        }
    }
    default.to_string()
}

fn resolve_string(env_name: &str, options: &Value, key: &str, default: &str) -> String {
    if let Ok(v) = std::env::var(env_name) {
        if !v.trim().is_empty() {
            return v;
        }
    }
    if let Some(v) = options.get(key).and_then(Value::as_str) {
        if !v.trim().is_empty() {
            return v.to_string();
        }
    }
    default.to_string()
}

fn resolve_list(env_name: &str, options: &Value, key: &str, default: &[String]) -> Vec<String> {
    if let Ok(v) = std::env::var(env_name) {
        let items = split_csv(&v);
        if !items.is_empty() {
            return items;
        }
    }
    if let Some(items) = options.get(key).and_then(Value::as_array) {
        let items: Vec<String> = items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
        if !items.is_empty() {
            return items;
        }
    }
    default.to_vec()
}

fn split_csv(value: &str) -> Vec<String> {
    value.split(',').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect()
}

fn resolve_u16(env_name: &str, options: &Value, key: &str, default: u16) -> u16 {
    if let Ok(v) = std::env::var(env_name) {
        if let Ok(parsed) = v.trim().parse() {
            return parsed;
        }
    }
    if let Some(n) = options.get(key).and_then(Value::as_u64) {
        if let Ok(parsed) = u16::try_from(n) {
            return parsed;
        }
    }
    default
}

fn resolve_u32(env_name: &str, options: &Value, key: &str, default: u32) -> u32 {
    if let Ok(v) = std::env::var(env_name) {
        if let Ok(parsed) = v.trim().parse() {
            return parsed;
        }
    }
    if let Some(n) = options.get(key).and_then(Value::as_u64) {
        if let Ok(parsed) = u32::try_from(n) {
            return parsed;
        }
    }
    default
}

fn resolve_usize(env_name: &str, options: &Value, key: &str, default: usize) -> usize {
    if let Ok(v) = std::env::var(env_name) {
        if let Ok(parsed) = v.trim().parse() {
            return parsed;
        }
    }
    if let Some(n) = options.get(key).and_then(Value::as_u64) {
        return n as usize;
    }
    default
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment variables are process-global; serialize tests that touch them.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    fn clear_env() {
        for key in [
            "HOST", "PORT", "GEMINI_API_KEY", "GOOGLE_API_KEY", "MODEL", "GEMINI_API_VERSION", "HA_URL",
            "HA_TOKEN", "ALLOWED_DOMAINS", "ENTITY_ALLOWLIST", "ENTITY_BLOCKLIST", "MAX_CONTEXT_ENTITIES",
            "INPUT_SAMPLE_RATE_HZ", "OUTPUT_SAMPLE_RATE_HZ", "SILENCE_TAIL_MS", "AUDIO_CHUNK_SIZE", "LOG_LEVEL",
        ] {
            std::env::remove_var(key);
        }
    }

    #[test]
    fn missing_options_file_falls_back_to_defaults() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let settings = load_settings(Path::new("/nonexistent/options.json"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn google_api_key_env_is_used_when_gemini_api_key_is_absent() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("GOOGLE_API_KEY", "google-secret");
        let settings = load_settings(Path::new("/nonexistent/options.json"));
        assert_eq!(settings.gemini_api_key, "google-secret");
        clear_env();
    }

    #[test]
    fn gemini_api_key_env_takes_priority_over_google() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("GEMINI_API_KEY", "gemini-secret");
        std::env::set_var("GOOGLE_API_KEY", "google-secret");
        let settings = load_settings(Path::new("/nonexistent/options.json"));
        assert_eq!(settings.gemini_api_key, "gemini-secret");
        clear_env();
    }

    #[test]
    fn env_var_overrides_options_file() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("options.json");
        std::fs::write(&path, r#"{"port": 9999, "allowed_domains": ["sensor"]}"#).unwrap();

        std::env::set_var("PORT", "12345");
        let settings = load_settings(&path);
        assert_eq!(settings.port, 12345);
        assert_eq!(settings.allowed_domains, vec!["sensor".to_string()]);
        clear_env();
    }

    #[test]
    fn csv_list_env_var_is_split_and_trimmed() {
        let _guard = ENV_LOCK.lock().unwrap();
        clear_env();
        std::env::set_var("ALLOWED_DOMAINS", "light, switch ,  cover");
        let settings = load_settings(Path::new("/nonexistent/options.json"));
        assert_eq!(settings.allowed_domains, vec!["light", "switch", "cover"]);
        clear_env();
    }
}
