//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`GatewaySettings::default()`]
//! 2. If `~/.chirp/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `CHIRP_*` environment variable overrides (highest priority)
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::Result;
use crate::types::GatewaySettings;

/// Resolve the path to the settings file (`~/.chirp/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".chirp").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<GatewaySettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. If the file contains
/// invalid JSON, returns an error.
pub fn load_settings_from_path(path: &Path) -> Result<GatewaySettings> {
    let defaults = serde_json::to_value(GatewaySettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: GatewaySettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
///
/// - Objects are merged recursively (source overrides target per-key)
/// - Arrays and primitives are replaced entirely by source
/// - Null values in source are skipped (preserving target)
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `CHIRP_*` environment variable overrides.
///
/// API keys come from the environment in deployment; the settings file is
/// for everything else.
fn apply_env_overrides(settings: &mut GatewaySettings) {
    if let Ok(host) = std::env::var("CHIRP_HOST") {
        settings.server.host = host;
    }
    if let Ok(port) = std::env::var("CHIRP_PORT") {
        if let Ok(port) = port.parse() {
            settings.server.port = port;
        }
    }
    if let Ok(url) = std::env::var("CHIRP_CALLBACK_BASE_URL") {
        settings.server.callback_base_url = url;
    }
    if let Ok(key) = std::env::var("CHIRP_REALTIME_API_KEY") {
        settings.vendors.realtime.api_key = Some(key);
    }
    if let Ok(key) = std::env::var("CHIRP_CHAT_API_KEY") {
        settings.vendors.chat.api_key = Some(key);
    }
    if let Ok(key) = std::env::var("CHIRP_SPEECH_API_KEY") {
        settings.vendors.speech.api_key = Some(key);
    }
    if let Ok(key) = std::env::var("CHIRP_TRANSCRIPTION_API_KEY") {
        settings.vendors.transcription.api_key = Some(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn missing_file_returns_defaults() {
        let settings =
            load_settings_from_path(Path::new("/tmp/definitely-not-a-chirp-settings-file.json"))
                .unwrap();
        assert_eq!(settings.server.port, GatewaySettings::default().server.port);
    }

    #[test]
    fn file_values_override_defaults() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"{"server": {"port": 4242}, "relay": {"jobTtlSecs": 30}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(tmp.path()).unwrap();
        assert_eq!(settings.server.port, 4242);
        assert_eq!(settings.relay.job_ttl_secs, 30);
        // Untouched keys keep defaults
        assert_eq!(settings.server.host, "0.0.0.0");
    }

    #[test]
    fn invalid_json_is_an_error() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), "{not json").unwrap();
        assert!(load_settings_from_path(tmp.path()).is_err());
    }

    #[test]
    fn vendor_keys_survive_merge() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        std::fs::write(
            tmp.path(),
            r#"{"vendors": {"chat": {"apiKey": "sk-test", "model": "companion-large"}}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(tmp.path()).unwrap();
        assert_eq!(settings.vendors.chat.api_key.as_deref(), Some("sk-test"));
        assert_eq!(settings.vendors.chat.model, "companion-large");
        // Sibling vendors untouched
        assert!(settings.vendors.speech.api_key.is_none());
    }

    // ── deep_merge ──

    #[test]
    fn merge_nested_objects() {
        let target = json!({"a": {"x": 1, "y": 2}});
        let source = json!({"a": {"y": 3}});
        let merged = deep_merge(target, source);
        assert_eq!(merged, json!({"a": {"x": 1, "y": 3}}));
    }

    #[test]
    fn merge_skips_nulls() {
        let target = json!({"a": 1});
        let source = json!({"a": null, "b": 2});
        let merged = deep_merge(target, source);
        assert_eq!(merged, json!({"a": 1, "b": 2}));
    }

    #[test]
    fn merge_replaces_arrays() {
        let target = json!({"a": [1, 2, 3]});
        let source = json!({"a": [4]});
        let merged = deep_merge(target, source);
        assert_eq!(merged, json!({"a": [4]}));
    }

    #[test]
    fn merge_replaces_primitives() {
        assert_eq!(deep_merge(json!(1), json!("two")), json!("two"));
    }
}
