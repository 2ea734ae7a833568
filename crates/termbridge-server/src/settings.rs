//! Layered settings: compiled defaults, an optional JSON file, then
//! `TERMBRIDGE_*` environment overrides (highest priority).
//!
//! The file is deep-merged over the defaults, so it only needs the keys it
//! changes. Environment values are parsed strictly; invalid ones are ignored
//! with a warning.

use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::ServerConfig;
use crate::errors::Result;

/// Logging settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines instead of compact text.
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
        }
    }
}

/// Root settings document.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Server and per-connection proxy settings.
    pub server: ServerConfig,
    /// Logging settings.
    pub logging: LoggingConfig,
}

/// Load settings, merging `path` (if given and present) over the defaults,
/// then applying process environment overrides.
pub fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let defaults = serde_json::to_value(Settings::default())?;

    let merged = match path {
        Some(path) if path.exists() => {
            debug!(?path, "loading settings from file");
            let content = std::fs::read_to_string(path)?;
            let user: Value = serde_json::from_str(&content)?;
            deep_merge(defaults, user)
        }
        Some(path) => {
            debug!(?path, "settings file not found, using defaults");
            defaults
        }
        None => defaults,
    };

    let mut settings: Settings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings, |name| std::env::var(name).ok());
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

/// Apply `TERMBRIDGE_*` overrides read through `lookup`.
pub fn apply_env_overrides<F>(settings: &mut Settings, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };
    let server = &mut settings.server;

    if let Some(v) = env.string("TERMBRIDGE_HOST") {
        server.host = v;
    }
    if let Some(v) = env.u64_in("TERMBRIDGE_PORT", 0, 65_535) {
        server.port = u16::try_from(v).unwrap_or(server.port);
    }
    if let Some(v) = env.u64_in("TERMBRIDGE_MAX_CONNECTIONS", 1, 100_000) {
        server.max_connections = usize::try_from(v).unwrap_or(server.max_connections);
    }
    if let Some(v) = env.u64_in("TERMBRIDGE_PING_INTERVAL_SECS", 0, 3_600) {
        server.ping_interval_secs = v;
    }
    if let Some(v) = env.string("TERMBRIDGE_COMMAND") {
        server.command = Some(v.split_whitespace().map(str::to_owned).collect());
    }

    // ── Proxy ───────────────────────────────────────────────────────
    let proxy = &mut server.proxy;
    if let Some(v) = env.u64_in("TERMBRIDGE_QUEUE_CAPACITY", 1, 1_000_000) {
        proxy.queue_capacity = usize::try_from(v).unwrap_or(proxy.queue_capacity);
    }
    if let Some(v) = env.u64_in("TERMBRIDGE_ENQUEUE_TIMEOUT_MS", 1, 600_000) {
        proxy.enqueue_timeout_ms = v;
    }
    if let Some(v) = env.u64_in("TERMBRIDGE_KEEPALIVE_SECS", 0, 86_400) {
        // 0 turns the keepalive off
        proxy.keepalive_timeout_secs = (v > 0).then_some(v);
    }
    if let Some(v) = env.bool("TERMBRIDGE_BYTE_STREAM") {
        proxy.byte_stream = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("TERMBRIDGE_LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = env.bool("TERMBRIDGE_LOG_JSON") {
        settings.logging.json = v;
    }
}

/// Parse a boolean env value.
///
/// Accepts `true`/`1`/`yes`/`on` and `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn bool(&self, name: &str) -> Option<bool> {
        let val = (self.lookup)(name)?;
        let result = parse_bool(&val);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid boolean env var, ignoring");
        }
        result
    }

    fn u64_in(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::SettingsError;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"server": {"port": 8080, "host": "localhost"}});
        let source = serde_json::json!({"server": {"port": 9090}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["server"]["port"], 9090);
        assert_eq!(merged["server"]["host"], "localhost");
    }

    #[test]
    fn merge_skips_null_source() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null});
        assert_eq!(deep_merge(target, source)["a"], 1);
    }

    #[test]
    fn merge_replaces_arrays() {
        let target = serde_json::json!({"cmd": ["a", "b"]});
        let source = serde_json::json!({"cmd": ["c"]});
        assert_eq!(deep_merge(target, source)["cmd"], serde_json::json!(["c"]));
    }

    // ── file loading ────────────────────────────────────────────────

    #[test]
    fn no_path_loads() {
        assert!(load_settings(None).is_ok());
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.server.proxy.queue_capacity, 4096);
    }

    #[test]
    fn file_values_merge_over_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("termbridge.json");
        std::fs::write(
            &path,
            r#"{"server":{"port":7000,"proxy":{"keepalive_timeout_secs":30}},"logging":{"json":true}}"#,
        )
        .unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.server.port, 7000);
        assert_eq!(settings.server.proxy.keepalive_timeout_secs, Some(30));
        assert_eq!(settings.server.proxy.queue_capacity, 4096);
        assert!(settings.logging.json);
    }

    #[test]
    fn invalid_json_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        let err = load_settings(Some(&path)).unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    // ── env overrides ───────────────────────────────────────────────

    #[test]
    fn env_overrides_server_and_proxy() {
        let mut settings = Settings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("TERMBRIDGE_HOST", "0.0.0.0"),
                ("TERMBRIDGE_PORT", "9090"),
                ("TERMBRIDGE_QUEUE_CAPACITY", "128"),
                ("TERMBRIDGE_ENQUEUE_TIMEOUT_MS", "250"),
                ("TERMBRIDGE_BYTE_STREAM", "off"),
                ("TERMBRIDGE_LOG_LEVEL", "debug"),
            ]),
        );
        assert_eq!(settings.server.host, "0.0.0.0");
        assert_eq!(settings.server.port, 9090);
        assert_eq!(settings.server.proxy.queue_capacity, 128);
        assert_eq!(settings.server.proxy.enqueue_timeout_ms, 250);
        assert!(!settings.server.proxy.byte_stream);
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn zero_keepalive_disables() {
        let mut settings = Settings::default();
        apply_env_overrides(&mut settings, env(&[("TERMBRIDGE_KEEPALIVE_SECS", "0")]));
        assert!(settings.server.proxy.keepalive_timeout_secs.is_none());
    }

    #[test]
    fn command_split_on_whitespace() {
        let mut settings = Settings::default();
        apply_env_overrides(&mut settings, env(&[("TERMBRIDGE_COMMAND", "/bin/sh -i")]));
        assert_eq!(
            settings.server.command,
            Some(vec!["/bin/sh".to_owned(), "-i".to_owned()])
        );
    }

    #[test]
    fn invalid_values_ignored() {
        let mut settings = Settings::default();
        apply_env_overrides(
            &mut settings,
            env(&[
                ("TERMBRIDGE_PORT", "99999"),
                ("TERMBRIDGE_QUEUE_CAPACITY", "lots"),
                ("TERMBRIDGE_LOG_JSON", "maybe"),
                ("TERMBRIDGE_HOST", ""),
            ]),
        );
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn parse_bool_variants() {
        assert_eq!(parse_bool("YES"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("2"), None);
    }

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("10", 1, 10), Some(10));
        assert_eq!(parse_u64_range("11", 1, 10), None);
        assert_eq!(parse_u64_range("-1", 0, 10), None);
    }
}
