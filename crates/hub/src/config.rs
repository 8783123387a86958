//! TOML config file loading with environment overrides and validation.
//!
//! Missing file means defaults; every value can also be overridden through
//! the environment (`MQTT_HOST`, `MQTT_PORT`, `MQTT_BASE_TOPIC`, `DB_URL`,
//! `WEB_PORT`), which is how deployments usually configure the hub.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::env;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct Settings {
    pub(crate) mqtt: MqttSettings,
    pub(crate) database: DatabaseSettings,
    pub(crate) web: WebSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct MqttSettings {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) base_topic: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct DatabaseSettings {
    pub(crate) url: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct WebSettings {
    pub(crate) port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mqtt: MqttSettings::default(),
            database: DatabaseSettings::default(),
            web: WebSettings::default(),
        }
    }
}

impl Default for MqttSettings {
    fn default() -> Self {
        Self {
            host: "broker.hivemq.com".to_string(),
            port: 1883,
            base_topic: "smartcomb/sensors".to_string(),
        }
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: "sqlite:smartcomb.db?mode=rwc".to_string(),
        }
    }
}

impl Default for WebSettings {
    fn default() -> Self {
        Self { port: 4000 }
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Settings {
    /// Validate all settings. Returns `Ok(())` or an error describing every
    /// violation found (not just the first one).
    pub(crate) fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.mqtt.host.trim().is_empty() {
            errors.push("mqtt.host is empty".to_string());
        }
        if self.mqtt.port == 0 {
            errors.push("mqtt.port must be non-zero".to_string());
        }

        let topic = &self.mqtt.base_topic;
        if topic.trim().is_empty() {
            errors.push("mqtt.base_topic is empty".to_string());
        } else {
            if topic.contains('+') || topic.contains('#') {
                errors.push(format!(
                    "mqtt.base_topic '{topic}' must not contain wildcards"
                ));
            }
            if topic.starts_with('/') || topic.ends_with('/') {
                errors.push(format!(
                    "mqtt.base_topic '{topic}' must not start or end with '/'"
                ));
            }
            if topic.chars().any(char::is_whitespace) {
                errors.push(format!(
                    "mqtt.base_topic '{topic}' must not contain whitespace"
                ));
            }
        }

        if self.database.url.trim().is_empty() {
            errors.push("database.url is empty".to_string());
        }
        if self.web.port == 0 {
            errors.push("web.port must be non-zero".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn apply_env(&mut self) {
        if let Ok(host) = env::var("MQTT_HOST") {
            self.mqtt.host = host;
        }
        if let Some(port) = env::var("MQTT_PORT").ok().and_then(|s| s.parse().ok()) {
            self.mqtt.port = port;
        }
        if let Ok(topic) = env::var("MQTT_BASE_TOPIC") {
            self.mqtt.base_topic = topic;
        }
        if let Ok(url) = env::var("DB_URL") {
            self.database.url = url;
        }
        if let Some(port) = env::var("WEB_PORT").ok().and_then(|s| s.parse().ok()) {
            self.web.port = port;
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read and validate settings: TOML file if present, env overrides on top.
pub(crate) fn load(path: &str) -> Result<Settings> {
    let mut settings = if Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {path}"))?;
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?
    } else {
        tracing::info!(path, "no config file, using defaults");
        Settings::default()
    };

    settings.apply_env();
    settings
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(settings)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn defaults_match_original_deployment() {
        let s = Settings::default();
        assert_eq!(s.mqtt.host, "broker.hivemq.com");
        assert_eq!(s.mqtt.port, 1883);
        assert_eq!(s.mqtt.base_topic, "smartcomb/sensors");
        assert_eq!(s.web.port, 4000);
    }

    #[test]
    fn parse_full_toml() {
        let s: Settings = toml::from_str(
            r#"
[mqtt]
host = "10.0.0.5"
port = 1884
base_topic = "comb/dev"

[database]
url = "sqlite::memory:"

[web]
port = 8080
"#,
        )
        .unwrap();
        assert_eq!(s.mqtt.host, "10.0.0.5");
        assert_eq!(s.mqtt.port, 1884);
        assert_eq!(s.mqtt.base_topic, "comb/dev");
        assert_eq!(s.database.url, "sqlite::memory:");
        assert_eq!(s.web.port, 8080);
    }

    #[test]
    fn parse_partial_toml_fills_defaults() {
        let s: Settings = toml::from_str("[mqtt]\nhost = \"localhost\"\n").unwrap();
        assert_eq!(s.mqtt.host, "localhost");
        assert_eq!(s.mqtt.port, 1883);
        assert_eq!(s.web.port, 4000);
    }

    #[test]
    fn parse_empty_toml_is_all_defaults() {
        let s: Settings = toml::from_str("").unwrap();
        assert_eq!(s.mqtt.base_topic, "smartcomb/sensors");
    }

    fn assert_validation_err(s: &Settings, needle: &str) {
        let err = s.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    #[test]
    fn empty_host_rejected() {
        let mut s = Settings::default();
        s.mqtt.host = "  ".to_string();
        assert_validation_err(&s, "mqtt.host is empty");
    }

    #[test]
    fn zero_mqtt_port_rejected() {
        let mut s = Settings::default();
        s.mqtt.port = 0;
        assert_validation_err(&s, "mqtt.port");
    }

    #[test]
    fn wildcard_topic_rejected() {
        let mut s = Settings::default();
        s.mqtt.base_topic = "smartcomb/+/sensors".to_string();
        assert_validation_err(&s, "wildcards");
    }

    #[test]
    fn hash_wildcard_topic_rejected() {
        let mut s = Settings::default();
        s.mqtt.base_topic = "smartcomb/#".to_string();
        assert_validation_err(&s, "wildcards");
    }

    #[test]
    fn trailing_slash_topic_rejected() {
        let mut s = Settings::default();
        s.mqtt.base_topic = "smartcomb/sensors/".to_string();
        assert_validation_err(&s, "start or end with '/'");
    }

    #[test]
    fn whitespace_topic_rejected() {
        let mut s = Settings::default();
        s.mqtt.base_topic = "smart comb".to_string();
        assert_validation_err(&s, "whitespace");
    }

    #[test]
    fn empty_db_url_rejected() {
        let mut s = Settings::default();
        s.database.url = String::new();
        assert_validation_err(&s, "database.url is empty");
    }

    #[test]
    fn zero_web_port_rejected() {
        let mut s = Settings::default();
        s.web.port = 0;
        assert_validation_err(&s, "web.port");
    }

    #[test]
    fn multiple_errors_collected() {
        let mut s = Settings::default();
        s.mqtt.host = String::new();
        s.mqtt.port = 0;
        s.mqtt.base_topic = "/bad topic/".to_string();
        let err = s.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(msg.contains("mqtt.host is empty"), "missing host error in: {msg}");
        assert!(msg.contains("mqtt.port"), "missing port error in: {msg}");
        assert!(msg.contains("whitespace"), "missing topic error in: {msg}");
    }
}
