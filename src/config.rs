use crate::error::{BridgeError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use strum::{Display, EnumString};

pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_MQTT_TOPIC: &str = "tele/tasmota_ir";
pub const DEFAULT_SCAN_INTERVAL_SECS: u64 = 10;
pub const DEFAULT_BROKER_PORT: u16 = 1883;

/// Load environment variables from a `.env` style file.
/// Handles values with spaces without requiring quotes.
pub fn load_dotenv() {
    load_dotenv_from(Path::new(".env"));
}

/// Same as [`load_dotenv`], reading from an explicit path.
///
/// Variables already present in the process environment are left untouched.
pub fn load_dotenv_from(env_path: &Path) {
    let Ok(content) = fs::read_to_string(env_path) else {
        return;
    };

    for (key, value) in parse_dotenv(&content) {
        if std::env::var(key).is_err() {
            // SAFETY: called from main before the tokio runtime spawns any worker threads
            unsafe { std::env::set_var(key, value) };
        }
    }
}

/// Split `.env` content into key/value pairs, skipping blanks and comments.
fn parse_dotenv(content: &str) -> Vec<(&str, &str)> {
    let mut pairs = Vec::new();

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let mut value = value.trim();
        if value.len() >= 2
            && ((value.starts_with('"') && value.ends_with('"'))
                || (value.starts_with('\'') && value.ends_with('\'')))
        {
            value = &value[1..value.len() - 1];
        }
        pairs.push((key.trim(), value));
    }

    pairs
}

/// How commands reach the hub.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum TransportMode {
    /// Tasmota web API (`/cm?cmnd=...`), readings are polled.
    #[default]
    Http,
    /// Command topic publishes, readings are pushed.
    Mqtt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub hub: HubConfig,
    pub mqtt: MqttConfig,
}

/// Endpoint settings for one IR hub. Immutable once an entry is set up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HubConfig {
    pub host: String,
    pub port: u16,
    pub transport: TransportMode,
    pub mqtt_topic: String,
    /// Topic the hub publishes received codes on. Defaults to `<mqtt_topic>/RESULT`.
    pub receive_topic: Option<String>,
    pub http_user: Option<String>,
    #[serde(skip_serializing)]
    pub http_pass: Option<String>,
    pub scan_interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttConfig {
    /// Set when a broker was configured explicitly.
    pub enabled: bool,
    pub broker_host: String,
    pub broker_port: u16,
    pub client_id: String,
    pub username: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_PORT,
            transport: TransportMode::Http,
            mqtt_topic: DEFAULT_MQTT_TOPIC.to_string(),
            receive_topic: None,
            http_user: None,
            http_pass: None,
            scan_interval_secs: DEFAULT_SCAN_INTERVAL_SECS,
        }
    }
}

impl Default for MqttConfig {
    fn default() -> Self {
        let hostname = gethostname::gethostname().to_string_lossy().into_owned();
        Self {
            enabled: false,
            broker_host: "localhost".to_string(),
            broker_port: DEFAULT_BROKER_PORT,
            client_id: format!("tasmota-ir-bridge-{}", hostname),
            username: None,
            password: None,
        }
    }
}

impl HubConfig {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            ..Self::default()
        }
    }

    pub fn use_mqtt(&self) -> bool {
        self.transport == TransportMode::Mqtt
    }

    /// Topic that command payloads are published to.
    pub fn command_topic(&self) -> String {
        format!("{}/command", self.mqtt_topic)
    }

    pub fn receive_topic(&self) -> String {
        self.receive_topic
            .clone()
            .unwrap_or_else(|| format!("{}/RESULT", self.mqtt_topic))
    }

    /// Basic-auth credentials, only when both user and password are set.
    pub fn basic_auth(&self) -> Option<(&str, &str)> {
        match (self.http_user.as_deref(), self.http_pass.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some((user, pass))
            }
            _ => None,
        }
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    /// Human readable entry title.
    pub fn title(&self) -> String {
        format!("Tasmota IR Hub ({})", self.host)
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(BridgeError::InvalidConfig("host is required".into()));
        }
        if self.host.contains("://") || self.host.contains('/') {
            return Err(BridgeError::InvalidConfig(format!(
                "host must be a bare hostname or address, got: {}",
                self.host
            )));
        }
        if self.port == 0 {
            return Err(BridgeError::InvalidConfig("port must be non-zero".into()));
        }
        if self.scan_interval_secs == 0 {
            return Err(BridgeError::InvalidConfig(
                "scan interval must be at least one second".into(),
            ));
        }
        if self.use_mqtt() && self.mqtt_topic.trim().is_empty() {
            return Err(BridgeError::InvalidConfig(
                "mqtt topic is required in mqtt mode".into(),
            ));
        }
        Ok(())
    }
}

impl Config {
    /// A broker connection is needed to publish commands in MQTT mode, or to
    /// receive IR readings whenever a broker is configured.
    pub fn needs_broker(&self) -> bool {
        self.hub.use_mqtt() || self.mqtt.enabled
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from any key lookup, starting from defaults.
    ///
    /// Empty credential values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut hub = HubConfig::default();
        let mut mqtt = MqttConfig::default();

        if let Some(host) = lookup("TASMOTA_IR_HOST") {
            hub.host = host.trim().to_string();
        }
        if let Some(port) = lookup("TASMOTA_IR_PORT") {
            hub.port = parse_var("TASMOTA_IR_PORT", &port)?;
        }
        if let Some(transport) = lookup("TASMOTA_IR_TRANSPORT") {
            hub.transport = transport.trim().parse().map_err(|_| {
                BridgeError::InvalidConfig(format!(
                    "TASMOTA_IR_TRANSPORT must be 'http' or 'mqtt', got: {}",
                    transport
                ))
            })?;
        }
        if let Some(topic) = lookup("TASMOTA_IR_MQTT_TOPIC") {
            hub.mqtt_topic = topic.trim().trim_end_matches('/').to_string();
        }
        hub.receive_topic = non_empty(lookup("TASMOTA_IR_RECEIVE_TOPIC"));
        hub.http_user = non_empty(lookup("TASMOTA_IR_HTTP_USER"));
        hub.http_pass = non_empty(lookup("TASMOTA_IR_HTTP_PASS"));
        if let Some(interval) = lookup("TASMOTA_IR_SCAN_INTERVAL") {
            hub.scan_interval_secs = parse_var("TASMOTA_IR_SCAN_INTERVAL", &interval)?;
        }

        if let Some(host) = non_empty(lookup("MQTT_BROKER_HOST")) {
            mqtt.broker_host = host;
            mqtt.enabled = true;
        }
        if let Some(port) = lookup("MQTT_BROKER_PORT") {
            mqtt.broker_port = parse_var("MQTT_BROKER_PORT", &port)?;
        }
        if let Some(client_id) = non_empty(lookup("MQTT_CLIENT_ID")) {
            mqtt.client_id = client_id;
        }
        mqtt.username = non_empty(lookup("MQTT_USERNAME"));
        mqtt.password = non_empty(lookup("MQTT_PASSWORD"));

        hub.validate()?;
        Ok(Self { hub, mqtt })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BridgeError::InvalidConfig(format!("{} has an invalid value: {}", key, value)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_applied() {
        let config = Config::from_lookup(lookup(&[("TASMOTA_IR_HOST", "10.0.0.50")])).unwrap();
        assert_eq!(config.hub.host, "10.0.0.50");
        assert_eq!(config.hub.port, 80);
        assert_eq!(config.hub.transport, TransportMode::Http);
        assert_eq!(config.hub.mqtt_topic, "tele/tasmota_ir");
        assert_eq!(config.hub.scan_interval(), Duration::from_secs(10));
        assert_eq!(config.mqtt.broker_port, 1883);
        assert!(config.mqtt.client_id.starts_with("tasmota-ir-bridge-"));
        assert!(!config.needs_broker());
    }

    #[test]
    fn test_broker_host_enables_receiving() {
        let config = Config::from_lookup(lookup(&[
            ("TASMOTA_IR_HOST", "10.0.0.50"),
            ("MQTT_BROKER_HOST", "10.0.0.2"),
        ]))
        .unwrap();
        assert!(config.mqtt.enabled);
        assert!(config.needs_broker());
    }

    #[test]
    fn test_missing_host_rejected() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, BridgeError::InvalidConfig(_)));
    }

    #[test]
    fn test_transport_parsing() {
        let config = Config::from_lookup(lookup(&[
            ("TASMOTA_IR_HOST", "hub.local"),
            ("TASMOTA_IR_TRANSPORT", "MQTT"),
            ("TASMOTA_IR_MQTT_TOPIC", "ir/living/"),
        ]))
        .unwrap();
        assert!(config.hub.use_mqtt());
        assert_eq!(config.hub.command_topic(), "ir/living/command");
        assert_eq!(config.hub.receive_topic(), "ir/living/RESULT");

        let err = Config::from_lookup(lookup(&[
            ("TASMOTA_IR_HOST", "hub.local"),
            ("TASMOTA_IR_TRANSPORT", "serial"),
        ]))
        .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidConfig(_)));
    }

    #[test]
    fn test_invalid_port_rejected() {
        let err = Config::from_lookup(lookup(&[
            ("TASMOTA_IR_HOST", "hub.local"),
            ("TASMOTA_IR_PORT", "eighty"),
        ]))
        .unwrap_err();
        assert!(matches!(err, BridgeError::InvalidConfig(_)));
    }

    #[test]
    fn test_basic_auth_requires_both_parts() {
        let mut hub = HubConfig::new("hub.local");
        assert_eq!(hub.basic_auth(), None);

        hub.http_user = Some("admin".into());
        assert_eq!(hub.basic_auth(), None);

        hub.http_pass = Some(String::new());
        assert_eq!(hub.basic_auth(), None);

        hub.http_pass = Some("secret".into());
        assert_eq!(hub.basic_auth(), Some(("admin", "secret")));
    }

    #[test]
    fn test_empty_credentials_treated_as_unset() {
        let config = Config::from_lookup(lookup(&[
            ("TASMOTA_IR_HOST", "hub.local"),
            ("TASMOTA_IR_HTTP_USER", ""),
            ("TASMOTA_IR_HTTP_PASS", "  "),
        ]))
        .unwrap();
        assert_eq!(config.hub.http_user, None);
        assert_eq!(config.hub.http_pass, None);
    }

    #[test]
    fn test_validate_rejects_url_host() {
        let hub = HubConfig::new("http://10.0.0.50");
        assert!(hub.validate().is_err());
    }

    #[test]
    fn test_title() {
        assert_eq!(HubConfig::new("10.0.0.50").title(), "Tasmota IR Hub (10.0.0.50)");
    }

    #[test]
    fn test_parse_dotenv() {
        let content = "# comment\n\nTASMOTA_IR_HOST = 10.0.0.50\nMQTT_USERNAME=\"ir user\"\nbroken line\n";
        let pairs = parse_dotenv(content);
        assert_eq!(
            pairs,
            vec![("TASMOTA_IR_HOST", "10.0.0.50"), ("MQTT_USERNAME", "ir user")]
        );
    }
}
