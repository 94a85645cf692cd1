use serde::Deserialize;

/// Top-level configuration settings for the hub platforms.
///
/// Includes settings for the MQTT bridge, the state store and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub mqtt: MqttSettings,
    pub persistence: PersistenceSettings,
    pub logging: LoggingSettings,
}

/// Configuration settings for the MQTT bridge.
///
/// Broker address and credentials are handed to the transport; the birth
/// message and reconnect delays drive the client component itself.
#[derive(Debug, Deserialize, Clone)]
pub struct MqttSettings {
    pub broker: String,
    pub port: u16,
    pub client_id: Option<String>,
    pub keepalive_secs: u64,
    pub username: Option<String>,
    pub password: Option<String>,
    pub birth_message: Option<BirthMessage>,
    pub reconnect_base_delay_ms: u64,
    pub reconnect_max_delay_ms: u64,
}

/// Message published every time the broker accepts the connection.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct BirthMessage {
    pub topic: String,
    pub payload: String,
    #[serde(default)]
    pub qos: u8,
    #[serde(default)]
    pub retain: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PersistenceSettings {
    pub path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub mqtt: Option<PartialMqttSettings>,
    pub persistence: Option<PartialPersistenceSettings>,
    pub logging: Option<PartialLoggingSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialMqttSettings {
    pub broker: Option<String>,
    pub port: Option<u16>,
    pub client_id: Option<String>,
    pub keepalive_secs: Option<u64>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub birth_message: Option<BirthMessage>,
    pub reconnect_base_delay_ms: Option<u64>,
    pub reconnect_max_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct PartialPersistenceSettings {
    pub path: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLoggingSettings {
    pub level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            mqtt: MqttSettings {
                broker: "localhost".to_string(),
                port: 1883,
                client_id: None,
                keepalive_secs: 60,
                username: None,
                password: None,
                birth_message: None,
                reconnect_base_delay_ms: 1_000,
                reconnect_max_delay_ms: 300_000,
            },
            persistence: PersistenceSettings {
                path: "hub_state_db".to_string(),
            },
            logging: LoggingSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Fill every missing value from `Settings::default()`.
    pub fn merge_with_defaults(self) -> Settings {
        let default = Settings::default();
        let mqtt = self.mqtt;
        let persistence = self.persistence;
        let logging = self.logging;

        Settings {
            mqtt: MqttSettings {
                broker: mqtt
                    .as_ref()
                    .and_then(|m| m.broker.clone())
                    .unwrap_or(default.mqtt.broker),
                port: mqtt
                    .as_ref()
                    .and_then(|m| m.port)
                    .unwrap_or(default.mqtt.port),
                client_id: mqtt.as_ref().and_then(|m| m.client_id.clone()),
                keepalive_secs: mqtt
                    .as_ref()
                    .and_then(|m| m.keepalive_secs)
                    .unwrap_or(default.mqtt.keepalive_secs),
                username: mqtt.as_ref().and_then(|m| m.username.clone()),
                password: mqtt.as_ref().and_then(|m| m.password.clone()),
                birth_message: mqtt.as_ref().and_then(|m| m.birth_message.clone()),
                reconnect_base_delay_ms: mqtt
                    .as_ref()
                    .and_then(|m| m.reconnect_base_delay_ms)
                    .unwrap_or(default.mqtt.reconnect_base_delay_ms),
                reconnect_max_delay_ms: mqtt
                    .as_ref()
                    .and_then(|m| m.reconnect_max_delay_ms)
                    .unwrap_or(default.mqtt.reconnect_max_delay_ms),
            },
            persistence: PersistenceSettings {
                path: persistence
                    .and_then(|p| p.path)
                    .unwrap_or(default.persistence.path),
            },
            logging: LoggingSettings {
                level: logging
                    .and_then(|l| l.level)
                    .unwrap_or(default.logging.level),
            },
        }
    }
}
