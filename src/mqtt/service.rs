//! `mqtt.publish` service data
//!
//! Service calls arrive as loosely typed JSON from automations and the UI, so
//! `qos` may be an integer or a numeric string and `retain` may be a boolean
//! or one of the usual boolean words. `payload` may be any JSON value;
//! strings are sent as they are and everything else as its JSON text.
//!
//! `payload_template` is accepted by the schema so that a call carrying it is
//! refused with a clear error instead of publishing an empty payload.

use serde::Deserialize;
use serde_json::Value;

use crate::mqtt::message::QoS;
use crate::utils::error::MqttError;

pub const DOMAIN: &str = "mqtt";
pub const SERVICE_PUBLISH: &str = "publish";

pub const ATTR_TOPIC: &str = "topic";
pub const ATTR_PAYLOAD: &str = "payload";
pub const ATTR_PAYLOAD_TEMPLATE: &str = "payload_template";
pub const ATTR_QOS: &str = "qos";
pub const ATTR_RETAIN: &str = "retain";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawPublishData {
    topic: Option<String>,
    payload: Option<Value>,
    payload_template: Option<String>,
    qos: Option<Value>,
    retain: Option<Value>,
}

/// A validated publish request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishRequest {
    pub topic: String,
    pub payload: String,
    pub qos: QoS,
    pub retain: bool,
}

impl PublishRequest {
    pub fn from_service_data(data: &Value) -> Result<Self, MqttError> {
        let raw = RawPublishData::deserialize(data)
            .map_err(|e| MqttError::ServiceData(e.to_string()))?;

        let topic = raw
            .topic
            .ok_or_else(|| MqttError::ServiceData(format!("required key '{ATTR_TOPIC}' missing")))?;
        let payload = match (raw.payload, raw.payload_template) {
            (Some(_), Some(_)) => {
                return Err(MqttError::ServiceData(format!(
                    "'{ATTR_PAYLOAD}' and '{ATTR_PAYLOAD_TEMPLATE}' are mutually exclusive"
                )));
            }
            (None, Some(_)) => {
                return Err(MqttError::ServiceData(format!(
                    "'{ATTR_PAYLOAD_TEMPLATE}' is not supported, render the payload before publishing"
                )));
            }
            (Some(value), None) => payload_text(value),
            (None, None) => String::new(),
        };
        let qos = match raw.qos {
            Some(value) => coerce_qos(&value)?,
            None => QoS::default(),
        };
        let retain = match raw.retain {
            Some(value) => coerce_bool(&value)?,
            None => false,
        };

        Ok(Self {
            topic,
            payload,
            qos,
            retain,
        })
    }
}

fn payload_text(value: Value) -> String {
    match value {
        Value::String(s) => s,
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn coerce_qos(value: &Value) -> Result<QoS, MqttError> {
    let level = match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    let level = level
        .and_then(|l| u8::try_from(l).ok())
        .ok_or_else(|| MqttError::ServiceData(format!("invalid {ATTR_QOS} value {value}")))?;
    QoS::try_from(level)
}

fn coerce_bool(value: &Value) -> Result<bool, MqttError> {
    let parsed = match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_u64() {
            Some(0) => Some(false),
            Some(1) => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" | "enable" => Some(true),
            "0" | "false" | "no" | "off" | "disable" => Some(false),
            _ => None,
        },
        _ => None,
    };
    parsed.ok_or_else(|| MqttError::ServiceData(format!("invalid {ATTR_RETAIN} value {value}")))
}
