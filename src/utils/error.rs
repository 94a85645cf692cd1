//! The `error` module defines the error types used across the platforms.
//!
//! Every fallible operation in the crate returns one of these enums. They are
//! kept together so the transport, entity and storage layers agree on how a
//! failure is described and propagated.

use thiserror::Error;

use crate::mqtt::message::ConnectReturnCode;

/// Rejections produced while validating an MQTT topic or topic filter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    #[error("topic must not be empty")]
    Empty,
    #[error("topic is {0} bytes, longer than the 65535 byte limit")]
    TooLong(usize),
    #[error("topic must not contain a NUL character")]
    NullCharacter,
    #[error("wildcard '{wildcard}' is not allowed in segment '{segment}'")]
    MisplacedWildcard { wildcard: char, segment: String },
    #[error("multi-level wildcard '#' must be the last segment")]
    MultiLevelNotLast,
    #[error("wildcards are not allowed in publish topic '{0}'")]
    WildcardInPublish(String),
}

/// Errors reported by a broker transport implementation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    ConnectionRefused(ConnectReturnCode),
    #[error("transport is not connected")]
    NotConnected,
    #[error("transport I/O failure: {0}")]
    Io(String),
}

#[derive(Debug, Error)]
pub enum MqttError {
    #[error(transparent)]
    Topic(#[from] TopicError),
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("unable to connect to the broker during setup: {0}")]
    Setup(TransportError),
    #[error("invalid QoS level {0}")]
    InvalidQos(u8),
    #[error("invalid service data: {0}")]
    ServiceData(String),
    #[error("MQTT client must be created inside a tokio runtime")]
    NoRuntime,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LockError {
    #[error("invalid device identifier '{0}', expected hexadecimal")]
    InvalidDeviceId(String),
    #[error("invalid usercode: must be {max} or less digits, got {len}")]
    InvalidUsercode { len: usize, max: usize },
    #[error("Z-Wave node {0} not found")]
    UnknownNode(u8),
    #[error("node has no usercode slot {0}")]
    UnknownSlot(u8),
    #[error("unknown lock service '{0}'")]
    UnknownService(String),
    #[error("invalid service data: {0}")]
    ServiceData(String),
    #[error("failed to write Z-Wave value: {0}")]
    Write(String),
}

#[derive(Debug, Error)]
pub enum SliderError {
    #[error("invalid input_slider configuration: {0}")]
    InvalidConfig(String),
    #[error("entity {0} not found")]
    UnknownEntity(String),
    #[error("value '{0}' is not a number")]
    InvalidValue(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Error)]
pub enum RingError {
    #[error("invalid Ring configuration: {0}")]
    InvalidConfig(String),
    #[error("unable to reach Ring API: {0}")]
    Connection(String),
    #[error("unexpected Ring API response: {0}")]
    Response(#[from] serde_json::Error),
    #[error("device {0} is no longer reported by the Ring API")]
    DeviceGone(u64),
}

/// Errors of the configuration editing API. Each maps to an HTTP status.
#[derive(Debug, Error)]
pub enum ConfigEditError {
    #[error("Entity not found")]
    NotFound,
    #[error("Invalid JSON specified")]
    InvalidJson,
    #[error("Key is invalid: {0}")]
    InvalidKey(String),
    #[error("Message malformed: {0}")]
    InvalidData(String),
    #[error("config file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("config file is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

impl ConfigEditError {
    pub fn status_code(&self) -> u16 {
        match self {
            ConfigEditError::NotFound => 404,
            ConfigEditError::InvalidJson
            | ConfigEditError::InvalidKey(_)
            | ConfigEditError::InvalidData(_) => 400,
            ConfigEditError::Io(_) | ConfigEditError::Parse(_) => 500,
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("state store failure: {0}")]
    Sled(#[from] sled::Error),
    #[error("stored state is not valid JSON: {0}")]
    Serde(#[from] serde_json::Error),
}
