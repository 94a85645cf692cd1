//! Message definitions for the MQTT bridge
//!
//! `MqttMessage` is what subscribers receive once a payload has been decoded
//! as UTF-8 text. `MqttEvent` is what the bridge reports to the hub's event
//! system for every inbound publish.
//!
//! Notes on fields:
//! - `topic`: concrete topic the broker delivered the message on
//! - `payload`: decoded text payload
//! - `qos`: delivery mode the broker used
//! - `timestamp`: milliseconds since UNIX epoch, set on receipt

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::error::MqttError;

/// Packet identifier assigned by the transport to (un)subscribe and publish requests.
pub type MessageId = u16;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum QoS {
    #[default]
    AtMostOnce,
    AtLeastOnce,
    ExactlyOnce,
}

impl From<QoS> for u8 {
    fn from(qos: QoS) -> u8 {
        match qos {
            QoS::AtMostOnce => 0,
            QoS::AtLeastOnce => 1,
            QoS::ExactlyOnce => 2,
        }
    }
}

impl TryFrom<u8> for QoS {
    type Error = MqttError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(QoS::AtMostOnce),
            1 => Ok(QoS::AtLeastOnce),
            2 => Ok(QoS::ExactlyOnce),
            other => Err(MqttError::InvalidQos(other)),
        }
    }
}

impl fmt::Display for QoS {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", u8::from(*self))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: String,
    pub qos: QoS,
    pub timestamp: i64,
}

/// Event emitted to the hub for each message received from the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MqttEvent {
    MessageReceived(MqttMessage),
    /// The payload could not be decoded as UTF-8 and was not delivered.
    DecodeError {
        topic: String,
        payload: Vec<u8>,
        qos: u8,
    },
}

/// Reason codes carried by a `CONNACK`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectReturnCode {
    Accepted,
    UnacceptableProtocolVersion,
    IdentifierRejected,
    ServerUnavailable,
    BadUserNameOrPassword,
    NotAuthorized,
    Other(u8),
}

impl From<u8> for ConnectReturnCode {
    fn from(val: u8) -> Self {
        match val {
            0 => Self::Accepted,
            1 => Self::UnacceptableProtocolVersion,
            2 => Self::IdentifierRejected,
            3 => Self::ServerUnavailable,
            4 => Self::BadUserNameOrPassword,
            5 => Self::NotAuthorized,
            _ => Self::Other(val),
        }
    }
}

impl fmt::Display for ConnectReturnCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accepted => write!(f, "Connection Accepted."),
            Self::UnacceptableProtocolVersion => {
                write!(f, "Connection Refused: unacceptable protocol version.")
            }
            Self::IdentifierRejected => write!(f, "Connection Refused: identifier rejected."),
            Self::ServerUnavailable => write!(f, "Connection Refused: broker unavailable."),
            Self::BadUserNameOrPassword => {
                write!(f, "Connection Refused: bad user name or password.")
            }
            Self::NotAuthorized => write!(f, "Connection Refused: not authorised."),
            Self::Other(code) => write!(f, "Connection Refused: unknown reason ({code})."),
        }
    }
}
